use embedded_hal::delay::DelayNs;
use embedded_storage::nor_flash::NorFlash;

pub trait AlignedOps: NorFlash {
    fn align_read(size: usize) -> usize {
        align_ceil(size, Self::READ_SIZE)
    }

    fn align_write_ceil(size: usize) -> usize {
        align_ceil(size, Self::WRITE_SIZE)
    }

    fn align_erase_ceil(size: usize) -> usize {
        align_ceil(size, Self::ERASE_SIZE)
    }
}

#[inline(always)]
const fn align_ceil(size: usize, alignment: usize) -> usize {
    if alignment.is_power_of_two() {
        size.saturating_add(alignment - 1) & !(alignment - 1)
    } else {
        size.saturating_add(alignment - 1) / alignment * alignment
    }
}

impl<T: NorFlash> AlignedOps for T {}

/// The board the provisioning runs on: a monotonic uptime clock, blocking delays, a chip
/// identifier for the generated access point identity and the ability to restart.
pub trait Board: DelayNs {
    /// Milliseconds since boot.
    fn now_ms(&mut self) -> u64;

    /// Unique chip identifier, usually derived from the factory MAC address.
    fn chip_id(&self) -> u32;

    /// Restarts the device. Hosts and tests may return, the manager treats the run as finished
    /// either way.
    fn restart(&mut self);
}

/// Reports whether this boot was preceded by a burst of resets in quick succession, the manual
/// trigger for the config portal. Implementations usually persist a counter in RTC memory.
pub trait ResetDetector {
    /// Called exactly once during boot.
    fn detect_reset_burst(&mut self) -> bool;

    /// Called on every supervisory tick so the detector can close its time window.
    fn tick(&mut self) {}
}

/// A detector that never reports a burst, for boards without one.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoResetDetector;

impl ResetDetector for NoResetDetector {
    fn detect_reset_burst(&mut self) -> bool {
        false
    }
}

#[cfg(any(
    feature = "esp32",
    feature = "esp32s2",
    feature = "esp32s3",
    feature = "esp32c2",
    feature = "esp32c3",
    feature = "esp32c6",
    feature = "esp32h2",
))]
mod chip {
    use crate::platform::Board;
    use crate::storage::FlashStore;
    use embedded_hal::delay::DelayNs;
    use esp_hal::delay::Delay;
    use esp_hal::time::Instant;
    use esp_storage::FlashStorage;

    /// The record store medium on the internal SPI flash.
    pub type EspFlashStore<'d> = FlashStore<FlashStorage<'d>>;

    pub struct EspBoard {
        delay: Delay,
        chip_id: u32,
    }

    impl EspBoard {
        /// `chip_id` is usually the lower 24 bits of the factory MAC address.
        pub fn new(chip_id: u32) -> Self {
            Self {
                delay: Delay::new(),
                chip_id,
            }
        }
    }

    impl DelayNs for EspBoard {
        fn delay_ns(&mut self, ns: u32) {
            self.delay.delay_ns(ns);
        }
    }

    impl Board for EspBoard {
        fn now_ms(&mut self) -> u64 {
            Instant::now().duration_since_epoch().as_millis()
        }

        fn chip_id(&self) -> u32 {
            self.chip_id
        }

        fn restart(&mut self) {
            esp_hal::system::software_reset();
        }
    }
}

#[cfg(any(
    feature = "esp32",
    feature = "esp32s2",
    feature = "esp32s3",
    feature = "esp32c2",
    feature = "esp32c3",
    feature = "esp32c6",
    feature = "esp32h2",
))]
pub use chip::*;

#[cfg(test)]
mod tests {
    use super::align_ceil;

    #[test]
    fn align_ceil_rounds_up() {
        assert_eq!(align_ceil(0, 4), 0);
        assert_eq!(align_ceil(5, 4), 8);
        assert_eq!(align_ceil(8, 4), 8);
        assert_eq!(align_ceil(7, 3), 9);
    }
}
