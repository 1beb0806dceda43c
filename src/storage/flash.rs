use crate::error::Error;
use crate::platform::AlignedOps;
use crate::storage::{Region, Storage};
use alloc::vec;
use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};
use strum::EnumCount;

const LEN_SIZE: usize = size_of::<u32>();
const ERASED_LEN: u32 = u32::MAX;

/// A raw NOR flash area split into one erase-aligned slot per [`Region`].
///
/// Slot layout: `[len: u32 LE][payload][0xff padding]`. A slot that was never written still
/// reads `0xffffffff` as its length and is reported as [`Error::NotFound`].
///
/// A failed flash operation marks the store as faulted until it is mounted again. The mark is
/// informational: every erase and write still runs on its own, so a fault on one copy of a record
/// never keeps the other copy from being written.
pub struct FlashStore<F: NorFlash> {
    flash: F,
    base_address: usize,
    region_size: usize,
    faulted: bool,
}

impl<F: NorFlash> FlashStore<F> {
    /// `base_address` has to be aligned to the erase size of the flash and `region_size` a
    /// non-zero multiple of it. The store occupies `region_size * Region::COUNT` bytes.
    pub fn new(flash: F, base_address: usize, region_size: usize) -> Result<Self, Error> {
        if !base_address.is_multiple_of(F::ERASE_SIZE) {
            return Err(Error::InvalidRegionOffset);
        }

        if region_size == 0 || !region_size.is_multiple_of(F::ERASE_SIZE) {
            return Err(Error::InvalidRegionSize);
        }

        Ok(Self {
            flash,
            base_address,
            region_size,
            faulted: false,
        })
    }

    /// Smallest region size that fits `payload` bytes.
    pub fn region_size_for(payload: usize) -> usize {
        F::align_erase_ceil(LEN_SIZE + payload)
    }

    pub fn size(&self) -> usize {
        self.region_size * Region::COUNT
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    pub fn into_inner(self) -> F {
        self.flash
    }

    /// Whether a flash operation failed since the last mount.
    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    /// Start address of `region`, or [`Error::StorageUnavailable`] if the flash ends before it.
    fn region_address(&self, region: Region) -> Result<usize, Error> {
        let address = self.base_address + region.index() * self.region_size;
        if address + self.region_size > self.flash.capacity() {
            return Err(Error::StorageUnavailable);
        }
        Ok(address)
    }

    fn check_capacity(&self) -> Result<(), Error> {
        let end = self.base_address + self.size();
        if end > self.flash.capacity() {
            error!(
                "flash store: area ends at {:#x}, flash capacity {:#x}",
                end,
                self.flash.capacity()
            );
            return Err(Error::StorageUnavailable);
        }
        Ok(())
    }

    fn io_error<E>(&mut self, _err: E) -> Error {
        warn!("flash store: flash operation failed");
        self.faulted = true;
        Error::StorageIo
    }
}

impl<F: NorFlash> Storage for FlashStore<F> {
    fn mount(&mut self) -> Result<(), Error> {
        self.check_capacity()?;
        self.faulted = false;
        Ok(())
    }

    fn format(&mut self) -> Result<(), Error> {
        self.check_capacity()?;
        let from = self.base_address as u32;
        let to = (self.base_address + self.size()) as u32;
        debug!("flash store: format {:#x}..{:#x}", from, to);
        self.flash.erase(from, to).map_err(|e| self.io_error(e))
    }

    fn read(&mut self, region: Region, buf: &mut [u8]) -> Result<(), Error> {
        let len = LEN_SIZE + buf.len();
        if len > self.region_size {
            return Err(Error::RegionTooSmall);
        }

        let mut raw = vec![0u8; F::align_read(len)];
        let address = self.region_address(region)? as u32;
        self.flash
            .read(address, &mut raw)
            .map_err(|e| self.io_error(e))?;

        let mut len_bytes = [0u8; LEN_SIZE];
        len_bytes.copy_from_slice(&raw[..LEN_SIZE]);
        match u32::from_le_bytes(len_bytes) {
            ERASED_LEN => Err(Error::NotFound),
            stored if stored as usize != buf.len() => {
                warn!(
                    "flash store: {} holds {} bytes, expected {}",
                    region,
                    stored,
                    buf.len()
                );
                Err(Error::CorruptedData)
            }
            _ => {
                buf.copy_from_slice(&raw[LEN_SIZE..len]);
                Ok(())
            }
        }
    }

    fn write(&mut self, region: Region, data: &[u8]) -> Result<(), Error> {
        let len = LEN_SIZE + data.len();
        if len > self.region_size {
            return Err(Error::RegionTooSmall);
        }

        let address = self.region_address(region)?;
        trace!("flash store: write {} at {:#x}", region, address);
        self.flash
            .erase(address as u32, (address + self.region_size) as u32)
            .map_err(|e| self.io_error(e))?;

        let mut raw = vec![0xffu8; F::align_write_ceil(len)];
        raw[..LEN_SIZE].copy_from_slice(&(data.len() as u32).to_le_bytes());
        raw[LEN_SIZE..len].copy_from_slice(data);
        self.flash
            .write(address as u32, &raw)
            .map_err(|e| self.io_error(e))
    }
}
