//! The connectivity engine: walks the stored credential slots in order and reports the first one
//! that works. Failures are reported as [`ConnectStatus::Failed`], never as errors.

use crate::config::{AccessPoint, ConnectPolicy, StationConfig, WIFI_POLL_INTERVAL_MS};
use crate::record::{CloudCredential, WifiCredential};
use embedded_hal::delay::DelayNs;

/// The WiFi interface of the device.
pub trait WifiStation {
    type Error;

    /// Starts associating with a network. Returns once the request is accepted, the link state is
    /// polled with [`is_connected`](Self::is_connected).
    fn connect(
        &mut self,
        ssid: &str,
        password: &str,
        config: &StationConfig,
    ) -> Result<(), Self::Error>;

    fn is_connected(&mut self) -> bool;

    /// Switches to access point mode for the config portal.
    fn start_access_point(&mut self, access_point: &AccessPoint) -> Result<(), Self::Error>;
}

/// The client of the cloud service the credentials are for.
pub trait CloudLink {
    type Error;

    /// Connects and authenticates, giving up after `timeout_ms`.
    fn connect(
        &mut self,
        server: &str,
        token: &str,
        port: u16,
        timeout_ms: u32,
    ) -> Result<(), Self::Error>;

    fn is_connected(&mut self) -> bool;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectStatus {
    /// Connected with the credentials of `slot`.
    Connected { slot: usize },
    Failed,
}

impl ConnectStatus {
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectStatus::Connected { .. })
    }
}

/// Tries every usable network slot in order, each up to `policy.wifi_attempts_per_slot` times.
/// Slots holding the placeholder or an empty ssid are skipped.
pub fn connect_network<W: WifiStation, D: DelayNs>(
    station: &mut W,
    delay: &mut D,
    credentials: &[WifiCredential],
    config: &StationConfig,
    policy: &ConnectPolicy,
) -> ConnectStatus {
    for (slot, credential) in credentials.iter().enumerate() {
        if credential.is_blank() || credential.ssid.is_empty() {
            debug!("wifi: slot {} not configured, skipping", slot);
            continue;
        }

        for attempt in 1..=policy.wifi_attempts_per_slot {
            info!(
                "wifi: connecting to {}, slot {} attempt {}",
                credential.ssid.as_str(),
                slot,
                attempt
            );
            let requested = station
                .connect(credential.ssid.as_str(), credential.password.as_str(), config)
                .is_ok();
            if !requested {
                warn!("wifi: slot {} rejected by the station", slot);
                delay.delay_ms(policy.wifi_retry_delay_ms);
                continue;
            }

            if wait_for_link(station, delay, policy.wifi_retry_delay_ms) {
                info!("wifi: connected with slot {}", slot);
                return ConnectStatus::Connected { slot };
            }
        }
    }

    warn!("wifi: no network slot connected");
    ConnectStatus::Failed
}

/// Polls the link until it is up or `timeout_ms` has passed.
fn wait_for_link<W: WifiStation, D: DelayNs>(
    station: &mut W,
    delay: &mut D,
    timeout_ms: u32,
) -> bool {
    let mut waited = 0;
    loop {
        if station.is_connected() {
            return true;
        }
        if waited >= timeout_ms {
            return false;
        }
        let step = WIFI_POLL_INTERVAL_MS.min(timeout_ms - waited);
        delay.delay_ms(step);
        waited += step;
    }
}

/// Tries every usable cloud slot once, in order. Slots holding the placeholder or an empty
/// server are skipped.
pub fn connect_cloud_link<L: CloudLink>(
    link: &mut L,
    credentials: &[CloudCredential],
    port: u16,
    timeout_ms: u32,
) -> ConnectStatus {
    for (slot, credential) in credentials.iter().enumerate() {
        if credential.is_blank() || credential.server.is_empty() {
            debug!("cloud: slot {} not configured, skipping", slot);
            continue;
        }

        info!(
            "cloud: connecting to {}:{}, slot {}",
            credential.server.as_str(),
            port,
            slot
        );
        let connected = link
            .connect(
                credential.server.as_str(),
                credential.token.as_str(),
                port,
                timeout_ms,
            )
            .is_ok();
        if connected && link.is_connected() {
            info!("cloud: connected with slot {}", slot);
            return ConnectStatus::Connected { slot };
        }
        warn!("cloud: slot {} failed", slot);
    }

    ConnectStatus::Failed
}
