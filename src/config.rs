//! Runtime knobs of the provisioning manager.
//!
//! Every struct here is plain data with a `Default`. Values set by the application are clamped
//! into their legal range by [`ProvisioningConfig::sanitized`] before the manager uses them.

use alloc::format;
use alloc::string::String;
use core::net::Ipv4Addr;

use crate::record::HEADER_LEN;

pub const DEFAULT_BOARD_TYPE: &str = "ESP32";

pub const CONFIG_TIMEOUT_DEFAULT_MS: u32 = 60_000;
pub const CONFIG_TIMEOUT_MIN_MS: u32 = 10_000;

pub const RETRIES_BEFORE_RESET_DEFAULT: u8 = 10;
pub const RETRIES_BEFORE_RESET_MIN: u8 = 2;
pub const RETRIES_BEFORE_RESET_MAX: u8 = 100;

// Long enough for the acknowledgement of the last field update to leave the socket.
pub const RESTART_DELAY_DEFAULT_MS: u32 = 1_000;

pub const WIFI_ATTEMPTS_PER_SLOT_DEFAULT: u8 = 3;
pub const WIFI_RETRY_DELAY_DEFAULT_MS: u32 = 3_000;
pub const WIFI_RETRY_DELAY_MAX_MS: u32 = 60_000;
/// Step in which the link state is polled while waiting for an association.
pub const WIFI_POLL_INTERVAL_MS: u32 = 100;
pub const CLOUD_TIMEOUT_DEFAULT_MS: u32 = 10_000;
pub const CLOUD_TIMEOUT_MIN_MS: u32 = 1_000;
pub const CLOUD_TIMEOUT_MAX_MS: u32 = 60_000;
pub const BOOT_CLOUD_ROUNDS_DEFAULT: u8 = 10;

pub const MIN_WIFI_CHANNEL: u8 = 1;
pub const MAX_WIFI_CHANNEL: u8 = 11;
pub const DEFAULT_PORTAL_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);

pub const HOSTNAME_MAX_LEN: usize = 24;

/// How hard the connectivity engine tries before giving up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectPolicy {
    /// Association attempts per network slot.
    pub wifi_attempts_per_slot: u8,
    /// Longest wait for the link after each association attempt. The link is polled every
    /// [`WIFI_POLL_INTERVAL_MS`] in the meantime.
    pub wifi_retry_delay_ms: u32,
    /// Timeout of a single cloud link attempt.
    pub cloud_timeout_ms: u32,
    /// Rounds over all cloud slots at boot before falling back to the portal.
    pub boot_cloud_rounds: u8,
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        Self {
            wifi_attempts_per_slot: WIFI_ATTEMPTS_PER_SLOT_DEFAULT,
            wifi_retry_delay_ms: WIFI_RETRY_DELAY_DEFAULT_MS,
            cloud_timeout_ms: CLOUD_TIMEOUT_DEFAULT_MS,
            boot_cloud_rounds: BOOT_CLOUD_ROUNDS_DEFAULT,
        }
    }
}

impl ConnectPolicy {
    pub const fn sanitized(self) -> Self {
        Self {
            wifi_attempts_per_slot: clamp_u8(self.wifi_attempts_per_slot, 1, 20),
            wifi_retry_delay_ms: clamp_u32(self.wifi_retry_delay_ms, 0, WIFI_RETRY_DELAY_MAX_MS),
            cloud_timeout_ms: clamp_u32(
                self.cloud_timeout_ms,
                CLOUD_TIMEOUT_MIN_MS,
                CLOUD_TIMEOUT_MAX_MS,
            ),
            boot_cloud_rounds: clamp_u8(self.boot_cloud_rounds, 1, 20),
        }
    }
}

/// Identity of the access point opened in config mode. Ssid and password are generated from the
/// chip id unless both are set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessPointConfig {
    pub ssid: Option<String>,
    pub password: Option<String>,
    /// `0` picks a channel between 1 and 11 at random, out of range values fall back to 1.
    pub channel: u8,
    pub ip: Ipv4Addr,
}

impl Default for AccessPointConfig {
    fn default() -> Self {
        Self {
            ssid: None,
            password: None,
            channel: MIN_WIFI_CHANNEL,
            ip: DEFAULT_PORTAL_IP,
        }
    }
}

/// The access point as it is actually started.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessPoint {
    pub ssid: String,
    pub password: String,
    pub channel: u8,
    pub ip: Ipv4Addr,
}

impl AccessPointConfig {
    pub fn resolve(&self, chip_id: u32, now_ms: u64) -> AccessPoint {
        let (ssid, password) = match (&self.ssid, &self.password) {
            (Some(ssid), Some(password)) if !ssid.is_empty() && !password.is_empty() => {
                (ssid.clone(), password.clone())
            }
            _ => (format!("ESP_{chip_id:X}"), format!("MyESP_{chip_id:X}")),
        };

        let channel = match self.channel {
            0 => (now_ms % u64::from(MAX_WIFI_CHANNEL)) as u8 + MIN_WIFI_CHANNEL,
            c if c > MAX_WIFI_CHANNEL => MIN_WIFI_CHANNEL,
            c => c,
        };

        AccessPoint {
            ssid,
            password,
            channel,
            ip: self.ip,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StaticIpConfig {
    pub ip: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub subnet: Option<Ipv4Addr>,
    pub dns1: Option<Ipv4Addr>,
    pub dns2: Option<Ipv4Addr>,
}

/// A static station address with every optional part filled in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StaticIp {
    pub ip: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub subnet: Ipv4Addr,
    pub dns1: Ipv4Addr,
    pub dns2: Ipv4Addr,
}

impl StaticIpConfig {
    pub fn new(ip: Ipv4Addr, gateway: Ipv4Addr) -> Self {
        Self {
            ip,
            gateway,
            subnet: None,
            dns1: None,
            dns2: None,
        }
    }

    pub fn resolve(&self) -> StaticIp {
        StaticIp {
            ip: self.ip,
            gateway: self.gateway,
            subnet: self.subnet.unwrap_or(Ipv4Addr::new(255, 255, 255, 0)),
            dns1: self.dns1.unwrap_or(self.gateway),
            dns2: self.dns2.unwrap_or(Ipv4Addr::new(8, 8, 8, 8)),
        }
    }
}

/// Everything the station interface needs besides the credentials.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StationConfig {
    pub hostname: String,
    pub static_ip: Option<StaticIp>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortalOptions {
    /// Replaces the built-in `<style>` element.
    pub custom_style: Option<String>,
    /// Extra markup inserted into `<head>`.
    pub custom_head: Option<String>,
    /// Value of `Access-Control-Allow-Origin`, no header when `None`.
    pub cors_origin: Option<String>,
}

impl Default for PortalOptions {
    fn default() -> Self {
        Self {
            custom_style: None,
            custom_head: None,
            cors_origin: Some(String::from("*")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvisioningConfig {
    /// Header tag of the stored record. Records written by another board type are invalid.
    pub board_type: String,
    /// Deadline of config mode when one is set.
    pub config_timeout_ms: u32,
    /// Restart after `retries_before_reset` failed reconnect ticks past the deadline.
    pub reset_if_config_timeout: bool,
    pub retries_before_reset: u8,
    /// Delay between a commit and the restart.
    pub restart_delay_ms: u32,
    pub connect: ConnectPolicy,
    pub access_point: AccessPointConfig,
    pub static_ip: Option<StaticIpConfig>,
    /// Defaults to `<board_type>-<chip id>`.
    pub hostname: Option<String>,
    pub portal: PortalOptions,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            board_type: String::from(DEFAULT_BOARD_TYPE),
            config_timeout_ms: CONFIG_TIMEOUT_DEFAULT_MS,
            reset_if_config_timeout: true,
            retries_before_reset: RETRIES_BEFORE_RESET_DEFAULT,
            restart_delay_ms: RESTART_DELAY_DEFAULT_MS,
            connect: ConnectPolicy::default(),
            access_point: AccessPointConfig::default(),
            static_ip: None,
            hostname: None,
            portal: PortalOptions::default(),
        }
    }
}

impl ProvisioningConfig {
    pub fn sanitized(mut self) -> Self {
        // one byte of the header stays reserved for the terminator
        let mut end = self.board_type.len().min(HEADER_LEN - 1);
        while !self.board_type.is_char_boundary(end) {
            end -= 1;
        }
        self.board_type.truncate(end);

        self.config_timeout_ms = self.config_timeout_ms.max(CONFIG_TIMEOUT_MIN_MS);
        self.retries_before_reset = clamp_u8(
            self.retries_before_reset,
            RETRIES_BEFORE_RESET_MIN,
            RETRIES_BEFORE_RESET_MAX,
        );
        self.connect = self.connect.sanitized();
        self
    }

    /// The RFC 952 host name the station registers with.
    pub fn hostname(&self, chip_id: u32) -> String {
        match &self.hostname {
            Some(name) if !name.is_empty() => rfc952_hostname(name),
            _ => rfc952_hostname(&format!("{}-{:X}", self.board_type, chip_id)),
        }
    }

    pub fn station(&self, chip_id: u32) -> StationConfig {
        StationConfig {
            hostname: self.hostname(chip_id),
            static_ip: self.static_ip.as_ref().map(StaticIpConfig::resolve),
        }
    }
}

/// Reduces `name` to a valid host name: letters, digits and `-` only, at most
/// [`HOSTNAME_MAX_LEN`] characters, no trailing `-`.
pub fn rfc952_hostname(name: &str) -> String {
    let mut host: String = name
        .chars()
        .take(HOSTNAME_MAX_LEN)
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    while host.ends_with('-') {
        host.pop();
    }
    host
}

const fn clamp_u32(value: u32, min: u32, max: u32) -> u32 {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

const fn clamp_u8(value: u8, min: u8, max: u8) -> u8 {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_is_sanitized() {
        assert_eq!(rfc952_hostname("my_board #1-"), "myboard1");
        assert_eq!(rfc952_hostname("a-b-c--"), "a-b-c");
        assert_eq!(
            rfc952_hostname("abcdefghijklmnopqrstuvwxyz0123"),
            "abcdefghijklmnopqrstuvwx"
        );
    }

    #[test]
    fn default_hostname_uses_chip_id() {
        let config = ProvisioningConfig::default();
        assert_eq!(config.hostname(0x00ab_12cd), "ESP32-AB12CD");
    }

    #[test]
    fn knobs_are_clamped() {
        let config = ProvisioningConfig {
            board_type: String::from("a-very-long-board-type"),
            config_timeout_ms: 5,
            retries_before_reset: 0,
            connect: ConnectPolicy {
                wifi_attempts_per_slot: 0,
                wifi_retry_delay_ms: u32::MAX,
                cloud_timeout_ms: 1,
                boot_cloud_rounds: 200,
            },
            ..Default::default()
        }
        .sanitized();

        assert_eq!(config.board_type, "a-very-long-boa");
        assert_eq!(config.config_timeout_ms, CONFIG_TIMEOUT_MIN_MS);
        assert_eq!(config.retries_before_reset, RETRIES_BEFORE_RESET_MIN);
        assert_eq!(config.connect.wifi_attempts_per_slot, 1);
        assert_eq!(config.connect.wifi_retry_delay_ms, WIFI_RETRY_DELAY_MAX_MS);
        assert_eq!(config.connect.cloud_timeout_ms, CLOUD_TIMEOUT_MIN_MS);
        assert_eq!(config.connect.boot_cloud_rounds, 20);
    }

    #[test]
    fn access_point_identity() {
        let ap = AccessPointConfig::default().resolve(0xbeef, 0);
        assert_eq!(ap.ssid, "ESP_BEEF");
        assert_eq!(ap.password, "MyESP_BEEF");
        assert_eq!(ap.channel, 1);
        assert_eq!(ap.ip, DEFAULT_PORTAL_IP);

        let random = AccessPointConfig {
            channel: 0,
            ..Default::default()
        };
        assert_eq!(random.resolve(1, 25).channel, 4);

        let invalid = AccessPointConfig {
            channel: 14,
            ..Default::default()
        };
        assert_eq!(invalid.resolve(1, 0).channel, 1);
    }

    #[test]
    fn static_ip_defaults() {
        let gateway = Ipv4Addr::new(192, 168, 2, 1);
        let ip = StaticIpConfig::new(Ipv4Addr::new(192, 168, 2, 50), gateway).resolve();
        assert_eq!(ip.dns1, gateway);
        assert_eq!(ip.dns2, Ipv4Addr::new(8, 8, 8, 8));
        assert_eq!(ip.subnet, Ipv4Addr::new(255, 255, 255, 0));
    }
}
