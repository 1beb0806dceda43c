#![allow(dead_code)]

// filename according to https://doc.rust-lang.org/book/ch11-03-test-organization.html
use embedded_hal::delay::DelayNs;
use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};
use esp_provision::config::{AccessPoint, StationConfig};
use esp_provision::platform::{Board, ResetDetector};
use esp_provision::storage::{FlashStore, Region};
use esp_provision::{
    CloudCredential, CloudLink, ConfigRecord, ProvisioningConfig, ProvisioningManager,
    WifiCredential, WifiStation,
};

pub const FLASH_SECTOR_SIZE: usize = 4096;
// Taken from https://github.com/esp-rs/esp-hal/blob/main/esp-storage/src/stub.rs
pub const WORD_SIZE: usize = 4;
pub const REGIONS: usize = 5;
pub const LEN_SIZE: usize = 4;
pub const CHIP_ID: u32 = 0x00AB_CDEF;
pub const HEADER: &str = "ESP32";

#[derive(Default)]
pub struct Flash {
    pub buf: Vec<u8>,
    pub fail_after_operation: usize,
    /// Fails the operation with this index once, every other operation succeeds.
    pub fail_once_at: Option<usize>,
    pub operations: Vec<Operation>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Operation {
    Read { offset: u32, len: usize },
    Write { offset: u32, len: usize },
    Erase { offset: u32, len: usize },
}

impl Flash {
    pub fn new(pages: usize) -> Self {
        Self {
            buf: vec![0xffu8; FLASH_SECTOR_SIZE * pages],
            fail_after_operation: usize::MAX,
            ..Default::default()
        }
    }

    pub fn new_with_fault(pages: usize, fail_after_operation: usize) -> Self {
        Self {
            buf: vec![0xffu8; FLASH_SECTOR_SIZE * pages],
            fail_after_operation,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Every operation from now on fails.
    pub fn fail_from_now(&mut self) {
        self.fail_after_operation = self.operations.len();
    }

    /// Only the next operation fails.
    pub fn fail_next(&mut self) {
        self.fail_once_at = Some(self.operations.len());
    }

    pub fn disable_faults(&mut self) {
        self.fail_after_operation = usize::MAX;
        self.fail_once_at = None;
    }

    fn fault(&mut self) -> bool {
        let index = self.operations.len();
        if self.fail_once_at == Some(index) {
            self.fail_once_at = None;
            return true;
        }
        index >= self.fail_after_operation
    }

    pub fn writes_to(&self, region: Region) -> usize {
        let offset = region_offset(region) as u32;
        self.operations
            .iter()
            .filter(|op| matches!(op, Operation::Write { offset: o, .. } if *o == offset))
            .count()
    }

    /// The payload bytes of a region, without the length prefix.
    pub fn region(&self, region: Region, len: usize) -> &[u8] {
        let start = region_offset(region) + LEN_SIZE;
        &self.buf[start..start + len]
    }

    pub fn region_mut(&mut self, region: Region, len: usize) -> &mut [u8] {
        let start = region_offset(region) + LEN_SIZE;
        &mut self.buf[start..start + len]
    }

    pub fn dump_operations(&self) {
        println!("Operations:");
        for op in &self.operations {
            println!("  {:?}", op);
        }
    }
}

pub fn region_offset(region: Region) -> usize {
    region as usize * FLASH_SECTOR_SIZE
}

#[derive(Debug)]
pub struct FlashError;

impl NorFlashError for FlashError {
    fn kind(&self) -> NorFlashErrorKind {
        NorFlashErrorKind::Other
    }
}

impl ErrorType for Flash {
    type Error = FlashError;
}

impl ReadNorFlash for Flash {
    const READ_SIZE: usize = WORD_SIZE;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        assert!(offset.is_multiple_of(Self::READ_SIZE as _));
        assert!(bytes.len().is_multiple_of(Self::READ_SIZE));

        println!(
            "    flash: read:  0x{offset:04X}[0x{:04X}] #{:>2}",
            bytes.len(),
            self.operations.len()
        );
        if self.fault() {
            println!("    flash: FAULT");
            return Err(FlashError);
        }
        self.operations.push(Operation::Read {
            offset,
            len: bytes.len(),
        });

        let offset = offset as usize;
        bytes.copy_from_slice(&self.buf[offset..offset + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.buf.len()
    }
}

impl NorFlash for Flash {
    const WRITE_SIZE: usize = WORD_SIZE;

    const ERASE_SIZE: usize = FLASH_SECTOR_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        assert!(from.is_multiple_of(Self::ERASE_SIZE as _));
        assert!(to.is_multiple_of(Self::ERASE_SIZE as _));

        println!(
            "    flash: erase: {from:04X} - {to:04X} #{:>2}",
            self.operations.len()
        );

        if self.fault() {
            println!("    flash: FAULT");
            return Err(FlashError);
        }

        self.operations.push(Operation::Erase {
            offset: from,
            len: (to - from) as usize,
        });

        for addr in from..to {
            self.buf[addr as usize] = 0xff;
        }
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        assert!(offset.is_multiple_of(Self::WRITE_SIZE as _));
        assert!(bytes.len().is_multiple_of(Self::WRITE_SIZE as _));

        println!(
            "    flash: write: 0x{offset:04X}[0x{:04X}] #{:>2}",
            bytes.len(),
            self.operations.len()
        );

        if self.fault() {
            println!("    flash: FAULT");
            return Err(FlashError);
        }
        assert!(!bytes.is_empty());

        self.operations.push(Operation::Write {
            offset,
            len: bytes.len(),
        });

        let offset = offset as usize;
        for (i, &val) in bytes.iter().enumerate() {
            // the esp flash we can only flip bits from 1 to 0
            self.buf[offset + i] &= val;
        }
        Ok(())
    }
}

pub fn flash_store() -> FlashStore<Flash> {
    FlashStore::new(Flash::new(REGIONS), 0, FLASH_SECTOR_SIZE).unwrap()
}

pub fn complete_record() -> ConfigRecord {
    let mut record = ConfigRecord::blank(HEADER);
    record.wifi = [
        WifiCredential::new("home", "home-secret"),
        WifiCredential::new("office", "office-secret"),
    ];
    record.cloud = [
        CloudCredential::new("cloud.example.com", "token-0"),
        CloudCredential::new("10.0.0.2", "token-1"),
    ];
    record.port = 9443;
    record.board_name = esp_provision::record::BoardName::truncating("greenhouse");
    record
}

/// A WiFi interface that joins every network listed in `networks`.
#[derive(Default)]
pub struct Station {
    pub networks: Vec<(String, String)>,
    pub connected: bool,
    /// Link state polls that still report down after a successful association.
    pub link_after_polls: usize,
    pending_polls: usize,
    pub attempts: Vec<(String, String)>,
    pub access_points: Vec<AccessPoint>,
    pub station_configs: Vec<StationConfig>,
}

impl Station {
    pub fn with_network(ssid: &str, password: &str) -> Self {
        Self {
            networks: vec![(ssid.to_string(), password.to_string())],
            ..Default::default()
        }
    }
}

impl WifiStation for Station {
    type Error = ();

    fn connect(
        &mut self,
        ssid: &str,
        password: &str,
        config: &StationConfig,
    ) -> Result<(), Self::Error> {
        self.attempts.push((ssid.to_string(), password.to_string()));
        self.station_configs.push(config.clone());
        self.connected = self
            .networks
            .iter()
            .any(|(s, p)| s == ssid && p == password);
        self.pending_polls = self.link_after_polls;
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        if self.connected && self.pending_polls > 0 {
            self.pending_polls -= 1;
            return false;
        }
        self.connected
    }

    fn start_access_point(&mut self, access_point: &AccessPoint) -> Result<(), Self::Error> {
        self.access_points.push(access_point.clone());
        self.connected = false;
        Ok(())
    }
}

/// A cloud client that accepts every (server, token) pair listed in `servers`.
#[derive(Default)]
pub struct Cloud {
    pub servers: Vec<(String, String)>,
    pub connected: bool,
    pub attempts: Vec<(String, String, u16, u32)>,
}

impl Cloud {
    pub fn with_server(server: &str, token: &str) -> Self {
        Self {
            servers: vec![(server.to_string(), token.to_string())],
            ..Default::default()
        }
    }
}

impl CloudLink for Cloud {
    type Error = ();

    fn connect(
        &mut self,
        server: &str,
        token: &str,
        port: u16,
        timeout_ms: u32,
    ) -> Result<(), Self::Error> {
        self.attempts
            .push((server.to_string(), token.to_string(), port, timeout_ms));
        self.connected = self
            .servers
            .iter()
            .any(|(s, t)| s == server && t == token);
        if self.connected { Ok(()) } else { Err(()) }
    }

    fn is_connected(&mut self) -> bool {
        self.connected
    }
}

/// A board whose clock only moves on delays or when a test moves it.
#[derive(Default)]
pub struct TestBoard {
    pub now: u64,
    pub restarts: usize,
}

impl DelayNs for TestBoard {
    fn delay_ns(&mut self, ns: u32) {
        self.now += u64::from(ns) / 1_000_000;
    }

    fn delay_ms(&mut self, ms: u32) {
        self.now += u64::from(ms);
    }
}

impl Board for TestBoard {
    fn now_ms(&mut self) -> u64 {
        self.now
    }

    fn chip_id(&self) -> u32 {
        CHIP_ID
    }

    fn restart(&mut self) {
        self.restarts += 1;
    }
}

#[derive(Default)]
pub struct Detector {
    pub burst: bool,
    pub ticks: usize,
}

impl ResetDetector for Detector {
    fn detect_reset_burst(&mut self) -> bool {
        self.burst
    }

    fn tick(&mut self) {
        self.ticks += 1;
    }
}

pub type TestManager<'a> =
    ProvisioningManager<'a, FlashStore<Flash>, Station, Cloud, TestBoard, Detector>;

/// A manager for a device that can reach the networks of [`complete_record`].
pub fn manager<'a>(storage: FlashStore<Flash>, burst: bool) -> TestManager<'a> {
    ProvisioningManager::new(
        storage,
        Station::with_network("office", "office-secret"),
        Cloud::with_server("10.0.0.2", "token-1"),
        TestBoard::default(),
        Detector {
            burst,
            ..Default::default()
        },
        ProvisioningConfig::default(),
    )
}
