use crate::error::Error;
use crate::fixed::FixedStr;
use core::mem::size_of;

pub const HEADER_LEN: usize = 16;
pub const SSID_LEN: usize = 32;
/// WPA2 passphrases are at most 63 characters.
pub const PASSWORD_LEN: usize = 64;
pub const SERVER_LEN: usize = 32;
pub const TOKEN_LEN: usize = 36;
pub const BOARD_NAME_LEN: usize = 24;

pub const NUM_WIFI_CREDENTIALS: usize = 2;
pub const NUM_CLOUD_CREDENTIALS: usize = 2;

/// Port used by the cloud link when none has been configured.
pub const DEFAULT_CLOUD_PORT: u16 = 8080;

/// Placeholder written into every credential field of a fresh record. A record still holding it
/// is incomplete and never used to connect.
pub const BLANK: &str = "blank";

pub type Header = FixedStr<HEADER_LEN>;
pub type Ssid = FixedStr<SSID_LEN>;
pub type Password = FixedStr<PASSWORD_LEN>;
pub type ServerAddress = FixedStr<SERVER_LEN>;
pub type AuthToken = FixedStr<TOKEN_LEN>;
pub type BoardName = FixedStr<BOARD_NAME_LEN>;

const WIFI_CREDENTIAL_SIZE: usize = SSID_LEN + PASSWORD_LEN;
const CLOUD_CREDENTIAL_SIZE: usize = SERVER_LEN + TOKEN_LEN;

const WIFI_OFFSET: usize = HEADER_LEN;
const CLOUD_OFFSET: usize = WIFI_OFFSET + NUM_WIFI_CREDENTIALS * WIFI_CREDENTIAL_SIZE;
const PORT_OFFSET: usize = CLOUD_OFFSET + NUM_CLOUD_CREDENTIALS * CLOUD_CREDENTIAL_SIZE;
const BOARD_NAME_OFFSET: usize = PORT_OFFSET + size_of::<i32>();
const CHECKSUM_OFFSET: usize = BOARD_NAME_OFFSET + BOARD_NAME_LEN;

/// Size of an encoded record including the trailing checksum.
pub const RECORD_SIZE: usize = CHECKSUM_OFFSET + size_of::<u32>();

const _: () = assert!(RECORD_SIZE == 376, "record layout changed");

/// Additive checksum: the sum of all bytes, wrapping at `u32::MAX`.
pub fn checksum(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |acc, &b| acc.wrapping_add(u32::from(b)))
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WifiCredential {
    pub ssid: Ssid,
    pub password: Password,
}

impl WifiCredential {
    pub fn new(ssid: &str, password: &str) -> Self {
        Self {
            ssid: Ssid::truncating(ssid),
            password: Password::truncating(password),
        }
    }

    pub(crate) fn blank() -> Self {
        Self::new(BLANK, BLANK)
    }

    /// Exact match: a value that merely starts with [`BLANK`], like `"blanket"`, is configured.
    pub fn is_blank(&self) -> bool {
        self.ssid == BLANK || self.password == BLANK
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CloudCredential {
    pub server: ServerAddress,
    pub token: AuthToken,
}

impl CloudCredential {
    pub fn new(server: &str, token: &str) -> Self {
        Self {
            server: ServerAddress::truncating(server),
            token: AuthToken::truncating(token),
        }
    }

    pub(crate) fn blank() -> Self {
        Self::new(BLANK, BLANK)
    }

    /// Exact match, like [`WifiCredential::is_blank`].
    pub fn is_blank(&self) -> bool {
        self.server == BLANK || self.token == BLANK
    }
}

/// The fixed part of the persisted configuration.
///
/// The in-memory struct carries no checksum: it is computed by [`ConfigRecord::encode`] and
/// verified by [`ConfigRecord::decode`], so an encode/decode pair always yields the same bytes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConfigRecord {
    pub header: Header,
    pub wifi: [WifiCredential; NUM_WIFI_CREDENTIALS],
    pub cloud: [CloudCredential; NUM_CLOUD_CREDENTIALS],
    pub port: u16,
    pub board_name: BoardName,
}

impl ConfigRecord {
    /// A record with every credential set to [`BLANK`]. Forces the config portal until replaced.
    pub fn blank(header: &str) -> Self {
        Self {
            header: Header::truncating(header),
            wifi: [WifiCredential::blank(); NUM_WIFI_CREDENTIALS],
            cloud: [CloudCredential::blank(); NUM_CLOUD_CREDENTIALS],
            port: DEFAULT_CLOUD_PORT,
            board_name: BoardName::truncating(BLANK),
        }
    }

    /// An all-zero record carrying only the header. Starting point of a portal session.
    pub fn zeroed(header: &str) -> Self {
        Self {
            header: Header::truncating(header),
            ..Default::default()
        }
    }

    /// A record is complete when no credential holds the [`BLANK`] placeholder.
    pub fn is_complete(&self) -> bool {
        !self.wifi.iter().any(WifiCredential::is_blank)
            && !self.cloud.iter().any(CloudCredential::is_blank)
    }

    pub fn has_header(&self, header: &str) -> bool {
        self.header == header
    }

    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[..HEADER_LEN].copy_from_slice(self.header.as_bytes());

        for (i, cred) in self.wifi.iter().enumerate() {
            let offset = WIFI_OFFSET + i * WIFI_CREDENTIAL_SIZE;
            buf[offset..offset + SSID_LEN].copy_from_slice(cred.ssid.as_bytes());
            buf[offset + SSID_LEN..offset + WIFI_CREDENTIAL_SIZE]
                .copy_from_slice(cred.password.as_bytes());
        }

        for (i, cred) in self.cloud.iter().enumerate() {
            let offset = CLOUD_OFFSET + i * CLOUD_CREDENTIAL_SIZE;
            buf[offset..offset + SERVER_LEN].copy_from_slice(cred.server.as_bytes());
            buf[offset + SERVER_LEN..offset + CLOUD_CREDENTIAL_SIZE]
                .copy_from_slice(cred.token.as_bytes());
        }

        buf[PORT_OFFSET..BOARD_NAME_OFFSET].copy_from_slice(&i32::from(self.port).to_le_bytes());
        buf[BOARD_NAME_OFFSET..CHECKSUM_OFFSET].copy_from_slice(self.board_name.as_bytes());

        let sum = checksum(&buf[..CHECKSUM_OFFSET]);
        buf[CHECKSUM_OFFSET..].copy_from_slice(&sum.to_le_bytes());
        buf
    }

    /// Decodes and verifies a stored record. Fails with [`Error::RecordInvalid`] when either the
    /// header tag or the checksum does not match.
    pub fn decode(buf: &[u8; RECORD_SIZE], expected_header: &str) -> Result<Self, Error> {
        let stored = u32::from_le_bytes(read_array(buf, CHECKSUM_OFFSET));
        let calculated = checksum(&buf[..CHECKSUM_OFFSET]);
        if stored != calculated {
            warn!(
                "record: checksum mismatch, stored {:#x} calculated {:#x}",
                stored,
                calculated
            );
            return Err(Error::RecordInvalid);
        }

        let record = Self::decode_unchecked(buf);
        if !record.has_header(expected_header) {
            warn!("record: header mismatch");
            return Err(Error::RecordInvalid);
        }
        Ok(record)
    }

    fn decode_unchecked(buf: &[u8; RECORD_SIZE]) -> Self {
        let mut record = Self {
            header: Header::from_bytes(read_array(buf, 0)),
            ..Default::default()
        };

        for (i, cred) in record.wifi.iter_mut().enumerate() {
            let offset = WIFI_OFFSET + i * WIFI_CREDENTIAL_SIZE;
            cred.ssid = Ssid::from_bytes(read_array(buf, offset));
            cred.password = Password::from_bytes(read_array(buf, offset + SSID_LEN));
        }

        for (i, cred) in record.cloud.iter_mut().enumerate() {
            let offset = CLOUD_OFFSET + i * CLOUD_CREDENTIAL_SIZE;
            cred.server = ServerAddress::from_bytes(read_array(buf, offset));
            cred.token = AuthToken::from_bytes(read_array(buf, offset + SERVER_LEN));
        }

        let port = i32::from_le_bytes(read_array(buf, PORT_OFFSET));
        record.port = u16::try_from(port).unwrap_or(0);
        record.board_name = BoardName::from_bytes(read_array(buf, BOARD_NAME_OFFSET));
        record
    }
}

fn read_array<const M: usize>(buf: &[u8], offset: usize) -> [u8; M] {
    let mut out = [0u8; M];
    out.copy_from_slice(&buf[offset..offset + M]);
    out
}
