use thiserror::Error;

/// Errors that can occur while provisioning. Most of them never reach the caller of
/// [`ProvisioningManager`](crate::ProvisioningManager): record corruption is recovered by resetting
/// to defaults, connectivity failures fall back to the config portal. They are still surfaced by
/// the lower level [`RecordStore`](crate::RecordStore) and [`Storage`](crate::storage::Storage)
/// APIs. Marked as non-exhaustive to allow for future additions without breaking the API.
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The base address of a flash store has to be aligned to the erase size of the flash
    #[error("invalid region offset")]
    InvalidRegionOffset,

    /// The region size of a flash store has to be a non-zero multiple of the erase size
    #[error("invalid region size")]
    InvalidRegionSize,

    /// The medium could not be mounted, even after a format attempt.
    #[error("storage unavailable")]
    StorageUnavailable,

    /// The internal error value is returned from the underlying flash or file system
    #[error("storage I/O error")]
    StorageIo,

    /// The region has never been written.
    #[error("region not found")]
    NotFound,

    /// The payload does not fit into a single region.
    #[error("region too small")]
    RegionTooSmall,

    /// A region exists but its stored length does not match the expected payload
    #[error("corrupted data")]
    CorruptedData,

    /// Header tag or checksum of the stored config record does not match.
    #[error("config record invalid")]
    RecordInvalid,

    /// The record is valid but still contains placeholder credentials.
    #[error("config record incomplete")]
    RecordIncomplete,

    /// The checksum of the dynamic field blob does not match.
    #[error("dynamic data invalid")]
    DynamicDataInvalid,

    /// All stored network or cloud credentials were tried without success.
    #[error("connectivity failed")]
    ConnectivityFailed,

    /// Neither the primary nor the backup copy could be written.
    #[error("persisting failed")]
    PersistWriteFailed,

    /// Credential slot index is larger than the number of slots in the record.
    #[error("slot out of range")]
    SlotOutOfRange,
}
