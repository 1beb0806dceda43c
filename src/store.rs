use crate::dynamic::DynamicFields;
use crate::error::Error;
use crate::record::{ConfigRecord, Header, RECORD_SIZE};
use crate::storage::{Region, Storage};
use alloc::vec;

/// What [`RecordStore::restore`] found on the medium.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecordStatus {
    /// Valid and free of placeholder credentials, good to connect with.
    Complete,
    /// Valid, but at least one credential still holds the placeholder.
    Incomplete,
    /// The medium could not be mounted and no complete default record was supplied.
    Unavailable,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Restored {
    pub record: ConfigRecord,
    pub status: RecordStatus,
    /// Whether the stored data was invalid and got replaced by defaults.
    pub reset: bool,
}

/// Persists the [`ConfigRecord`], the dynamic field blob and the portal flag on a [`Storage`]
/// medium. Record and blob are written to a primary and a backup region, loads fall back to the
/// backup when the primary does not verify.
pub struct RecordStore<S: Storage> {
    pub(crate) storage: S,
    header: Header,
}

impl<S: Storage> RecordStore<S> {
    /// `header` is the board tag every stored record has to carry, at most 15 bytes.
    pub fn new(storage: S, header: &str) -> Self {
        Self {
            storage,
            header: Header::truncating(header),
        }
    }

    pub fn header(&self) -> &str {
        self.header.as_str()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn into_inner(self) -> S {
        self.storage
    }

    /// Mounts the medium, formatting it once if the first attempt fails.
    pub fn mount(&mut self) -> Result<(), Error> {
        if let Err(e) = self.storage.mount() {
            warn!("store: mount failed ({}), formatting", e);
            if self.storage.format().is_err() {
                error!("store: format failed");
            }
            self.storage.mount().map_err(|_| Error::StorageUnavailable)?;
        }
        Ok(())
    }

    /// Loads the config record. Falls back to the backup copy if the primary cannot be read or
    /// does not verify, and repairs the primary from it.
    pub fn load(&mut self) -> Result<ConfigRecord, Error> {
        match self.load_record(Region::Config) {
            Ok(record) => Ok(record),
            Err(primary) => {
                warn!("store: primary record unusable ({}), trying backup", primary);
                let record = self.load_record(Region::ConfigBackup)?;
                info!("store: record restored from backup");
                if let Err(e) = self.storage.write(Region::Config, &record.encode()) {
                    warn!("store: repairing primary record failed ({})", e);
                }
                Ok(record)
            }
        }
    }

    fn load_record(&mut self, region: Region) -> Result<ConfigRecord, Error> {
        let mut buf = [0u8; RECORD_SIZE];
        self.storage.read(region, &mut buf)?;
        ConfigRecord::decode(&buf, self.header.as_str())
    }

    /// Saves the record to both copies. The header is replaced by the one of this store.
    pub fn save(&mut self, record: &ConfigRecord) -> Result<(), Error> {
        let mut record = *record;
        record.header = self.header;
        let encoded = record.encode();
        self.write_both(Region::Config, Region::ConfigBackup, &encoded)
    }

    /// Loads the dynamic field blob into the field buffers, primary copy first. The buffers are
    /// only written once a copy verified.
    pub fn load_dynamic(&mut self, fields: &mut DynamicFields<'_>) -> Result<(), Error> {
        if fields.is_empty() {
            return Ok(());
        }

        let mut blob = vec![0u8; fields.blob_len()];
        let primary = self
            .storage
            .read(Region::Dynamic, &mut blob)
            .and_then(|()| fields.decode(&blob));

        match primary {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("store: primary dynamic data unusable ({}), trying backup", e);
                self.storage.read(Region::DynamicBackup, &mut blob)?;
                fields.decode(&blob)?;
                info!("store: dynamic data restored from backup");
                if let Err(e) = self.storage.write(Region::Dynamic, &blob) {
                    warn!("store: repairing primary dynamic data failed ({})", e);
                }
                Ok(())
            }
        }
    }

    pub fn save_dynamic(&mut self, fields: &DynamicFields<'_>) -> Result<(), Error> {
        if fields.is_empty() {
            return Ok(());
        }
        self.write_both(Region::Dynamic, Region::DynamicBackup, &fields.encode())
    }

    /// Saves record and dynamic fields. Both are attempted even if the first one fails.
    pub fn save_all(
        &mut self,
        record: &ConfigRecord,
        fields: &DynamicFields<'_>,
    ) -> Result<(), Error> {
        let record = self.save(record);
        let dynamic = self.save_dynamic(fields);
        record.and(dynamic)
    }

    /// Writes primary then backup. Only fails if neither copy could be written.
    fn write_both(&mut self, primary: Region, backup: Region, data: &[u8]) -> Result<(), Error> {
        let first = self.storage.write(primary, data);
        let second = self.storage.write(backup, data);
        match (first, second) {
            (Err(a), Err(b)) => {
                error!("store: writing {} failed ({}, {})", primary, a, b);
                Err(Error::PersistWriteFailed)
            }
            (Err(e), Ok(())) | (Ok(()), Err(e)) => {
                warn!("store: one copy of {} not written ({})", primary, e);
                Ok(())
            }
            (Ok(()), Ok(())) => Ok(()),
        }
    }

    /// Boot time load-or-reset.
    ///
    /// Mounts the medium and loads the record and the dynamic fields. If either is missing or
    /// does not verify, both are replaced: by `defaults` when given (dynamic buffers keep the
    /// values the application put there), otherwise by the blank record and blank dynamic
    /// values. The replacement is persisted right away.
    pub fn restore(
        &mut self,
        defaults: Option<&ConfigRecord>,
        fields: &mut DynamicFields<'_>,
    ) -> Restored {
        let mounted = self.mount().is_ok();

        let loaded = if mounted {
            self.load()
                .and_then(|record| self.load_dynamic(fields).map(|()| record))
        } else {
            error!("store: storage unavailable");
            Err(Error::StorageUnavailable)
        };

        let (record, reset) = match loaded {
            Ok(record) => (record, false),
            Err(e) => {
                warn!("store: no valid config ({}), resetting", e);
                let record = match defaults {
                    Some(defaults) => ConfigRecord {
                        header: self.header,
                        ..*defaults
                    },
                    None => {
                        fields.set_blank();
                        ConfigRecord::blank(self.header.as_str())
                    }
                };
                if mounted {
                    if let Err(e) = self.save_all(&record, fields) {
                        error!("store: persisting reset config failed ({})", e);
                    }
                }
                (record, true)
            }
        };

        let status = match (record.is_complete(), mounted) {
            (true, _) => RecordStatus::Complete,
            (false, true) => RecordStatus::Incomplete,
            (false, false) => RecordStatus::Unavailable,
        };
        debug!("store: restored, status {:?}, reset {}", status, reset);

        Restored {
            record,
            status,
            reset,
        }
    }
}
