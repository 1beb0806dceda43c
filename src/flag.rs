use crate::error::Error;
use crate::storage::{Region, Storage};
use crate::store::RecordStore;
use strum::FromRepr;

/// Request to open the config portal on the next boot, stored apart from the config record so
/// setting it never touches the record.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, FromRepr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum PortalFlag {
    #[default]
    Normal = 0,
    /// Cleared as soon as it has been acted on.
    Forced = 0xDEAD_BEEF,
    /// Kept until a portal session commits.
    ForcedPersistent = 0xBEEF_DEAD,
}

impl PortalFlag {
    pub fn is_set(self) -> bool {
        self != PortalFlag::Normal
    }

    pub fn is_persistent(self) -> bool {
        self == PortalFlag::ForcedPersistent
    }

    pub(crate) fn from_bytes(bytes: [u8; 4]) -> Self {
        // anything that is not one of the sentinels, including erased flash, means normal
        PortalFlag::from_repr(u32::from_le_bytes(bytes)).unwrap_or_default()
    }

    pub(crate) fn to_bytes(self) -> [u8; 4] {
        (self as u32).to_le_bytes()
    }
}

impl<S: Storage> RecordStore<S> {
    /// Reads the portal flag. A missing or unreadable flag reads as [`PortalFlag::Normal`].
    pub fn portal_flag(&mut self) -> PortalFlag {
        let mut bytes = [0u8; 4];
        match self.storage.read(Region::PortalFlag, &mut bytes) {
            Ok(()) => PortalFlag::from_bytes(bytes),
            Err(Error::NotFound) => PortalFlag::Normal,
            Err(e) => {
                warn!("store: reading portal flag failed ({})", e);
                PortalFlag::Normal
            }
        }
    }

    pub fn set_portal_flag(&mut self, persistent: bool) -> Result<(), Error> {
        let flag = if persistent {
            PortalFlag::ForcedPersistent
        } else {
            PortalFlag::Forced
        };
        info!("store: portal flag set to {:?}", flag);
        self.storage.write(Region::PortalFlag, &flag.to_bytes())
    }

    pub fn clear_portal_flag(&mut self) -> Result<(), Error> {
        info!("store: portal flag cleared");
        self.storage
            .write(Region::PortalFlag, &PortalFlag::Normal.to_bytes())
    }
}
