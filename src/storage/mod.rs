//! Byte-addressable media the [`RecordStore`](crate::RecordStore) persists to.
//!
//! Every medium exposes the same five independent regions. Each region holds exactly one payload,
//! a write replaces it completely.

mod flash;
#[cfg(feature = "std")]
mod file;

pub use flash::FlashStore;
#[cfg(feature = "std")]
pub use file::FileStore;

use crate::error::Error;
use strum::{Display, EnumCount, EnumIter};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, EnumIter, EnumCount)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Region {
    Config = 0,
    ConfigBackup = 1,
    Dynamic = 2,
    DynamicBackup = 3,
    PortalFlag = 4,
}

impl Region {
    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

pub trait Storage {
    /// Prepares the medium for use. Fails with [`Error::StorageUnavailable`] if that is not
    /// possible.
    fn mount(&mut self) -> Result<(), Error>;

    /// Wipes every region. Called once when mounting fails.
    fn format(&mut self) -> Result<(), Error>;

    /// Reads the payload stored in `region` into `buf`. `buf` has to be exactly as long as the
    /// stored payload, a mismatch is reported as [`Error::CorruptedData`]. A region that has never
    /// been written reports [`Error::NotFound`].
    fn read(&mut self, region: Region, buf: &mut [u8]) -> Result<(), Error>;

    /// Replaces the payload stored in `region`.
    fn write(&mut self, region: Region, data: &[u8]) -> Result<(), Error>;
}

impl<S: Storage + ?Sized> Storage for &mut S {
    fn mount(&mut self) -> Result<(), Error> {
        (**self).mount()
    }

    fn format(&mut self) -> Result<(), Error> {
        (**self).format()
    }

    fn read(&mut self, region: Region, buf: &mut [u8]) -> Result<(), Error> {
        (**self).read(region, buf)
    }

    fn write(&mut self, region: Region, data: &[u8]) -> Result<(), Error> {
        (**self).write(region, data)
    }
}
