use crate::error::Error;
use crate::storage::{Region, Storage};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// File-per-region medium for hosts and boards with a file system.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, region: Region) -> PathBuf {
        self.dir.join(file_name(region))
    }
}

const fn file_name(region: Region) -> &'static str {
    match region {
        Region::Config => "wm_config.dat",
        Region::ConfigBackup => "wm_config.bak",
        Region::Dynamic => "wm_cred.dat",
        Region::DynamicBackup => "wm_cred.bak",
        Region::PortalFlag => "wm_cp.dat",
    }
}

fn map_io(err: io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::NotFound => Error::NotFound,
        _ => Error::StorageIo,
    }
}

impl Storage for FileStore {
    fn mount(&mut self) -> Result<(), Error> {
        match fs::metadata(&self.dir) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(Error::StorageUnavailable),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                fs::create_dir_all(&self.dir).map_err(|_| Error::StorageUnavailable)
            }
            Err(_) => Err(Error::StorageUnavailable),
        }
    }

    fn format(&mut self) -> Result<(), Error> {
        debug!("file store: format");
        match fs::metadata(&self.dir) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(&self.dir).map_err(map_io)?,
            Ok(_) => fs::remove_file(&self.dir).map_err(map_io)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(map_io(err)),
        }
        fs::create_dir_all(&self.dir).map_err(map_io)
    }

    fn read(&mut self, region: Region, buf: &mut [u8]) -> Result<(), Error> {
        let data = fs::read(self.path(region)).map_err(map_io)?;
        if data.len() != buf.len() {
            warn!(
                "file store: {} holds {} bytes, expected {}",
                region,
                data.len(),
                buf.len()
            );
            return Err(Error::CorruptedData);
        }
        buf.copy_from_slice(&data);
        Ok(())
    }

    fn write(&mut self, region: Region, data: &[u8]) -> Result<(), Error> {
        trace!("file store: write {}", region);
        fs::write(self.path(region), data).map_err(map_io)
    }
}
