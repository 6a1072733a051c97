use super::codec::{self, PersistedTickets};
use crate::core::{ForceError, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// File name of the per-space ticket snapshot inside the space's save directory.
pub const FORCED_REGIONS_FILE: &str = "forcedchunks.dat";

/// Suffix appended to a snapshot that failed to decode.
pub const CORRUPT_SUFFIX: &str = ".corrupt";

pub struct ForcedRegionsStore {
    path: PathBuf,
}

impl ForcedRegionsStore {
    pub fn new<P: AsRef<Path>>(save_dir: P) -> Self {
        Self {
            path: save_dir.as_ref().join(FORCED_REGIONS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn save(&self, tickets: &PersistedTickets) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| ForceError::IoError(format!("Failed to create save directory: {}", e)))?;
        }
        let bytes = codec::encode(tickets)?;
        let temp_path = self.path.with_extension("tmp");
        let temp_file = File::create(&temp_path).map_err(|e| ForceError::IoError(format!("Failed to create temp file: {}", e)))?;
        let mut writer = BufWriter::new(temp_file);
        writer.write_all(&bytes).map_err(|e| ForceError::IoError(format!("Failed to write tickets: {}", e)))?;
        writer.flush().map_err(|e| ForceError::IoError(format!("Failed to flush tickets: {}", e)))?;
        writer.get_mut().sync_all().map_err(|e| ForceError::IoError(format!("Failed to sync tickets: {}", e)))?;
        fs::rename(&temp_path, &self.path).map_err(|e| ForceError::IoError(format!("Failed to rename tickets file: {}", e)))?;
        Ok(())
    }

    fn read_bytes(&self) -> Result<Vec<u8>> {
        let mut file = File::open(&self.path).map_err(|e| ForceError::IoError(format!("Failed to open tickets file: {}", e)))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data).map_err(|e| ForceError::IoError(format!("Failed to read tickets file: {}", e)))?;
        Ok(data)
    }

    /// Strict load: `Ok(None)` when no file exists, errors are returned as-is.
    pub fn try_load(&self) -> Result<Option<PersistedTickets>> {
        if !self.exists() {
            return Ok(None);
        }
        let data = self.read_bytes()?;
        codec::decode(&data).map(Some)
    }

    /// Lenient load used on space start-up.
    ///
    /// Unreadable data is treated as "no tickets". A copy of the offending
    /// file is kept next to it with [`CORRUPT_SUFFIX`] for inspection.
    pub fn load(&self) -> Option<PersistedTickets> {
        match self.try_load() {
            Ok(tickets) => tickets,
            Err(err) => {
                let preserved = self.preserve_corrupt();
                warn!(
                    path = %self.path.display(),
                    preserved = preserved.as_ref().map(|p| p.display().to_string()).unwrap_or_default(),
                    error = %err,
                    "unable to read forced region data, it will be ignored"
                );
                None
            }
        }
    }

    fn preserve_corrupt(&self) -> Option<PathBuf> {
        let mut name = self.path.file_name()?.to_os_string();
        name.push(CORRUPT_SUFFIX);
        let target = self.path.with_file_name(name);
        match fs::copy(&self.path, &target) {
            Ok(_) => Some(target),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to preserve corrupt tickets file");
                None
            }
        }
    }

    pub fn delete(&self) -> Result<()> {
        if self.exists() {
            fs::remove_file(&self.path).map_err(|e| ForceError::IoError(format!("Failed to delete tickets file: {}", e)))?;
            info!(path = %self.path.display(), "removed forced region data");
        }
        Ok(())
    }
}

/// Cheap check for hosts deciding whether a space is worth loading at start-up.
pub fn has_persisted_tickets<P: AsRef<Path>>(save_dir: P) -> bool {
    let store = ForcedRegionsStore::new(save_dir);
    if !store.exists() {
        return false;
    }
    match store.read_bytes() {
        Ok(bytes) => codec::has_tickets(&bytes),
        Err(_) => false,
    }
}
