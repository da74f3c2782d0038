use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tempfile::NamedTempFile;

use crate::ledger::LedgerDocument;
use crate::{Ledger, LedgerError, LedgerStore};

/// One `<aoi_id>.json` document per AOI inside `dir`.
#[derive(Debug, Clone)]
pub struct JsonLedgerStore {
    dir: PathBuf,
}

/// Exclusive advisory lock on one AOI's ledger, released on drop.
#[derive(Debug)]
pub struct LedgerLock {
    file: File,
    path: PathBuf,
}

impl LedgerLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            tracing::warn!(
                path = %self.path.display(),
                error = %err,
                "failed to release ledger lock"
            );
        }
    }
}

impl JsonLedgerStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ledger_path(&self, aoi_id: &str) -> PathBuf {
        self.dir.join(format!("{aoi_id}.json"))
    }

    fn lock_path(&self, aoi_id: &str) -> PathBuf {
        self.dir.join(format!("{aoi_id}.lock"))
    }

    /// Takes the single-writer lock for `aoi_id` without blocking.
    pub fn lock(&self, aoi_id: &str) -> Result<LedgerLock, LedgerError> {
        let path = self.lock_path(aoi_id);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        file.try_lock_exclusive().map_err(|_| LedgerError::Locked {
            aoi_id: aoi_id.to_owned(),
        })?;
        Ok(LedgerLock { file, path })
    }
}

impl LedgerStore for JsonLedgerStore {
    fn load(&self, aoi_id: &str) -> Result<Ledger, LedgerError> {
        let path = self.ledger_path(aoi_id);
        if !path.exists() {
            return Ok(Ledger::new(aoi_id));
        }

        let raw = fs::read_to_string(&path)?;
        if raw.trim().is_empty() {
            return Ok(Ledger::new(aoi_id));
        }

        let document: LedgerDocument =
            serde_json::from_str(&raw).map_err(|source| LedgerError::Corrupt {
                path: path.clone(),
                source,
            })?;
        Ok(Ledger::from_document(aoi_id, document))
    }

    fn save(&self, ledger: &Ledger) -> Result<(), LedgerError> {
        let path = self.ledger_path(ledger.aoi_id());
        let write_error = |source: std::io::Error| LedgerError::Write {
            path: path.clone(),
            source,
        };

        let temp = NamedTempFile::new_in(&self.dir).map_err(write_error)?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, &ledger.document()).map_err(|source| {
                LedgerError::Serialize {
                    aoi_id: ledger.aoi_id().to_owned(),
                    source,
                }
            })?;
            writer.write_all(b"\n").map_err(write_error)?;
            writer.flush().map_err(write_error)?;
        }
        temp.as_file().sync_all().map_err(write_error)?;
        temp.persist(&path)
            .map_err(|err| write_error(err.error))?;

        tracing::debug!(aoi = %ledger.aoi_id(), path = %path.display(), "ledger saved");
        Ok(())
    }
}
