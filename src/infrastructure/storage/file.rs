#[cfg(test)]
#[path = "file_test.rs"]
mod tests;

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::anyhow;
use anyhow::Result;

use crate::domain::models::CredentialStorage;

type Entries = BTreeMap<String, String>;

/// Stores entries as a single JSON object on disk. The file is only readable
/// by the current user on unix since it holds a bearer token.
pub struct FileStorage {
    pub file_path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(file_path: PathBuf) -> FileStorage {
        return FileStorage {
            file_path,
            lock: Mutex::new(()),
        };
    }

    fn read_entries(&self) -> Entries {
        if !self.file_path.exists() {
            return Entries::new();
        }

        let contents = match fs::read_to_string(&self.file_path) {
            Ok(contents) => contents,
            Err(err) => {
                tracing::warn!(error = ?err, path = ?self.file_path, "Failed to read credentials file");
                return Entries::new();
            }
        };

        if contents.trim().is_empty() {
            return Entries::new();
        }

        match serde_json::from_str::<Entries>(&contents) {
            Ok(entries) => return entries,
            Err(err) => {
                tracing::warn!(error = ?err, path = ?self.file_path, "Credentials file is corrupt, ignoring it");
                return Entries::new();
            }
        }
    }

    fn write_entries(&self, entries: &Entries) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut options = fs::OpenOptions::new();
        options.write(true).truncate(true).create(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&self.file_path)?;
        let text = serde_json::to_string_pretty(entries)?;
        file.write_all(text.as_bytes())?;
        file.flush()?;

        return Ok(());
    }
}

impl CredentialStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| return anyhow!("File storage lock poisoned"))?;

        return Ok(self.read_entries().get(key).cloned());
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| return anyhow!("File storage lock poisoned"))?;

        let mut entries = self.read_entries();
        entries.insert(key.to_string(), value.to_string());

        return self.write_entries(&entries);
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| return anyhow!("File storage lock poisoned"))?;

        let mut entries = self.read_entries();
        if entries.remove(key).is_none() {
            return Ok(());
        }

        return self.write_entries(&entries);
    }
}
