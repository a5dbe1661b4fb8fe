use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::anyhow;
use anyhow::Result;

use crate::domain::models::CredentialStorage;

#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn with_entries(entries: &[(&str, &str)]) -> MemoryStorage {
        let map = entries
            .iter()
            .map(|(key, value)| return (key.to_string(), value.to_string()))
            .collect::<HashMap<String, String>>();

        return MemoryStorage {
            entries: Mutex::new(map),
        };
    }
}

impl CredentialStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| return anyhow!("Memory storage lock poisoned"))?;

        return Ok(entries.get(key).cloned());
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| return anyhow!("Memory storage lock poisoned"))?;
        entries.insert(key.to_string(), value.to_string());

        return Ok(());
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| return anyhow!("Memory storage lock poisoned"))?;
        entries.remove(key);

        return Ok(());
    }
}
