mod file;
mod memory;

use std::path::PathBuf;

pub use file::*;
pub use memory::*;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::StorageBox;

pub struct StorageManager {}

impl StorageManager {
    pub fn get(persist: bool) -> StorageBox {
        if !persist {
            return Box::<MemoryStorage>::default();
        }

        let path = PathBuf::from(Config::get(ConfigKey::CredentialsFile));
        return Box::new(FileStorage::new(path));
    }
}
