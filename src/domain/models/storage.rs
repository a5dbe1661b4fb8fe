use anyhow::Result;

pub const TOKEN_KEY: &str = "token";
pub const USER_KEY: &str = "user";

/// Persistent string key/value entries that survive between runs. Only the
/// bearer token and the serialized user are ever stored.
pub trait CredentialStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

pub type StorageBox = Box<dyn CredentialStorage>;
