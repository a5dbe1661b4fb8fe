#[cfg(test)]
#[path = "auth_store_test.rs"]
mod tests;

use anyhow::Result;
use thiserror::Error;
use tokio::sync::watch;

use crate::domain::models::AuthApi;
use crate::domain::models::AuthOutcome;
use crate::domain::models::AuthResponse;
use crate::domain::models::LoginRequest;
use crate::domain::models::RegisterRequest;
use crate::domain::models::StorageBox;
use crate::domain::models::User;
use crate::domain::models::TOKEN_KEY;
use crate::domain::models::USER_KEY;

const MIN_PASSWORD_LENGTH: usize = 8;
const MIN_USERNAME_LENGTH: usize = 3;

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("All fields are required")]
    MissingField,
    #[error("Passwords do not match")]
    PasswordMismatch,
    #[error("Password must be at least 8 characters")]
    PasswordTooShort,
    #[error("Username must be at least 3 characters")]
    UsernameTooShort,
}

/// Checks run before a registration ever reaches the network. The first
/// failing check wins.
pub fn validate_registration(
    email: &str,
    username: &str,
    password: &str,
    confirm_password: &str,
) -> Result<(), RegistrationError> {
    if email.is_empty() || username.is_empty() || password.is_empty() || confirm_password.is_empty()
    {
        return Err(RegistrationError::MissingField);
    }

    if password != confirm_password {
        return Err(RegistrationError::PasswordMismatch);
    }

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(RegistrationError::PasswordTooShort);
    }

    if username.chars().count() < MIN_USERNAME_LENGTH {
        return Err(RegistrationError::UsernameTooShort);
    }

    return Ok(());
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthState {
    pub user: Option<User>,
    pub loading: bool,
    pub error: Option<String>,
}

impl Default for AuthState {
    fn default() -> AuthState {
        return AuthState {
            user: None,
            loading: true,
            error: None,
        };
    }
}

/// Owns the signed-in user and the persisted token. There is one per process
/// and every consumer either holds a reference or subscribes to changes.
pub struct AuthStore {
    storage: StorageBox,
    state: watch::Sender<AuthState>,
}

impl AuthStore {
    pub fn new(storage: StorageBox) -> AuthStore {
        let (state, _) = watch::channel(AuthState::default());
        return AuthStore { storage, state };
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.storage.get(key) {
            Ok(val) => return val,
            Err(err) => {
                tracing::warn!(error = ?err, key, "Failed to read from credential storage");
                return None;
            }
        }
    }

    fn clear_persisted(&self) {
        for key in [TOKEN_KEY, USER_KEY] {
            if let Err(err) = self.storage.remove(key) {
                tracing::warn!(error = ?err, key, "Failed to remove from credential storage");
            }
        }
    }

    fn persist(&self, res: &AuthResponse) -> Result<()> {
        self.storage.set(TOKEN_KEY, &res.access_token)?;
        self.storage.set(USER_KEY, &serde_json::to_string(&res.user)?)?;
        return Ok(());
    }

    /// Hydrates the user from storage. Unparseable user records are wiped
    /// along with the token.
    pub fn init(&self) {
        let token = self.read(TOKEN_KEY);
        let user_data = self.read(USER_KEY);

        let mut user = None;
        if let (Some(_), Some(user_data)) = (token, user_data) {
            match serde_json::from_str::<User>(&user_data) {
                Ok(parsed) => user = Some(parsed),
                Err(err) => {
                    tracing::warn!(error = ?err, "Discarding corrupt persisted user");
                    self.clear_persisted();
                }
            }
        }

        self.state.send_modify(|state| {
            state.user = user;
            state.loading = false;
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        return self.state.subscribe();
    }

    pub fn user(&self) -> Option<User> {
        return self.state.borrow().user.clone();
    }

    pub fn is_authenticated(&self) -> bool {
        return self.state.borrow().user.is_some();
    }

    pub fn loading(&self) -> bool {
        return self.state.borrow().loading;
    }

    pub fn error(&self) -> Option<String> {
        return self.state.borrow().error.clone();
    }

    pub fn clear_error(&self) {
        self.state.send_modify(|state| {
            state.error = None;
        });
    }

    pub fn token(&self) -> Option<String> {
        return self.read(TOKEN_KEY);
    }

    fn complete(&self, res: Result<AuthResponse, String>) -> AuthOutcome {
        let res = res.and_then(|res| {
            return self
                .persist(&res)
                .map(|_| return res.user)
                .map_err(|err| return err.to_string());
        });

        match res {
            Ok(user) => {
                tracing::debug!(user_id = %user.id, "Signed in");
                self.state.send_modify(|state| {
                    state.user = Some(user);
                });
                return AuthOutcome::Success;
            }
            Err(message) => {
                self.state.send_modify(|state| {
                    state.error = Some(message.clone());
                });
                return AuthOutcome::Failure(message);
            }
        }
    }

    pub async fn login(&self, api: &dyn AuthApi, email: &str, password: &str) -> AuthOutcome {
        self.clear_error();

        let req = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let res = api
            .login(&req)
            .await
            .map_err(|err| return err.user_message("Login failed"));

        return self.complete(res);
    }

    pub async fn register(
        &self,
        api: &dyn AuthApi,
        email: &str,
        username: &str,
        password: &str,
        confirm_password: &str,
    ) -> AuthOutcome {
        self.clear_error();

        if let Err(err) = validate_registration(email, username, password, confirm_password) {
            return AuthOutcome::Failure(err.to_string());
        }

        let req = RegisterRequest {
            email: email.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            confirm_password: confirm_password.to_string(),
        };
        let res = api
            .register(&req)
            .await
            .map_err(|err| return err.user_message("Registration failed"));

        return self.complete(res);
    }

    pub fn logout(&self) {
        self.clear_persisted();
        self.state.send_modify(|state| {
            state.user = None;
        });
    }

    /// Drops the session after the server rejected our token. Returns whether
    /// there was anything to drop, so repeated rejections only act once.
    pub fn invalidate(&self) -> bool {
        let has_persisted = self.read(TOKEN_KEY).is_some() || self.read(USER_KEY).is_some();
        if !has_persisted && !self.is_authenticated() {
            return false;
        }

        tracing::info!("Authorization rejected, clearing stored session");
        self.logout();
        return true;
    }
}
