use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use anyhow::Result;
use async_trait::async_trait;
use test_utils::auth_response_fixture;
use test_utils::user_fixture;

use super::validate_registration;
use super::AuthStore;
use super::RegistrationError;
use crate::domain::models::AuthApi;
use crate::domain::models::AuthOutcome;
use crate::domain::models::AuthResponse;
use crate::domain::models::CredentialStorage;
use crate::domain::models::LoginRequest;
use crate::domain::models::RegisterRequest;
use crate::domain::models::TOKEN_KEY;
use crate::domain::models::USER_KEY;
use crate::infrastructure::api::ApiError;
use crate::infrastructure::storage::MemoryStorage;

#[derive(Default)]
struct FakeAuthApi {
    calls: AtomicUsize,
    reject_with: Option<String>,
}

impl FakeAuthApi {
    fn rejecting(detail: &str) -> FakeAuthApi {
        return FakeAuthApi {
            calls: AtomicUsize::new(0),
            reject_with: Some(detail.to_string()),
        };
    }

    fn respond(&self) -> Result<AuthResponse, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(detail) = &self.reject_with {
            return Err(ApiError::Status {
                status: 400,
                detail: Some(detail.to_string()),
            });
        }

        let res: AuthResponse =
            serde_json::from_str(auth_response_fixture()).map_err(ApiError::Decode)?;
        return Ok(res);
    }
}

#[async_trait]
impl AuthApi for FakeAuthApi {
    async fn login(&self, _req: &LoginRequest) -> Result<AuthResponse, ApiError> {
        return self.respond();
    }

    async fn register(&self, _req: &RegisterRequest) -> Result<AuthResponse, ApiError> {
        return self.respond();
    }
}

fn store_with(entries: &[(&str, &str)]) -> AuthStore {
    return AuthStore::new(Box::new(MemoryStorage::with_entries(entries)));
}

mod init {
    use super::*;

    #[test]
    fn it_starts_loading_until_hydrated() {
        let store = store_with(&[]);
        assert!(store.loading());

        store.init();
        assert!(!store.loading());
        assert!(!store.is_authenticated());
    }

    #[test]
    fn it_hydrates_a_persisted_user() {
        let store = store_with(&[(TOKEN_KEY, "token123"), (USER_KEY, user_fixture())]);
        store.init();

        assert!(store.is_authenticated());
        assert_eq!(store.user().map(|user| return user.username), Some("ada".to_string()));
        assert_eq!(store.token(), Some("token123".to_string()));
    }

    #[test]
    fn it_discards_a_corrupt_user_record() {
        let store = store_with(&[(TOKEN_KEY, "token123"), (USER_KEY, "{broken")]);
        store.init();

        assert!(!store.is_authenticated());
        assert!(!store.loading());
        assert_eq!(store.token(), None);
        assert_eq!(store.storage.get(USER_KEY).unwrap(), None);
    }

    #[test]
    fn it_ignores_a_user_without_a_token() {
        let store = store_with(&[(USER_KEY, user_fixture())]);
        store.init();

        assert!(!store.is_authenticated());
        assert!(store.storage.get(USER_KEY).unwrap().is_some());
    }
}

mod login {
    use super::*;

    #[tokio::test]
    async fn it_persists_token_and_user() -> Result<()> {
        let store = store_with(&[]);
        store.init();
        let mut rx = store.subscribe();
        let api = FakeAuthApi::default();

        let res = store.login(&api, "ada@example.com", "password1").await;

        assert!(res.is_success());
        assert!(store.is_authenticated());
        assert_eq!(store.token(), Some("token123".to_string()));
        let persisted = store.storage.get(USER_KEY)?.unwrap();
        assert!(persisted.contains("\"username\":\"ada\""));

        assert!(rx.has_changed()?);
        assert_eq!(
            rx.borrow_and_update().user.as_ref().map(|user| return user.id.to_string()),
            Some("u-1".to_string())
        );

        return Ok(());
    }

    #[tokio::test]
    async fn it_returns_server_detail_without_failing() {
        let store = store_with(&[]);
        store.init();
        let api = FakeAuthApi::rejecting("Invalid email or password");

        let res = store.login(&api, "ada@example.com", "wrong").await;

        assert_eq!(
            res,
            AuthOutcome::Failure("Invalid email or password".to_string())
        );
        assert_eq!(res.error(), Some("Invalid email or password"));
        assert_eq!(store.error(), Some("Invalid email or password".to_string()));
        assert!(!store.is_authenticated());
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);

        store.clear_error();
        assert_eq!(store.error(), None);
    }
}

mod register {
    use super::*;

    #[tokio::test]
    async fn it_validates_before_any_request() {
        let cases = vec![
            (("", "ada", "password1", "password1"), "All fields are required"),
            (("a@b.c", "ada", "password1", ""), "All fields are required"),
            (("a@b.c", "ada", "password1", "password2"), "Passwords do not match"),
            (("a@b.c", "ada", "pass123", "pass123"), "Password must be at least 8 characters"),
            (("a@b.c", "ad", "password1", "password1"), "Username must be at least 3 characters"),
        ];

        for ((email, username, password, confirm), expected) in cases {
            let store = store_with(&[]);
            let api = FakeAuthApi::default();
            let res = store
                .register(&api, email, username, password, confirm)
                .await;

            assert_eq!(res, AuthOutcome::Failure(expected.to_string()));
            assert_eq!(api.calls.load(Ordering::SeqCst), 0);
            assert!(!store.is_authenticated());
        }
    }

    #[test]
    fn it_checks_in_order() {
        // Mismatch is reported before either length problem.
        assert_eq!(
            validate_registration("a@b.c", "ad", "short", "other"),
            Err(RegistrationError::PasswordMismatch)
        );
        assert_eq!(
            validate_registration("a@b.c", "ad", "short", "short"),
            Err(RegistrationError::PasswordTooShort)
        );
        assert_eq!(
            validate_registration("a@b.c", "ada", "pässwörd", "pässwörd"),
            Ok(())
        );
    }

    #[tokio::test]
    async fn it_signs_in_after_registering() {
        let store = store_with(&[]);
        let api = FakeAuthApi::default();

        let res = store
            .register(&api, "ada@example.com", "ada", "password1", "password1")
            .await;

        assert!(res.is_success());
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
        assert!(store.is_authenticated());
    }

    #[tokio::test]
    async fn it_surfaces_server_errors_like_login() {
        let store = store_with(&[]);
        let api = FakeAuthApi::rejecting("Email already registered");

        let res = store
            .register(&api, "ada@example.com", "ada", "password1", "password1")
            .await;

        assert_eq!(res.error(), Some("Email already registered"));
    }
}

mod logout {
    use super::*;

    #[test]
    fn it_clears_storage_and_user() {
        let store = store_with(&[(TOKEN_KEY, "token123"), (USER_KEY, user_fixture())]);
        store.init();
        assert!(store.is_authenticated());

        store.logout();

        assert!(!store.is_authenticated());
        assert_eq!(store.token(), None);
        assert_eq!(store.storage.get(USER_KEY).unwrap(), None);
    }

    #[test]
    fn it_invalidates_only_once() {
        let store = store_with(&[(TOKEN_KEY, "token123"), (USER_KEY, user_fixture())]);
        store.init();

        assert!(store.invalidate());
        assert!(!store.invalidate());
        assert!(!store.is_authenticated());
        assert_eq!(store.token(), None);
    }
}
