use async_trait::async_trait;

use super::AuthResponse;
use super::LoginRequest;
use super::RegisterRequest;
use crate::infrastructure::api::ApiError;

/// The network half of signing in. Kept behind a trait so the auth store can
/// be driven without a server.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, req: &LoginRequest) -> Result<AuthResponse, ApiError>;

    async fn register(&self, req: &RegisterRequest) -> Result<AuthResponse, ApiError>;
}
