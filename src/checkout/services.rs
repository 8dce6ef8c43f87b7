use async_trait::async_trait;

use super::models::{CheckoutSession, UserProfile};
use crate::error::ServiceResult;

/// key: checkout-session-service -> processor view of a checkout session
#[async_trait]
pub trait CheckoutSessionService: Send + Sync {
    async fn verify_session(&self, session_id: &str) -> ServiceResult<CheckoutSession>;
}

/// key: user-profile-service -> backend view of the signed-in user
#[async_trait]
pub trait UserProfileService: Send + Sync {
    async fn current_profile(&self) -> ServiceResult<UserProfile>;
}

/// Performs the terminal redirect once reconciliation is over.
pub trait Navigator: Send + Sync {
    fn redirect(&self, target: &str);
}
