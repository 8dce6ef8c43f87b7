pub mod checkout;
pub mod config;
pub mod error;
pub mod reconciler;

pub use config::{BackendConfig, ReconcilerConfig};
pub use error::{ConfigurationError, ServiceError, VerificationError, VerificationFailure};
pub use reconciler::{
    PaymentReconciler, ReconciliationHandle, ReconciliationOutcome, ReconciliationState,
    RedirectReason, VerificationRequest,
};
