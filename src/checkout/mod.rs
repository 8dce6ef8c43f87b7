pub mod client;
pub mod models;
pub mod redirect;
pub mod services;

pub use client::BackendClient;
pub use models::{CheckoutSession, ProfileUser, SessionStatus, Tier, TierPlan, UserProfile};
pub use redirect::session_id_from_redirect;
pub use services::{CheckoutSessionService, Navigator, UserProfileService};
