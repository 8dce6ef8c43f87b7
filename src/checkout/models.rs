use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Status reported by the checkout processor for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Paid,
    Open,
    Other(String),
}

impl SessionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SessionStatus::Paid => "paid",
            SessionStatus::Open => "open",
            SessionStatus::Other(raw) => raw.as_str(),
        }
    }
}

impl From<&str> for SessionStatus {
    fn from(raw: &str) -> Self {
        match raw {
            "paid" => SessionStatus::Paid,
            "open" => SessionStatus::Open,
            other => SessionStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SessionStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(SessionStatus::from(raw.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub status: SessionStatus,
}

/// Body of `GET /api/checkout/verify-session`.
#[derive(Debug, Deserialize)]
pub(crate) struct VerifySessionResponse {
    pub status: SessionStatus,
}

/// Subscription tier name. Only ever compared for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tier(String);

impl Tier {
    pub fn new(name: impl Into<String>) -> Self {
        Tier(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub tier: Tier,
    #[serde(default)]
    pub is_banned: bool,
}

/// Body of `GET /api/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user: ProfileUser,
    #[serde(default)]
    pub storage_used: u64,
    #[serde(default)]
    pub storage_limit: u64,
    #[serde(default)]
    pub clip_count: u64,
}

impl UserProfile {
    pub fn tier(&self) -> &Tier {
        &self.user.tier
    }
}

/// Entry of the active tier catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPlan {
    pub name: String,
    pub max_storage_bytes: u64,
    #[serde(default)]
    pub stripe_price_id: Option<String>,
    pub display_price: String,
    #[serde(default)]
    pub display_frequency: Option<String>,
    pub description: String,
    #[serde(default)]
    pub display_features: Vec<String>,
    #[serde(default)]
    pub is_popular: bool,
}

impl TierPlan {
    pub fn find<'a>(catalog: &'a [TierPlan], tier: &Tier) -> Option<&'a TierPlan> {
        catalog.iter().find(|plan| plan.name == tier.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_statuses_are_kept_verbatim() {
        let body: VerifySessionResponse =
            serde_json::from_value(json!({ "status": "expired" })).unwrap();
        assert_eq!(body.status, SessionStatus::Other("expired".to_string()));

        let body: VerifySessionResponse =
            serde_json::from_value(json!({ "status": "paid" })).unwrap();
        assert_eq!(body.status, SessionStatus::Paid);
    }

    #[test]
    fn profile_decodes_with_missing_counters() {
        let profile: UserProfile = serde_json::from_value(json!({
            "user": {
                "id": "5b0c",
                "github_id": 42,
                "username": "clipper",
                "avatar_url": null,
                "tier": "tier2",
                "is_banned": false
            }
        }))
        .unwrap();
        assert_eq!(profile.tier(), &Tier::new("tier2"));
        assert_eq!(profile.clip_count, 0);
    }
}
