use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::Client;
use tracing::debug;
use url::Url;

use super::models::{CheckoutSession, UserProfile, VerifySessionResponse};
use super::services::{CheckoutSessionService, UserProfileService};
use crate::config::BackendConfig;
use crate::error::{ServiceError, ServiceResult};

const VERIFY_SESSION_PATH: &str = "api/checkout/verify-session";
const PROFILE_PATH: &str = "api/me";

/// Credentialed HTTP client for the application backend.
#[derive(Clone)]
pub struct BackendClient {
    base_url: Url,
    client: Client,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> ServiceResult<Self> {
        let mut normalized = config.api_url.trim_end_matches('/').to_string();
        normalized.push('/');
        let base_url = Url::parse(&normalized)?;

        let mut headers = HeaderMap::new();
        if let Some(cookie) = &config.session_cookie {
            let value = HeaderValue::from_str(cookie)
                .map_err(|err| ServiceError::Message(format!("invalid session cookie: {err}")))?;
            headers.insert(COOKIE, value);
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self { base_url, client })
    }

    fn endpoint(&self, path: &str) -> ServiceResult<Url> {
        Ok(self.base_url.join(path)?)
    }
}

#[async_trait]
impl CheckoutSessionService for BackendClient {
    async fn verify_session(&self, session_id: &str) -> ServiceResult<CheckoutSession> {
        let url = self.endpoint(VERIFY_SESSION_PATH)?;
        let body: VerifySessionResponse = self
            .client
            .get(url)
            .query(&[("session_id", session_id)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!(%session_id, status = %body.status, "checkout session status fetched");
        Ok(CheckoutSession {
            id: session_id.to_string(),
            status: body.status,
        })
    }
}

#[async_trait]
impl UserProfileService for BackendClient {
    async fn current_profile(&self) -> ServiceResult<UserProfile> {
        let url = self.endpoint(PROFILE_PATH)?;
        let profile: UserProfile = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!(tier = %profile.tier(), "user profile fetched");
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_keep_base_path_prefix() {
        let client = BackendClient::new(&BackendConfig::new("https://wayclip.test/backend/"))
            .expect("client");
        assert_eq!(
            client.endpoint(PROFILE_PATH).unwrap().as_str(),
            "https://wayclip.test/backend/api/me"
        );
    }

    #[test]
    fn rejects_unparseable_base_url() {
        let err = BackendClient::new(&BackendConfig::new("not a url")).err();
        assert!(matches!(err, Some(ServiceError::Url(_))));
    }

    #[test]
    fn rejects_cookie_with_control_characters() {
        let config = BackendConfig::new("https://wayclip.test").with_session_cookie("sid=a\nb");
        assert!(matches!(
            BackendClient::new(&config).err(),
            Some(ServiceError::Message(_))
        ));
    }
}
