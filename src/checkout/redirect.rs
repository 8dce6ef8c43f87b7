use url::Url;

const SESSION_ID_PARAM: &str = "session_id";

/// Pulls the checkout session id out of the URL the processor redirected back to.
///
/// Accepts absolute URLs (`https://app/payment/verify?session_id=..`) as well as
/// paths (`/payment/verify?session_id=..`). Empty values count as absent.
pub fn session_id_from_redirect(redirect: &str) -> Option<String> {
    let url = match Url::parse(redirect) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse("http://localhost/").ok()?.join(redirect).ok()?
        }
        Err(_) => return None,
    };

    url.query_pairs()
        .find(|(key, _)| key == SESSION_ID_PARAM)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
