use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;

/// Claims carried by a Supabase API key. Read for diagnostics only; the
/// signature is never checked and the remote service stays the authority.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeyClaims {
    pub role: Option<String>,
    #[serde(rename = "ref")]
    pub project_ref: Option<String>,
    pub exp: Option<u64>,
}

impl KeyClaims {
    /// Decode the payload segment of a JWT-shaped key. Returns `None` for
    /// anything that does not look like one (opaque keys are fine).
    pub fn peek(key: &str) -> Option<Self> {
        let mut parts = key.split('.');
        let (_header, payload, _sig) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }
        let bytes = general_purpose::URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    pub fn is_expired_at(&self, now_secs: u64) -> bool {
        matches!(self.exp, Some(exp) if exp <= now_secs)
    }
}

/// Mask a secret for display, keeping a short prefix for recognition.
pub fn redact_key(key: &str) -> String {
    const VISIBLE: usize = 6;
    if key.chars().count() <= VISIBLE * 2 {
        return "***".to_string();
    }
    let prefix: String = key.chars().take(VISIBLE).collect();
    format!("{}…***", prefix)
}

/// Log what can be learned from the key without sending it anywhere.
pub fn inspect_key(key: &str) {
    match KeyClaims::peek(key) {
        Some(claims) => {
            tracing::debug!(
                role = claims.role.as_deref().unwrap_or("?"),
                project_ref = claims.project_ref.as_deref().unwrap_or("?"),
                "api key claims"
            );
            let now = (crate::utils::unix_millis() / 1000) as u64;
            if claims.is_expired_at(now) {
                tracing::warn!("api key appears to be expired (exp={:?})", claims.exp);
            }
        }
        None => tracing::debug!("api key is not a JWT; skipping claim inspection"),
    }
}
