//! Cloudflare Turnstile verification gate.
//!
//! Disabled entirely when no secret key is configured. When enabled,
//! every guarded request must carry a token that the siteverify
//! endpoint accepts within the client timeout.

use std::time::Duration;

use serde_derive::Deserialize;

use crate::errors::ServerError;

const SITEVERIFY_URL: &str = "https://challenges.cloudflare.com/turnstile/v0/siteverify";
const VERIFY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TurnstileGate {
    client: reqwest::Client,
    secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SiteverifyOutcome {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

impl TurnstileGate {
    pub fn new(secret: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(VERIFY_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        TurnstileGate {
            client,
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    pub fn from_env() -> Self {
        TurnstileGate::new(std::env::var("TURNSTILE_SECRET_KEY").ok())
    }

    pub fn enabled(&self) -> bool {
        self.secret.is_some()
    }

    pub async fn require(
        &self,
        token: Option<&str>,
        remote_ip: Option<&str>,
    ) -> Result<(), ServerError> {
        let secret = match &self.secret {
            Some(secret) => secret,
            None => return Ok(()),
        };

        let token = match token.filter(|t| !t.is_empty()) {
            Some(token) => token,
            None => return Err(ServerError::CaptchaFailed("captcha token missing")),
        };

        let mut params = vec![("secret", secret.as_str()), ("response", token)];
        if let Some(ip) = remote_ip {
            params.push(("remoteip", ip));
        }

        let outcome = self
            .client
            .post(SITEVERIFY_URL)
            .form(&params)
            .send()
            .await
            .map_err(|err| {
                log::warn!("turnstile siteverify unreachable: {}", err);
                ServerError::CaptchaFailed("captcha verification unavailable")
            })?
            .json::<SiteverifyOutcome>()
            .await
            .map_err(|_| ServerError::CaptchaFailed("captcha verification unavailable"))?;

        if outcome.success {
            Ok(())
        } else {
            log::warn!("turnstile rejected token: {:?}", outcome.error_codes);
            Err(ServerError::CaptchaFailed("captcha verification failed"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn disabled_gate_lets_everything_through() {
        let gate = TurnstileGate::new(None);
        assert!(!gate.enabled());
        assert!(gate.require(None, None).await.is_ok());
        assert!(gate.require(Some("any-token"), None).await.is_ok());
    }

    #[actix_web::test]
    async fn blank_secret_means_disabled() {
        let gate = TurnstileGate::new(Some(String::new()));
        assert!(!gate.enabled());
        assert!(gate.require(None, None).await.is_ok());
    }

    #[actix_web::test]
    async fn enabled_gate_rejects_missing_token_without_network() {
        let gate = TurnstileGate::new(Some("dummy-secret".to_string()));
        assert!(gate.enabled());

        match gate.require(None, None).await {
            Err(ServerError::CaptchaFailed(msg)) => assert_eq!(msg, "captcha token missing"),
            other => panic!("expected captcha failure, got {:?}", other),
        }
        match gate.require(Some(""), None).await {
            Err(ServerError::CaptchaFailed(msg)) => assert_eq!(msg, "captcha token missing"),
            other => panic!("expected captcha failure, got {:?}", other),
        }
    }

    #[test]
    fn siteverify_outcome_parses_with_and_without_error_codes() {
        let ok: SiteverifyOutcome = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(ok.success);
        assert!(ok.error_codes.is_empty());

        let rejected: SiteverifyOutcome = serde_json::from_str(
            r#"{"success": false, "error-codes": ["invalid-input-response"]}"#,
        )
        .unwrap();
        assert!(!rejected.success);
        assert_eq!(rejected.error_codes, vec!["invalid-input-response"]);
    }
}
