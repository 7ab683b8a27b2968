//! Human-verification gateway backed by Cloudflare Turnstile.

use async_trait::async_trait;
use atelier_core::config::VerificationConfig;
use serde::Deserialize;

/// Submits a challenge token to a remote verifier.
///
/// Implementations never fail: any problem talking to the verifier is a
/// negative verdict.
#[async_trait]
pub trait ChallengeVerifier: Send + Sync {
    async fn verify(&self, token: &str, client_ip: &str) -> bool;
}

/// Siteverify response body. Only `success` drives the verdict.
#[derive(Debug, Deserialize)]
struct SiteverifyResponse {
    success: bool,
    #[serde(rename = "error-codes", default)]
    error_codes: Vec<String>,
    #[serde(default)]
    hostname: Option<String>,
}

/// Turnstile siteverify client.
pub struct TurnstileVerifier {
    client: reqwest::Client,
    endpoint: String,
    secret: Option<String>,
}

impl TurnstileVerifier {
    /// Build the siteverify client. Every call is bounded by the configured timeout.
    pub fn new(config: &VerificationConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            secret: config.enabled_secret().map(str::to_string),
        })
    }

    async fn siteverify(
        &self,
        secret: &str,
        token: &str,
        client_ip: &str,
    ) -> Result<SiteverifyResponse, reqwest::Error> {
        let mut form = vec![("secret", secret), ("response", token)];
        if client_ip != crate::client_ip::UNKNOWN_CLIENT {
            form.push(("remoteip", client_ip));
        }

        self.client
            .post(&self.endpoint)
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .json::<SiteverifyResponse>()
            .await
    }
}

#[async_trait]
impl ChallengeVerifier for TurnstileVerifier {
    #[tracing::instrument(skip(self, token))]
    async fn verify(&self, token: &str, client_ip: &str) -> bool {
        let Some(secret) = self.secret.as_deref() else {
            return true;
        };

        match self.siteverify(secret, token, client_ip).await {
            Ok(body) => {
                if !body.success {
                    tracing::warn!(
                        error_codes = ?body.error_codes,
                        hostname = ?body.hostname,
                        "Turnstile rejected token"
                    );
                }
                body.success
            }
            Err(e) => {
                tracing::warn!(error = %e, "Turnstile verification failed");
                false
            }
        }
    }
}

/// Verifier with a fixed verdict.
pub struct StaticVerifier(pub bool);

#[async_trait]
impl ChallengeVerifier for StaticVerifier {
    async fn verify(&self, _token: &str, _client_ip: &str) -> bool {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn config(server: &MockServer, secret: Option<&str>) -> VerificationConfig {
        VerificationConfig {
            secret: secret.map(str::to_string),
            endpoint: server.url("/turnstile/v0/siteverify"),
            timeout_secs: 2,
        }
    }

    #[tokio::test]
    async fn test_no_secret_always_passes() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.any_request();
                then.status(500);
            })
            .await;

        let verifier = TurnstileVerifier::new(&config(&server, None)).unwrap();
        assert!(verifier.verify("anything", "1.2.3.4").await);
        mock.assert_hits_async(0).await;

        let blank = TurnstileVerifier::new(&config(&server, Some(""))).unwrap();
        assert!(blank.verify("anything", "1.2.3.4").await);
    }

    #[tokio::test]
    async fn test_success_verdict() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/turnstile/v0/siteverify")
                    .x_www_form_urlencoded_tuple("secret", "s3cret")
                    .x_www_form_urlencoded_tuple("response", "tok")
                    .x_www_form_urlencoded_tuple("remoteip", "1.2.3.4");
                then.status(200)
                    .json_body(serde_json::json!({"success": true, "error-codes": []}));
            })
            .await;

        let verifier = TurnstileVerifier::new(&config(&server, Some("s3cret"))).unwrap();
        assert!(verifier.verify("tok", "1.2.3.4").await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_token() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).json_body(
                    serde_json::json!({"success": false, "error-codes": ["invalid-input-response"]}),
                );
            })
            .await;

        let verifier = TurnstileVerifier::new(&config(&server, Some("s3cret"))).unwrap();
        assert!(!verifier.verify("bad", "1.2.3.4").await);
    }

    #[tokio::test]
    async fn test_errors_are_negative_verdicts() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/turnstile/v0/siteverify");
                then.status(502).body("bad gateway");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/garbled");
                then.status(200).body("not json");
            })
            .await;

        let verifier = TurnstileVerifier::new(&config(&server, Some("s3cret"))).unwrap();
        assert!(!verifier.verify("tok", "1.2.3.4").await);

        let garbled = TurnstileVerifier::new(&VerificationConfig {
            endpoint: server.url("/garbled"),
            ..config(&server, Some("s3cret"))
        })
        .unwrap();
        assert!(!garbled.verify("tok", "1.2.3.4").await);
    }

    #[tokio::test]
    async fn test_unknown_client_omits_remoteip() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).body("secret=s3cret&response=tok");
                then.status(200).json_body(serde_json::json!({"success": true}));
            })
            .await;

        let verifier = TurnstileVerifier::new(&config(&server, Some("s3cret"))).unwrap();
        assert!(verifier.verify("tok", "unknown").await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_slow_siteverify_times_out() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/turnstile/v0/siteverify");
                then.status(200)
                    .delay(std::time::Duration::from_secs(3))
                    .json_body(serde_json::json!({ "success": true }));
            })
            .await;

        let verifier = TurnstileVerifier::new(&VerificationConfig {
            timeout_secs: 1,
            ..config(&server, Some("s3cret"))
        })
        .unwrap();

        let started = std::time::Instant::now();
        assert!(!verifier.verify("tok", "1.2.3.4").await);
        assert!(started.elapsed() < std::time::Duration::from_secs(3));
    }
}
