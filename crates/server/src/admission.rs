//! Admission control for generation requests.
//!
//! A request passes through an ordered chain of gates. The first gate that
//! denies ends evaluation; a privileged caller skips the rest of the chain.
//! Denials never touch the ledger. An allowed request is committed to the
//! ledger with [`AdmissionLedger::try_record_request`], which re-checks the
//! throttles under lock so two racing requests cannot both slip through.

use crate::client_ip::ClientIpExtractor;
use crate::ledger::{AdmissionLedger, Throttle};
use crate::metrics;
use crate::state::AppState;
use crate::verification::ChallengeVerifier;
use atelier_core::config::AdmissionConfig;
use axum::{
    Json,
    body::Body,
    extract::{Query, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;

/// Header carrying the privilege credential.
pub const PRIVILEGE_KEY_HEADER: &str = "x-privilege-key";
/// Header carrying the challenge token.
pub const TURNSTILE_TOKEN_HEADER: &str = "x-turnstile-token";

/// One step of the admission chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gate {
    /// Matching privilege credential bypasses the remaining gates.
    Privilege,
    /// Minimum spacing between admitted requests of all clients.
    GlobalThrottle,
    /// Minimum spacing between admitted requests of one client.
    ClientThrottle,
    /// Periodic human verification.
    Verification,
}

/// Gates in evaluation order.
pub const GATE_CHAIN: [Gate; 4] = [
    Gate::Privilege,
    Gate::GlobalThrottle,
    Gate::ClientThrottle,
    Gate::Verification,
];

/// Why a request was turned away.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DenyReason {
    GlobalRateLimit,
    IpRateLimit,
    TurnstileRequired,
    InvalidTurnstile,
}

impl DenyReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::GlobalRateLimit => "GLOBAL_RATE_LIMIT",
            Self::IpRateLimit => "IP_RATE_LIMIT",
            Self::TurnstileRequired => "TURNSTILE_REQUIRED",
            Self::InvalidTurnstile => "INVALID_TURNSTILE",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::GlobalRateLimit | Self::IpRateLimit => StatusCode::TOO_MANY_REQUESTS,
            Self::TurnstileRequired | Self::InvalidTurnstile => StatusCode::UNAUTHORIZED,
        }
    }
}

impl From<Throttle> for DenyReason {
    fn from(throttle: Throttle) -> Self {
        match throttle {
            Throttle::Global => Self::GlobalRateLimit,
            Throttle::Client => Self::IpRateLimit,
        }
    }
}

/// Inputs to one admission decision.
#[derive(Clone, Debug, Default)]
pub struct AdmissionRequest {
    pub client_id: String,
    pub challenge_token: Option<String>,
    pub privilege_key: Option<String>,
}

/// Outcome of the gate chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdmissionDecision {
    Allowed {
        /// Admitted through the privilege gate.
        privileged: bool,
        /// A challenge token was verified on this request.
        verified: bool,
    },
    Denied(DenyReason),
}

impl AdmissionDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    /// Label used for metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Allowed { privileged: true, .. } => "privileged",
            Self::Allowed { .. } => "allowed",
            Self::Denied(reason) => reason.code(),
        }
    }
}

enum GateResult {
    Continue,
    Bypass,
    Deny(DenyReason),
}

/// Composes the ledger and the verifier into allow/deny decisions.
pub struct AdmissionController {
    ledger: AdmissionLedger,
    verifier: Arc<dyn ChallengeVerifier>,
    privilege_key: Option<String>,
    global_interval_secs: u64,
    client_interval_secs: u64,
}

impl AdmissionController {
    pub fn new(
        config: &AdmissionConfig,
        ledger: AdmissionLedger,
        verifier: Arc<dyn ChallengeVerifier>,
    ) -> Self {
        Self {
            ledger,
            verifier,
            privilege_key: config.enabled_privilege_key().map(str::to_string),
            global_interval_secs: config.global_interval_secs,
            client_interval_secs: config.client_interval_secs,
        }
    }

    pub fn ledger(&self) -> &AdmissionLedger {
        &self.ledger
    }

    /// Run the gate chain for one request.
    pub async fn evaluate(&self, request: &AdmissionRequest) -> AdmissionDecision {
        let client_id = request.client_id.as_str();
        let mut verified = false;

        for gate in GATE_CHAIN {
            match self.check_gate(gate, request, &mut verified).await {
                GateResult::Continue => {}
                GateResult::Bypass => {
                    self.ledger.record_request(client_id);
                    return AdmissionDecision::Allowed {
                        privileged: true,
                        verified,
                    };
                }
                GateResult::Deny(reason) => return AdmissionDecision::Denied(reason),
            }
        }

        // The verifier call may have suspended long enough for another
        // request from this client (or any client) to be admitted.
        match self.ledger.try_record_request(client_id) {
            Ok(()) => AdmissionDecision::Allowed {
                privileged: false,
                verified,
            },
            Err(throttle) => AdmissionDecision::Denied(throttle.into()),
        }
    }

    async fn check_gate(
        &self,
        gate: Gate,
        request: &AdmissionRequest,
        verified: &mut bool,
    ) -> GateResult {
        let client_id = request.client_id.as_str();
        match gate {
            Gate::Privilege => match (&self.privilege_key, &request.privilege_key) {
                (Some(expected), Some(supplied)) if expected == supplied => GateResult::Bypass,
                _ => GateResult::Continue,
            },
            Gate::GlobalThrottle if !self.ledger.admit_global() => {
                GateResult::Deny(DenyReason::GlobalRateLimit)
            }
            Gate::ClientThrottle if !self.ledger.admit_client(client_id) => {
                GateResult::Deny(DenyReason::IpRateLimit)
            }
            Gate::Verification if self.ledger.verification_required(client_id) => {
                let Some(token) = request
                    .challenge_token
                    .as_deref()
                    .filter(|t| !t.is_empty())
                else {
                    return GateResult::Deny(DenyReason::TurnstileRequired);
                };
                if self.verifier.verify(token, client_id).await {
                    self.ledger.record_verification(client_id);
                    *verified = true;
                    GateResult::Continue
                } else {
                    GateResult::Deny(DenyReason::InvalidTurnstile)
                }
            }
            Gate::GlobalThrottle | Gate::ClientThrottle | Gate::Verification => {
                GateResult::Continue
            }
        }
    }

    /// Build the HTTP response for a denial.
    pub fn denial(&self, reason: DenyReason) -> AdmissionDenied {
        let retry_after = match reason {
            DenyReason::GlobalRateLimit => Some(self.global_interval_secs),
            DenyReason::IpRateLimit => Some(self.client_interval_secs),
            DenyReason::TurnstileRequired | DenyReason::InvalidTurnstile => None,
        };
        let message = match reason {
            DenyReason::GlobalRateLimit => format!(
                "Global rate limit exceeded. Please wait {} seconds between requests.",
                self.global_interval_secs
            ),
            DenyReason::IpRateLimit => format!(
                "IP rate limit exceeded. Please wait {} seconds between requests.",
                self.client_interval_secs
            ),
            DenyReason::TurnstileRequired => "Turnstile verification required.".to_string(),
            DenyReason::InvalidTurnstile => "Invalid Turnstile token.".to_string(),
        };
        AdmissionDenied {
            reason,
            message,
            retry_after,
        }
    }
}

/// Denied admission, rendered as `{"error", "code"}`.
#[derive(Debug)]
pub struct AdmissionDenied {
    pub reason: DenyReason,
    pub message: String,
    pub retry_after: Option<u64>,
}

impl IntoResponse for AdmissionDenied {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "error": self.message,
            "code": self.reason.code(),
        }));
        let status = self.reason.status_code();
        match self.retry_after {
            Some(secs) => (status, [("Retry-After", secs.to_string())], body).into_response(),
            None => (status, body).into_response(),
        }
    }
}

/// Identity of a request that passed admission.
#[derive(Clone, Debug)]
pub struct AdmittedClient {
    pub client_id: String,
    pub privileged: bool,
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    turnstile_token: Option<String>,
}

/// Pull the admission inputs out of a request.
pub fn admission_request(req: &Request<Body>, client_ip: &ClientIpExtractor) -> AdmissionRequest {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .filter(|v| !v.is_empty())
    };

    let challenge_token = header(TURNSTILE_TOKEN_HEADER).or_else(|| {
        Query::<TokenQuery>::try_from_uri(req.uri())
            .ok()
            .and_then(|Query(q)| q.turnstile_token)
            .filter(|t| !t.is_empty())
    });

    AdmissionRequest {
        client_id: client_ip.extract(req),
        challenge_token,
        privilege_key: header(PRIVILEGE_KEY_HEADER),
    }
}

/// Admission middleware for the generation route.
pub async fn admission_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let request = admission_request(&req, &state.client_ip);
    let decision = state.admission.evaluate(&request).await;

    metrics::ADMISSION_DECISIONS
        .with_label_values(&[decision.outcome()])
        .inc();

    match decision {
        AdmissionDecision::Allowed {
            privileged,
            verified,
        } => {
            tracing::debug!(
                client = %request.client_id,
                privileged = privileged,
                verified = verified,
                "Request admitted"
            );
            req.extensions_mut().insert(AdmittedClient {
                client_id: request.client_id,
                privileged,
            });
            next.run(req).await
        }
        AdmissionDecision::Denied(reason) => {
            tracing::info!(
                client = %request.client_id,
                code = reason.code(),
                "Request denied by admission control"
            );
            state.admission.denial(reason).into_response()
        }
    }
}
