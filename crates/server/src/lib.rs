//! HTTP gateway for NovelAI image generation.
//!
//! This crate provides:
//! - The admission ledger and the gate chain that guards generation
//! - Turnstile verification
//! - Provider orchestration and archive extraction
//! - Outcome recording with file rollback
//! - Record lookup, style preset and file serving endpoints

pub mod admission;
pub mod archive;
pub mod bootstrap;
pub mod client_ip;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod metrics;
pub mod provider;
pub mod recorder;
pub mod routes;
pub mod state;
pub mod verification;

pub use admission::{AdmissionController, AdmissionDecision, DenyReason};
pub use error::ApiError;
pub use ledger::AdmissionLedger;
pub use routes::create_router;
pub use state::AppState;
