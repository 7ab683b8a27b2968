//! Core domain types and shared logic for the atelier image gateway.
//!
//! This crate defines the data model used across all other crates:
//! - Application configuration
//! - Generation parameters, defaults and seed resolution
//! - Generation record status lifecycle
//! - Style preset prompt composition
//! - The clock abstraction used for admission interval arithmetic

pub mod clock;
pub mod config;
pub mod error;
pub mod generation;
pub mod style;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use generation::{GenerationParams, GenerationStatus, resolve_seed};
pub use style::PromptAffixes;

/// Seed value requesting a randomly drawn seed.
pub const RANDOM_SEED: i64 = -1;

/// Exclusive upper bound for randomly drawn seeds.
pub const SEED_UPPER_BOUND: i64 = 10_000_000_000;

/// Default sampling steps.
pub const DEFAULT_STEPS: i64 = 28;

/// Default image width in pixels.
pub const DEFAULT_WIDTH: i64 = 832;

/// Default image height in pixels.
pub const DEFAULT_HEIGHT: i64 = 1216;

/// Negative prompt used when the caller supplies none.
pub const DEFAULT_NEGATIVE_PROMPT: &str = "bad anatomy, bad hands, text, error, missing fingers, \
extra digit, fewer digits, cropped, worst quality, low quality, normal quality, jpeg artifacts, \
signature, watermark, username, blurry";
