//! Generation parameters and record lifecycle.

use crate::{
    DEFAULT_HEIGHT, DEFAULT_NEGATIVE_PROMPT, DEFAULT_STEPS, DEFAULT_WIDTH, Error, RANDOM_SEED,
    Result, SEED_UPPER_BOUND,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Parameters for one generation attempt, with defaults applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub prompt: String,
    pub negative_prompt: String,
    /// Requested seed; [`RANDOM_SEED`] until resolved.
    pub seed: i64,
    pub steps: i64,
    pub width: i64,
    pub height: i64,
    pub style_preset_id: Option<Uuid>,
}

impl GenerationParams {
    /// Build parameters from raw request fields, filling in defaults.
    ///
    /// Non-positive or missing dimensions and steps take their defaults,
    /// a blank negative prompt becomes [`DEFAULT_NEGATIVE_PROMPT`], and a
    /// missing seed is treated as [`RANDOM_SEED`].
    pub fn from_request(
        prompt: impl Into<String>,
        negative_prompt: Option<String>,
        seed: Option<i64>,
        steps: Option<i64>,
        width: Option<i64>,
        height: Option<i64>,
        style_preset_id: Option<Uuid>,
    ) -> Result<Self> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(Error::Validation("prompt is required".to_string()));
        }

        let seed = seed.unwrap_or(RANDOM_SEED);

        let negative_prompt = negative_prompt
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_NEGATIVE_PROMPT.to_string());

        Ok(Self {
            prompt,
            negative_prompt,
            seed,
            steps: positive_or(steps, DEFAULT_STEPS),
            width: positive_or(width, DEFAULT_WIDTH),
            height: positive_or(height, DEFAULT_HEIGHT),
            style_preset_id,
        })
    }
}

fn positive_or(value: Option<i64>, default: i64) -> i64 {
    match value {
        Some(v) if v > 0 => v,
        _ => default,
    }
}

/// Resolve the random seed sentinel into a concrete seed.
pub fn resolve_seed(seed: i64) -> i64 {
    resolve_seed_with(seed, &mut rand::rng())
}

/// Resolve a seed using the given random source.
pub fn resolve_seed_with<R: Rng>(seed: i64, rng: &mut R) -> i64 {
    if seed == RANDOM_SEED {
        rng.random_range(0..SEED_UPPER_BOUND)
    } else {
        seed
    }
}

/// Generation record status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    /// Attempt started but not yet resolved.
    Pending,
    /// Image was produced and stored.
    Success,
    /// Provider or archive failure.
    Failed,
}

impl GenerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenerationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(Error::InvalidStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn params(seed: Option<i64>) -> Result<GenerationParams> {
        GenerationParams::from_request("a lighthouse", None, seed, None, None, None, None)
    }

    #[test]
    fn test_defaults_applied() {
        let p = GenerationParams::from_request(
            "a lighthouse",
            Some("   ".to_string()),
            None,
            Some(0),
            Some(-5),
            None,
            None,
        )
        .unwrap();
        assert_eq!(p.steps, DEFAULT_STEPS);
        assert_eq!(p.width, DEFAULT_WIDTH);
        assert_eq!(p.height, DEFAULT_HEIGHT);
        assert_eq!(p.negative_prompt, DEFAULT_NEGATIVE_PROMPT);
        assert_eq!(p.seed, RANDOM_SEED);
    }

    #[test]
    fn test_explicit_values_kept() {
        let p = GenerationParams::from_request(
            "a lighthouse",
            Some("fog".to_string()),
            Some(42),
            Some(12),
            Some(512),
            Some(768),
            None,
        )
        .unwrap();
        assert_eq!(p.seed, 42);
        assert_eq!(p.steps, 12);
        assert_eq!(p.width, 512);
        assert_eq!(p.height, 768);
        assert_eq!(p.negative_prompt, "fog");
    }

    #[test]
    fn test_blank_prompt_rejected() {
        let err = GenerationParams::from_request("  ", None, None, None, None, None, None);
        assert!(matches!(err, Err(Error::Validation(_))));
    }

    #[test]
    fn test_explicit_seed_passed_through() {
        assert_eq!(params(Some(-2)).unwrap().seed, -2);
        assert_eq!(params(Some(SEED_UPPER_BOUND)).unwrap().seed, SEED_UPPER_BOUND);
        assert_eq!(params(Some(0)).unwrap().seed, 0);
        assert_eq!(resolve_seed(-2), -2);
        assert_eq!(resolve_seed(SEED_UPPER_BOUND), SEED_UPPER_BOUND);
    }

    #[test]
    fn test_resolve_seed_keeps_explicit_seed() {
        assert_eq!(resolve_seed(0), 0);
        assert_eq!(resolve_seed(1234), 1234);
    }

    #[test]
    fn test_random_seeds_in_range_and_vary() {
        let seeds: HashSet<i64> = (0..200).map(|_| resolve_seed(RANDOM_SEED)).collect();
        assert!(seeds.iter().all(|s| (0..SEED_UPPER_BOUND).contains(s)));
        assert!(seeds.len() > 1, "random seeds should not be constant");
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(
            "success".parse::<GenerationStatus>().unwrap(),
            GenerationStatus::Success
        );
        assert_eq!(GenerationStatus::Failed.to_string(), "failed");
        assert!("done".parse::<GenerationStatus>().is_err());
    }
}
