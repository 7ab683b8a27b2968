//! Style preset prompt composition.

use serde::{Deserialize, Serialize};

/// Text a style preset wraps around the caller's prompts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptAffixes {
    pub prefix_prompt: String,
    pub suffix_prompt: String,
    pub prefix_negative_prompt: String,
    pub suffix_negative_prompt: String,
}

impl PromptAffixes {
    /// Compose the positive prompt sent to the provider.
    pub fn apply_prompt(&self, prompt: &str) -> String {
        join_parts(&[&self.prefix_prompt, prompt, &self.suffix_prompt])
    }

    /// Compose the negative prompt sent to the provider.
    pub fn apply_negative(&self, negative_prompt: &str) -> String {
        join_parts(&[
            &self.prefix_negative_prompt,
            negative_prompt,
            &self.suffix_negative_prompt,
        ])
    }
}

fn join_parts(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}
