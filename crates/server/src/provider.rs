//! Generation orchestration against the NovelAI image API.
//!
//! The orchestrator turns [`GenerationParams`] into the provider payload,
//! issues a single bearer-authenticated POST and unpacks the zip archive
//! that comes back. It never touches storage; persisting the outcome is the
//! recorder's job.

use crate::archive::{ArchiveError, extract_image};
use crate::metrics;
use atelier_core::config::ProviderConfig;
use atelier_core::{GenerationParams, PromptAffixes, resolve_seed};
use bytes::Bytes;
use serde::Serialize;
use std::time::Instant;

/// Longest provider error body echoed into the error text.
const MAX_ERROR_BODY: usize = 1024;

/// Errors from one generation attempt.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("failed to build payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Provider { status: u16, body: String },

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

#[derive(Serialize)]
struct GeneratePayload<'a> {
    action: &'static str,
    input: &'a str,
    model: &'a str,
    parameters: GenerateParameters<'a>,
}

#[derive(Serialize)]
struct GenerateParameters<'a> {
    params_version: u32,
    prefer_brownian: bool,
    negative_prompt: &'a str,
    height: i64,
    width: i64,
    scale: u32,
    seed: i64,
    sampler: &'static str,
    noise_schedule: &'static str,
    steps: i64,
    n_samples: u32,
    #[serde(rename = "ucPreset")]
    uc_preset: u32,
    #[serde(rename = "qualityToggle")]
    quality_toggle: bool,
    add_original_image: bool,
    controlnet_strength: u32,
    deliberate_euler_ancestral_bug: bool,
    dynamic_thresholding: bool,
    legacy: bool,
    legacy_v3_extend: bool,
    sm: bool,
    sm_dyn: bool,
    uncond_scale: u32,
    skip_cfg_above_sigma: Option<f64>,
    use_coords: bool,
    #[serde(rename = "characterPrompts")]
    character_prompts: Vec<serde_json::Value>,
    reference_image_multiple: Vec<serde_json::Value>,
    reference_information_extracted_multiple: Vec<serde_json::Value>,
    reference_strength_multiple: Vec<serde_json::Value>,
    v4_negative_prompt: V4Prompt<'a>,
    v4_prompt: V4Prompt<'a>,
}

#[derive(Serialize)]
struct V4Prompt<'a> {
    caption: V4Caption<'a>,
    use_coords: bool,
    use_order: bool,
}

#[derive(Serialize)]
struct V4Caption<'a> {
    base_caption: &'a str,
    char_captions: Vec<serde_json::Value>,
}

/// Payload ready to send, with the seed it was built for.
#[derive(Clone, Debug)]
pub struct PreparedGeneration {
    pub seed: i64,
    pub payload: String,
}

/// Result of [`GenerationOrchestrator::generate`].
#[derive(Debug)]
pub struct GenerationOutcome {
    /// Resolved seed, reported even when the attempt failed.
    pub seed: i64,
    /// Payload sent to the provider, if it could be built.
    pub payload: Option<String>,
    pub result: Result<Bytes, GenerationError>,
}

/// Drives one generation attempt against the provider.
pub struct GenerationOrchestrator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GenerationOrchestrator {
    pub fn new(config: &ProviderConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    /// Resolve the seed and serialize the provider payload.
    ///
    /// When `affixes` is given the style preset text wraps both prompts.
    pub fn prepare(
        &self,
        params: &GenerationParams,
        affixes: Option<&PromptAffixes>,
    ) -> Result<PreparedGeneration, (i64, GenerationError)> {
        let seed = resolve_seed(params.seed);
        let (prompt, negative) = match affixes {
            Some(affixes) => (
                affixes.apply_prompt(&params.prompt),
                affixes.apply_negative(&params.negative_prompt),
            ),
            None => (params.prompt.clone(), params.negative_prompt.clone()),
        };

        let payload = GeneratePayload {
            action: "generate",
            input: &prompt,
            model: &self.model,
            parameters: GenerateParameters {
                params_version: 3,
                prefer_brownian: true,
                negative_prompt: &negative,
                height: params.height,
                width: params.width,
                scale: 5,
                seed,
                sampler: "k_euler_ancestral",
                noise_schedule: "karras",
                steps: params.steps,
                n_samples: 1,
                uc_preset: 0,
                quality_toggle: false,
                add_original_image: false,
                controlnet_strength: 1,
                deliberate_euler_ancestral_bug: false,
                dynamic_thresholding: true,
                legacy: false,
                legacy_v3_extend: false,
                sm: false,
                sm_dyn: false,
                uncond_scale: 1,
                skip_cfg_above_sigma: None,
                use_coords: false,
                character_prompts: Vec::new(),
                reference_image_multiple: Vec::new(),
                reference_information_extracted_multiple: Vec::new(),
                reference_strength_multiple: Vec::new(),
                v4_negative_prompt: V4Prompt {
                    caption: V4Caption {
                        base_caption: &negative,
                        char_captions: Vec::new(),
                    },
                    use_coords: false,
                    use_order: false,
                },
                v4_prompt: V4Prompt {
                    caption: V4Caption {
                        base_caption: &prompt,
                        char_captions: Vec::new(),
                    },
                    use_coords: false,
                    use_order: true,
                },
            },
        };

        match serde_json::to_string(&payload) {
            Ok(payload) => Ok(PreparedGeneration { seed, payload }),
            Err(e) => Err((seed, e.into())),
        }
    }

    /// Send a prepared payload and unpack the image.
    #[tracing::instrument(skip(self, prepared), fields(seed = prepared.seed))]
    pub async fn execute(&self, prepared: &PreparedGeneration) -> Result<Bytes, GenerationError> {
        let started = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(prepared.payload.clone())
            .send()
            .await;
        metrics::PROVIDER_LATENCY.observe(started.elapsed().as_secs_f64());

        let response = response?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Provider {
                status: status.as_u16(),
                body: truncate(body, MAX_ERROR_BODY),
            });
        }

        let archive = response.bytes().await?;
        let image = extract_image(&archive)?;

        tracing::debug!(size = image.len(), "Provider returned image");
        Ok(image)
    }

    /// Prepare and execute in one call, keeping the seed and payload for
    /// the record whatever happens.
    pub async fn generate(
        &self,
        params: &GenerationParams,
        affixes: Option<&PromptAffixes>,
    ) -> GenerationOutcome {
        match self.prepare(params, affixes) {
            Ok(prepared) => {
                let result = self.execute(&prepared).await;
                GenerationOutcome {
                    seed: prepared.seed,
                    payload: Some(prepared.payload),
                    result,
                }
            }
            Err((seed, e)) => GenerationOutcome {
                seed,
                payload: None,
                result: Err(e),
            },
        }
    }
}

fn truncate(mut body: String, limit: usize) -> String {
    if body.len() > limit {
        let mut cut = limit;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("...");
    }
    body
}
