use super::{ImageGenError, ImageGenResult, ImageProvider};
use crate::types::{GeneratedImage, ImageMetadata, ImageStatus, PlayerId};
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use std::time::{Duration, Instant};

/// Prompts containing any of these terms are rejected, so the
/// content-policy path works without a real backend.
const BLOCKED_TERMS: &[&str] = &["nsfw", "gore", "explicit"];

/// Deterministic placeholder provider with simulated latency.
pub struct MockProvider {
    latency: Option<(Duration, Duration)>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            latency: Some((Duration::from_millis(500), Duration::from_millis(1500))),
        }
    }

    /// No simulated latency; used by tests.
    pub fn instant() -> Self {
        Self { latency: None }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// FNV-1a, enough to derive stable placeholder seeds per prompt.
fn prompt_seed(prompt: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in prompt.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[async_trait]
impl ImageProvider for MockProvider {
    async fn generate(
        &self,
        prompt: &str,
        count: u32,
        owner: &PlayerId,
    ) -> ImageGenResult<Vec<GeneratedImage>> {
        let started = Instant::now();
        let lowered = prompt.to_lowercase();
        if let Some(term) = BLOCKED_TERMS.iter().find(|t| lowered.contains(**t)) {
            return Err(ImageGenError::ContentPolicy(format!(
                "prompt contains disallowed term: {term}"
            )));
        }

        if let Some((min, max)) = self.latency {
            let millis = rand::rng().random_range(min.as_millis()..=max.as_millis());
            tokio::time::sleep(Duration::from_millis(millis as u64)).await;
        }

        let seed = prompt_seed(prompt);
        let generation_time_ms = started.elapsed().as_millis() as u64;

        Ok((0..count)
            .map(|index| GeneratedImage {
                id: ulid::Ulid::new().to_string(),
                prompt_id: owner.clone(),
                player_id: owner.clone(),
                image_url: format!("https://picsum.photos/seed/{seed:x}-{index}/512/512"),
                thumbnail_url: Some(format!("https://picsum.photos/seed/{seed:x}-{index}/128/128")),
                provider: "mock".to_string(),
                provider_image_id: Some(format!("{seed:x}-{index}")),
                status: ImageStatus::Complete,
                generated_at: Utc::now(),
                metadata: ImageMetadata {
                    model: "placeholder".to_string(),
                    revised_prompt: None,
                    generation_time_ms,
                },
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
