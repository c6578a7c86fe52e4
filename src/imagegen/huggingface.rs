use super::{ImageGenError, ImageGenResult, ImageProvider};
use crate::types::{GeneratedImage, ImageMetadata, ImageStatus, PlayerId};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use serde::Serialize;
use std::time::{Duration, Instant};

const DEFAULT_MODEL: &str = "stabilityai/stable-diffusion-xl-base-1.0";
const API_BASE: &str = "https://api-inference.huggingface.co/models";

#[derive(Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
}

/// HuggingFace inference provider. The API returns raw image bytes; they
/// are embedded as data URLs so the core still stores URLs verbatim.
pub struct HuggingFaceProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl HuggingFaceProvider {
    pub fn new(api_key: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key,
            model: std::env::var("HUGGINGFACE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
        }
    }

    async fn generate_one(&self, prompt: &str) -> ImageGenResult<String> {
        let response = self
            .client
            .post(format!("{}/{}", API_BASE, self.model))
            .bearer_auth(&self.api_key)
            .json(&InferenceRequest { inputs: prompt })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ImageGenError::Transient("request timed out".to_string())
                } else {
                    ImageGenError::Transient(format!("transport error: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let lowered = body.to_lowercase();
            if status.as_u16() == 400
                && (lowered.contains("safety") || lowered.contains("content policy"))
            {
                return Err(ImageGenError::ContentPolicy(body));
            }
            return Err(ImageGenError::Transient(format!("HTTP {status}: {body}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ImageGenError::Transient(format!("reading body: {e}")))?;

        Ok(format!("data:image/png;base64,{}", STANDARD.encode(&bytes)))
    }
}

#[async_trait]
impl ImageProvider for HuggingFaceProvider {
    async fn generate(
        &self,
        prompt: &str,
        count: u32,
        owner: &PlayerId,
    ) -> ImageGenResult<Vec<GeneratedImage>> {
        let start = Instant::now();

        // The inference endpoint yields one image per call.
        let mut images = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let url = self.generate_one(prompt).await?;
            images.push(GeneratedImage {
                id: ulid::Ulid::new().to_string(),
                prompt_id: owner.clone(),
                player_id: owner.clone(),
                image_url: url,
                thumbnail_url: None,
                provider: "huggingface".to_string(),
                provider_image_id: None,
                status: ImageStatus::Complete,
                generated_at: Utc::now(),
                metadata: ImageMetadata {
                    model: self.model.clone(),
                    revised_prompt: None,
                    generation_time_ms: start.elapsed().as_millis() as u64,
                },
            });
        }

        Ok(images)
    }

    fn name(&self) -> &'static str {
        "huggingface"
    }
}
