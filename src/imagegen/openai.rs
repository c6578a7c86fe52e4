use super::{ImageGenError, ImageGenResult, ImageProvider};
use crate::types::{GeneratedImage, ImageMetadata, ImageStatus, PlayerId};
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{CreateImageRequestArgs, Image, ImageModel, ImageResponseFormat, ImageSize},
    Client,
};
use async_trait::async_trait;
use chrono::Utc;
use std::time::{Duration, Instant};

const MODEL: ImageModel = ImageModel::DallE2;

/// OpenAI image provider
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    timeout: Duration,
}

impl OpenAiProvider {
    pub fn new(api_key: String, timeout: Duration) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        Self {
            client: Client::with_config(config),
            timeout,
        }
    }
}

fn map_error(err: OpenAIError) -> ImageGenError {
    match err {
        OpenAIError::ApiError(api) => {
            let code = api.code.as_deref().unwrap_or("");
            if code == "content_policy_violation" || api.message.contains("content policy") {
                ImageGenError::ContentPolicy(api.message)
            } else {
                ImageGenError::Transient(api.message)
            }
        }
        other => ImageGenError::Transient(other.to_string()),
    }
}

#[async_trait]
impl ImageProvider for OpenAiProvider {
    async fn generate(
        &self,
        prompt: &str,
        count: u32,
        owner: &PlayerId,
    ) -> ImageGenResult<Vec<GeneratedImage>> {
        let start = Instant::now();

        let request = CreateImageRequestArgs::default()
            .prompt(prompt)
            .model(MODEL)
            .n(count.min(10) as u8)
            .size(ImageSize::S512x512)
            .response_format(ImageResponseFormat::Url)
            .build()
            .map_err(map_error)?;

        let response = tokio::time::timeout(self.timeout, self.client.images().create(request))
            .await
            .map_err(|_| {
                ImageGenError::Transient(format!("request timed out after {:?}", self.timeout))
            })?
            .map_err(map_error)?;

        let generation_time_ms = start.elapsed().as_millis() as u64;

        let images = response
            .data
            .iter()
            .filter_map(|image| match image.as_ref() {
                Image::Url {
                    url,
                    revised_prompt,
                } => Some(GeneratedImage {
                    id: ulid::Ulid::new().to_string(),
                    prompt_id: owner.clone(),
                    player_id: owner.clone(),
                    image_url: url.clone(),
                    thumbnail_url: None,
                    provider: "openai".to_string(),
                    provider_image_id: None,
                    status: ImageStatus::Complete,
                    generated_at: Utc::now(),
                    metadata: ImageMetadata {
                        model: "dall-e-2".to_string(),
                        revised_prompt: revised_prompt.clone(),
                        generation_time_ms,
                    },
                }),
                _ => None,
            })
            .collect::<Vec<_>>();

        if images.is_empty() {
            return Err(ImageGenError::Transient(
                "no image URLs in response".to_string(),
            ));
        }

        Ok(images)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
