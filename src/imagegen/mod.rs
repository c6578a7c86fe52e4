//! Pluggable image generation backends.
//!
//! The core only sees [`ImageProvider`]; providers return finished
//! [`GeneratedImage`] records whose URLs are stored verbatim. The two error
//! kinds matter to the game loop: a content-policy verdict is final and
//! bounces back to the submitter, a transient failure may be retried on the
//! fallback provider.

mod huggingface;
mod mock;
mod openai;

pub use huggingface::HuggingFaceProvider;
pub use mock::MockProvider;
pub use openai::OpenAiProvider;

use crate::types::{GeneratedImage, PlayerId};
use async_trait::async_trait;
use std::time::Duration;

pub type ImageGenResult<T> = Result<T, ImageGenError>;

#[derive(Debug, thiserror::Error)]
pub enum ImageGenError {
    /// The prompt was rejected outright. Final: never retried on a
    /// fallback provider.
    #[error("content policy violation: {0}")]
    ContentPolicy(String),

    /// Timeouts, rate limits, transport errors.
    #[error("{0}")]
    Transient(String),
}

#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Generate up to `count` images for the prompt, owned by `owner`.
    /// Every returned image has status `Complete`.
    async fn generate(
        &self,
        prompt: &str,
        count: u32,
        owner: &PlayerId,
    ) -> ImageGenResult<Vec<GeneratedImage>>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Mock,
    HuggingFace,
    OpenAi,
}

impl ProviderKind {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "mock" => Some(ProviderKind::Mock),
            "huggingface" => Some(ProviderKind::HuggingFace),
            "openai" => Some(ProviderKind::OpenAi),
            _ => None,
        }
    }
}

/// Primary provider plus optional one-shot fallback.
pub struct ProviderChain {
    primary: Box<dyn ImageProvider>,
    fallback: Option<Box<dyn ImageProvider>>,
}

impl ProviderChain {
    pub fn new(primary: Box<dyn ImageProvider>, fallback: Option<Box<dyn ImageProvider>>) -> Self {
        Self { primary, fallback }
    }

    pub fn name(&self) -> &'static str {
        self.primary.name()
    }

    /// Try the primary; on a transient failure retry once on the fallback.
    /// A content-policy verdict from either provider is re-raised as-is.
    pub async fn generate(
        &self,
        prompt: &str,
        count: u32,
        owner: &PlayerId,
    ) -> ImageGenResult<Vec<GeneratedImage>> {
        match self.primary.generate(prompt, count, owner).await {
            Ok(images) => Ok(images),
            Err(ImageGenError::ContentPolicy(msg)) => Err(ImageGenError::ContentPolicy(msg)),
            Err(ImageGenError::Transient(msg)) => {
                let Some(fallback) = &self.fallback else {
                    return Err(ImageGenError::Transient(msg));
                };
                tracing::warn!(
                    "Provider {} failed ({}), retrying on {}",
                    self.primary.name(),
                    msg,
                    fallback.name()
                );
                fallback.generate(prompt, count, owner).await
            }
        }
    }
}

/// Configuration for image generation providers
#[derive(Debug, Clone)]
pub struct ImageGenConfig {
    pub provider: ProviderKind,
    pub enable_fallback: bool,
    pub fallback_provider: Option<ProviderKind>,
    pub openai_api_key: Option<String>,
    pub huggingface_api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for ImageGenConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Mock,
            enable_fallback: false,
            fallback_provider: None,
            openai_api_key: None,
            huggingface_api_key: None,
            timeout: Duration::from_secs(60),
        }
    }
}

impl ImageGenConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let provider = std::env::var("IMAGE_PROVIDER")
            .ok()
            .and_then(|v| ProviderKind::parse(&v))
            .unwrap_or(ProviderKind::Mock);

        let enable_fallback = std::env::var("ENABLE_FALLBACK")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let fallback_provider = std::env::var("FALLBACK_PROVIDER")
            .ok()
            .and_then(|v| ProviderKind::parse(&v));

        Self {
            provider,
            enable_fallback,
            fallback_provider,
            openai_api_key: non_empty_env("OPENAI_API_KEY"),
            huggingface_api_key: non_empty_env("HUGGINGFACE_API_KEY"),
            timeout: std::env::var("IMAGE_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(60)),
        }
    }

    /// Build the provider chain described by this config.
    pub fn build_chain(&self) -> ImageGenResult<ProviderChain> {
        let primary = self.build_provider(self.provider)?;
        let fallback = if self.enable_fallback {
            match self.fallback_provider {
                Some(kind) if kind != self.provider => Some(self.build_provider(kind)?),
                Some(_) => None,
                None => None,
            }
        } else {
            None
        };
        Ok(ProviderChain::new(primary, fallback))
    }

    fn build_provider(&self, kind: ProviderKind) -> ImageGenResult<Box<dyn ImageProvider>> {
        match kind {
            ProviderKind::Mock => Ok(Box::new(MockProvider::new())),
            ProviderKind::OpenAi => {
                let key = self.openai_api_key.clone().ok_or_else(|| {
                    ImageGenError::Transient("OPENAI_API_KEY not configured".to_string())
                })?;
                Ok(Box::new(OpenAiProvider::new(key, self.timeout)))
            }
            ProviderKind::HuggingFace => {
                let key = self.huggingface_api_key.clone().ok_or_else(|| {
                    ImageGenError::Transient("HUGGINGFACE_API_KEY not configured".to_string())
                })?;
                Ok(Box::new(HuggingFaceProvider::new(key, self.timeout)))
            }
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ImageMetadata, ImageStatus};
    use chrono::Utc;

    struct FailingProvider {
        error: fn() -> ImageGenError,
    }

    #[async_trait]
    impl ImageProvider for FailingProvider {
        async fn generate(
            &self,
            _prompt: &str,
            _count: u32,
            _owner: &PlayerId,
        ) -> ImageGenResult<Vec<GeneratedImage>> {
            Err((self.error)())
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    struct OkProvider;

    #[async_trait]
    impl ImageProvider for OkProvider {
        async fn generate(
            &self,
            _prompt: &str,
            count: u32,
            owner: &PlayerId,
        ) -> ImageGenResult<Vec<GeneratedImage>> {
            Ok((0..count)
                .map(|i| GeneratedImage {
                    id: format!("img-{i}"),
                    prompt_id: owner.clone(),
                    player_id: owner.clone(),
                    image_url: format!("https://example.test/{i}.png"),
                    thumbnail_url: None,
                    provider: "ok".to_string(),
                    provider_image_id: None,
                    status: ImageStatus::Complete,
                    generated_at: Utc::now(),
                    metadata: ImageMetadata {
                        model: "test".to_string(),
                        revised_prompt: None,
                        generation_time_ms: 0,
                    },
                })
                .collect())
        }

        fn name(&self) -> &'static str {
            "ok"
        }
    }

    #[tokio::test]
    async fn transient_failure_falls_through_to_fallback() {
        let chain = ProviderChain::new(
            Box::new(FailingProvider {
                error: || ImageGenError::Transient("rate limited".to_string()),
            }),
            Some(Box::new(OkProvider)),
        );

        let images = chain
            .generate("a blue cat", 4, &"p1".to_string())
            .await
            .unwrap();
        assert_eq!(images.len(), 4);
    }

    #[tokio::test]
    async fn content_policy_is_final() {
        let chain = ProviderChain::new(
            Box::new(FailingProvider {
                error: || ImageGenError::ContentPolicy("disallowed".to_string()),
            }),
            Some(Box::new(OkProvider)),
        );

        let result = chain.generate("something", 4, &"p1".to_string()).await;
        assert!(matches!(result, Err(ImageGenError::ContentPolicy(_))));
    }

    #[tokio::test]
    async fn no_fallback_propagates_transient() {
        let chain = ProviderChain::new(
            Box::new(FailingProvider {
                error: || ImageGenError::Transient("timeout".to_string()),
            }),
            None,
        );

        let result = chain.generate("something", 4, &"p1".to_string()).await;
        assert!(matches!(result, Err(ImageGenError::Transient(_))));
    }

    #[test]
    fn provider_kind_parsing() {
        assert_eq!(ProviderKind::parse("mock"), Some(ProviderKind::Mock));
        assert_eq!(ProviderKind::parse("OpenAI"), Some(ProviderKind::OpenAi));
        assert_eq!(
            ProviderKind::parse("huggingface"),
            Some(ProviderKind::HuggingFace)
        );
        assert_eq!(ProviderKind::parse("dall-e"), None);
    }
}
