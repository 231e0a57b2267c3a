//! Fetch → invoke → sanitize → parse.

use std::sync::Arc;

use tracing::{info, warn, Instrument};

use crate::media::analysis::ModelClientHandle;
use crate::media::fetch::{FetchError, ImageFetcher};
use crate::moderation::error::PipelineError;
use crate::moderation::instructions::{InstructionTemplate, MODERATION_INSTRUCTIONS};
use crate::moderation::sanitize::sanitize;
use crate::moderation::verdict::{parse_verdict, ModerationVerdict};

/// A single moderation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationRequest {
    image_reference: String,
}

impl ModerationRequest {
    pub fn new(image_reference: impl Into<String>) -> Self {
        Self {
            image_reference: image_reference.into(),
        }
    }

    pub fn image_reference(&self) -> &str {
        &self.image_reference
    }
}

/// The request-processing pipeline shared by every adapter.
///
/// Cheap to clone; the fetcher and model handle are shared.
#[derive(Clone)]
pub struct ModerationPipeline {
    fetcher: Arc<dyn ImageFetcher>,
    model: ModelClientHandle,
    instructions: Arc<str>,
}

impl ModerationPipeline {
    pub fn new(fetcher: Arc<dyn ImageFetcher>, model: ModelClientHandle) -> Self {
        Self {
            fetcher,
            model,
            instructions: MODERATION_INSTRUCTIONS.render().into(),
        }
    }

    pub fn with_instructions(mut self, template: &InstructionTemplate) -> Self {
        self.instructions = template.render().into();
        self
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn model_ready(&self) -> bool {
        self.model.is_ready()
    }

    /// Run one request to completion. Short-circuits on the first failure;
    /// nothing is retried.
    pub async fn process(
        &self,
        request: &ModerationRequest,
    ) -> Result<ModerationVerdict, PipelineError> {
        let reference = request.image_reference().trim();
        if reference.is_empty() {
            return Err(PipelineError::InvalidRequest(
                "image reference must not be empty".to_string(),
            ));
        }

        let span = tracing::info_span!("moderation", reference = %reference);
        async move {
            let result = self.run(reference).await;
            match &result {
                Ok(verdict) => info!(
                    category = %verdict.category,
                    flagged = verdict.is_flagged(),
                    "moderation complete"
                ),
                Err(e) => warn!(kind = e.kind(), error = %e, "moderation failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run(&self, reference: &str) -> Result<ModerationVerdict, PipelineError> {
        // Fail fast before downloading anything.
        let model = self.model.model()?;

        let asset = self.fetcher.fetch(reference).await?;
        if asset.is_empty() {
            return Err(FetchError::Empty.into());
        }

        let raw = model.invoke(&asset, &self.instructions).await?;
        drop(asset);

        let text = sanitize(&raw);
        if text.is_empty() {
            return Err(PipelineError::ModelOutputEmpty);
        }

        parse_verdict(&text).map_err(|e| PipelineError::ModelOutputNotJson {
            message: e.to_string(),
            raw: text,
        })
    }
}

impl std::fmt::Debug for ModerationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModerationPipeline")
            .field("model", &self.model)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::analysis::{ModelError, ModerationModel};
    use crate::media::fetch::ImageAsset;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const GOOD_REPLY: &str = "```json\n{\"details\":\"d\",\"category\":\"c\",\"isViolence\":false,\"isPornographic\":false,\"isProfanity\":false,\"isLikelyAI_Score\":0.5,\"isLikelyAI_Explanation\":\"e\"}\n```";

    struct StubFetcher(Result<ImageAsset, FetchError>);

    #[async_trait]
    impl ImageFetcher for StubFetcher {
        async fn fetch(&self, _reference: &str) -> Result<ImageAsset, FetchError> {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct StubModel {
        reply: Option<Result<String, ModelError>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ModerationModel for StubModel {
        async fn invoke(&self, _asset: &ImageAsset, _instructions: &str) -> Result<String, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone().unwrap_or_else(|| Ok(String::new()))
        }

        fn model_name(&self) -> &str {
            "stub"
        }
    }

    fn pipeline(fetch: Result<ImageAsset, FetchError>, model: Arc<StubModel>) -> ModerationPipeline {
        ModerationPipeline::new(
            Arc::new(StubFetcher(fetch)),
            ModelClientHandle::ready(model),
        )
    }

    fn image() -> Result<ImageAsset, FetchError> {
        Ok(ImageAsset::new(vec![1u8, 2, 3], "image/jpeg"))
    }

    fn model(reply: Result<String, ModelError>) -> Arc<StubModel> {
        Arc::new(StubModel {
            reply: Some(reply),
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_happy_path() {
        let m = model(Ok(GOOD_REPLY.to_string()));
        let verdict = pipeline(image(), m.clone())
            .process(&ModerationRequest::new("https://good/img.jpg"))
            .await
            .unwrap();
        assert_eq!(verdict.details, "d");
        assert_eq!(verdict.is_likely_ai_score, 0.5);
        assert_eq!(m.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_reference_is_invalid_request() {
        let m = model(Ok(GOOD_REPLY.to_string()));
        let err = pipeline(image(), m.clone())
            .process(&ModerationRequest::new("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRequest(_)));
        assert_eq!(m.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_payload_never_reaches_model() {
        let m = model(Ok(GOOD_REPLY.to_string()));
        let err = pipeline(Err(FetchError::Empty), m.clone())
            .process(&ModerationRequest::new("https://good/empty.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::FetchFailed(_)));
        assert_eq!(m.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_asset_from_any_fetcher_is_rejected() {
        let m = model(Ok(GOOD_REPLY.to_string()));
        let err = pipeline(Ok(ImageAsset::new(Vec::<u8>::new(), "image/jpeg")), m.clone())
            .process(&ModerationRequest::new("https://good/empty.jpg"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PipelineError::FetchFailed("image data is empty".to_string())
        );
        assert_eq!(m.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unavailable_model_fails_fast() {
        let p = ModerationPipeline::new(
            Arc::new(StubFetcher(image())),
            ModelClientHandle::unavailable("API key is not configured"),
        );
        assert!(!p.model_ready());
        let err = p
            .process(&ModerationRequest::new("https://good/img.jpg"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PipelineError::ModelUnavailable("API key is not configured".to_string())
        );
    }

    #[tokio::test]
    async fn test_blocked_is_distinct_from_empty() {
        let blocked = pipeline(image(), model(Err(ModelError::Blocked("SAFETY".to_string()))))
            .process(&ModerationRequest::new("x.jpg"))
            .await
            .unwrap_err();
        assert_eq!(blocked, PipelineError::ModelBlocked("SAFETY".to_string()));

        let empty = pipeline(image(), model(Ok("``` ```".to_string())))
            .process(&ModerationRequest::new("x.jpg"))
            .await
            .unwrap_err();
        assert_eq!(empty, PipelineError::ModelOutputEmpty);
    }

    #[tokio::test]
    async fn test_not_json_carries_text() {
        let err = pipeline(image(), model(Ok("`I cannot help with that.`".to_string())))
            .process(&ModerationRequest::new("x.jpg"))
            .await
            .unwrap_err();
        match err {
            PipelineError::ModelOutputNotJson { raw, .. } => {
                assert_eq!(raw, "I cannot help with that.");
            }
            other => panic!("expected ModelOutputNotJson, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_backend_failure_is_request_failed() {
        let err = pipeline(
            image(),
            model(Err(ModelError::ApiResponse {
                status: 503,
                body: "overloaded".to_string(),
            })),
        )
        .process(&ModerationRequest::new("x.jpg"))
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::ModelRequestFailed(ref m) if m.contains("overloaded")));
    }

    #[test]
    fn test_default_instructions() {
        let p = pipeline(image(), Arc::new(StubModel::default()));
        assert_eq!(p.instructions(), MODERATION_INSTRUCTIONS.render());
    }
}
