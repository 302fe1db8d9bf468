use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::{ConversionOutcome, ConversionRequest};

/// Error reported by a conversion hook (webhook, e-mail dispatch, ...).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HookError {
    message: String,
}

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type HookFuture = Pin<Box<dyn Future<Output = Result<(), HookError>> + Send>>;

type PreConvertHook = Arc<dyn Fn(ConversionRequest) -> HookFuture + Send + Sync>;
type PostConvertHook = Arc<dyn Fn(ConversionRequest, ConversionOutcome) -> HookFuture + Send + Sync>;
type ConversionFailedHook = Arc<dyn Fn(ConversionRequest, Vec<String>) -> HookFuture + Send + Sync>;

/// Side-effect callbacks wired in by the embedding service. Unset hooks are
/// no-ops.
#[derive(Clone, Default)]
pub struct ConversionHooks {
    pre_convert: Option<PreConvertHook>,
    post_convert: Option<PostConvertHook>,
    conversion_failed: Option<ConversionFailedHook>,
}

impl ConversionHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_pre_convert<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(ConversionRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        let hook: PreConvertHook =
            Arc::new(move |request: ConversionRequest| -> HookFuture { Box::pin(hook(request)) });
        self.pre_convert = Some(hook);
        self
    }

    pub fn on_post_convert<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(ConversionRequest, ConversionOutcome) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        let hook: PostConvertHook = Arc::new(
            move |request: ConversionRequest, outcome: ConversionOutcome| -> HookFuture {
                Box::pin(hook(request, outcome))
            },
        );
        self.post_convert = Some(hook);
        self
    }

    pub fn on_conversion_failed<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(ConversionRequest, Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        let hook: ConversionFailedHook = Arc::new(
            move |request: ConversionRequest, errors: Vec<String>| -> HookFuture {
                Box::pin(hook(request, errors))
            },
        );
        self.conversion_failed = Some(hook);
        self
    }

    pub(crate) async fn pre_convert(&self, request: &ConversionRequest) -> Result<(), HookError> {
        match &self.pre_convert {
            Some(hook) => hook(request.clone()).await,
            None => Ok(()),
        }
    }

    pub(crate) async fn post_convert(
        &self,
        request: &ConversionRequest,
        outcome: &ConversionOutcome,
    ) -> Result<(), HookError> {
        match &self.post_convert {
            Some(hook) => hook(request.clone(), outcome.clone()).await,
            None => Ok(()),
        }
    }

    pub(crate) async fn conversion_failed(
        &self,
        request: &ConversionRequest,
        errors: &[String],
    ) -> Result<(), HookError> {
        match &self.conversion_failed {
            Some(hook) => hook(request.clone(), errors.to_vec()).await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ConversionHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionHooks")
            .field("pre_convert", &self.pre_convert.is_some())
            .field("post_convert", &self.post_convert.is_some())
            .field("conversion_failed", &self.conversion_failed.is_some())
            .finish()
    }
}
