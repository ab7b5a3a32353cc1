//! Generation engine trait (port)

use async_trait::async_trait;

use crate::error::EngineError;

/// Opaque text generator: prompt in, completion out.
///
/// Implementations must report context/memory exhaustion as
/// [`EngineError::ResourceExhausted`] so the manager can compact and retry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationEngine: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, EngineError>;

    /// Drop transient working memory held after an attempt.
    /// Called once after every attempt, whatever its outcome.
    fn release_working_memory(&self) {}
}
