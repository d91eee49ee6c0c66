//! Scene generator seam
//!
//! A generator turns a natural-language prompt into scene markup (see
//! [`SceneDocument`](scenelink_sandbox::SceneDocument)). The session only
//! forwards the markup; parsing happens inside the sandbox, so a bad document
//! fails the `loadScene` command rather than the generator call.

use crate::error::GeneratorError;

/// Prompt -> scene markup
#[async_trait::async_trait]
pub trait SceneGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GeneratorError>;
}
