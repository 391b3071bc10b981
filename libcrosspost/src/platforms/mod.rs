//! Provider clients
//!
//! Each supported platform implements [`ProviderClient`]. Clients are built
//! fresh for every orchestration call by [`crate::factory::ProviderFactory`]
//! from the user's decoded credentials, and own their HTTP/session handles.
//!
//! Every network-bound method takes a [`CancellationToken`]; implementations
//! wrap their awaits with [`cancellable`] so a caller-side cancel aborts
//! in-flight requests.

use std::future::Future;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::PlatformError;
use crate::types::{EngagementStats, PublishedPost, SocialPlatform};

pub mod instagram;
pub mod telegram;

// Available outside tests so integration tests can build orchestrators
pub mod mock;

/// Result type used inside provider implementations
pub type ProviderResult<T> = std::result::Result<T, PlatformError>;

/// Unified interface to one platform's posting protocol
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn platform(&self) -> SocialPlatform;

    /// Lowercase platform identifier used in logs and events
    fn name(&self) -> &str {
        self.platform().as_str()
    }

    /// Publish `text` with the media at `files`
    ///
    /// Returns the channel/page and remote id identifying the new post.
    /// Empty-file-list handling is platform specific.
    ///
    /// # Errors
    ///
    /// Stage failures are returned as-is; nothing is retried.
    async fn create_post(
        &self,
        text: &str,
        files: &[PathBuf],
        cancel: &CancellationToken,
    ) -> ProviderResult<PublishedPost>;

    /// Current engagement counters for a previously created post
    async fn engagement_stats(
        &self,
        post_id: &str,
        cancel: &CancellationToken,
    ) -> ProviderResult<EngagementStats>;

    /// Public URL of a previously created post
    async fn post_link(&self, post_id: &str, cancel: &CancellationToken) -> ProviderResult<String>;
}

/// Run `fut` unless `cancel` fires first
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> ProviderResult<T>
where
    F: Future<Output = ProviderResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PlatformError::Cancelled),
        result = fut => result,
    }
}
