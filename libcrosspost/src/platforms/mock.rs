//! Mock provider for testing
//!
//! A configurable [`ProviderClient`] that can succeed, fail, stall or panic.
//! Integration tests use it to drive the posting orchestrator without
//! credentials or network access.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::error::PlatformError;
use crate::platforms::{cancellable, ProviderClient, ProviderResult};
use crate::types::{EngagementStats, PublishedPost, SocialPlatform};

/// What the mock does when asked to post
#[derive(Debug, Clone)]
pub enum MockBehavior {
    Succeed,
    Fail(PlatformError),
    Panic(String),
}

/// Shared record of calls, readable after the mock has been boxed
#[derive(Debug, Default)]
pub struct MockLedger {
    posts: Mutex<Vec<MockCall>>,
    stats_calls: Mutex<usize>,
    link_calls: Mutex<usize>,
}

/// One `create_post` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub text: String,
    pub files: Vec<PathBuf>,
}

impl MockLedger {
    pub fn post_calls(&self) -> Vec<MockCall> {
        self.posts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn post_call_count(&self) -> usize {
        self.posts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn stats_call_count(&self) -> usize {
        *self.stats_calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn link_call_count(&self) -> usize {
        *self.link_calls.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct MockProvider {
    platform: SocialPlatform,
    behavior: MockBehavior,
    delay: Duration,
    channel_id: String,
    stats: EngagementStats,
    ledger: Arc<MockLedger>,
}

impl MockProvider {
    pub fn new(platform: SocialPlatform, behavior: MockBehavior) -> Self {
        Self {
            platform,
            behavior,
            delay: Duration::ZERO,
            channel_id: format!("{}-channel", platform),
            stats: EngagementStats {
                views: 10,
                reactions: 2,
                comments: 1,
                forwards: 0,
            },
            ledger: Arc::new(MockLedger::default()),
        }
    }

    /// Mock that always posts successfully
    pub fn success(platform: SocialPlatform) -> Self {
        Self::new(platform, MockBehavior::Succeed)
    }

    /// Mock whose posts fail with `error`
    pub fn failure(platform: SocialPlatform, error: PlatformError) -> Self {
        Self::new(platform, MockBehavior::Fail(error))
    }

    /// Mock that panics inside `create_post`
    pub fn panicking(platform: SocialPlatform, message: &str) -> Self {
        Self::new(platform, MockBehavior::Panic(message.to_string()))
    }

    /// Simulated network latency, applied before every operation
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_stats(mut self, stats: EngagementStats) -> Self {
        self.stats = stats;
        self
    }

    /// Handle to the call record; clone it before boxing the mock
    pub fn ledger(&self) -> Arc<MockLedger> {
        Arc::clone(&self.ledger)
    }

    async fn simulate_latency(&self, cancel: &CancellationToken) -> ProviderResult<()> {
        if self.delay.is_zero() {
            return Ok(());
        }
        cancellable(cancel, async {
            sleep(self.delay).await;
            Ok(())
        })
        .await
    }

    fn check_behavior(&self) -> ProviderResult<()> {
        match &self.behavior {
            MockBehavior::Succeed => Ok(()),
            MockBehavior::Fail(error) => Err(error.clone()),
            MockBehavior::Panic(message) => panic!("{}", message),
        }
    }
}

#[async_trait]
impl ProviderClient for MockProvider {
    fn platform(&self) -> SocialPlatform {
        self.platform
    }

    async fn create_post(
        &self,
        text: &str,
        files: &[PathBuf],
        cancel: &CancellationToken,
    ) -> ProviderResult<PublishedPost> {
        self.ledger
            .posts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(MockCall {
                text: text.to_string(),
                files: files.to_vec(),
            });

        self.simulate_latency(cancel).await?;
        self.check_behavior()?;

        Ok(PublishedPost {
            channel_id: self.channel_id.clone(),
            remote_id: format!("mock-{}", uuid::Uuid::new_v4()),
            platform: self.platform,
        })
    }

    async fn engagement_stats(
        &self,
        post_id: &str,
        cancel: &CancellationToken,
    ) -> ProviderResult<EngagementStats> {
        *self.ledger.stats_calls.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        self.simulate_latency(cancel).await?;
        self.check_behavior()?;

        if post_id.is_empty() {
            return Err(PlatformError::NotFound("empty post id".to_string()));
        }
        Ok(self.stats)
    }

    async fn post_link(&self, post_id: &str, cancel: &CancellationToken) -> ProviderResult<String> {
        *self.ledger.link_calls.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        self.simulate_latency(cancel).await?;
        self.check_behavior()?;

        Ok(format!("https://mock.invalid/{}/{}", self.platform, post_id))
    }
}
