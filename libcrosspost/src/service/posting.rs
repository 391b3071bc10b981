//! Posting service for multi-platform content posting
//!
//! Providers are called one after another in
//! [`SocialPlatform::PRIORITY`](crate::types::SocialPlatform::PRIORITY) order.
//! The first failure stops the run and its message becomes the result. Posts
//! already published on earlier platforms are not rolled back.
//!
//! Only a fully successful run is recorded: one [`Post`](crate::types::Post)
//! row, then one media row per platform pointing at it.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::events::{Event, EventBus};
use super::validation::validate_post_request;
use crate::config::Config;
use crate::error::{CrosspostError, PlatformError, Result};
use crate::factory::ClientSource;
use crate::outcome::Outcome;
use crate::platforms::{cancellable, ProviderClient, ProviderResult};
use crate::store::{CredentialSource, PostRepository};
use crate::types::{EngagementStats, NewPost, PostWithMedia, PublishedPost, SocialPlatform};

pub const NO_CREDENTIALS: &str = "No credentials found";
pub const NO_POSTERS: &str = "No social media posters found";
pub const POSTED: &str = "Messages posted successfully";

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "provider panicked".to_string()
    }
}

/// Why an operation stopped: the caller-facing message and its exit code
#[derive(Debug)]
struct Failure {
    message: String,
    code: i32,
}

impl Failure {
    fn general(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: 1,
        }
    }

    fn into_outcome<T>(self) -> Outcome<T> {
        Outcome::fail(self.message).with_code(self.code)
    }

    fn into_outcome_with<T>(self, payload: T) -> Outcome<T> {
        Outcome::fail_with(self.message, payload).with_code(self.code)
    }
}

impl From<CrosspostError> for Failure {
    fn from(e: CrosspostError) -> Self {
        Self {
            message: e.user_message(),
            code: e.exit_code(),
        }
    }
}

impl From<PlatformError> for Failure {
    fn from(e: PlatformError) -> Self {
        CrosspostError::Platform(e).into()
    }
}

#[derive(Clone)]
pub struct PostingService {
    credentials: Arc<dyn CredentialSource>,
    posts: Arc<dyn PostRepository>,
    clients: Arc<dyn ClientSource>,
    config: Arc<Config>,
    events: EventBus,
}

impl PostingService {
    pub fn new(
        credentials: Arc<dyn CredentialSource>,
        posts: Arc<dyn PostRepository>,
        clients: Arc<dyn ClientSource>,
        config: Arc<Config>,
        events: EventBus,
    ) -> Self {
        Self {
            credentials,
            posts,
            clients,
            config,
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Provider clients for `user_id`, or the failure explaining why there
    /// are none
    ///
    /// An empty credential set is not an error here: it satisfies no
    /// platform, so it ends in [`NO_POSTERS`] like any incomplete set.
    async fn clients_for(&self, user_id: i64) -> std::result::Result<Vec<Box<dyn ProviderClient>>, Failure> {
        let credentials = self
            .credentials
            .decoded_credentials_by_user_id(user_id)
            .await
            .map_err(|e| {
                warn!("Could not load credentials for user {}: {}", user_id, e);
                Failure::general(NO_CREDENTIALS)
            })?;

        let clients = self.clients.build_clients(user_id, &credentials);
        if clients.is_empty() {
            debug!(
                "User {} has {} credential(s) but no complete platform set",
                user_id,
                credentials.len()
            );
            return Err(Failure::general(NO_POSTERS));
        }
        Ok(clients)
    }

    /// Run one provider operation under the caller's cancellation, the
    /// configured deadline and a panic guard
    ///
    async fn guarded<T, F>(
        &self,
        client: &dyn ProviderClient,
        cancel: &CancellationToken,
        operation: F,
    ) -> std::result::Result<T, Failure>
    where
        F: Future<Output = ProviderResult<T>>,
    {
        let deadline = self.config.posting.provider_timeout();
        let guarded = AssertUnwindSafe(cancellable(cancel, operation)).catch_unwind();

        match tokio::time::timeout(deadline, guarded).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(e))) => Err(e.into()),
            Ok(Err(panic)) => {
                let message = panic_message(panic);
                error!("{} provider panicked: {}", client.name(), message);
                Err(Failure::general(message))
            }
            Err(_) => Err(PlatformError::Timeout(format!(
                "{} did not respond within {}s",
                client.name(),
                deadline.as_secs()
            ))
            .into()),
        }
    }

    fn fail_posting(&self, user_id: i64, failure: Failure) -> Outcome<bool> {
        self.events.emit(Event::PostingFailed {
            user_id,
            error: failure.message.clone(),
        });
        failure.into_outcome_with(false)
    }

    /// Publish `text` and `files` to every platform the user has configured
    ///
    /// Never returns an error; the outcome's message says what happened.
    pub async fn create_post(
        &self,
        user_id: i64,
        text: &str,
        files: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Outcome<bool> {
        if let Err(e) = validate_post_request(text, files) {
            return self.fail_posting(user_id, e.into());
        }

        let clients = match self.clients_for(user_id).await {
            Ok(clients) => clients,
            Err(failure) => return self.fail_posting(user_id, failure),
        };

        let platforms: Vec<String> = clients.iter().map(|c| c.name().to_string()).collect();
        info!("Posting for user {} to {}", user_id, platforms.join(", "));
        self.events.emit(Event::PostingStarted {
            user_id,
            platforms,
        });

        let mut published: Vec<PublishedPost> = Vec::with_capacity(clients.len());
        for client in &clients {
            let result = self
                .guarded(client.as_ref(), cancel, client.create_post(text, files, cancel))
                .await;

            match result {
                Ok(post) => {
                    info!(
                        "Posted to {} (channel {}, id {})",
                        client.name(),
                        post.channel_id,
                        post.remote_id
                    );
                    self.events.emit(Event::ProviderSucceeded {
                        user_id,
                        platform: client.name().to_string(),
                        channel_id: post.channel_id.clone(),
                        remote_id: post.remote_id.clone(),
                    });
                    published.push(post);
                }
                Err(failure) => {
                    warn!("Posting to {} failed: {}", client.name(), failure.message);
                    if !published.is_empty() {
                        warn!(
                            "{} platform(s) already published this post and keep it",
                            published.len()
                        );
                    }
                    self.events.emit(Event::ProviderFailed {
                        user_id,
                        platform: client.name().to_string(),
                        error: failure.message.clone(),
                    });
                    return self.fail_posting(user_id, failure);
                }
            }
        }

        match self.record(user_id, &published).await {
            Ok(post_id) => {
                self.events.emit(Event::PostingCompleted { user_id, post_id });
                Outcome::ok(POSTED, true)
            }
            Err(e) => {
                error!("Posted remotely but failed to record post: {}", e);
                self.fail_posting(user_id, Failure::general(format!("Failed to record post: {}", e)))
            }
        }
    }

    /// Store one post and a media row per published platform post, all or
    /// nothing
    async fn record(&self, user_id: i64, published: &[PublishedPost]) -> Result<i64> {
        let (post, media) = self
            .posts
            .record_post(&NewPost::now(user_id), published)
            .await?;
        debug!("Recorded post {} with {} media row(s)", post.id, media.len());
        Ok(post.id)
    }

    async fn client_for(
        &self,
        user_id: i64,
        platform: SocialPlatform,
    ) -> std::result::Result<Box<dyn ProviderClient>, Failure> {
        self.clients_for(user_id)
            .await?
            .into_iter()
            .find(|c| c.platform() == platform)
            .ok_or_else(|| Failure::general(format!("No {} poster configured", platform)))
    }

    /// Engagement counters for a post previously published on `platform`
    ///
    /// On failure the payload is [`EngagementStats::unavailable`].
    pub async fn engagement_stats(
        &self,
        user_id: i64,
        platform: SocialPlatform,
        post_id: &str,
        cancel: &CancellationToken,
    ) -> Outcome<EngagementStats> {
        let client = match self.client_for(user_id, platform).await {
            Ok(client) => client,
            Err(failure) => return failure.into_outcome_with(EngagementStats::unavailable()),
        };

        match self
            .guarded(client.as_ref(), cancel, client.engagement_stats(post_id, cancel))
            .await
        {
            Ok(stats) => Outcome::ok("Statistics retrieved", stats),
            Err(failure) => {
                warn!("Stats lookup on {} failed: {}", platform, failure.message);
                failure.into_outcome_with(EngagementStats::unavailable())
            }
        }
    }

    /// Public URL of a post previously published on `platform`
    pub async fn post_link(
        &self,
        user_id: i64,
        platform: SocialPlatform,
        post_id: &str,
        cancel: &CancellationToken,
    ) -> Outcome<String> {
        let client = match self.client_for(user_id, platform).await {
            Ok(client) => client,
            Err(failure) => return failure.into_outcome(),
        };

        match self
            .guarded(client.as_ref(), cancel, client.post_link(post_id, cancel))
            .await
        {
            Ok(link) => Outcome::ok("Link retrieved", link),
            Err(failure) => failure.into_outcome(),
        }
    }

    /// Posts recorded for `user_id`, newest first, with their media rows
    pub async fn history(&self, user_id: i64, limit: usize) -> Result<Vec<PostWithMedia>> {
        let posts = self.posts.posts_by_author_id(user_id).await?;

        let mut history = Vec::new();
        for post in posts.into_iter().take(limit) {
            let media = self.posts.media_for_post(post.id).await?;
            history.push(PostWithMedia { post, media });
        }
        Ok(history)
    }
}
