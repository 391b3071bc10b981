//! Persistence collaborators consumed by the posting service
//!
//! Two implementations ship with the crate: [`crate::db::Database`]
//! (SQLite) and [`memory::MemoryStore`] (tests and embedding).

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{DecodedCredential, NewPost, NewPostMedia, Post, PostMedia, PublishedPost};

pub mod memory;

/// Source of decoded credentials for a user
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// All decoded credentials stored for `user_id` (possibly empty)
    async fn decoded_credentials_by_user_id(&self, user_id: i64) -> Result<Vec<DecodedCredential>>;
}

/// Storage for posts and their per-platform media rows
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Insert a post and return it with its assigned id
    async fn add_post(&self, post: &NewPost) -> Result<Post>;

    /// Posts by `author_id`, newest first
    async fn posts_by_author_id(&self, author_id: i64) -> Result<Vec<Post>>;

    async fn add_post_media(&self, media: &NewPostMedia) -> Result<PostMedia>;

    async fn media_for_post(&self, post_id: i64) -> Result<Vec<PostMedia>>;

    /// Insert a post and one media row per published item as a single unit
    ///
    /// Either everything is stored or nothing is.
    async fn record_post(
        &self,
        post: &NewPost,
        published: &[PublishedPost],
    ) -> Result<(Post, Vec<PostMedia>)>;
}
