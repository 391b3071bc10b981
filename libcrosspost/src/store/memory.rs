//! In-memory store
//!
//! Implements both collaborator traits over plain vectors. Failure switches
//! let integration tests exercise the orchestrator's error paths.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{CredentialSource, PostRepository};
use crate::error::{DbError, Result};
use crate::types::{DecodedCredential, NewPost, NewPostMedia, Post, PostMedia, PublishedPost};

#[derive(Default)]
struct Tables {
    credentials: Vec<DecodedCredential>,
    posts: Vec<Post>,
    media: Vec<PostMedia>,
    last_credential_id: i64,
    last_post_id: i64,
    last_media_id: i64,
}

fn media_row(media: &NewPostMedia, id: i64) -> PostMedia {
    PostMedia {
        id,
        post_id: media.post_id,
        platform: media.platform,
        channel_id: media.channel_id.clone(),
        remote_message_id: media.remote_message_id.clone(),
    }
}

pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_credentials: AtomicBool,
    fail_writes: AtomicBool,
    // Media inserts allowed before the next one fails; usize::MAX disables
    media_budget: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            tables: Mutex::default(),
            fail_credentials: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            media_budget: AtomicUsize::new(usize::MAX),
        }
    }
}

fn unavailable(what: &str) -> crate::CrosspostError {
    DbError::IoError(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("memory store {} unavailable", what),
    ))
    .into()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Poisoned locks are recovered
    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_credentials(credentials: Vec<DecodedCredential>) -> Self {
        let store = Self::new();
        for credential in credentials {
            store.put_credential(credential);
        }
        store
    }

    /// Insert or replace the credential for `(author_id, kind)`
    ///
    /// Every call assigns a fresh id, like an upsert into an
    /// autoincrement table.
    pub fn put_credential(&self, mut credential: DecodedCredential) {
        let mut tables = self.lock();
        tables
            .credentials
            .retain(|c| !(c.author_id == credential.author_id && c.kind == credential.kind));
        tables.last_credential_id += 1;
        credential.id = tables.last_credential_id;
        tables.credentials.push(credential);
    }

    /// Make credential lookups fail
    pub fn fail_credential_reads(&self, fail: bool) {
        self.fail_credentials.store(fail, Ordering::SeqCst);
    }

    /// Make post and media inserts fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Let `count` more media inserts succeed, then fail the rest
    pub fn fail_media_after(&self, count: usize) {
        self.media_budget.store(count, Ordering::SeqCst);
    }

    fn take_media_slot(&self) -> Result<()> {
        let granted = self
            .media_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                usize::MAX => Some(usize::MAX),
                0 => None,
                n => Some(n - 1),
            })
            .is_ok();

        if granted && !self.fail_writes.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(unavailable("post media"))
        }
    }

    pub fn post_count(&self) -> usize {
        self.lock().posts.len()
    }

    pub fn media_count(&self) -> usize {
        self.lock().media.len()
    }

    pub fn all_media(&self) -> Vec<PostMedia> {
        self.lock().media.clone()
    }
}

#[async_trait]
impl CredentialSource for MemoryStore {
    async fn decoded_credentials_by_user_id(&self, user_id: i64) -> Result<Vec<DecodedCredential>> {
        if self.fail_credentials.load(Ordering::SeqCst) {
            return Err(unavailable("credentials"));
        }

        Ok(self
            .lock()
            .credentials
            .iter()
            .filter(|c| c.author_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PostRepository for MemoryStore {
    async fn add_post(&self, post: &NewPost) -> Result<Post> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(unavailable("posts"));
        }

        let mut tables = self.lock();
        tables.last_post_id += 1;
        let created = Post {
            id: tables.last_post_id,
            author_id: post.author_id,
            date_posted: post.date_posted,
        };
        tables.posts.push(created.clone());
        Ok(created)
    }

    async fn posts_by_author_id(&self, author_id: i64) -> Result<Vec<Post>> {
        let mut posts: Vec<Post> = self
            .lock()
            .posts
            .iter()
            .filter(|p| p.author_id == author_id)
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.date_posted.cmp(&a.date_posted).then(b.id.cmp(&a.id)));
        Ok(posts)
    }

    async fn add_post_media(&self, media: &NewPostMedia) -> Result<PostMedia> {
        self.take_media_slot()?;

        let mut tables = self.lock();
        if !tables.posts.iter().any(|p| p.id == media.post_id) {
            return Err(DbError::InvalidValue(format!("post {} does not exist", media.post_id)).into());
        }

        tables.last_media_id += 1;
        let created = media_row(media, tables.last_media_id);
        tables.media.push(created.clone());
        Ok(created)
    }

    async fn media_for_post(&self, post_id: i64) -> Result<Vec<PostMedia>> {
        Ok(self
            .lock()
            .media
            .iter()
            .filter(|m| m.post_id == post_id)
            .cloned()
            .collect())
    }

    async fn record_post(
        &self,
        post: &NewPost,
        published: &[PublishedPost],
    ) -> Result<(Post, Vec<PostMedia>)> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(unavailable("posts"));
        }

        let mut tables = self.lock();

        // Stage against the current counters and publish only when every row is ready
        let created = Post {
            id: tables.last_post_id + 1,
            author_id: post.author_id,
            date_posted: post.date_posted,
        };
        let mut media = Vec::with_capacity(published.len());
        for (offset, item) in published.iter().enumerate() {
            self.take_media_slot()?;
            let row = NewPostMedia::from_published(created.id, item);
            media.push(media_row(&row, tables.last_media_id + 1 + offset as i64));
        }

        tables.last_post_id = created.id;
        tables.last_media_id += media.len() as i64;
        tables.posts.push(created.clone());
        tables.media.extend(media.iter().cloned());
        Ok((created, media))
    }
}
