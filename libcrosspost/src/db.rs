//! SQLite storage for credentials, posts and post media

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqliteRow};
use sqlx::{Executor, Row, Sqlite};

use crate::error::{DbError, Result};
use crate::store::{CredentialSource, PostRepository};
use crate::types::{
    CredentialKind, DecodedCredential, NewPost, NewPostMedia, Post, PostMedia, PublishedPost,
    SocialPlatform,
};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database at `db_path` and apply migrations
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // Forward slashes keep the URL valid on Windows too
        let db_url = format!("sqlite://{}", expanded_path.replace('\\', "/"));
        let options = SqliteConnectOptions::from_str(&db_url)
            .map_err(DbError::SqlxError)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    /// Insert or replace the credential of `kind` for `author_id`
    pub async fn upsert_credential(
        &self,
        author_id: i64,
        kind: CredentialKind,
        value: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO credentials (author_id, kind, value)
            VALUES (?, ?, ?)
            ON CONFLICT (author_id, kind) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(author_id)
        .bind(kind.as_str())
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Remove a credential; returns whether a row was deleted
    pub async fn delete_credential(&self, author_id: i64, kind: CredentialKind) -> Result<bool> {
        let result = sqlx::query("DELETE FROM credentials WHERE author_id = ? AND kind = ?")
            .bind(author_id)
            .bind(kind.as_str())
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }
}

fn credential_from_row(r: &SqliteRow) -> Result<DecodedCredential> {
    let kind: String = r.get("kind");
    Ok(DecodedCredential {
        id: r.get("id"),
        author_id: r.get("author_id"),
        kind: kind.parse()?,
        value: r.get("value"),
    })
}

fn media_from_row(r: &SqliteRow) -> Result<PostMedia> {
    let platform: String = r.get("platform");
    Ok(PostMedia {
        id: r.get("id"),
        post_id: r.get("post_id"),
        platform: SocialPlatform::from_str(&platform).map_err(DbError::InvalidValue)?,
        channel_id: r.get("channel_id"),
        remote_message_id: r.get("remote_message_id"),
    })
}

#[async_trait]
impl CredentialSource for Database {
    async fn decoded_credentials_by_user_id(&self, user_id: i64) -> Result<Vec<DecodedCredential>> {
        let rows = sqlx::query(
            r#"
            SELECT id, author_id, kind, value
            FROM credentials
            WHERE author_id = ?
            ORDER BY id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        let mut credentials = Vec::with_capacity(rows.len());
        for row in &rows {
            match credential_from_row(row) {
                Ok(credential) => credentials.push(credential),
                // A row written by a newer version should not block posting
                Err(e) => tracing::warn!("Skipping unreadable credential row: {}", e),
            }
        }

        Ok(credentials)
    }
}

#[async_trait]
impl PostRepository for Database {
    async fn add_post(&self, post: &NewPost) -> Result<Post> {
        insert_post(&self.pool, post).await
    }

    async fn posts_by_author_id(&self, author_id: i64) -> Result<Vec<Post>> {
        let rows = sqlx::query(
            r#"
            SELECT id, author_id, date_posted
            FROM posts
            WHERE author_id = ?
            ORDER BY date_posted DESC, id DESC
            "#,
        )
        .bind(author_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows
            .iter()
            .map(|r| Post {
                id: r.get("id"),
                author_id: r.get("author_id"),
                date_posted: r.get("date_posted"),
            })
            .collect())
    }

    async fn add_post_media(&self, media: &NewPostMedia) -> Result<PostMedia> {
        insert_post_media(&self.pool, media).await
    }

    async fn media_for_post(&self, post_id: i64) -> Result<Vec<PostMedia>> {
        let rows = sqlx::query(
            r#"
            SELECT id, post_id, platform, channel_id, remote_message_id
            FROM post_media
            WHERE post_id = ?
            ORDER BY id
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(media_from_row).collect()
    }

    async fn record_post(
        &self,
        post: &NewPost,
        published: &[PublishedPost],
    ) -> Result<(Post, Vec<PostMedia>)> {
        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;

        let created = insert_post(&mut *tx, post).await?;
        let mut media = Vec::with_capacity(published.len());
        for item in published {
            let row = NewPostMedia::from_published(created.id, item);
            media.push(insert_post_media(&mut *tx, &row).await?);
        }

        // Dropping `tx` on an early return rolls everything back
        tx.commit().await.map_err(DbError::SqlxError)?;
        Ok((created, media))
    }
}

async fn insert_post<'e, E>(executor: E, post: &NewPost) -> Result<Post>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("INSERT INTO posts (author_id, date_posted) VALUES (?, ?)")
        .bind(post.author_id)
        .bind(post.date_posted)
        .execute(executor)
        .await
        .map_err(DbError::SqlxError)?;

    Ok(Post {
        id: result.last_insert_rowid(),
        author_id: post.author_id,
        date_posted: post.date_posted,
    })
}

async fn insert_post_media<'e, E>(executor: E, media: &NewPostMedia) -> Result<PostMedia>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO post_media (post_id, platform, channel_id, remote_message_id)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(media.post_id)
    .bind(media.platform.as_str())
    .bind(&media.channel_id)
    .bind(&media.remote_message_id)
    .execute(executor)
    .await
    .map_err(DbError::SqlxError)?;

    Ok(PostMedia {
        id: result.last_insert_rowid(),
        post_id: media.post_id,
        platform: media.platform,
        channel_id: media.channel_id.clone(),
        remote_message_id: media.remote_message_id.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CrosspostError;
    use tempfile::TempDir;

    async fn setup() -> (Database, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("test.db");
        let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
        (db, temp_dir)
    }

    #[tokio::test]
    async fn test_database_initialization_with_invalid_path() {
        #[cfg(unix)]
        let invalid_path = "/tmp/test\0invalid.db";

        #[cfg(windows)]
        let invalid_path = "C:\\invalid<>path\\test.db";

        let result = Database::new(invalid_path).await;
        match result {
            Err(CrosspostError::Database(_)) => {}
            _ => panic!("Expected DbError for invalid path"),
        }
    }

    #[tokio::test]
    async fn test_upsert_credential_replaces_value() {
        let (db, _temp_dir) = setup().await;

        db.upsert_credential(1, CredentialKind::InstagramUserId, "first")
            .await
            .unwrap();
        db.upsert_credential(1, CredentialKind::InstagramUserId, "second")
            .await
            .unwrap();
        db.upsert_credential(2, CredentialKind::InstagramUserId, "other")
            .await
            .unwrap();

        let creds = db.decoded_credentials_by_user_id(1).await.unwrap();
        assert_eq!(creds.len(), 1);
        assert_eq!(creds[0].kind, CredentialKind::InstagramUserId);
        assert_eq!(creds[0].value, "second");
        assert_eq!(creds[0].author_id, 1);
    }

    #[tokio::test]
    async fn test_unknown_credential_kind_rows_are_skipped() {
        let (db, _temp_dir) = setup().await;
        db.upsert_credential(1, CredentialKind::TelegramAppId, "123")
            .await
            .unwrap();
        sqlx::query("INSERT INTO credentials (author_id, kind, value) VALUES (1, 'fax_number', 'x')")
            .execute(&db.pool)
            .await
            .unwrap();

        let creds = db.decoded_credentials_by_user_id(1).await.unwrap();
        assert_eq!(creds.len(), 1);
        assert_eq!(creds[0].kind, CredentialKind::TelegramAppId);
    }

    #[tokio::test]
    async fn test_delete_credential() {
        let (db, _temp_dir) = setup().await;
        db.upsert_credential(1, CredentialKind::TelegramPassword, "pw")
            .await
            .unwrap();

        assert!(db.delete_credential(1, CredentialKind::TelegramPassword).await.unwrap());
        assert!(!db.delete_credential(1, CredentialKind::TelegramPassword).await.unwrap());
        assert!(db.decoded_credentials_by_user_id(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_post_and_media_round_trip() {
        let (db, _temp_dir) = setup().await;

        let post = db
            .add_post(&NewPost {
                author_id: 5,
                date_posted: 1_700_000_000,
            })
            .await
            .unwrap();
        assert!(post.id > 0);

        for (platform, channel, remote) in [
            (SocialPlatform::Telegram, "1001", "42"),
            (SocialPlatform::Instagram, "1784", "1799"),
        ] {
            db.add_post_media(&NewPostMedia {
                post_id: post.id,
                platform,
                channel_id: channel.to_string(),
                remote_message_id: remote.to_string(),
            })
            .await
            .unwrap();
        }

        let media = db.media_for_post(post.id).await.unwrap();
        assert_eq!(media.len(), 2);
        assert_eq!(media[0].platform, SocialPlatform::Telegram);
        assert_eq!(media[1].remote_message_id, "1799");
        assert!(media.iter().all(|m| m.post_id == post.id));
    }

    #[tokio::test]
    async fn test_media_foreign_key_enforced() {
        let (db, _temp_dir) = setup().await;

        let result = db
            .add_post_media(&NewPostMedia {
                post_id: 404,
                platform: SocialPlatform::Telegram,
                channel_id: "1".to_string(),
                remote_message_id: "1".to_string(),
            })
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_posts_newest_first() {
        let (db, _temp_dir) = setup().await;

        for ts in [100, 300, 200] {
            db.add_post(&NewPost {
                author_id: 9,
                date_posted: ts,
            })
            .await
            .unwrap();
        }

        let posts = db.posts_by_author_id(9).await.unwrap();
        let dates: Vec<i64> = posts.iter().map(|p| p.date_posted).collect();
        assert_eq!(dates, vec![300, 200, 100]);
        assert!(db.media_for_post(posts[0].id).await.unwrap().is_empty());
    }

    fn published() -> Vec<PublishedPost> {
        vec![
            PublishedPost {
                channel_id: "1001".to_string(),
                remote_id: "42".to_string(),
                platform: SocialPlatform::Telegram,
            },
            PublishedPost {
                channel_id: "1784".to_string(),
                remote_id: "1799".to_string(),
                platform: SocialPlatform::Instagram,
            },
        ]
    }

    #[tokio::test]
    async fn test_record_post_links_media_to_one_post() {
        let (db, _temp_dir) = setup().await;

        let (post, media) = db
            .record_post(
                &NewPost {
                    author_id: 3,
                    date_posted: 500,
                },
                &published(),
            )
            .await
            .unwrap();

        assert_eq!(media.len(), 2);
        assert!(media.iter().all(|m| m.post_id == post.id));
        assert_eq!(db.posts_by_author_id(3).await.unwrap(), vec![post.clone()]);
        assert_eq!(db.media_for_post(post.id).await.unwrap(), media);
    }

    #[tokio::test]
    async fn test_record_post_rolls_back_when_media_insert_fails() {
        let (db, _temp_dir) = setup().await;

        // Reject the second media row of any post
        sqlx::query(
            r#"
            CREATE TRIGGER reject_second_media BEFORE INSERT ON post_media
            WHEN (SELECT COUNT(*) FROM post_media WHERE post_id = NEW.post_id) >= 1
            BEGIN
                SELECT RAISE(ABORT, 'disk full');
            END
            "#,
        )
        .execute(&db.pool)
        .await
        .unwrap();

        let result = db
            .record_post(
                &NewPost {
                    author_id: 3,
                    date_posted: 500,
                },
                &published(),
            )
            .await;

        assert!(result.is_err());
        assert!(db.posts_by_author_id(3).await.unwrap().is_empty());
        let orphans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM post_media")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(orphans, 0);
    }
}
