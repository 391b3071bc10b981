//! Core types for Crosspost

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CredentialError;

/// A social platform Crosspost can publish to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum SocialPlatform {
    Telegram,
    Instagram,
}

impl SocialPlatform {
    /// Fixed dispatch priority. Posting always walks platforms in this order.
    pub const PRIORITY: [SocialPlatform; 2] = [SocialPlatform::Telegram, SocialPlatform::Instagram];

    pub fn as_str(&self) -> &'static str {
        match self {
            SocialPlatform::Telegram => "telegram",
            SocialPlatform::Instagram => "instagram",
        }
    }
}

impl fmt::Display for SocialPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SocialPlatform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "telegram" => Ok(SocialPlatform::Telegram),
            "instagram" => Ok(SocialPlatform::Instagram),
            other => Err(format!(
                "Unknown platform: '{}'. Valid options: telegram, instagram",
                other
            )),
        }
    }
}

/// Kind of a stored credential value
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    TelegramAppId,
    TelegramAppHash,
    TelegramChannelId,
    TelegramPhoneNumber,
    TelegramPassword,
    InstagramAccessToken,
    InstagramUserId,
    ImageHostApiKey,
}

impl CredentialKind {
    pub const ALL: [CredentialKind; 8] = [
        CredentialKind::TelegramAppId,
        CredentialKind::TelegramAppHash,
        CredentialKind::TelegramChannelId,
        CredentialKind::TelegramPhoneNumber,
        CredentialKind::TelegramPassword,
        CredentialKind::InstagramAccessToken,
        CredentialKind::InstagramUserId,
        CredentialKind::ImageHostApiKey,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKind::TelegramAppId => "telegram_app_id",
            CredentialKind::TelegramAppHash => "telegram_app_hash",
            CredentialKind::TelegramChannelId => "telegram_channel_id",
            CredentialKind::TelegramPhoneNumber => "telegram_phone_number",
            CredentialKind::TelegramPassword => "telegram_password",
            CredentialKind::InstagramAccessToken => "instagram_access_token",
            CredentialKind::InstagramUserId => "instagram_user_id",
            CredentialKind::ImageHostApiKey => "image_host_api_key",
        }
    }

    /// Whether values of this kind must never be printed or logged
    pub fn is_secret(&self) -> bool {
        matches!(
            self,
            CredentialKind::TelegramAppHash
                | CredentialKind::TelegramPassword
                | CredentialKind::InstagramAccessToken
                | CredentialKind::ImageHostApiKey
        )
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialKind {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        CredentialKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| CredentialError::UnknownKind(s.to_string()))
    }
}

/// A credential value resolved to plaintext for use at call time
#[derive(Clone, Serialize, Deserialize)]
pub struct DecodedCredential {
    pub id: i64,
    pub author_id: i64,
    pub kind: CredentialKind,
    pub value: String,
}

impl DecodedCredential {
    pub fn new(author_id: i64, kind: CredentialKind, value: impl Into<String>) -> Self {
        Self {
            id: 0,
            author_id,
            kind,
            value: value.into(),
        }
    }
}

impl fmt::Debug for DecodedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = if self.kind.is_secret() {
            "[REDACTED]"
        } else {
            self.value.as_str()
        };
        f.debug_struct("DecodedCredential")
            .field("id", &self.id)
            .field("author_id", &self.author_id)
            .field("kind", &self.kind)
            .field("value", &value)
            .finish()
    }
}

/// Identity of a post on a remote platform
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublishedPost {
    /// Channel, page or account the post lives in
    pub channel_id: String,
    /// Remote message/media id
    pub remote_id: String,
    pub platform: SocialPlatform,
}

/// Engagement counters for a published post
///
/// A counter of `-1` means the platform did not report it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngagementStats {
    pub views: i64,
    pub reactions: i64,
    pub comments: i64,
    pub forwards: i64,
}

impl EngagementStats {
    /// Sentinel payload returned alongside a failed stats lookup
    pub fn unavailable() -> Self {
        Self {
            views: -1,
            reactions: -1,
            comments: -1,
            forwards: -1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    pub id: i64,
    pub author_id: i64,
    /// Unix timestamp
    pub date_posted: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewPost {
    pub author_id: i64,
    pub date_posted: i64,
}

impl NewPost {
    pub fn now(author_id: i64) -> Self {
        Self {
            author_id,
            date_posted: chrono::Utc::now().timestamp(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostMedia {
    pub id: i64,
    pub post_id: i64,
    pub platform: SocialPlatform,
    pub channel_id: String,
    pub remote_message_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewPostMedia {
    pub post_id: i64,
    pub platform: SocialPlatform,
    pub channel_id: String,
    pub remote_message_id: String,
}

impl NewPostMedia {
    pub fn from_published(post_id: i64, published: &PublishedPost) -> Self {
        Self {
            post_id,
            platform: published.platform,
            channel_id: published.channel_id.clone(),
            remote_message_id: published.remote_id.clone(),
        }
    }
}

/// A post with all of its per-platform media rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostWithMedia {
    pub post: Post,
    pub media: Vec<PostMedia>,
}

// ============================================================================
// Attachment Types
// ============================================================================

/// Supported image MIME types for attachments
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImageMimeType {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl ImageMimeType {
    /// Detect MIME type from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detect MIME type from a file path's extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Get the MIME type string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }
}

impl fmt::Display for ImageMimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
