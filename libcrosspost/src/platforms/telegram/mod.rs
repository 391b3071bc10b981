//! Telegram provider
//!
//! Posts to a channel from a user account (not a bot). The account session
//! is established lazily through a [`TelegramConnector`] and cached in the
//! shared [`SessionRegistry`], so repeated and concurrent posts for the same
//! account log in once.
//!
//! The wire protocol sits behind [`TelegramTransport`]. The `mtproto`
//! feature provides the real implementation; [`mock`] provides a scripted
//! one for tests.

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{cancellable, ProviderClient, ProviderResult};
use crate::error::PlatformError;
use crate::session::{SessionKey, SessionRegistry, SessionSlot};
use crate::types::{EngagementStats, PublishedPost, SocialPlatform};

pub mod mock;
#[cfg(feature = "mtproto")]
pub mod mtproto;

/// Telegram caps grouped media at ten items
pub const MAX_ALBUM_SIZE: usize = 10;

/// Credentials needed to log in and find the target channel
pub struct TelegramCredentials {
    pub app_id: i32,
    pub app_hash: SecretString,
    /// Bare channel id (without the `-100` prefix)
    pub channel_id: i64,
    pub phone_number: String,
    pub password: Option<SecretString>,
}

impl TelegramCredentials {
    pub fn new(
        app_id: &str,
        app_hash: &str,
        channel_id: &str,
        phone_number: &str,
        password: Option<&str>,
    ) -> ProviderResult<Self> {
        let app_id = app_id.trim().parse::<i32>().map_err(|_| {
            PlatformError::Validation(format!("Telegram app id '{}' is not a number", app_id.trim()))
        })?;
        let channel_id = parse_channel_id(channel_id).map_err(PlatformError::Validation)?;

        Ok(Self {
            app_id,
            app_hash: SecretString::from(app_hash.trim().to_string()),
            channel_id,
            phone_number: phone_number.trim().to_string(),
            password: password
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(|p| SecretString::from(p.to_string())),
        })
    }

    pub fn app_hash(&self) -> &str {
        self.app_hash.expose_secret()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_ref().map(|p| p.expose_secret())
    }
}

impl std::fmt::Debug for TelegramCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramCredentials")
            .field("app_id", &self.app_id)
            .field("channel_id", &self.channel_id)
            .field("phone_number", &self.phone_number)
            .field("has_password", &self.password.is_some())
            .finish()
    }
}

/// Normalise a stored channel id to the bare form used by dialogs
///
/// Accepts `1234567890`, `-1001234567890` (Bot API form) and `-1234567890`.
pub fn parse_channel_id(raw: &str) -> Result<i64, String> {
    let raw = raw.trim();
    let digits = raw
        .strip_prefix("-100")
        .or_else(|| raw.strip_prefix('-'))
        .unwrap_or(raw);

    match digits.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(format!("Telegram channel id '{}' is not a valid id", raw)),
    }
}

/// A channel as seen in the account's dialog list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: i64,
    pub title: String,
    /// Public @username, if the channel has one
    pub username: Option<String>,
}

impl ChannelInfo {
    /// Public URL of message `post_id` in this channel
    ///
    /// Public channels link by username; private ones by internal id.
    pub fn post_link(&self, post_id: i32) -> String {
        match self.username.as_deref().map(str::trim) {
            Some(username) if !username.is_empty() => {
                format!("https://t.me/{}/{}", username, post_id)
            }
            _ => format!("https://t.me/c/{}/{}", self.id, post_id),
        }
    }
}

/// Provider-side handle for an uploaded file
///
/// Opaque to everything but the transport that produced it.
pub struct MediaHandle {
    pub file_name: String,
    inner: Box<dyn Any + Send + Sync>,
}

impl MediaHandle {
    pub fn new<T: Any + Send + Sync>(file_name: impl Into<String>, inner: T) -> Self {
        Self {
            file_name: file_name.into(),
            inner: Box::new(inner),
        }
    }

    pub fn downcast<T: Any>(self) -> Option<T> {
        self.inner.downcast::<T>().ok().map(|b| *b)
    }
}

impl std::fmt::Debug for MediaHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaHandle")
            .field("file_name", &self.file_name)
            .finish_non_exhaustive()
    }
}

/// RPC surface of an authenticated user session
#[async_trait]
pub trait TelegramTransport: Send + Sync {
    /// Find a channel by bare id among the session's dialogs
    async fn find_channel(&self, channel_id: i64) -> ProviderResult<Option<ChannelInfo>>;

    async fn upload_file(&self, path: &Path) -> ProviderResult<MediaHandle>;

    /// Send `media` as one grouped message; returns the ids of the messages
    /// in album order
    async fn send_album(
        &self,
        channel: &ChannelInfo,
        media: Vec<MediaHandle>,
        caption: &str,
    ) -> ProviderResult<Vec<i32>>;

    async fn message_stats(
        &self,
        channel: &ChannelInfo,
        message_id: i32,
    ) -> ProviderResult<Option<EngagementStats>>;
}

/// Asks a human (or a test double) for the login verification code
#[async_trait]
pub trait VerificationCodeProvider: Send + Sync {
    async fn request_code(&self, phone_number: &str) -> ProviderResult<String>;
}

/// Always answers with the same code
pub struct FixedCode(pub String);

#[async_trait]
impl VerificationCodeProvider for FixedCode {
    async fn request_code(&self, _phone_number: &str) -> ProviderResult<String> {
        Ok(self.0.clone())
    }
}

/// Refuses interactive logins; only previously saved sessions work
pub struct NoInteractiveLogin;

#[async_trait]
impl VerificationCodeProvider for NoInteractiveLogin {
    async fn request_code(&self, phone_number: &str) -> ProviderResult<String> {
        Err(PlatformError::AuthenticationRequired(format!(
            "Telegram login for {} needs a verification code but no prompt is available",
            phone_number
        )))
    }
}

/// Establishes authenticated sessions
#[async_trait]
pub trait TelegramConnector: Send + Sync {
    async fn connect(
        &self,
        credentials: &TelegramCredentials,
        codes: &dyn VerificationCodeProvider,
    ) -> ProviderResult<Arc<dyn TelegramTransport>>;
}

/// Connector used when the crate is built without the `mtproto` feature
pub struct UnavailableConnector;

#[async_trait]
impl TelegramConnector for UnavailableConnector {
    async fn connect(
        &self,
        _credentials: &TelegramCredentials,
        _codes: &dyn VerificationCodeProvider,
    ) -> ProviderResult<Arc<dyn TelegramTransport>> {
        Err(PlatformError::AuthenticationRequired(
            "Telegram support not compiled. Build with --features mtproto".to_string(),
        ))
    }
}

pub type TelegramSessions = SessionRegistry<Arc<dyn TelegramTransport>>;

pub struct TelegramClient {
    credentials: Arc<TelegramCredentials>,
    connector: Arc<dyn TelegramConnector>,
    codes: Arc<dyn VerificationCodeProvider>,
    sessions: Arc<TelegramSessions>,
    session_key: SessionKey,
}

impl TelegramClient {
    pub fn new(
        user_id: i64,
        credentials: TelegramCredentials,
        connector: Arc<dyn TelegramConnector>,
        codes: Arc<dyn VerificationCodeProvider>,
        sessions: Arc<TelegramSessions>,
    ) -> Self {
        let session_key = SessionKey::new(
            user_id,
            SocialPlatform::Telegram,
            credentials.phone_number.clone(),
        );
        Self {
            credentials: Arc::new(credentials),
            connector,
            codes,
            sessions,
            session_key,
        }
    }

    pub fn channel_id(&self) -> i64 {
        self.credentials.channel_id
    }

    /// Existing session for this account, or a freshly established one
    async fn transport(
        &self,
        cancel: &CancellationToken,
    ) -> ProviderResult<Arc<dyn TelegramTransport>> {
        let slot: SessionSlot<_> = self.sessions.slot(&self.session_key);
        let mut guard = cancellable(cancel, async { Ok(slot.lock().await) }).await?;

        if let Some(transport) = guard.as_ref() {
            return Ok(Arc::clone(transport));
        }

        info!(
            "Establishing Telegram session for {}",
            self.credentials.phone_number
        );
        let transport = cancellable(
            cancel,
            self.connector
                .connect(&self.credentials, self.codes.as_ref()),
        )
        .await?;
        *guard = Some(Arc::clone(&transport));

        Ok(transport)
    }

    /// Drop a session the server no longer accepts
    fn discard_session_on_auth_error<T>(&self, result: ProviderResult<T>) -> ProviderResult<T> {
        if let Err(e) = &result {
            if e.is_authentication() {
                warn!("Telegram session rejected, discarding it: {}", e);
                self.sessions.forget(&self.session_key);
            }
        }
        result
    }

    async fn resolve_channel(
        &self,
        transport: &dyn TelegramTransport,
        cancel: &CancellationToken,
    ) -> ProviderResult<ChannelInfo> {
        let channel_id = self.credentials.channel_id;
        cancellable(cancel, transport.find_channel(channel_id))
            .await?
            .ok_or_else(|| {
                PlatformError::ChatNotFound(format!(
                    "channel {} is not in the account's dialogs",
                    channel_id
                ))
            })
    }

    async fn publish_album(
        &self,
        text: &str,
        files: &[PathBuf],
        cancel: &CancellationToken,
    ) -> ProviderResult<PublishedPost> {
        let transport = self.transport(cancel).await?;
        let channel = self.resolve_channel(transport.as_ref(), cancel).await?;

        let mut media = Vec::with_capacity(files.len());
        for path in files {
            let handle = cancellable(cancel, transport.upload_file(path)).await?;
            debug!("Uploaded {} to Telegram", path.display());
            media.push(handle);
        }

        let ids = cancellable(cancel, transport.send_album(&channel, media, text)).await?;
        let first = ids.first().copied().ok_or_else(|| {
            PlatformError::remote("Send album", 200, "response contained no messages")
        })?;

        info!(
            "Posted album of {} item(s) to Telegram channel {} as message {}",
            files.len(),
            channel.id,
            first
        );

        Ok(PublishedPost {
            channel_id: channel.id.to_string(),
            remote_id: first.to_string(),
            platform: SocialPlatform::Telegram,
        })
    }
}

fn parse_message_id(post_id: &str) -> ProviderResult<i32> {
    match post_id.trim().parse::<i32>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(PlatformError::Validation(format!(
            "'{}' is not a Telegram message id",
            post_id
        ))),
    }
}

#[async_trait]
impl ProviderClient for TelegramClient {
    fn platform(&self) -> SocialPlatform {
        SocialPlatform::Telegram
    }

    async fn create_post(
        &self,
        text: &str,
        files: &[PathBuf],
        cancel: &CancellationToken,
    ) -> ProviderResult<PublishedPost> {
        if files.is_empty() {
            return Err(PlatformError::NoFilesToUpload);
        }
        if files.len() > MAX_ALBUM_SIZE {
            return Err(PlatformError::Validation(format!(
                "Telegram albums hold at most {} files (got {})",
                MAX_ALBUM_SIZE,
                files.len()
            )));
        }

        let result = self.publish_album(text, files, cancel).await;
        self.discard_session_on_auth_error(result)
    }

    async fn engagement_stats(
        &self,
        post_id: &str,
        cancel: &CancellationToken,
    ) -> ProviderResult<EngagementStats> {
        let message_id = parse_message_id(post_id)?;

        let result: ProviderResult<EngagementStats> = async {
            let transport = self.transport(cancel).await?;
            let channel = self.resolve_channel(transport.as_ref(), cancel).await?;
            cancellable(cancel, transport.message_stats(&channel, message_id))
                .await?
                .ok_or_else(|| {
                    PlatformError::NotFound(format!(
                        "message {} in channel {}",
                        message_id, channel.id
                    ))
                })
        }
        .await;

        self.discard_session_on_auth_error(result)
    }

    async fn post_link(&self, post_id: &str, cancel: &CancellationToken) -> ProviderResult<String> {
        let message_id = parse_message_id(post_id)?;

        let result: ProviderResult<String> = async {
            let transport = self.transport(cancel).await?;
            let channel = self.resolve_channel(transport.as_ref(), cancel).await?;
            Ok::<_, PlatformError>(channel.post_link(message_id))
        }
        .await;

        self.discard_session_on_auth_error(result)
    }
}
