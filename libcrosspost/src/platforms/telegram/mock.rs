//! Scripted Telegram transport for tests
//!
//! Records every upload and album so tests can check what would have been
//! sent, without a network or a real account.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{
    ChannelInfo, MediaHandle, TelegramConnector, TelegramCredentials, TelegramTransport,
    VerificationCodeProvider,
};
use crate::error::PlatformError;
use crate::platforms::ProviderResult;
use crate::types::EngagementStats;

/// One `send_album` call as seen by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentAlbum {
    pub channel_id: i64,
    pub caption: String,
    pub media_count: usize,
    pub message_ids: Vec<i32>,
}

pub struct MockTelegramTransport {
    channel: ChannelInfo,
    failing_upload: Option<String>,
    stats: HashMap<i32, EngagementStats>,
    next_message_id: AtomicI32,
    uploads: Mutex<Vec<PathBuf>>,
    albums: Mutex<Vec<SentAlbum>>,
}

impl MockTelegramTransport {
    /// Transport whose dialog list holds exactly one channel
    pub fn with_channel(channel_id: i64, username: Option<&str>) -> Self {
        Self {
            channel: ChannelInfo {
                id: channel_id,
                title: format!("channel {}", channel_id),
                username: username.map(str::to_string),
            },
            failing_upload: None,
            stats: HashMap::new(),
            next_message_id: AtomicI32::new(100),
            uploads: Mutex::new(Vec::new()),
            albums: Mutex::new(Vec::new()),
        }
    }

    /// Fail the upload of any file whose name is `file_name`
    pub fn failing_upload(mut self, file_name: &str) -> Self {
        self.failing_upload = Some(file_name.to_string());
        self
    }

    pub fn with_stats(mut self, message_id: i32, stats: EngagementStats) -> Self {
        self.stats.insert(message_id, stats);
        self
    }

    pub fn uploaded_files(&self) -> Vec<PathBuf> {
        self.uploads.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn albums(&self) -> Vec<SentAlbum> {
        self.albums.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn album_count(&self) -> usize {
        self.albums.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl TelegramTransport for MockTelegramTransport {
    async fn find_channel(&self, channel_id: i64) -> ProviderResult<Option<ChannelInfo>> {
        Ok((self.channel.id == channel_id).then(|| self.channel.clone()))
    }

    async fn upload_file(&self, path: &Path) -> ProviderResult<MediaHandle> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if self.failing_upload.as_deref() == Some(file_name.as_str()) {
            return Err(PlatformError::UploadFailed(format!(
                "{}: FILE_PART_INVALID",
                path.display()
            )));
        }

        self.uploads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(path.to_path_buf());
        Ok(MediaHandle::new(file_name, path.to_path_buf()))
    }

    async fn send_album(
        &self,
        channel: &ChannelInfo,
        media: Vec<MediaHandle>,
        caption: &str,
    ) -> ProviderResult<Vec<i32>> {
        let message_ids: Vec<i32> = media
            .iter()
            .map(|_| self.next_message_id.fetch_add(1, Ordering::SeqCst))
            .collect();

        self.albums
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentAlbum {
                channel_id: channel.id,
                caption: caption.to_string(),
                media_count: media.len(),
                message_ids: message_ids.clone(),
            });

        Ok(message_ids)
    }

    async fn message_stats(
        &self,
        _channel: &ChannelInfo,
        message_id: i32,
    ) -> ProviderResult<Option<EngagementStats>> {
        Ok(self.stats.get(&message_id).copied())
    }
}

/// Connector handing out a shared [`MockTelegramTransport`]
///
/// Asks the code provider for a code on every connect, like a first login.
pub struct MockConnector {
    transport: Arc<MockTelegramTransport>,
    delay: Duration,
    failure: Option<PlatformError>,
    connects: AtomicUsize,
    codes: Mutex<Vec<String>>,
}

impl MockConnector {
    pub fn new(transport: Arc<MockTelegramTransport>) -> Self {
        Self {
            transport,
            delay: Duration::ZERO,
            failure: None,
            connects: AtomicUsize::new(0),
            codes: Mutex::new(Vec::new()),
        }
    }

    /// Simulated login latency
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_with(mut self, error: PlatformError) -> Self {
        self.failure = Some(error);
        self
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Phone numbers a code was requested for, in order
    pub fn codes_requested(&self) -> Vec<String> {
        self.codes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl TelegramConnector for MockConnector {
    async fn connect(
        &self,
        credentials: &TelegramCredentials,
        codes: &dyn VerificationCodeProvider,
    ) -> ProviderResult<Arc<dyn TelegramTransport>> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        codes.request_code(&credentials.phone_number).await?;
        self.codes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(credentials.phone_number.clone());

        Ok(Arc::clone(&self.transport) as Arc<dyn TelegramTransport>)
    }
}
