//! MTProto transport backed by grammers
//!
//! Logs in as a user account, persisting the authorization to a session
//! file under `telegram.session_dir` so later runs skip the code prompt.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use grammers_client::types::{Chat, InputMedia};
use grammers_client::{Client, Config, InitParams, SignInError};
use grammers_session::Session;
use tracing::{debug, info};

use super::{
    ChannelInfo, MediaHandle, TelegramConnector, TelegramCredentials, TelegramTransport,
    VerificationCodeProvider,
};
use crate::error::PlatformError;
use crate::platforms::ProviderResult;
use crate::types::EngagementStats;

fn rpc_error(context: &str, err: impl std::fmt::Display) -> PlatformError {
    PlatformError::Network(format!("{}: {}", context, err))
}

/// Session file for a phone number; digits only so the name is portable
pub fn session_file(session_dir: &Path, phone_number: &str) -> PathBuf {
    let digits: String = phone_number.chars().filter(|c| c.is_ascii_digit()).collect();
    session_dir.join(format!("{}.session", digits))
}

pub struct MtprotoConnector {
    session_dir: PathBuf,
}

impl MtprotoConnector {
    pub fn new(session_dir: PathBuf) -> Self {
        Self { session_dir }
    }

    async fn sign_in(
        &self,
        client: &Client,
        credentials: &TelegramCredentials,
        codes: &dyn VerificationCodeProvider,
    ) -> ProviderResult<()> {
        let phone = credentials.phone_number.as_str();
        let token = client
            .request_login_code(phone)
            .await
            .map_err(|e| PlatformError::Authentication(format!("Login code request failed: {}", e)))?;

        let code = codes.request_code(phone).await?;

        match client.sign_in(&token, code.trim()).await {
            Ok(_) => Ok(()),
            Err(SignInError::PasswordRequired(password_token)) => {
                let password = credentials.password().ok_or_else(|| {
                    PlatformError::AuthenticationRequired(
                        "Telegram account has two-step verification but no telegram_password is stored"
                            .to_string(),
                    )
                })?;
                client
                    .check_password(password_token, password)
                    .await
                    .map(|_| ())
                    .map_err(|e| PlatformError::Authentication(format!("Password rejected: {}", e)))
            }
            Err(e) => Err(PlatformError::Authentication(format!("Sign in failed: {}", e))),
        }
    }
}

#[async_trait]
impl TelegramConnector for MtprotoConnector {
    async fn connect(
        &self,
        credentials: &TelegramCredentials,
        codes: &dyn VerificationCodeProvider,
    ) -> ProviderResult<Arc<dyn TelegramTransport>> {
        std::fs::create_dir_all(&self.session_dir)
            .map_err(|e| rpc_error("Creating session directory", e))?;
        let path = session_file(&self.session_dir, &credentials.phone_number);

        let session = Session::load_file_or_create(&path)
            .map_err(|e| rpc_error("Loading session file", e))?;

        let client = Client::connect(Config {
            session,
            api_id: credentials.app_id,
            api_hash: credentials.app_hash().to_string(),
            params: InitParams::default(),
        })
        .await
        .map_err(|e| rpc_error("Connecting to Telegram", e))?;

        let authorized = client
            .is_authorized()
            .await
            .map_err(|e| rpc_error("Checking authorization", e))?;

        if !authorized {
            info!("Telegram session for {} is not authorized, signing in", credentials.phone_number);
            self.sign_in(&client, credentials, codes).await?;
            client
                .session()
                .save_to_file(&path)
                .map_err(|e| rpc_error("Saving session file", e))?;
        }

        Ok(Arc::new(MtprotoTransport {
            client,
            chats: Mutex::new(HashMap::new()),
        }))
    }
}

pub struct MtprotoTransport {
    client: Client,
    chats: Mutex<HashMap<i64, Chat>>,
}

impl MtprotoTransport {
    fn cached_chat(&self, channel_id: i64) -> Option<Chat> {
        self.chats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&channel_id)
            .cloned()
    }

    async fn chat(&self, channel_id: i64) -> ProviderResult<Chat> {
        if let Some(chat) = self.cached_chat(channel_id) {
            return Ok(chat);
        }
        self.find_channel(channel_id).await?;
        self.cached_chat(channel_id)
            .ok_or_else(|| PlatformError::ChatNotFound(channel_id.to_string()))
    }
}

#[async_trait]
impl TelegramTransport for MtprotoTransport {
    async fn find_channel(&self, channel_id: i64) -> ProviderResult<Option<ChannelInfo>> {
        let mut dialogs = self.client.iter_dialogs();

        while let Some(dialog) = dialogs
            .next()
            .await
            .map_err(|e| rpc_error("Listing dialogs", e))?
        {
            let chat = dialog.chat();
            if chat.id() != channel_id {
                continue;
            }

            let info = ChannelInfo {
                id: chat.id(),
                title: chat.name().to_string(),
                username: chat.username().map(str::to_string),
            };
            self.chats
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(channel_id, chat.clone());
            return Ok(Some(info));
        }

        Ok(None)
    }

    async fn upload_file(&self, path: &Path) -> ProviderResult<MediaHandle> {
        let uploaded = self
            .client
            .upload_file(path)
            .await
            .map_err(|e| PlatformError::UploadFailed(format!("{}: {}", path.display(), e)))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(MediaHandle::new(file_name, uploaded))
    }

    async fn send_album(
        &self,
        channel: &ChannelInfo,
        media: Vec<MediaHandle>,
        caption: &str,
    ) -> ProviderResult<Vec<i32>> {
        let chat = self.chat(channel.id).await?;

        // Telegram shows the first item's caption as the album caption
        let mut items = Vec::with_capacity(media.len());
        for (index, handle) in media.into_iter().enumerate() {
            let file_name = handle.file_name.clone();
            let uploaded = handle.downcast().ok_or_else(|| {
                PlatformError::UploadFailed(format!("{} was not uploaded by this session", file_name))
            })?;
            let text = if index == 0 { caption } else { "" };
            items.push(InputMedia::caption(text).photo(uploaded));
        }

        let sent = self
            .client
            .send_album(chat.pack(), items)
            .await
            .map_err(|e| rpc_error("Send album", e))?;

        let ids: Vec<i32> = sent.into_iter().flatten().map(|m| m.id()).collect();
        debug!("Album sent as messages {:?}", ids);
        Ok(ids)
    }

    async fn message_stats(
        &self,
        channel: &ChannelInfo,
        message_id: i32,
    ) -> ProviderResult<Option<EngagementStats>> {
        let chat = self.chat(channel.id).await?;
        let messages = self
            .client
            .get_messages_by_id(chat.pack(), &[message_id])
            .await
            .map_err(|e| rpc_error("Fetching message", e))?;

        let Some(message) = messages.into_iter().flatten().next() else {
            return Ok(None);
        };

        let reactions = match &message.raw.reactions {
            Some(grammers_tl_types::enums::MessageReactions::Reactions(r)) => r
                .results
                .iter()
                .map(|grammers_tl_types::enums::ReactionCount::Count(c)| i64::from(c.count))
                .sum(),
            None => 0,
        };

        Ok(Some(EngagementStats {
            views: message.view_count().map(i64::from).unwrap_or(0),
            reactions,
            comments: message.reply_count().map(i64::from).unwrap_or(0),
            forwards: message.forward_count().map(i64::from).unwrap_or(0),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_file_uses_phone_digits() {
        let path = session_file(Path::new("/data/sessions"), "+1 (555) 000-1111");
        assert_eq!(path, PathBuf::from("/data/sessions/15550001111.session"));
    }
}
