//! Provider construction from stored credentials
//!
//! Each orchestration call gets a fresh set of clients built from the
//! caller's credentials. Platforms whose credentials are incomplete are
//! skipped rather than reported, so a user configured for Telegram only
//! posts to Telegram only.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{PlatformError, Result};
use crate::platforms::instagram::{InstagramClient, InstagramCredentials};
use crate::platforms::telegram::{
    NoInteractiveLogin, TelegramClient, TelegramConnector, TelegramCredentials, TelegramSessions,
    VerificationCodeProvider,
};
use crate::platforms::ProviderClient;
use crate::types::{CredentialKind, DecodedCredential, SocialPlatform};

/// Credential kinds a platform cannot work without
pub fn required_kinds(platform: SocialPlatform) -> &'static [CredentialKind] {
    match platform {
        SocialPlatform::Telegram => &[
            CredentialKind::TelegramAppId,
            CredentialKind::TelegramAppHash,
            CredentialKind::TelegramChannelId,
            CredentialKind::TelegramPhoneNumber,
        ],
        SocialPlatform::Instagram => &[
            CredentialKind::InstagramAccessToken,
            CredentialKind::InstagramUserId,
            CredentialKind::ImageHostApiKey,
        ],
    }
}

/// Credential kinds a platform uses when present
pub fn optional_kinds(platform: SocialPlatform) -> &'static [CredentialKind] {
    match platform {
        SocialPlatform::Telegram => &[CredentialKind::TelegramPassword],
        SocialPlatform::Instagram => &[],
    }
}

/// Platform owning a credential kind
pub fn platform_of(kind: CredentialKind) -> SocialPlatform {
    SocialPlatform::PRIORITY
        .into_iter()
        .find(|p| required_kinds(*p).contains(&kind) || optional_kinds(*p).contains(&kind))
        .unwrap_or(SocialPlatform::Instagram)
}

/// Non-blank credential values for one platform
#[derive(Default)]
pub struct CredentialSet {
    values: HashMap<CredentialKind, String>,
}

impl CredentialSet {
    pub fn get(&self, kind: CredentialKind) -> Option<&str> {
        self.values.get(&kind).map(String::as_str)
    }

    /// Value of a kind known to be present; empty otherwise
    fn value(&self, kind: CredentialKind) -> &str {
        self.get(kind).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.values.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("CredentialSet").field("kinds", &kinds).finish()
    }
}

/// Pick out `platform`'s credentials, or `None` if any required kind is
/// missing or blank
///
/// When a kind appears more than once the row with the highest id wins.
pub fn resolve_credentials(
    platform: SocialPlatform,
    credentials: &[DecodedCredential],
) -> Option<CredentialSet> {
    let wanted = |kind: &CredentialKind| {
        required_kinds(platform).contains(kind) || optional_kinds(platform).contains(kind)
    };

    let mut latest: HashMap<CredentialKind, &DecodedCredential> = HashMap::new();
    for credential in credentials.iter().filter(|c| wanted(&c.kind)) {
        if credential.value.trim().is_empty() {
            continue;
        }
        match latest.get(&credential.kind) {
            Some(existing) if existing.id > credential.id => {}
            _ => {
                latest.insert(credential.kind, credential);
            }
        }
    }

    let missing: Vec<&str> = required_kinds(platform)
        .iter()
        .filter(|kind| !latest.contains_key(*kind))
        .map(|kind| kind.as_str())
        .collect();
    if !missing.is_empty() {
        debug!("Skipping {}: missing {}", platform, missing.join(", "));
        return None;
    }

    Some(CredentialSet {
        values: latest
            .into_iter()
            .map(|(kind, c)| (kind, c.value.trim().to_string()))
            .collect(),
    })
}

/// Builds provider clients for a user
///
/// The orchestrator depends on this trait rather than on
/// [`ProviderFactory`] so tests can hand it mock providers.
pub trait ClientSource: Send + Sync {
    /// Clients for every platform the credentials fully configure, in
    /// [`SocialPlatform::PRIORITY`] order
    fn build_clients(
        &self,
        user_id: i64,
        credentials: &[DecodedCredential],
    ) -> Vec<Box<dyn ProviderClient>>;
}

pub struct ProviderFactory {
    config: Config,
    http: reqwest::Client,
    telegram_connector: Arc<dyn TelegramConnector>,
    code_provider: Arc<dyn VerificationCodeProvider>,
    sessions: Arc<TelegramSessions>,
}

#[cfg(feature = "mtproto")]
fn default_connector(config: &Config) -> Arc<dyn TelegramConnector> {
    Arc::new(crate::platforms::telegram::mtproto::MtprotoConnector::new(
        config.telegram.expand_session_dir(),
    ))
}

#[cfg(not(feature = "mtproto"))]
fn default_connector(_config: &Config) -> Arc<dyn TelegramConnector> {
    Arc::new(crate::platforms::telegram::UnavailableConnector)
}

impl ProviderFactory {
    /// Factory with a shared HTTP pool configured from `config.http`
    pub fn new(config: Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http.timeout())
            .user_agent(config.http.user_agent.clone())
            .build()
            .map_err(PlatformError::from)?;

        Ok(Self {
            telegram_connector: default_connector(&config),
            config,
            http,
            code_provider: Arc::new(NoInteractiveLogin),
            sessions: Arc::new(TelegramSessions::new()),
        })
    }

    pub fn with_telegram_connector(mut self, connector: Arc<dyn TelegramConnector>) -> Self {
        self.telegram_connector = connector;
        self
    }

    /// Where Telegram login codes come from (a terminal prompt in the CLI)
    pub fn with_code_provider(mut self, codes: Arc<dyn VerificationCodeProvider>) -> Self {
        self.code_provider = codes;
        self
    }

    /// Session registry shared by every Telegram client this factory builds
    pub fn sessions(&self) -> Arc<TelegramSessions> {
        Arc::clone(&self.sessions)
    }

    fn build_client(
        &self,
        user_id: i64,
        platform: SocialPlatform,
        set: &CredentialSet,
    ) -> std::result::Result<Box<dyn ProviderClient>, PlatformError> {
        match platform {
            SocialPlatform::Telegram => {
                let credentials = TelegramCredentials::new(
                    set.value(CredentialKind::TelegramAppId),
                    set.value(CredentialKind::TelegramAppHash),
                    set.value(CredentialKind::TelegramChannelId),
                    set.value(CredentialKind::TelegramPhoneNumber),
                    set.get(CredentialKind::TelegramPassword),
                )?;
                Ok(Box::new(TelegramClient::new(
                    user_id,
                    credentials,
                    Arc::clone(&self.telegram_connector),
                    Arc::clone(&self.code_provider),
                    Arc::clone(&self.sessions),
                )))
            }
            SocialPlatform::Instagram => {
                let credentials = InstagramCredentials::new(
                    set.value(CredentialKind::InstagramAccessToken),
                    set.value(CredentialKind::InstagramUserId),
                    set.value(CredentialKind::ImageHostApiKey),
                );
                Ok(Box::new(InstagramClient::new(
                    self.http.clone(),
                    &self.config.instagram.graph_api_url,
                    &self.config.instagram.image_host_url,
                    credentials,
                )))
            }
        }
    }
}

impl ClientSource for ProviderFactory {
    fn build_clients(
        &self,
        user_id: i64,
        credentials: &[DecodedCredential],
    ) -> Vec<Box<dyn ProviderClient>> {
        let mut clients = Vec::new();

        for platform in SocialPlatform::PRIORITY {
            let Some(set) = resolve_credentials(platform, credentials) else {
                continue;
            };
            match self.build_client(user_id, platform, &set) {
                Ok(client) => clients.push(client),
                Err(e) => warn!("Skipping {} for user {}: {}", platform, user_id, e),
            }
        }

        debug!(
            "Built {} provider client(s) for user {}",
            clients.len(),
            user_id
        );
        clients
    }
}
