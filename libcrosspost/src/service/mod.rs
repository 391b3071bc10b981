//! Service layer for Crosspost
//!
//! `CrosspostService` wires the SQLite store, the provider factory and the
//! event bus into a [`PostingService`]. Interfaces (the CLI today) talk to
//! the facade; tests usually build a `PostingService` directly from the
//! in-memory store and mock providers.
//!
//! # Example
//!
//! ```no_run
//! use libcrosspost::service::CrosspostService;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> libcrosspost::Result<()> {
//! let service = CrosspostService::new().await?;
//!
//! let outcome = service
//!     .posting()
//!     .create_post(1, "Hello", &[], &CancellationToken::new())
//!     .await;
//! println!("{}", outcome.message);
//! # Ok(())
//! # }
//! ```

pub mod events;
pub mod posting;
pub mod validation;

use std::sync::Arc;

use self::events::EventBus;
use self::posting::PostingService;
use crate::config::{resolve_db_path, Config};
use crate::db::Database;
use crate::error::Result;
use crate::factory::ProviderFactory;
use crate::platforms::telegram::VerificationCodeProvider;

#[derive(Clone)]
pub struct CrosspostService {
    db: Arc<Database>,
    config: Arc<Config>,
    posting: PostingService,
}

impl CrosspostService {
    /// Service from the default configuration file
    pub async fn new() -> Result<Self> {
        Self::from_config(Config::load()?, None).await
    }

    /// Service from an explicit configuration
    ///
    /// `codes` answers Telegram login prompts; without one, Telegram only
    /// works with an already authorized session file.
    pub async fn from_config(
        config: Config,
        codes: Option<Arc<dyn VerificationCodeProvider>>,
    ) -> Result<Self> {
        let db_path = resolve_db_path(Some(&config.database.path))?;
        let db = Arc::new(Database::new(&db_path.to_string_lossy()).await?);

        let mut factory = ProviderFactory::new(config.clone())?;
        if let Some(codes) = codes {
            factory = factory.with_code_provider(codes);
        }

        let config = Arc::new(config);
        let posting = PostingService::new(
            db.clone(),
            db.clone(),
            Arc::new(factory),
            config.clone(),
            EventBus::default(),
        );

        Ok(Self {
            db,
            config,
            posting,
        })
    }

    pub fn posting(&self) -> &PostingService {
        &self.posting
    }

    /// Direct store access (credential management)
    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        self.posting.events()
    }
}
