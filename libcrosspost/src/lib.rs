//! Crosspost - publish one post to several social platforms
//!
//! This library builds provider clients (Telegram, Instagram) from a user's
//! stored credentials, posts to each in a fixed order and records what was
//! published.

pub mod config;
pub mod db;
pub mod error;
pub mod factory;
pub mod logging;
pub mod outcome;
pub mod platforms;
pub mod service;
pub mod session;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use error::{CrosspostError, PlatformError, Result};
pub use factory::{ClientSource, ProviderFactory};
pub use outcome::Outcome;
pub use platforms::ProviderClient;
pub use service::posting::PostingService;
pub use service::CrosspostService;
pub use types::{
    CredentialKind, DecodedCredential, EngagementStats, Post, PostMedia, PostWithMedia,
    PublishedPost, SocialPlatform,
};
