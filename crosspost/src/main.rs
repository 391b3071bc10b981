//! crosspost - Publish one post to Telegram and Instagram

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use libcrosspost::error::PlatformError;
use libcrosspost::logging::LoggingConfig;
use libcrosspost::platforms::telegram::VerificationCodeProvider;
use libcrosspost::service::validation::validate_post_request;
use libcrosspost::store::CredentialSource;
use libcrosspost::{
    Config, CredentialKind, CrosspostError, CrosspostService, Outcome, PostWithMedia,
    SocialPlatform,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "crosspost")]
#[command(version)]
#[command(about = "Publish one post to several social platforms", long_about = None)]
#[command(after_help = "EXIT CODES:
    0 - Success
    1 - Posting or lookup failed
    2 - Authentication error
    3 - Invalid input

CONFIGURATION:
    Reads $CROSSPOST_CONFIG, or ~/.config/crosspost/config.toml by default.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    format: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Post text and images to every configured platform
    Post {
        /// User whose credentials are used
        #[arg(short, long, env = "CROSSPOST_USER")]
        user: i64,

        /// Image to attach (repeatable, up to 10)
        #[arg(long = "file", value_name = "PATH")]
        files: Vec<PathBuf>,

        /// Caption text (reads from stdin if not provided)
        text: Option<String>,
    },

    /// Show engagement statistics for a published post
    Stats {
        #[arg(short, long, env = "CROSSPOST_USER")]
        user: i64,

        /// Platform the post lives on (telegram, instagram)
        #[arg(short, long)]
        platform: String,

        /// Remote post id
        post_id: String,
    },

    /// Print the public URL of a published post
    Link {
        #[arg(short, long, env = "CROSSPOST_USER")]
        user: i64,

        #[arg(short, long)]
        platform: String,

        post_id: String,
    },

    /// List recorded posts, newest first
    History {
        #[arg(short, long, env = "CROSSPOST_USER")]
        user: i64,

        /// Maximum number of posts
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Manage stored platform credentials
    Creds {
        #[command(subcommand)]
        command: CredsCommand,
    },
}

#[derive(Subcommand, Debug)]
enum CredsCommand {
    /// Store a credential value
    Set {
        #[arg(short, long, env = "CROSSPOST_USER")]
        user: i64,

        /// Credential kind (e.g. telegram_app_id, instagram_access_token)
        kind: String,

        /// Read the value from stdin instead of prompting
        #[arg(long)]
        stdin: bool,
    },

    /// List stored credentials (secret values are masked)
    List {
        #[arg(short, long, env = "CROSSPOST_USER")]
        user: i64,
    },

    /// Delete a stored credential
    Delete {
        #[arg(short, long, env = "CROSSPOST_USER")]
        user: i64,

        kind: String,
    },
}

/// Asks for Telegram login codes on the terminal
struct TerminalCodePrompt;

#[async_trait]
impl VerificationCodeProvider for TerminalCodePrompt {
    async fn request_code(&self, phone_number: &str) -> Result<String, PlatformError> {
        if !atty::is(atty::Stream::Stdin) {
            return Err(PlatformError::AuthenticationRequired(format!(
                "Telegram sent a login code to {} but stdin is not a terminal. \
                 Run crosspost interactively once to authorize the session.",
                phone_number
            )));
        }

        let prompt = format!("Telegram login code for {}: ", phone_number);
        tokio::task::spawn_blocking(move || rpassword::prompt_password(prompt))
            .await
            .map_err(|e| PlatformError::AuthenticationRequired(e.to_string()))?
            .map_err(|e| PlatformError::AuthenticationRequired(format!("Could not read code: {}", e)))
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.verbose).init();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            e.downcast_ref::<CrosspostError>()
                .map(CrosspostError::exit_code)
                .unwrap_or(1)
        }
    };

    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let config = Config::load()?;
    let service =
        CrosspostService::from_config(config, Some(Arc::new(TerminalCodePrompt))).await?;
    let format = cli.format;

    match cli.command {
        Commands::Post { user, files, text } => post(&service, format, user, text, files).await,
        Commands::Stats {
            user,
            platform,
            post_id,
        } => {
            let platform = parse_platform(&platform)?;
            let cancel = cancel_on_ctrl_c();
            let outcome = service
                .posting()
                .engagement_stats(user, platform, &post_id, &cancel)
                .await;
            Ok(report(format, &outcome, |stats| {
                format!(
                    "views: {}\nreactions: {}\ncomments: {}\nforwards: {}",
                    stats.views, stats.reactions, stats.comments, stats.forwards
                )
            }))
        }
        Commands::Link {
            user,
            platform,
            post_id,
        } => {
            let platform = parse_platform(&platform)?;
            let cancel = cancel_on_ctrl_c();
            let outcome = service
                .posting()
                .post_link(user, platform, &post_id, &cancel)
                .await;
            Ok(report(format, &outcome, |link| link.clone()))
        }
        Commands::History { user, limit } => {
            let history = service.posting().history(user, limit).await?;
            print_history(format, &history)?;
            Ok(0)
        }
        Commands::Creds { command } => creds(&service, format, command).await,
    }
}

async fn post(
    service: &CrosspostService,
    format: OutputFormat,
    user: i64,
    text: Option<String>,
    files: Vec<PathBuf>,
) -> Result<i32> {
    let text = match text {
        Some(text) => text,
        None if atty::is(atty::Stream::Stdin) => String::new(),
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read text from stdin")?;
            buffer.trim_end().to_string()
        }
    };

    validate_post_request(&text, &files)?;

    let cancel = cancel_on_ctrl_c();
    let outcome = service
        .posting()
        .create_post(user, &text, &files, &cancel)
        .await;

    Ok(report(format, &outcome, |_| outcome.message.clone()))
}

async fn creds(service: &CrosspostService, format: OutputFormat, command: CredsCommand) -> Result<i32> {
    let db = service.database();

    match command {
        CredsCommand::Set { user, kind, stdin } => {
            let kind = parse_kind(&kind)?;
            let value = read_credential_value(kind, stdin)?;
            if value.trim().is_empty() {
                return Err(CrosspostError::InvalidInput(format!("{} cannot be empty", kind)).into());
            }

            db.upsert_credential(user, kind, value.trim()).await?;
            debug!("Stored {} for user {}", kind, user);
            if format == OutputFormat::Json {
                println!("{}", json!({ "user": user, "kind": kind.as_str(), "stored": true }));
            } else {
                println!("Stored {} for user {}", kind, user);
            }
            Ok(0)
        }
        CredsCommand::List { user } => {
            let credentials = db.decoded_credentials_by_user_id(user).await?;
            let rows: Vec<(CredentialKind, String)> = credentials
                .iter()
                .map(|c| {
                    let shown = if c.kind.is_secret() {
                        "********".to_string()
                    } else {
                        c.value.clone()
                    };
                    (c.kind, shown)
                })
                .collect();

            if format == OutputFormat::Json {
                let items: Vec<_> = rows
                    .iter()
                    .map(|(kind, value)| json!({ "kind": kind.as_str(), "value": value }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else if rows.is_empty() {
                println!("No credentials stored for user {}", user);
            } else {
                for (kind, value) in rows {
                    println!("{:<24} {}", kind.as_str(), value);
                }
            }
            Ok(0)
        }
        CredsCommand::Delete { user, kind } => {
            let kind = parse_kind(&kind)?;
            if !db.delete_credential(user, kind).await? {
                eprintln!("No {} stored for user {}", kind, user);
                return Ok(1);
            }
            if format == OutputFormat::Json {
                println!("{}", json!({ "user": user, "kind": kind.as_str(), "deleted": true }));
            } else {
                println!("Deleted {} for user {}", kind, user);
            }
            Ok(0)
        }
    }
}

fn read_credential_value(kind: CredentialKind, use_stdin: bool) -> Result<String> {
    if use_stdin || !atty::is(atty::Stream::Stdin) {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read credential from stdin")?;
        return Ok(buffer);
    }

    let prompt = format!("{}: ", kind);
    if kind.is_secret() {
        return Ok(rpassword::prompt_password(&prompt)?);
    }

    print!("{}", prompt);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input)
}

fn parse_platform(value: &str) -> Result<SocialPlatform> {
    value
        .parse()
        .map_err(|e: String| CrosspostError::InvalidInput(e).into())
}

fn parse_kind(value: &str) -> Result<CredentialKind> {
    value
        .parse()
        .map_err(|e: libcrosspost::error::CredentialError| {
            CrosspostError::InvalidInput(e.to_string()).into()
        })
}

/// Token cancelled on Ctrl+C
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    token
}

/// Print an outcome and return the exit code
fn report<T: serde::Serialize>(
    format: OutputFormat,
    outcome: &Outcome<T>,
    text: impl FnOnce(&T) -> String,
) -> i32 {
    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(outcome) {
            Ok(body) => println!("{}", body),
            Err(e) => eprintln!("Error: {}", e),
        },
        OutputFormat::Text if outcome.success => {
            if let Some(payload) = &outcome.payload {
                println!("{}", text(payload));
            }
        }
        OutputFormat::Text => eprintln!("Error: {}", outcome.message),
    }

    outcome.exit_code()
}

fn print_history(format: OutputFormat, history: &[PostWithMedia]) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(history)?);
        return Ok(());
    }

    if history.is_empty() {
        println!("No posts recorded");
        return Ok(());
    }

    for entry in history {
        let when = chrono::DateTime::from_timestamp(entry.post.date_posted, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| entry.post.date_posted.to_string());
        println!("#{} {}", entry.post.id, when);
        for media in &entry.media {
            println!(
                "  {:<10} {} / {}",
                media.platform.as_str(),
                media.channel_id,
                media.remote_message_id
            );
        }
    }
    Ok(())
}
