//! Waitline server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens the
//! SQLite store, builds the configured delivery relay, and serves the JSON
//! API over HTTP.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string for `admin_password_hash` in
//! config.toml:
//!
//! ```
//! cargo run -p waitline-api --bin server -- --hash-password
//! ```

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::Parser;
use rand_core::OsRng;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use waitline_api::{AppState, AuthConfig, ServerConfig, TokenVerifier};
use waitline_core::{
  guard::AbuseGuard, mailer::Mailer as _, service::WaitlistService,
};
use waitline_mailer::Relay;
use waitline_store_sqlite::SqliteStore;

#[derive(Parser)]
#[command(author, version, about = "Waitline enrollment server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Helper mode: hash a password and exit.
  if cli.hash_password {
    let password = read_password()?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
      .to_string();
    println!("{hash}");
    return Ok(());
  }

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("WAITLINE").separator("__"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  // Open SQLite store.
  let store = SqliteStore::open(&server_cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", server_cfg.store_path))?;

  // Build the configured delivery relay and probe it once. An unreachable
  // relay is survivable — sends will fail soft — but worth a loud warning.
  let relay = Relay::from_config(&server_cfg.relay, &server_cfg.sender)
    .context("failed to build delivery relay")?;
  if relay.test_connection().await {
    tracing::info!(relay = relay.name(), "delivery relay reachable");
  } else {
    tracing::warn!(relay = relay.name(), "delivery relay unreachable at startup");
  }

  // Wire the service.
  let store = Arc::new(store);
  let verifier = TokenVerifier::new(server_cfg.verifier.clone());
  let guard = AbuseGuard::new(server_cfg.guard_config(), verifier);
  let service = Arc::new(WaitlistService::new(store.clone(), Arc::new(relay), guard));

  let state = AppState {
    service,
    store,
    auth: Arc::new(AuthConfig {
      username:      server_cfg.admin_username.clone(),
      password_hash: server_cfg.admin_password_hash.clone(),
    }),
  };

  let app = waitline_api::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  let stdin = io::stdin();
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  stdin.lock().read_line(&mut line)?;
  Ok(
    line
      .trim_end_matches('\n')
      .trim_end_matches('\r')
      .to_string(),
  )
}
