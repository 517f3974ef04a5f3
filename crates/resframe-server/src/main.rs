//! `resframe` server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the SQLite
//! store, and either serves the JSON API or runs the bulk loader.
//!
//! ```text
//! resframe serve
//! resframe load --dataset seed.json --with-achievements
//! resframe load --dataset seed.json --clear
//! resframe hash-password
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::{Parser, Subcommand};
use rand_core::OsRng;
use resframe_core::{
  permission::GrantTable,
  seed::{Dataset, LoadOptions, LoadReport, Loader, PhaseReport, section_breakdown},
  service::Framework,
  store::FrameworkStore,
};
use resframe_server::{AppState, ServerConfig};
use resframe_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Results framework server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the JSON API over HTTP.
  Serve,

  /// Load a seed dataset into the store.
  Load {
    /// JSON dataset with `sections`, `indicators`, `achievements`, `grants`.
    #[arg(long)]
    dataset: PathBuf,

    /// Soft-delete the existing hierarchy first.
    #[arg(long)]
    clear: bool,

    /// Also load the `achievements` phase.
    #[arg(long)]
    with_achievements: bool,
  },

  /// Print the argon2 hash for a password entered on stdin and exit.
  HashPassword,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if let Command::HashPassword = cli.command {
    let password = read_password()?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
      .to_string();
    println!("{hash}");
    return Ok(());
  }

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("RESFRAME"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  for role in server_cfg.all_roles() {
    store
      .add_role(&role)
      .await
      .with_context(|| format!("failed to register role {role:?}"))?;
  }

  match cli.command {
    Command::Serve => serve(store, server_cfg).await,
    Command::Load { dataset, clear, with_achievements } => {
      load(&store, &dataset, LoadOptions { clear, with_achievements }).await
    }
    Command::HashPassword => Ok(()),
  }
}

async fn serve(store: SqliteStore, config: ServerConfig) -> anyhow::Result<()> {
  let grants = GrantTable::load(&store)
    .await
    .context("failed to load permission grants")?;

  let state = AppState {
    framework: Framework::new(Arc::new(store), grants),
    config:    Arc::new(config.clone()),
  };

  let app = resframe_server::router(state);
  let address = format!("{}:{}", config.host, config.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

async fn load(
  store: &SqliteStore,
  path: &Path,
  options: LoadOptions,
) -> anyhow::Result<()> {
  let text = std::fs::read_to_string(path)
    .with_context(|| format!("reading dataset {}", path.display()))?;
  let dataset = Dataset::from_json(&text)
    .with_context(|| format!("parsing dataset {}", path.display()))?;

  let report = Loader::new(store)
    .run(&dataset, options)
    .await
    .context("load failed")?;
  print_report(&report);

  println!();
  println!("Live sections:");
  for (section, indicators) in section_breakdown(store).await? {
    println!("  {:>5}  {:<48} {indicators} indicator(s)", section.id, section.name);
  }
  Ok(())
}

fn print_report(report: &LoadReport) {
  if let Some(c) = &report.cleared {
    println!(
      "cleared       {} section(s), {} indicator(s), {} achievement(s)",
      c.sections, c.indicators, c.achievements
    );
  }
  print_phase("sections", &report.sections);
  print_phase("indicators", &report.indicators);
  if let Some(a) = &report.achievements {
    print_phase("achievements", a);
  }
  print_phase("grants", &report.grants);
  if !report.warnings.is_empty() {
    println!("{} record(s) skipped with warnings", report.warnings.len());
  }
}

fn print_phase(name: &str, p: &PhaseReport) {
  println!(
    "{name:<13} inserted {:>4}  duplicates {:>4}  orphaned {:>4}  invalid {:>4}  retired {:>4}",
    p.inserted, p.duplicates, p.orphaned, p.invalid, p.retired
  );
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  let stdin = io::stdin();
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  stdin.lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
