//! `feedgate-auth` operator tool: key generation, password hashing and
//! configuration checks against the same code paths the service uses.
use std::io::{self, BufRead};
use std::path::PathBuf;

use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand};
use feedgate_auth::auth::{encode_key, generate_key, CredentialVerifier};
use feedgate_auth::config::Settings;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(name = "feedgate-auth", version, about = "feedgate session and token tooling")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a freshly generated, wire-encoded random key
    GenKey {
        #[arg(long, default_value_t = 32)]
        bytes: usize,
    },
    /// Read a password from stdin and print its hash
    HashPassword,
    /// Load and validate the configuration, then print it as JSON
    CheckConfig,
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if settings.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load_from(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    init_tracing(&settings);

    match cli.command {
        Command::GenKey { bytes } => {
            if bytes == 0 {
                bail!("--bytes must be positive");
            }
            let key = generate_key(bytes)?;
            println!("{}", encode_key(&key));
        },
        Command::HashPassword => {
            let mut line = Zeroizing::new(String::new());
            io::stdin().lock().read_line(&mut line)?;
            let password = line.trim_end_matches(['\r', '\n']);
            if password.is_empty() {
                bail!("no password on stdin");
            }
            let verifier = CredentialVerifier::new(&settings.password)?;
            let hash = verifier.hash(password)?;
            tracing::info!(log_n = settings.password.log_n, "password hashed");
            println!("{hash}");
        },
        Command::CheckConfig => {
            tracing::info!(path = %cli.config.display(), "configuration valid");
            println!("{}", serde_json::to_string_pretty(&settings)?);
        },
    }

    Ok(())
}
