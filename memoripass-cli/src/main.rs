//! Memoripass maintenance tool
//!
//! Diagnostics and master key lifecycle against the OS keyring. There is no
//! decrypt command: plaintext only leaves the vault through an authenticated
//! session in the app.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use memoripass_core::config::{load_config, save_config, VaultConfig};
use memoripass_core::crypto::EncryptionEngine;
use memoripass_core::keystore::{KeyCustodian, KeyringStore};
use memoripass_core::AuditEvent;
use serde::Serialize;
use tracing::{info, warn};

/// Memoripass vault maintenance
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the vault configuration file
    #[arg(short, long, default_value = "memoripass.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show key store and cipher details as JSON
    Info,
    /// Create the master key if it does not exist yet
    Init,
    /// Read one secret from stdin and print its envelope
    Encrypt,
    /// Encrypt and decrypt a probe value to check the key works
    Selftest,
    /// Replace the master key. Every stored entry becomes unreadable.
    RotateKey {
        /// Confirm that existing entries will be lost
        #[arg(long)]
        yes: bool,
    },
    /// Delete the master key. Every stored entry becomes unreadable.
    DeleteKey {
        /// Confirm that existing entries will be lost
        #[arg(long)]
        yes: bool,
    },
    /// Write the effective configuration to the config path
    WriteConfig,
}

#[derive(Serialize)]
struct SelftestReport {
    key_present: bool,
    hardware_backed: bool,
    envelope_len: usize,
    round_trip: bool,
}

fn custodian(config: &VaultConfig) -> Arc<KeyCustodian> {
    Arc::new(KeyCustodian::with_options(
        KeyringStore::with_service(&config.keystore.service),
        &config.keystore.alias,
        config.key_policy(),
        config.keystore.prefer_hardware,
    ))
}

fn read_secret() -> Result<String> {
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read secret from stdin")?;
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(line)
}

fn selftest(engine: &EncryptionEngine) -> Result<SelftestReport> {
    const PROBE: &str = "memoripass-selftest";

    let envelope = engine.encrypt(PROBE).context("Encryption failed")?;
    let opened = engine.decrypt(&envelope).context("Decryption failed")?;

    Ok(SelftestReport {
        key_present: engine.is_available(),
        hardware_backed: engine.custodian().is_hardware_backed(),
        envelope_len: envelope.as_str().len(),
        round_trip: opened.as_str() == PROBE,
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "memoripass=info,memoripass_core=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;
    let custodian = custodian(&config);
    let engine = EncryptionEngine::new(Arc::clone(&custodian));

    match args.command {
        Command::Info => {
            println!("{}", serde_json::to_string_pretty(&engine.info())?);
        }
        Command::Init => {
            if custodian.exists() {
                info!("Master key already present");
            } else {
                custodian.generate().context("Failed to generate master key")?;
                info!("Master key created");
            }
        }
        Command::Encrypt => {
            let mut secret = read_secret()?;
            let envelope = engine
                .encrypt_and_clear(&mut secret)
                .context("Failed to encrypt secret")?;
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", envelope.as_str())?;
        }
        Command::Selftest => {
            let report = selftest(&engine)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.round_trip {
                bail!("Self-test round trip mismatch");
            }
        }
        Command::RotateKey { yes } => {
            if !yes {
                bail!("Rotating the master key destroys every stored entry; pass --yes to confirm");
            }
            warn!("Rotating master key");
            engine.rotate_key().context("Failed to rotate master key")?;
            info!("{}", AuditEvent::KeyRotated);
        }
        Command::DeleteKey { yes } => {
            if !yes {
                bail!("Deleting the master key destroys every stored entry; pass --yes to confirm");
            }
            custodian.delete().context("Failed to delete master key")?;
            info!("{}", AuditEvent::KeyDeleted);
        }
        Command::WriteConfig => {
            save_config(&args.config, &config)
                .with_context(|| format!("Failed to write config to {:?}", args.config))?;
            info!("Configuration written to {:?}", args.config);
        }
    }

    Ok(())
}
