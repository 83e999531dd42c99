use crate::cli::Cli;
use anyhow::{bail, Result};
use std::path::Path;
use trickle_common::utils::config::load_config_or_default;
use trickle_faucet::config::LedgerBackend;
use trickle_faucet::FaucetConfig;

/// File, then environment, then command line.
pub fn load_faucet_config<P: AsRef<Path>>(path: P, args: &Cli) -> Result<FaucetConfig> {
    let mut config: FaucetConfig = load_config_or_default(path)?;
    config.apply_env();
    apply_cli_overrides(&mut config, args)?;
    Ok(config)
}

fn apply_cli_overrides(config: &mut FaucetConfig, args: &Cli) -> Result<()> {
    if let Some(addr) = &args.addr {
        config.server.addr = addr.clone();
    }

    if let Some(backend) = &args.ledger {
        config.ledger.backend = match backend.to_lowercase().as_str() {
            "memory" => LedgerBackend::Memory,
            "sled" => LedgerBackend::Sled,
            other => bail!("Unknown ledger backend '{}', expected memory or sled", other),
        };
    }

    if let Some(path) = &args.db_path {
        config.ledger.db_path = path.clone();
    }

    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }

    if args.debug {
        config.logging.level = "debug".to_string();
    }

    Ok(())
}

/// Effective configuration as JSON, credentials replaced
pub fn redacted(config: &FaucetConfig) -> Result<serde_json::Value> {
    let mut config = config.clone();
    if config.payout.api_key.is_some() {
        config.payout.api_key = Some("<redacted>".to_string());
    }
    if config.auth.supabase_anon_key.is_some() {
        config.auth.supabase_anon_key = Some("<redacted>".to_string());
    }
    let token_count = config.auth.static_tokens.len();
    config.auth.static_tokens = (0..token_count)
        .map(|i| (format!("<token {}>", i), "<redacted>".to_string()))
        .collect();
    Ok(serde_json::to_value(&config)?)
}
