//! `wallet-guard` command-line interface
//!
//! Runs single security checks against the core and prints a JSON envelope
//! `{"success", "data", "error", "http_status"}` on stdout. Logs go to stderr.
//!
//! Exit status: 0 on success, 2 when a check rejects the input, 1 on usage,
//! configuration or I/O errors.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use wallet_guard::utils::logging::{init_logging, LogFormat};
use wallet_guard::{
    ApiResponse, ErrorCode, GuardConfig, GuardError, NetworkManager, SecurityManager, Transaction,
};

/// Wallet Guard - security checks for wallet transactions, URLs and RPC endpoints.
#[derive(Parser, Debug)]
#[command(name = "wallet-guard")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log output format (pretty or json)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a transaction read from a JSON file (`-` for stdin)
    VerifyTx {
        input: String,
    },

    /// Check a URL against the phishing heuristics
    CheckUrl {
        url: String,
    },

    /// Sanitize free text
    Sanitize {
        text: String,
    },

    /// Look for scam keywords in page content
    CheckContent {
        text: String,
    },

    /// Validate an RPC endpoint (whitelist, https, live TLS handshake)
    ValidateRpc {
        url: String,
    },

    /// Print the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() { ExitCode::from(1) } else { ExitCode::SUCCESS };
        }
    };

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            let response: ApiResponse<Value> = ApiResponse::err(e);
            println!("{}", response.to_json());
            return ExitCode::from(1);
        }
    };

    init_logging(
        &config.logging.level,
        cli.log_format.unwrap_or(config.logging.format),
    );

    match run(cli.command, config).await {
        Ok(response) => {
            println!("{}", response.to_json());
            exit_code(&response)
        }
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            let response: ApiResponse<Value> = ApiResponse::err(GuardError::internal(format!("{:#}", e)));
            println!("{}", response.to_json());
            ExitCode::from(1)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<GuardConfig, GuardError> {
    match path {
        Some(path) => Ok(GuardConfig::load(path)?),
        None => Ok(GuardConfig::default()),
    }
}

fn exit_code(response: &ApiResponse<Value>) -> ExitCode {
    match &response.error {
        None => ExitCode::SUCCESS,
        Some(e) if e.is(ErrorCode::Config) || e.is(ErrorCode::Internal) => ExitCode::from(1),
        Some(_) => ExitCode::from(2),
    }
}

fn respond(result: Result<Value, GuardError>) -> ApiResponse<Value> {
    match result {
        Ok(data) => ApiResponse::ok(data),
        Err(e) => ApiResponse::err(e),
    }
}

async fn run(command: Commands, config: GuardConfig) -> anyhow::Result<ApiResponse<Value>> {
    let security = Arc::new(SecurityManager::new(config.security.clone())?);

    let response = match command {
        Commands::VerifyTx { input } => {
            let payload = read_input(&input)?;
            let result = serde_json::from_str::<Transaction>(&payload)
                .map_err(GuardError::from)
                .and_then(|tx| security.verify_transaction(&tx))
                .map(|valid| json!({ "valid": valid }));
            respond(result)
        }

        Commands::CheckUrl { url } => {
            let result = security
                .check_phishing(&url)
                .map(|safe| json!({ "url": url, "safe": safe }));
            respond(result)
        }

        Commands::Sanitize { text } => {
            let result = security.sanitize(&text);
            ApiResponse::ok(json!({
                "value": result.value,
                "modified": result.was_modified,
                "modifications": result.modifications,
            }))
        }

        Commands::CheckContent { text } => {
            let scam = security.analyze_content(&text);
            ApiResponse::ok(json!({ "scam": scam }))
        }

        Commands::ValidateRpc { url } => {
            let network = NetworkManager::with_rustls(security.clone(), config.network.clone())?;
            let result = network
                .validate_rpc_endpoint(&url)
                .await
                .map(|valid| json!({ "url": url, "valid": valid }));
            respond(result)
        }

        Commands::ShowConfig => {
            let warnings = config.security.warnings();
            ApiResponse::ok(json!({
                "config": serde_json::to_value(&config)?,
                "warnings": warnings,
            }))
        }
    };

    Ok(response)
}

/// Read a file, or stdin for `-`
fn read_input(input: &str) -> anyhow::Result<String> {
    if input == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read stdin")?;
        return Ok(buffer);
    }
    std::fs::read_to_string(input).with_context(|| format!("failed to read {}", input))
}
