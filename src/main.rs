//! CLTV Wallet - JSON-RPC server
//!
//! Run modes:
//!   cargo run                    - Show usage
//!   cargo run -- api             - Start the JSON-RPC API
//!   cargo run -- keygen          - Generate a signing key

use cltv_wallet::api;
use cltv_wallet::chain::{Signer, SingleKeySigner};
use cltv_wallet::common::{init_from_config, WalletConfig};
use std::env;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return;
    }

    match args[1].as_str() {
        "api" => run_api_server(&args[2..]).await,
        "keygen" => cmd_keygen(),
        "help" | "--help" | "-h" => print_usage(),
        _ => print_usage(),
    }
}

fn print_usage() {
    println!("CLTV Wallet - Locked Output Service");
    println!();
    println!("Usage:");
    println!("  cltv-wallet api [--port <port>]    Start JSON-RPC server (default: 3001)");
    println!("  cltv-wallet keygen                 Generate a new signing key");
    println!();
    println!("Environment Variables:");
    println!("  CLTV_NETWORK          mainnet | testnet | signet | regtest");
    println!("  CLTV_SIGNER_KEY       Hex-encoded signing key (required on mainnet)");
    println!("  CLTV_ESPLORA_URL      Esplora API endpoint");
    println!("  CLTV_STORE            memory | sqlite");
    println!("  CLTV_DB_PATH          SQLite database path");
    println!("  CLTV_API_PORT         JSON-RPC port (default: 3001)");
}

/// Start the JSON-RPC server
async fn run_api_server(args: &[String]) {
    let config = match WalletConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return;
        }
    };

    if let Err(e) = init_from_config(&config) {
        eprintln!("Warning: {}", e);
    }

    let mut port = config.api_port;

    // Parse arguments
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--port" if i + 1 < args.len() => {
                port = args[i + 1].parse().unwrap_or(config.api_port);
                i += 2;
            }
            _ => i += 1,
        }
    }

    config.print_summary();

    let service = match config.service() {
        Ok(service) => service,
        Err(e) => {
            eprintln!("Failed to start service: {}", e);
            return;
        }
    };

    tracing::info!(target: "cltv::api", port, network = %service.network(), "starting JSON-RPC server");

    if let Err(e) = api::start_server(service, port).await {
        eprintln!("API server error: {}", e);
    }
}

fn cmd_keygen() {
    let signer = SingleKeySigner::generate();

    println!("=== New Signing Key Generated ===");
    println!();
    println!("Public Key: {}", signer.public_key());
    println!("Secret Key: {}", signer.secret_hex());
    println!();
    println!("IMPORTANT: Save the secret key securely!");
    println!();
    println!("To use this key, set:");
    println!("  export CLTV_SIGNER_KEY={}", signer.secret_hex());
}
