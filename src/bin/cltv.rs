//! CLTV Command Line
//!
//! Inspect redeem scripts and drive the locked output service directly.
//!
//! Usage:
//!   cltv parse <script_hex> [--network <name>]
//!   cltv verify <address> <script_hex> [--network <name>]
//!   cltv register <address> <script_hex>
//!   cltv list [account]
//!   cltv spend <from> <to> [--amount <sats>]

use cltv_wallet::common::{init_from_config, Network, WalletConfig};
use cltv_wallet::redemption::LockedOutputService;
use cltv_wallet::script::{self, wrap_address, ScriptMode};
use cltv_wallet::types::SpendAmount;
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
        "parse" => cmd_parse(&args[2..]),
        "verify" => cmd_verify(&args[2..]),
        "register" => cmd_register(&args[2..]).await,
        "list" => cmd_list(&args[2..]).await,
        "spend" => cmd_spend(&args[2..]).await,
        "help" | "--help" | "-h" => print_usage(),
        _ => print_usage(),
    }
}

fn print_usage() {
    println!("cltv - CLTV locked output tool");
    println!();
    println!("Usage:");
    println!("  cltv parse <script_hex> [--network <name>]             Decode a redeem script");
    println!("  cltv verify <address> <script_hex> [--network <name>]  Check an address wraps a script");
    println!("  cltv register <address> <script_hex>                   Register a locked output");
    println!("  cltv list [account]                                    List locked outputs");
    println!("  cltv spend <from> <to> [--amount <sats>]               Spend a locked output");
    println!();
    println!("Examples:");
    println!("  cltv parse 0320a107b17521...ac --network testnet");
    println!("  cltv spend tb1q... tb1q... --amount 50000");
    println!();
    println!("Environment:");
    println!("  CLTV_NETWORK       Network (default: mainnet)");
    println!("  CLTV_SIGNER_KEY    Hex-encoded signing key");
    println!("  CLTV_ESPLORA_URL   Esplora API URL");
}

/// Value following `flag`, if present
fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

/// Arguments that are neither flags nor flag values
fn positional(args: &[String]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i].starts_with("--") {
            i += 2;
        } else {
            out.push(args[i].as_str());
            i += 1;
        }
    }
    out
}

fn network_arg(args: &[String]) -> Option<Network> {
    let name = flag_value(args, "--network")
        .map(str::to_string)
        .or_else(|| env::var("CLTV_NETWORK").ok())
        .unwrap_or_else(|| "mainnet".to_string());

    match name.parse() {
        Ok(network) => Some(network),
        Err(e) => {
            println!("Error: {}", e);
            None
        }
    }
}

fn decode_hex(script_hex: &str) -> Option<Vec<u8>> {
    match hex::decode(script_hex) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            println!("Error: Invalid script hex: {}", e);
            None
        }
    }
}

fn cmd_parse(args: &[String]) {
    let positional = positional(args);
    let Some(script_hex) = positional.first() else {
        println!("Usage: cltv parse <script_hex> [--network <name>]");
        return;
    };
    let Some(network) = network_arg(args) else {
        return;
    };
    let Some(bytes) = decode_hex(script_hex) else {
        return;
    };

    let redeem = match script::parse(&bytes) {
        Ok(redeem) => redeem,
        Err(e) => {
            println!("Error: {}", e);
            return;
        }
    };

    println!("=== Redeem Script ===");
    println!("Kind:       {}", redeem.kind());
    println!("Lock Time:  {}", redeem.lock_time());
    println!("Signatures: {}", redeem.required_signatures());

    let script = bitcoin::Script::from_bytes(&bytes);
    for mode in [ScriptMode::Legacy, ScriptMode::Segwit] {
        match wrap_address(script, mode, network.bitcoin_network()) {
            Ok(address) => println!("{:<11} {}", format!("{}:", mode), address),
            Err(e) => println!("{:<11} {}", format!("{}:", mode), e),
        }
    }

    println!();
    match serde_json::to_string_pretty(&redeem) {
        Ok(json) => println!("{}", json),
        Err(e) => println!("Error: {}", e),
    }
}

fn cmd_verify(args: &[String]) {
    let positional = positional(args);
    if positional.len() < 2 {
        println!("Usage: cltv verify <address> <script_hex> [--network <name>]");
        return;
    }
    let Some(network) = network_arg(args) else {
        return;
    };
    let Some(bytes) = decode_hex(positional[1]) else {
        return;
    };

    if script::verify(positional[0], &bytes, network.bitcoin_network()) {
        println!("OK: {} wraps the script", positional[0]);
    } else {
        println!("MISMATCH: {} does not wrap the script on {:?}", positional[0], network);
    }
}

/// Service built from the environment
fn load_service() -> Option<LockedOutputService> {
    let config = match WalletConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            println!("Configuration error: {}", e);
            return None;
        }
    };

    if let Err(e) = init_from_config(&config) {
        eprintln!("Warning: {}", e);
    }

    match config.service() {
        Ok(service) => Some(service),
        Err(e) => {
            println!("Error: {}", e);
            None
        }
    }
}

async fn cmd_register(args: &[String]) {
    if args.len() < 2 {
        println!("Usage: cltv register <address> <script_hex>");
        return;
    }
    let Some(service) = load_service() else {
        return;
    };

    match service.register(&args[0], &args[1], None).await {
        Ok(lock_time) => {
            println!("Registered {} (lock time {})", args[0], lock_time);
            println!("Account: {}", service.default_account());
        }
        Err(e) => println!("Error [{}]: {}", e.code(), e),
    }
}

async fn cmd_list(args: &[String]) {
    let Some(service) = load_service() else {
        return;
    };
    let account = args.first().map(String::as_str);

    match service.list(account).await {
        Ok(outputs) if outputs.is_empty() => {
            println!("No locked outputs for {}", account.unwrap_or(service.default_account()));
        }
        Ok(outputs) => {
            println!("=== Locked Outputs ({}) ===", outputs.len());
            for (address, output) in &outputs {
                println!();
                println!("Address:   {}", address);
                println!("Lock Time: {}", output.lock_time);
                println!("Script:    {}", output.script);
            }
        }
        Err(e) => println!("Error [{}]: {}", e.code(), e),
    }
}

async fn cmd_spend(args: &[String]) {
    let positional = positional(args);
    if positional.len() < 2 {
        println!("Usage: cltv spend <from> <to> [--amount <sats>]");
        return;
    }

    let amount = match flag_value(args, "--amount") {
        None => SpendAmount::Sweep,
        Some(value) => match value.parse() {
            Ok(sats) => SpendAmount::Exact(sats),
            Err(_) => {
                println!("Error: Invalid amount");
                return;
            }
        },
    };

    let Some(service) = load_service() else {
        return;
    };

    println!("Spending {} -> {}", positional[0], positional[1]);

    match service.spend(positional[0], positional[1], amount, None).await {
        Ok(receipt) => {
            println!();
            println!("=== Broadcast ===");
            println!("TXID:   {}", receipt.txid);
            println!("Sent:   {} sats", receipt.send_amount);
            println!("Fee:    {} sats", receipt.fee);
            if let Some(change) = receipt.change {
                println!("Change: {} sats", change);
            }
        }
        Err(e) => println!("Error [{}]: {}", e.code(), e),
    }
}
