//! Clear heartbeat entries so folders are treated as never synced
//!
//! # Usage
//!
//! ```bash
//! # Every folder and device of account 5
//! clear-heartbeat -a 5
//!
//! # One folder, one device, on a remote registry
//! clear-heartbeat -H registry.internal -p 7480 -a 5 -f 3 -d 0
//! ```

use clap::Parser;
use mailsync_rs::heartbeat::{HeartbeatClient, HeartbeatRegistry, HeartbeatSelector};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "clear-heartbeat")]
#[command(about = "Clear heartbeat status for an account", long_about = None)]
struct Cli {
    /// Registry host
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Registry port
    #[arg(short, long, default_value_t = 7480)]
    port: u16,

    #[arg(short, long)]
    account_id: i64,

    /// Only this folder (default: every folder)
    #[arg(short, long)]
    folder_id: Option<i64>,

    /// Only this device (default: every device)
    #[arg(short, long)]
    device_id: Option<i64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let registry = HeartbeatClient::new(format!("{}:{}", cli.host, cli.port));
    let selector = HeartbeatSelector::new(cli.account_id, cli.folder_id, cli.device_id);

    println!("Clearing heartbeat status...");
    match registry.clear(&selector).await {
        Ok(cleared) => {
            println!("{} folders cleared.", cleared);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
