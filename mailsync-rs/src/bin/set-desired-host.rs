//! Move an account to another sync host, or toggle its sync
//!
//! # Usage
//!
//! ```bash
//! # Show the current placement only
//! set-desired-host 42 --dry-run --config mailsync.toml
//!
//! # Assign the account to sync-2
//! set-desired-host 42 --desired-host sync-2 --config mailsync.toml
//!
//! # Pause syncing (the desired host is cleared when --desired-host is omitted)
//! set-desired-host 42 --toggle-sync --db sqlite://shard0.db
//! ```

use anyhow::Context;
use clap::Parser;
use mailsync_rs::config::Config;
use mailsync_rs::model::Account;
use mailsync_rs::shard::ShardDirectory;
use mailsync_rs::store::{self, AccountStore};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "set-desired-host")]
#[command(about = "Set the desired sync host of an account", long_about = None)]
struct Cli {
    account_id: i64,

    #[arg(long)]
    desired_host: Option<String>,

    /// Print the current placement without changing anything
    #[arg(long)]
    dry_run: bool,

    /// Flip sync_should_run
    #[arg(long)]
    toggle_sync: bool,

    /// Config file listing the database shards
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database URL, instead of resolving the account's shard
    #[arg(long)]
    db: Option<String>,
}

fn print_placement(when: &str, account: &Account) {
    println!("{} sync host: {}", when, account.sync_host.as_deref().unwrap_or("None"));
    println!(
        "{} desired sync host: {}",
        when,
        account.desired_sync_host.as_deref().unwrap_or("None")
    );
    println!("{} sync should run: {}", when, account.sync_should_run);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let pool = match &cli.db {
        Some(url) => store::open(url, 1).await?,
        None => {
            let config = Config::load(cli.config.as_deref())?;
            let shards = ShardDirectory::connect(&config.database.hosts).await?;
            shards.resolve(cli.account_id)?
        }
    };

    let accounts = AccountStore::new(pool);
    let account = accounts
        .get(cli.account_id)
        .await
        .with_context(|| format!("loading account {}", cli.account_id))?;

    print_placement("Before", &account);

    if cli.dry_run {
        return Ok(());
    }

    accounts
        .set_desired_host(account.id, cli.desired_host.as_deref())
        .await?;
    if cli.toggle_sync {
        accounts.toggle_sync(account.id).await?;
    }

    let account = accounts.get(account.id).await?;
    print_placement("After", &account);

    Ok(())
}
