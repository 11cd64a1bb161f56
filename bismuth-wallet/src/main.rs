//! Bismuth Light Wallet CLI
//!
//! A command line wallet for the Bismuth network.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bismuth_wallet::commands::{self, Context};

#[derive(Parser)]
#[command(name = "bismuth-wallet")]
#[command(about = "Bismuth light wallet - manage your BIS from the command line")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Custom wallet file path
    #[arg(short, long, global = true)]
    wallet: Option<PathBuf>,

    /// Custom config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use this ip:port server instead of discovery
    #[arg(short, long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List wallet addresses
    Address {
        #[command(subcommand)]
        action: Option<AddressCommand>,
    },

    /// Check the balance of the selected address
    Balance {
        /// Sum over every address of the wallet
        #[arg(long)]
        all: bool,
    },

    /// Show transaction history
    History {
        /// Maximum number of transactions to show
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Number of transactions to skip
        #[arg(long, default_value = "0")]
        offset: usize,
    },

    /// Send BIS to an address
    Send {
        /// Recipient address
        recipient: String,

        /// Amount to send in BIS
        amount: String,

        /// Operation field
        #[arg(long, default_value = "")]
        operation: String,

        /// Message attached to the transaction
        #[arg(short, long, default_value = "")]
        memo: String,

        /// Skip confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Show known wallet servers
    Servers {
        /// Re-query the server list APIs first
        #[arg(long)]
        refresh: bool,
    },

    /// Show server status
    Status,

    /// Encrypt the wallet with a master password
    Encrypt,

    /// Set or clear the spend protection
    Spend {
        /// Protection kind, "None" to clear
        kind: Option<String>,

        /// Protection value
        #[arg(long, default_value = "")]
        value: String,
    },

    /// Sign, encrypt or decrypt messages
    Message {
        #[command(subcommand)]
        action: MessageCommand,
    },

    /// Look up aliases
    Alias {
        #[command(subcommand)]
        action: AliasCommand,
    },
}

#[derive(Subcommand)]
enum AddressCommand {
    /// Add an address
    New {
        #[arg(short, long, default_value = "")]
        label: String,

        /// Derive the key from a password instead of at random
        #[arg(long)]
        deterministic: bool,

        /// Salt for deterministic derivation
        #[arg(long, default_value = "")]
        salt: String,
    },

    /// Select the address to use
    Select { address: String },

    /// Change the label of an address
    Label { address: String, label: String },

    /// Import a legacy key file
    Import {
        path: PathBuf,

        #[arg(short, long, default_value = "")]
        label: String,

        /// The private key in the file is password protected
        #[arg(long)]
        encrypted: bool,
    },
}

#[derive(Subcommand)]
enum MessageCommand {
    /// Sign a message with the selected address
    Sign { message: String },

    /// Encrypt a message for an address
    Encrypt { recipient: String, message: String },

    /// Decrypt a message sent to the selected address
    Decrypt { ciphertext: String },
}

#[derive(Subcommand)]
enum AliasCommand {
    /// Show the aliases of addresses
    Resolve {
        #[arg(required = true)]
        addresses: Vec<String>,
    },

    /// Check whether an alias is registered
    Check { alias: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let ctx = Context {
        wallet: cli.wallet,
        config: cli.config,
        server: cli.server,
    };

    match cli.command {
        Commands::Address { action } => match action {
            None => commands::address::list(&ctx),
            Some(AddressCommand::New {
                label,
                deterministic,
                salt,
            }) => commands::address::new(&ctx, &label, deterministic, &salt),
            Some(AddressCommand::Select { address }) => commands::address::select(&ctx, &address),
            Some(AddressCommand::Label { address, label }) => {
                commands::address::label(&ctx, &address, &label)
            }
            Some(AddressCommand::Import {
                path,
                label,
                encrypted,
            }) => commands::address::import(&ctx, &path, &label, encrypted),
        },
        Commands::Balance { all } => commands::balance::run(&ctx, all).await,
        Commands::History { limit, offset } => commands::history::run(&ctx, limit, offset).await,
        Commands::Send {
            recipient,
            amount,
            operation,
            memo,
            yes,
        } => commands::send::run(&ctx, &recipient, &amount, &operation, &memo, yes).await,
        Commands::Servers { refresh } => commands::servers::list(&ctx, refresh).await,
        Commands::Status => commands::servers::status(&ctx).await,
        Commands::Encrypt => commands::encrypt::encrypt(&ctx),
        Commands::Spend { kind, value } => commands::encrypt::spend(&ctx, kind.as_deref(), &value),
        Commands::Message { action } => match action {
            MessageCommand::Sign { message } => commands::message::sign(&ctx, &message),
            MessageCommand::Encrypt { recipient, message } => {
                commands::message::encrypt(&ctx, &recipient, &message).await
            }
            MessageCommand::Decrypt { ciphertext } => commands::message::decrypt(&ctx, &ciphertext),
        },
        Commands::Alias { action } => match action {
            AliasCommand::Resolve { addresses } => commands::alias::resolve(&ctx, &addresses).await,
            AliasCommand::Check { alias } => commands::alias::check(&ctx, &alias).await,
        },
    }
}
