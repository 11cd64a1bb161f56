//! CLI Commands
//!
//! Implementation of all wallet CLI commands.

pub mod address;
pub mod alias;
pub mod balance;
pub mod encrypt;
pub mod history;
pub mod message;
pub mod send;
pub mod servers;

use anyhow::{Context as _, Result};
use std::io::{self, Write};
use std::path::PathBuf;

use crate::client::{Collaborators, WalletClient};
use crate::config::ClientConfig;

/// Options shared by every command
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub wallet: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub server: Option<String>,
}

impl Context {
    /// Configuration file, then command line overrides
    pub fn config(&self) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => {
                let path = ClientConfig::default_path();
                if path.exists() {
                    ClientConfig::from_file(&path)?
                } else {
                    ClientConfig::default()
                }
            }
        };

        if let Some(wallet) = &self.wallet {
            config.wallet_file = wallet.clone();
        }
        if let Some(server) = &self.server {
            config.servers = vec![server.clone()];
        }
        config.validate()?;
        Ok(config)
    }

    /// Open the client without unlocking
    pub fn open(&self) -> Result<WalletClient> {
        let config = self.config()?;
        if let Some(parent) = config.wallet_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let collaborators = Collaborators::standard(&config)?;
        Ok(WalletClient::open(&config, collaborators)?)
    }

    /// Open the client, asking for the master password if the wallet is
    /// encrypted
    pub fn open_unlocked(&self) -> Result<WalletClient> {
        let mut client = self.open()?;
        if client.wallet().is_locked() {
            let password = prompt_password("Enter wallet password: ")?;
            client.unlock(&password)?;
        }
        Ok(client)
    }
}

/// Prompt for password input (hidden)
pub fn prompt_password(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let password = rpassword::read_password()?;
    Ok(password)
}

/// Prompt for a new password twice
pub fn prompt_new_password(prompt: &str) -> Result<String> {
    let password = prompt_password(prompt)?;
    let confirm = prompt_password("Confirm password: ")?;
    if password != confirm {
        anyhow::bail!("Passwords do not match");
    }
    Ok(password)
}

/// Prompt for confirmation
pub fn prompt_confirm(message: &str) -> Result<bool> {
    print!("{} [y/N]: ", message);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(input.trim().eq_ignore_ascii_case("y") || input.trim().eq_ignore_ascii_case("yes"))
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("\x1b[31mError:\x1b[0m {}", message);
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("\x1b[32m{}\x1b[0m", message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("\x1b[33mWarning:\x1b[0m {}", message);
}
