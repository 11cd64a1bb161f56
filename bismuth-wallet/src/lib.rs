//! Bismuth Light Wallet
//!
//! A wallet client that keeps its keys locally and talks to untrusted
//! wallet servers over JSON-RPC.
//!
//! ## Security Model
//!
//! - Private keys never leave the wallet
//! - Encrypted wallets keep every address sealed at rest
//! - Transaction signing happens locally
//! - Servers are interchangeable; a failing one is dropped and another
//!   selected on the next command
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the binary.

pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod directory;
pub mod discovery;
pub mod error;
pub mod keys;
pub mod storage;
pub mod transaction;
pub mod transport;
pub mod wallet;

pub mod commands;

pub use client::{Balance, ClientInfo, Collaborators, ServerStatus, WalletClient};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ClientConfig;
pub use crypto::{CryptoProvider, StandardCrypto};
pub use directory::ServerDirectory;
pub use discovery::{Discovery, HttpDiscovery, ServerInfo};
pub use error::{CryptoError, DiscoveryError, Result, TransportError, WalletError};
pub use keys::{AddressRecord, KeyPair, PrivateKey};
pub use transaction::{SendOutcome, TransactionEntry, TransactionPipeline};
pub use transport::{Connection, JsonRpcTransport, Transport};
pub use wallet::{WalletInfo, WalletStore};
