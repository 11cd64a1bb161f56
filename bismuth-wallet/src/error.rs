//! Error types for the wallet client.
//!
//! [`WalletError`] is what the wallet store, the transaction pipeline and the
//! client façade return. The collaborator seams (crypto, transport,
//! discovery) have their own error enums so that their causes reach the
//! caller unchanged.

use displaydoc::Display;
use thiserror::Error;

/// Errors raised by the wallet store and the client façade.
#[derive(Debug, Display, Error)]
pub enum WalletError {
    /// Operation not allowed in the current wallet state: {0}
    InvalidState(String),

    /// Password does not match
    WrongPassword,

    /// Duplicate or unknown address: {0}
    DuplicateOrUnknownAddress(String),

    /// Policy violation: {0}
    PolicyViolation(String),

    /// No reachable server available, try again later
    NoServerAvailable,

    /// Transaction rejected: {0}
    SendFailure(String),

    /// Wallet must be unlocked
    MustUnlock,

    /// No address selected
    NoAddressSelected,

    /// Invalid key file: {0}
    InvalidKeyFile(String),

    /// Invalid amount: {0}
    InvalidAmount(String),

    /// Crypto error: {0}
    Crypto(#[from] CryptoError),

    /// Server error: {0}
    Transport(#[from] TransportError),

    /// Server discovery error: {0}
    Discovery(#[from] DiscoveryError),

    /// I/O error: {0}
    Io(#[from] std::io::Error),

    /// Malformed wallet data: {0}
    Json(#[from] serde_json::Error),
}

/// Errors from the crypto collaborator.
#[derive(Debug, Display, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Invalid key material: {0}
    InvalidKey(String),

    /// Key derivation failed: {0}
    KeyDerivation(String),

    /// Encryption failed
    EncryptionFailed,

    /// Decryption failed - wrong password?
    DecryptionFailed,

    /// Malformed ciphertext: {0}
    MalformedCiphertext(String),

    /// Invalid signature: {0}
    InvalidSignature(String),
}

/// Errors from the transport collaborator.
#[derive(Debug, Display, Error)]
pub enum TransportError {
    /// Invalid server address: {0}
    InvalidAddress(String),

    /// Connection to {0} failed: {1}
    Connect(String, String),

    /// Request timed out
    Timeout,

    /// HTTP error: {0}
    Http(String),

    /// RPC error {code}: {message}
    Rpc { code: i64, message: String },

    /// Malformed reply: {0}
    MalformedReply(String),
}

impl TransportError {
    /// The server could not be reached or stopped answering, as opposed to
    /// answering with an error
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            TransportError::Connect(..) | TransportError::Timeout | TransportError::Http(_)
        )
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Http(err.to_string())
        }
    }
}

/// Errors from the discovery collaborator.
#[derive(Debug, Display, Error)]
pub enum DiscoveryError {
    /// Discovery request to {0} failed: {1}
    Request(String, String),

    /// No server list could be retrieved
    Unavailable,
}

/// Result alias used across the crate.
pub type Result<T, E = WalletError> = std::result::Result<T, E>;
