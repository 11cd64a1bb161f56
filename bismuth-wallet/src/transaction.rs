//! Transaction Building and Signing
//!
//! Builds, signs and evaluates ledger transactions for the wallet.
//! All signing happens locally - private keys never leave the wallet.
//!
//! A transaction is the tuple `(timestamp, sender, recipient, amount,
//! operation, memo)`. Timestamps are float seconds with two decimals and
//! amounts carry eight decimals. The transaction id is the first 56
//! characters of the signature.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};

use crate::clock::Clock;
use crate::crypto::CryptoProvider;
use crate::error::{Result, TransportError, WalletError};
use crate::keys::AddressRecord;

/// Smallest units per BIS
pub const UNITS_PER_BIS: u64 = 100_000_000;

/// Decimals in an amount
pub const AMOUNT_DECIMALS: u32 = 8;

/// Length of a transaction id
pub const TXID_LEN: usize = 56;

/// Safety margin subtracted along with a positive clock drift (seconds)
pub const DRIFT_MARGIN: f64 = 0.1;

/// Server command that inserts a transaction into the mempool
pub const SUBMIT_COMMAND: &str = "mpinsert";

/// Reply marker for an accepted transaction
const SUCCESS_MARKER: &str = "Success";

/// Recipients that refuse transactions without a memo (exchanges)
pub const MEMO_REQUIRED: &[&str] = &[
    "f6c0363ca1c5aa28cc584252e65a63998493ff0a5ec1bb16beda9bac",
    "49ca873779b36c4a503562ebf5697fca331685d79fd3deef64a46888",
    "edf2d63cdf0b6275ead22c9e6d66aa8ea31dc0ccb367fad2e7c08a25",
];

/// The signed part of a transaction, already in wire formatting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxPayload {
    /// `%.2f` unix seconds
    pub timestamp: String,
    pub sender: String,
    pub recipient: String,
    /// `%.8f` BIS
    pub amount: String,
    pub operation: String,
    pub memo: String,
}

impl TxPayload {
    /// Bytes covered by the signature: the six fields as a JSON array
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::json!([
            self.timestamp,
            self.sender,
            self.recipient,
            self.amount,
            self.operation,
            self.memo,
        ])
        .to_string()
        .into_bytes()
    }
}

/// A transaction ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub payload: TxPayload,
    pub signature: String,
    /// Base64 of the sender's public key string
    pub public_key: String,
    pub txid: String,
}

impl SignedTransaction {
    /// Arguments for [`SUBMIT_COMMAND`]: a single eight-field tuple
    pub fn submission_args(&self) -> Vec<Value> {
        let p = &self.payload;
        vec![serde_json::json!([
            p.timestamp,
            p.sender,
            p.recipient,
            p.amount,
            self.signature,
            self.public_key,
            p.operation,
            p.memo,
        ])]
    }
}

/// What became of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Accepted { txid: String },
    Failed { reason: String },
}

impl SendOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SendOutcome::Accepted { .. })
    }

    /// `Failed` becomes [`WalletError::SendFailure`]
    pub fn into_result(self) -> Result<String> {
        match self {
            SendOutcome::Accepted { txid } => Ok(txid),
            SendOutcome::Failed { reason } => Err(WalletError::SendFailure(reason)),
        }
    }
}

/// Builds and signs transactions, and judges server replies.
pub struct TransactionPipeline {
    crypto: Arc<dyn CryptoProvider>,
    clock: Arc<dyn Clock>,
}

impl TransactionPipeline {
    pub fn new(crypto: Arc<dyn CryptoProvider>, clock: Arc<dyn Clock>) -> Self {
        Self { crypto, clock }
    }

    /// Does `recipient` require a memo
    pub fn requires_memo(recipient: &str) -> bool {
        MEMO_REQUIRED.contains(&recipient)
    }

    /// Reject transactions a recipient is known to refuse
    pub fn check_policy(recipient: &str, memo: &str) -> Result<()> {
        if Self::requires_memo(recipient) && memo.trim().is_empty() {
            return Err(WalletError::PolicyViolation(format!(
                "{recipient} requires a message"
            )));
        }
        Ok(())
    }

    /// Local time corrected for a positive `drift` (local minus server
    /// time), rounded to two decimals
    pub fn timestamp(&self, drift: f64) -> f64 {
        let mut timestamp = self.clock.now();
        if drift > 0.0 {
            timestamp -= drift + DRIFT_MARGIN;
        }
        (timestamp * 100.0).round() / 100.0
    }

    /// Check policy, stamp and sign a transaction from `sender`
    pub fn build_and_sign(
        &self,
        sender: &AddressRecord,
        recipient: &str,
        amount: u64,
        operation: &str,
        memo: &str,
        drift: f64,
    ) -> Result<SignedTransaction> {
        Self::check_policy(recipient, memo)?;

        let payload = TxPayload {
            timestamp: format!("{:.2}", self.timestamp(drift)),
            sender: sender.address.clone(),
            recipient: recipient.to_string(),
            amount: format_amount(amount),
            operation: operation.to_string(),
            memo: memo.to_string(),
        };

        let signature = self.crypto.sign(&payload, &sender.private_key)?;
        let txid: String = signature.chars().take(TXID_LEN).collect();
        debug!("Signed transaction {} at {}", txid, payload.timestamp);

        Ok(SignedTransaction {
            payload,
            signature,
            public_key: STANDARD.encode(sender.public_key.as_bytes()),
            txid,
        })
    }

    /// Judge the server's reply to a submission
    pub fn evaluate_reply(reply: &Value, txid: &str) -> SendOutcome {
        let last = match reply {
            Value::Array(items) => items.last(),
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            other => Some(other),
        };

        match last {
            None => {
                error!("Server timeout");
                SendOutcome::Failed {
                    reason: "Server timeout".to_string(),
                }
            }
            Some(Value::String(marker)) if marker == SUCCESS_MARKER => SendOutcome::Accepted {
                txid: txid.to_string(),
            },
            Some(other) => {
                let reason = match other {
                    Value::String(s) => s.clone(),
                    v => v.to_string(),
                };
                error!("Transaction {} rejected: {}", txid, reason);
                SendOutcome::Failed { reason }
            }
        }
    }

    /// Outcome of a submission that never got a reply
    pub fn transport_failure(err: &TransportError) -> SendOutcome {
        let reason = match err {
            TransportError::Timeout => "Server timeout".to_string(),
            other => other.to_string(),
        };
        error!("Transaction not submitted: {}", reason);
        SendOutcome::Failed { reason }
    }
}

/// A transaction as listed by the server, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionEntry {
    /// Negative while in the mempool
    pub block_height: i64,
    pub timestamp: f64,
    pub address: String,
    pub recipient: String,
    pub amount: u64,
    pub signature: String,
    pub public_key: String,
    pub block_hash: String,
    pub fee: u64,
    pub reward: u64,
    pub operation: String,
    pub openfield: String,
}

impl TransactionEntry {
    /// Parse a 12-field history row
    pub fn from_row(row: &Value) -> std::result::Result<Self, TransportError> {
        let malformed = |what: &str| TransportError::MalformedReply(format!("history row: {what}"));

        let fields = row.as_array().ok_or_else(|| malformed("not a list"))?;
        if fields.len() < 12 {
            return Err(malformed("expected 12 fields"));
        }

        let text = |i: usize| match &fields[i] {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        let number = |i: usize| match &fields[i] {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        let amount = |i: usize| {
            let raw = text(i);
            parse_amount(&raw).map_err(|_| malformed("amount"))
        };

        Ok(Self {
            block_height: number(0).ok_or_else(|| malformed("block height"))? as i64,
            timestamp: number(1).ok_or_else(|| malformed("timestamp"))?,
            address: text(2),
            recipient: text(3),
            amount: amount(4)?,
            signature: text(5),
            public_key: text(6),
            block_hash: text(7),
            fee: amount(8)?,
            reward: amount(9)?,
            operation: text(10),
            openfield: text(11),
        })
    }
}

/// Format smallest units as a BIS amount with eight decimals
pub fn format_amount(units: u64) -> String {
    format!("{}.{:08}", units / UNITS_PER_BIS, units % UNITS_PER_BIS)
}

/// Parse a BIS amount to smallest units.
///
/// Accepts plain decimals (`1.5`), a trailing `BIS` and exponent forms the
/// server emits (`0E-8`, `1.5e2`). Precision below 1e-8 is rejected.
pub fn parse_amount(amount: &str) -> Result<u64> {
    let invalid = || WalletError::InvalidAmount(amount.to_string());

    let text = amount.trim().trim_end_matches("BIS").trim();
    let (mantissa, exponent) = match text.find(|c| c == 'e' || c == 'E') {
        Some(i) => (
            &text[..i],
            text[i + 1..].parse::<i32>().map_err(|_| invalid())?,
        ),
        None => (text, 0),
    };
    let mantissa = mantissa.strip_prefix('+').unwrap_or(mantissa);
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid());
    }
    if !int_part
        .bytes()
        .chain(frac_part.bytes())
        .all(|b| b.is_ascii_digit())
    {
        return Err(invalid());
    }

    let digits = format!("{int_part}{frac_part}");
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(0);
    }

    let shift = AMOUNT_DECIMALS as i64 - frac_part.len() as i64 + exponent as i64;
    let value: u128 = if shift >= 0 {
        let scale = 10u128
            .checked_pow(u32::try_from(shift).map_err(|_| invalid())?)
            .ok_or_else(invalid)?;
        digits
            .parse::<u128>()
            .map_err(|_| invalid())?
            .checked_mul(scale)
            .ok_or_else(invalid)?
    } else {
        let cut = usize::try_from(-shift).map_err(|_| invalid())?;
        let keep = digits.len().checked_sub(cut).ok_or_else(invalid)?;
        if digits[keep..].bytes().any(|b| b != b'0') {
            return Err(invalid());
        }
        if keep == 0 {
            0
        } else {
            digits[..keep].parse::<u128>().map_err(|_| invalid())?
        }
    };

    u64::try_from(value).map_err(|_| invalid())
}
