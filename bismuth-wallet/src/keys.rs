//! Key Management
//!
//! Ed25519 key-pairs and the address records the wallet stores.
//!
//! An address is the hex SHA-224 digest of the public key (56 lowercase hex
//! characters). Private keys are kept as hex seeds inside a [`PrivateKey`]
//! wrapper that zeroizes on drop and never prints its contents.

use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha224, Sha256};
use std::fmt;
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Length of an address string
pub const ADDRESS_LEN: usize = 56;

/// Argon2 parameters for password-derived key-pairs. These are part of the
/// derivation, changing them changes every derived address.
const KEYGEN_MEMORY_KB: u32 = 19456; // 19 MB
const KEYGEN_ITERATIONS: u32 = 2;
const KEYGEN_PARALLELISM: u32 = 1;

/// Private key material (hex encoded Ed25519 seed).
pub struct PrivateKey(Zeroizing<String>);

impl PrivateKey {
    pub fn new(hex_seed: impl Into<String>) -> Self {
        Self(Zeroizing::new(hex_seed.into()))
    }

    /// The raw hex seed. Handle with care.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub(crate) fn signing_key(&self) -> Result<SigningKey, CryptoError> {
        let bytes = Zeroizing::new(
            hex::decode(self.expose())
                .map_err(|_| CryptoError::InvalidKey("private key is not hex".to_string()))?,
        );
        let seed: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("private key must be 32 bytes".to_string()))?;
        Ok(SigningKey::from_bytes(&seed))
    }

    /// Hex encoded public key belonging to this seed
    pub fn public_key(&self) -> Result<String, CryptoError> {
        Ok(hex::encode(self.signing_key()?.verifying_key().to_bytes()))
    }
}

impl Clone for PrivateKey {
    fn clone(&self) -> Self {
        Self::new(self.expose())
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for PrivateKey {}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

impl Serialize for PrivateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.expose())
    }
}

impl<'de> Deserialize<'de> for PrivateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::new(value))
    }
}

/// One address held by the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub address: String,
    /// Hex encoded Ed25519 public key
    pub public_key: String,
    pub private_key: PrivateKey,
    #[serde(default)]
    pub label: String,
    /// Creation time (unix seconds)
    #[serde(default)]
    pub timestamp: u64,
}

/// A freshly generated key-pair, before it gets a label.
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub address: String,
    pub public_key: String,
    pub private_key: PrivateKey,
}

impl KeyPair {
    /// Generate a random key-pair
    pub fn generate() -> Self {
        let mut seed = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut seed[..]);
        Self::from_seed(&seed)
    }

    /// Derive a key-pair deterministically from a password and salt
    pub fn from_password(password: &str, salt: &str) -> Result<Self, CryptoError> {
        let params = Params::new(
            KEYGEN_MEMORY_KB,
            KEYGEN_ITERATIONS,
            KEYGEN_PARALLELISM,
            Some(32),
        )
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        // Argon2 wants at least 8 bytes of salt, user salts can be empty.
        let salt_digest = Sha256::digest(salt.as_bytes());

        let mut seed = Zeroizing::new([0u8; 32]);
        argon2
            .hash_password_into(password.as_bytes(), &salt_digest, &mut seed[..])
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

        Ok(Self::from_seed(&seed))
    }

    fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let public_bytes = signing_key.verifying_key().to_bytes();

        Self {
            address: address_from_key_bytes(&public_bytes),
            public_key: hex::encode(public_bytes),
            private_key: PrivateKey::new(hex::encode(seed)),
        }
    }

    /// Attach a label and creation time
    pub fn into_record(self, label: &str, timestamp: u64) -> AddressRecord {
        AddressRecord {
            address: self.address,
            public_key: self.public_key,
            private_key: self.private_key,
            label: label.to_string(),
            timestamp,
        }
    }
}

/// Check the shape of an address string
pub fn is_valid_address(address: &str) -> bool {
    address.len() == ADDRESS_LEN
        && address
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

/// Derive the address belonging to a hex encoded public key
pub fn derive_address(public_key: &str) -> Result<String, CryptoError> {
    let key = verifying_key(public_key)?;
    Ok(address_from_key_bytes(&key.to_bytes()))
}

fn address_from_key_bytes(public_key: &[u8; 32]) -> String {
    hex::encode(Sha224::digest(public_key))
}

pub(crate) fn verifying_key(public_key: &str) -> Result<VerifyingKey, CryptoError> {
    let bytes = hex::decode(public_key.trim())
        .map_err(|_| CryptoError::InvalidKey("public key is not hex".to_string()))?;
    let bytes: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("public key must be 32 bytes".to_string()))?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

/// Sign raw bytes, returning the base64 signature
pub(crate) fn sign_bytes(private_key: &PrivateKey, message: &[u8]) -> Result<String, CryptoError> {
    let signing_key = private_key.signing_key()?;
    let signature = signing_key.sign(message);
    Ok(STANDARD.encode(signature.to_bytes()))
}

/// Verify a base64 signature produced by [`sign_bytes`]
pub fn verify_signature(
    public_key: &str,
    message: &[u8],
    signature: &str,
) -> Result<(), CryptoError> {
    let key = verifying_key(public_key)?;
    let raw = STANDARD
        .decode(signature)
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    let signature =
        Signature::from_slice(&raw).map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    key.verify(message, &signature)
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_keypair() {
        let keys = KeyPair::generate();

        assert!(is_valid_address(&keys.address));
        assert_eq!(keys.public_key.len(), 64);
        assert_eq!(derive_address(&keys.public_key).unwrap(), keys.address);
    }

    #[test]
    fn test_private_key_knows_its_public_key() {
        let keys = KeyPair::generate();
        assert_eq!(keys.private_key.public_key().unwrap(), keys.public_key);
        assert!(PrivateKey::new("zz").public_key().is_err());
    }

    #[test]
    fn test_random_keypairs_differ() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        assert_ne!(a.address, b.address);
    }

    #[test]
    fn test_password_derivation_is_deterministic() {
        let a = KeyPair::from_password("correct horse", "battery").unwrap();
        let b = KeyPair::from_password("correct horse", "battery").unwrap();
        let c = KeyPair::from_password("correct horse", "staple").unwrap();

        assert_eq!(a.address, b.address);
        assert_eq!(a.private_key, b.private_key);
        assert_ne!(a.address, c.address);
    }

    #[test]
    fn test_is_valid_address() {
        assert!(is_valid_address(
            "f6c0363ca1c5aa28cc584252e65a63998493ff0a5ec1bb16beda9bac"
        ));
        assert!(!is_valid_address("f6c0363ca1c5aa28"));
        assert!(!is_valid_address(
            "F6C0363CA1C5AA28CC584252E65A63998493FF0A5EC1BB16BEDA9BAC"
        ));
        assert!(!is_valid_address(
            "z6c0363ca1c5aa28cc584252e65a63998493ff0a5ec1bb16beda9bac"
        ));
    }

    #[test]
    fn test_sign_and_verify() {
        let keys = KeyPair::generate();
        let signature = sign_bytes(&keys.private_key, b"hello").unwrap();

        assert!(verify_signature(&keys.public_key, b"hello", &signature).is_ok());
        assert!(verify_signature(&keys.public_key, b"hellO", &signature).is_err());
    }

    #[test]
    fn test_private_key_debug_is_redacted() {
        let keys = KeyPair::generate();
        let printed = format!("{:?}", keys.into_record("main", 1));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn test_record_json_field_names() {
        let record = KeyPair::generate().into_record("savings", 1_600_000_000);
        let json = serde_json::to_value(&record).unwrap();

        for field in ["address", "public_key", "private_key", "label", "timestamp"] {
            assert!(json.get(field).is_some(), "missing {field}");
        }

        let back: AddressRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_invalid_private_key() {
        let key = PrivateKey::new("not-hex");
        assert!(matches!(
            sign_bytes(&key, b"x"),
            Err(CryptoError::InvalidKey(_))
        ));
    }
}
