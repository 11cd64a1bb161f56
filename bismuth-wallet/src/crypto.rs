//! Crypto Collaborator
//!
//! The wallet core never touches primitives directly; it goes through
//! [`CryptoProvider`]. [`StandardCrypto`] is the implementation shipped with
//! the crate:
//! - Ed25519 key-pairs and signatures
//! - X25519 + ChaCha20-Poly1305 for messages encrypted to an address
//! - Argon2id + ChaCha20-Poly1305 for password sealed wallet blobs
//!
//! A sealed blob is a single string
//! `1:<memory_kb>:<iterations>:<parallelism>:<salt>:<nonce hex>:<ciphertext hex>`
//! so it can be opened without knowing which cost preset produced it.

use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHasher,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};
use x25519_dalek::{x25519, X25519_BASEPOINT_BYTES};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::keys::{self, KeyPair, PrivateKey};
use crate::transaction::TxPayload;

/// Sealed blob format version
const SEAL_VERSION: &str = "1";

/// Upper bounds on the KDF costs accepted from a sealed blob
const MAX_MEMORY_KB: u32 = 1 << 20; // 1 GB
const MAX_ITERATIONS: u32 = 16;
const MAX_PARALLELISM: u32 = 16;

/// Domain separator for message encryption keys
const MESSAGE_KDF_CONTEXT: &[u8] = b"bismuth-wallet-msg-v1";

/// How hard a sealed blob is to brute force.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealLevel {
    /// Individual address records (one per address, opened on every unlock)
    Record,
    /// The spend policy blob
    Policy,
}

/// Argon2 cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub memory_kb: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl KdfParams {
    /// Preset used for address records
    pub const RECORD: KdfParams = KdfParams {
        memory_kb: 19456, // 19 MB
        iterations: 2,
        parallelism: 1,
    };

    /// Preset used for the spend policy
    pub const POLICY: KdfParams = KdfParams {
        memory_kb: 65536, // 64 MB
        iterations: 3,
        parallelism: 4,
    };

    pub fn for_level(level: SealLevel) -> Self {
        match level {
            SealLevel::Record => Self::RECORD,
            SealLevel::Policy => Self::POLICY,
        }
    }
}

/// Cryptographic operations the wallet consumes.
///
/// Keys are passed as the strings stored in the wallet file: hex public
/// keys and [`PrivateKey`] handles.
pub trait CryptoProvider: Send + Sync {
    /// Create a key-pair. A non-empty password derives it deterministically
    /// from `password` and `salt`; otherwise it is random.
    fn generate_keypair(&self, password: &str, salt: &str) -> Result<KeyPair, CryptoError>;

    /// The address a public key hashes to
    fn address_for(&self, public_key: &str) -> Result<String, CryptoError>;

    /// Sign a transaction payload
    fn sign(&self, payload: &TxPayload, private_key: &PrivateKey) -> Result<String, CryptoError>;

    /// Sign a free-form message
    fn sign_message(&self, message: &str, private_key: &PrivateKey) -> Result<String, CryptoError>;

    /// Encrypt a message so only the holder of the matching private key can
    /// read it
    fn encrypt_for_recipient(
        &self,
        message: &str,
        recipient_public_key: &str,
    ) -> Result<String, CryptoError>;

    /// Decrypt a message produced by [`CryptoProvider::encrypt_for_recipient`]
    fn decrypt(&self, ciphertext: &str, private_key: &PrivateKey) -> Result<String, CryptoError>;

    /// Seal bytes with a password
    fn symmetric_encrypt(
        &self,
        password: &str,
        plaintext: &[u8],
        level: SealLevel,
    ) -> Result<String, CryptoError>;

    /// Open a sealed blob
    fn symmetric_decrypt(&self, password: &str, sealed: &str) -> Result<Vec<u8>, CryptoError>;
}

/// Ed25519 / X25519 / Argon2id implementation of [`CryptoProvider`].
#[derive(Debug, Clone, Default)]
pub struct StandardCrypto {
    /// Overrides both seal presets when set
    kdf_override: Option<KdfParams>,
}

impl StandardCrypto {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the same Argon2 cost for every seal level.
    ///
    /// Meant for memory constrained hosts and tests. Blobs record their own
    /// parameters, so they stay readable by any instance.
    pub fn with_kdf_params(params: KdfParams) -> Self {
        Self {
            kdf_override: Some(params),
        }
    }

    fn params_for(&self, level: SealLevel) -> KdfParams {
        self.kdf_override
            .unwrap_or_else(|| KdfParams::for_level(level))
    }
}

impl CryptoProvider for StandardCrypto {
    fn generate_keypair(&self, password: &str, salt: &str) -> Result<KeyPair, CryptoError> {
        if password.is_empty() {
            Ok(KeyPair::generate())
        } else {
            KeyPair::from_password(password, salt)
        }
    }

    fn address_for(&self, public_key: &str) -> Result<String, CryptoError> {
        keys::derive_address(public_key)
    }

    fn sign(&self, payload: &TxPayload, private_key: &PrivateKey) -> Result<String, CryptoError> {
        keys::sign_bytes(private_key, &payload.canonical_bytes())
    }

    fn sign_message(&self, message: &str, private_key: &PrivateKey) -> Result<String, CryptoError> {
        keys::sign_bytes(private_key, message.as_bytes())
    }

    fn encrypt_for_recipient(
        &self,
        message: &str,
        recipient_public_key: &str,
    ) -> Result<String, CryptoError> {
        let recipient = keys::verifying_key(recipient_public_key)?
            .to_montgomery()
            .to_bytes();

        let mut ephemeral = Zeroizing::new([0u8; 32]);
        rand::rngs::OsRng.fill_bytes(&mut ephemeral[..]);
        let ephemeral_public = x25519(*ephemeral, X25519_BASEPOINT_BYTES);
        let shared = Zeroizing::new(x25519(*ephemeral, recipient));

        let key = message_key(&shared, &ephemeral_public, &recipient);
        let (nonce, ciphertext) = aead_encrypt(&key, message.as_bytes())?;

        let mut out = Vec::with_capacity(32 + 12 + ciphertext.len());
        out.extend_from_slice(&ephemeral_public);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(out))
    }

    fn decrypt(&self, ciphertext: &str, private_key: &PrivateKey) -> Result<String, CryptoError> {
        let raw = STANDARD
            .decode(ciphertext.trim())
            .map_err(|e| CryptoError::MalformedCiphertext(e.to_string()))?;
        if raw.len() < 32 + 12 + 16 {
            return Err(CryptoError::MalformedCiphertext(
                "message too short".to_string(),
            ));
        }

        let (ephemeral_public, rest) = raw.split_at(32);
        let (nonce, body) = rest.split_at(12);
        let ephemeral_public: [u8; 32] = ephemeral_public
            .try_into()
            .map_err(|_| CryptoError::MalformedCiphertext("bad ephemeral key".to_string()))?;

        let signing_key = private_key.signing_key()?;
        let own_public = signing_key.verifying_key().to_montgomery().to_bytes();
        let scalar = Zeroizing::new(signing_key.to_scalar_bytes());
        let shared = Zeroizing::new(x25519(*scalar, ephemeral_public));

        let key = message_key(&shared, &ephemeral_public, &own_public);
        let plaintext = aead_decrypt(&key, nonce, body)?;

        String::from_utf8(plaintext)
            .map_err(|_| CryptoError::MalformedCiphertext("message is not utf-8".to_string()))
    }

    fn symmetric_encrypt(
        &self,
        password: &str,
        plaintext: &[u8],
        level: SealLevel,
    ) -> Result<String, CryptoError> {
        let params = self.params_for(level);

        // Generate random salt for Argon2
        let salt = SaltString::generate(&mut OsRng);
        let key = derive_key(password, salt.as_str(), params)?;

        let (nonce, ciphertext) = aead_encrypt(&key, plaintext)?;

        Ok(format!(
            "{}:{}:{}:{}:{}:{}:{}",
            SEAL_VERSION,
            params.memory_kb,
            params.iterations,
            params.parallelism,
            salt.as_str(),
            hex::encode(nonce),
            hex::encode(ciphertext)
        ))
    }

    fn symmetric_decrypt(&self, password: &str, sealed: &str) -> Result<Vec<u8>, CryptoError> {
        let parts: Vec<&str> = sealed.trim().split(':').collect();
        if parts.len() != 7 {
            return Err(CryptoError::MalformedCiphertext(
                "invalid sealed blob format".to_string(),
            ));
        }
        if parts[0] != SEAL_VERSION {
            return Err(CryptoError::MalformedCiphertext(format!(
                "unsupported sealed blob version: {}",
                parts[0]
            )));
        }

        let number = |s: &str| {
            s.parse::<u32>()
                .map_err(|_| CryptoError::MalformedCiphertext("invalid KDF parameter".to_string()))
        };
        let params = KdfParams {
            memory_kb: number(parts[1])?,
            iterations: number(parts[2])?,
            parallelism: number(parts[3])?,
        };
        if params.memory_kb > MAX_MEMORY_KB {
            return Err(CryptoError::MalformedCiphertext(
                "KDF memory cost too large".to_string(),
            ));
        }
        if params.iterations > MAX_ITERATIONS {
            return Err(CryptoError::MalformedCiphertext(
                "KDF iteration count too large".to_string(),
            ));
        }
        if params.parallelism > MAX_PARALLELISM {
            return Err(CryptoError::MalformedCiphertext(
                "KDF parallelism too large".to_string(),
            ));
        }

        let nonce = hex::decode(parts[5])
            .map_err(|_| CryptoError::MalformedCiphertext("invalid nonce format".to_string()))?;
        let ciphertext = hex::decode(parts[6])
            .map_err(|_| CryptoError::MalformedCiphertext("invalid ciphertext format".to_string()))?;
        if nonce.len() != 12 {
            return Err(CryptoError::MalformedCiphertext(
                "invalid nonce length".to_string(),
            ));
        }

        let key = derive_key(password, parts[4], params)?;
        aead_decrypt(&key, &nonce, &ciphertext)
    }
}

/// Derive a 32-byte encryption key from password using Argon2id
fn derive_key(
    password: &str,
    salt: &str,
    params: KdfParams,
) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    let salt = SaltString::from_b64(salt)
        .map_err(|_| CryptoError::MalformedCiphertext("invalid salt format".to_string()))?;

    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2::Params::new(
            params.memory_kb,
            params.iterations,
            params.parallelism,
            Some(32),
        )
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?,
    );

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    let hash_output = hash
        .hash
        .ok_or_else(|| CryptoError::KeyDerivation("no hash output".to_string()))?;
    let hash_bytes = hash_output.as_bytes();

    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&hash_bytes[..32]);

    Ok(key)
}

fn message_key(shared: &[u8; 32], ephemeral: &[u8; 32], recipient: &[u8; 32]) -> Zeroizing<[u8; 32]> {
    let mut hasher = Sha256::new();
    hasher.update(MESSAGE_KDF_CONTEXT);
    hasher.update(shared);
    hasher.update(ephemeral);
    hasher.update(recipient);
    Zeroizing::new(hasher.finalize().into())
}

fn aead_encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<([u8; 12], Vec<u8>), CryptoError> {
    // Generate random nonce
    let mut nonce_bytes = [0u8; 12];
    rand::thread_rng().fill(&mut nonce_bytes);

    let cipher =
        ChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::EncryptionFailed)?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    Ok((nonce_bytes, ciphertext))
}

fn aead_decrypt(key: &[u8; 32], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher =
        ChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::DecryptionFailed)?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_PASSWORD: &str = "test-password-123";

    fn fast() -> StandardCrypto {
        StandardCrypto::with_kdf_params(KdfParams {
            memory_kb: 64,
            iterations: 1,
            parallelism: 1,
        })
    }

    #[test]
    fn test_seal_and_open() {
        let crypto = fast();
        let sealed = crypto
            .symmetric_encrypt(TEST_PASSWORD, b"{\"label\":\"main\"}", SealLevel::Record)
            .unwrap();

        assert!(sealed.starts_with("1:64:1:1:"));
        let opened = crypto.symmetric_decrypt(TEST_PASSWORD, &sealed).unwrap();
        assert_eq!(opened, b"{\"label\":\"main\"}");
    }

    #[test]
    fn test_open_with_wrong_password() {
        let crypto = fast();
        let sealed = crypto
            .symmetric_encrypt(TEST_PASSWORD, b"secret", SealLevel::Policy)
            .unwrap();

        assert_eq!(
            crypto.symmetric_decrypt("wrong-password", &sealed),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn test_sealed_blob_is_self_describing() {
        let sealed = fast()
            .symmetric_encrypt(TEST_PASSWORD, b"secret", SealLevel::Record)
            .unwrap();

        // A default instance reads blobs made with other parameters.
        let opened = StandardCrypto::new()
            .symmetric_decrypt(TEST_PASSWORD, &sealed)
            .unwrap();
        assert_eq!(opened, b"secret");
    }

    #[test]
    fn test_malformed_sealed_blob() {
        let crypto = fast();
        assert!(matches!(
            crypto.symmetric_decrypt(TEST_PASSWORD, "not-a-blob"),
            Err(CryptoError::MalformedCiphertext(_))
        ));
        assert!(matches!(
            crypto.symmetric_decrypt(TEST_PASSWORD, "9:64:1:1:c2FsdHNhbHQ:00:00"),
            Err(CryptoError::MalformedCiphertext(_))
        ));
    }

    #[test]
    fn test_sealed_blob_costs_are_bounded() {
        let sealed = fast()
            .symmetric_encrypt(TEST_PASSWORD, b"secret", SealLevel::Record)
            .unwrap();
        let parts: Vec<&str> = sealed.split(':').collect();

        for (index, cost) in [(1, "2097152"), (2, "4000000000"), (3, "255")] {
            let mut tampered = parts.clone();
            tampered[index] = cost;
            assert!(matches!(
                fast().symmetric_decrypt(TEST_PASSWORD, &tampered.join(":")),
                Err(CryptoError::MalformedCiphertext(_))
            ));
        }
    }

    #[test]
    fn test_each_seal_uses_fresh_salt() {
        let crypto = fast();
        let a = crypto
            .symmetric_encrypt(TEST_PASSWORD, b"same", SealLevel::Record)
            .unwrap();
        let b = crypto
            .symmetric_encrypt(TEST_PASSWORD, b"same", SealLevel::Record)
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_message_encryption_roundtrip() {
        let crypto = fast();
        let recipient = KeyPair::generate();

        let ciphertext = crypto
            .encrypt_for_recipient("meet at noon", &recipient.public_key)
            .unwrap();
        let plaintext = crypto.decrypt(&ciphertext, &recipient.private_key).unwrap();

        assert_eq!(plaintext, "meet at noon");
    }

    #[test]
    fn test_message_for_someone_else() {
        let crypto = fast();
        let recipient = KeyPair::generate();
        let eavesdropper = KeyPair::generate();

        let ciphertext = crypto
            .encrypt_for_recipient("meet at noon", &recipient.public_key)
            .unwrap();

        assert_eq!(
            crypto.decrypt(&ciphertext, &eavesdropper.private_key),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn test_sign_message_verifies() {
        let crypto = fast();
        let keys = KeyPair::generate();
        let signature = crypto.sign_message("hello", &keys.private_key).unwrap();

        assert!(keys::verify_signature(&keys.public_key, b"hello", &signature).is_ok());
    }

    #[test]
    fn test_generate_keypair_without_password_is_random() {
        let crypto = fast();
        let a = crypto.generate_keypair("", "salt").unwrap();
        let b = crypto.generate_keypair("", "salt").unwrap();
        assert_ne!(a.address, b.address);
    }

    #[test]
    fn test_address_for_matches_generated() {
        let crypto = fast();
        let keys = crypto.generate_keypair("", "").unwrap();
        assert_eq!(crypto.address_for(&keys.public_key).unwrap(), keys.address);
    }
}
