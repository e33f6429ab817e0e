//! Ed25519 key pairs and detached signatures.
//!
//! This module is the signature engine behind signed tags. It provides:
//!
//! - Key pair generation from the operating system's CSPRNG
//! - Detached signing with either a bare seed or a seed/public-key pair
//! - Detached verification against a 32-byte public key
//!
//! # Key Format
//!
//! Private keys are stored the way the settings store expects them:
//!
//! ```text
//! | seed (32 bytes) | public key (32 bytes) |
//! ```
//!
//! Signing only reads the seed; the trailing public key is carried so the
//! pair can be persisted as one string.
//!
//! # Example
//!
//! ```
//! use flagcarrier_core::crypto::{generate_keypair, sign, verify};
//!
//! let pair = generate_keypair();
//! let sig = sign(b"hello", pair.private_key()).unwrap();
//! assert!(verify(&sig, b"hello", pair.public_key()).unwrap());
//! assert!(!verify(&sig, b"hellO", pair.public_key()).unwrap());
//! ```

use core::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::{Error, Result};

/// Size of the secret seed in bytes.
pub const SECRET_KEY_SIZE: usize = ed25519_dalek::SECRET_KEY_LENGTH;

/// Size of a public key in bytes.
pub const PUBLIC_KEY_SIZE: usize = ed25519_dalek::PUBLIC_KEY_LENGTH;

/// Size of a stored private key (`seed || public key`) in bytes.
pub const PRIVATE_KEY_SIZE: usize = SECRET_KEY_SIZE + PUBLIC_KEY_SIZE;

/// Size of a detached signature in bytes.
pub const SIGNATURE_SIZE: usize = ed25519_dalek::SIGNATURE_LENGTH;

/// An Ed25519 key pair in storage format.
///
/// The private half is `seed || public key` ([`PRIVATE_KEY_SIZE`] bytes) and
/// the public half is the bare [`PUBLIC_KEY_SIZE`]-byte key. Replacing a key
/// pair does not invalidate old signatures mathematically, but readers only
/// hold the newest public key.
pub struct KeyPair {
    private_key: [u8; PRIVATE_KEY_SIZE],
    public_key: [u8; PUBLIC_KEY_SIZE],
}

impl KeyPair {
    /// Derives the key pair belonging to a 32-byte secret seed.
    ///
    /// # Arguments
    ///
    /// * `seed` - The Ed25519 secret seed
    ///
    /// # Example
    ///
    /// ```
    /// use flagcarrier_core::crypto::KeyPair;
    ///
    /// let a = KeyPair::from_seed(&[7u8; 32]);
    /// let b = KeyPair::from_seed(&[7u8; 32]);
    /// assert_eq!(a.public_key(), b.public_key());
    /// assert_eq!(&a.private_key()[32..], a.public_key());
    /// ```
    #[must_use]
    pub fn from_seed(seed: &[u8; SECRET_KEY_SIZE]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let public_key = signing_key.verifying_key().to_bytes();

        let mut private_key = [0u8; PRIVATE_KEY_SIZE];
        private_key[..SECRET_KEY_SIZE].copy_from_slice(seed);
        private_key[SECRET_KEY_SIZE..].copy_from_slice(&public_key);

        Self {
            private_key,
            public_key,
        }
    }

    /// Returns the private key in `seed || public key` form.
    #[must_use]
    pub const fn private_key(&self) -> &[u8; PRIVATE_KEY_SIZE] {
        &self.private_key
    }

    /// Returns the public key.
    #[must_use]
    pub const fn public_key(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.public_key
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &hex::encode(self.public_key))
            .finish_non_exhaustive()
    }
}

/// Generates a fresh key pair from the operating system's CSPRNG.
///
/// [`OsRng`] is a handle to the single process-wide OS generator and is safe
/// to use from any thread.
#[must_use]
pub fn generate_keypair() -> KeyPair {
    let mut seed = [0u8; SECRET_KEY_SIZE];
    OsRng.fill_bytes(&mut seed);
    KeyPair::from_seed(&seed)
}

/// Produces a detached signature over `message`.
///
/// Ed25519 is deterministic: the same key and message always yield the same
/// [`SIGNATURE_SIZE`]-byte signature.
///
/// # Arguments
///
/// * `message` - The exact bytes to sign
/// * `private_key` - Either the bare seed or the `seed || public key` pair
///
/// # Errors
///
/// Returns [`Error::InvalidKeySize`] if `private_key` has any other length.
pub fn sign(message: &[u8], private_key: &[u8]) -> Result<[u8; SIGNATURE_SIZE]> {
    if private_key.len() != SECRET_KEY_SIZE && private_key.len() != PRIVATE_KEY_SIZE {
        return Err(Error::InvalidKeySize(private_key.len()));
    }

    let mut seed = [0u8; SECRET_KEY_SIZE];
    seed.copy_from_slice(&private_key[..SECRET_KEY_SIZE]);

    let signing_key = SigningKey::from_bytes(&seed);
    Ok(signing_key.sign(message).to_bytes())
}

/// Verifies a detached signature.
///
/// A public key that is not a valid curve point verifies nothing and yields
/// `false` rather than an error.
///
/// # Arguments
///
/// * `signature` - The detached signature
/// * `message` - The exact bytes that were signed
/// * `public_key` - The signer's public key
///
/// # Errors
///
/// - [`Error::InvalidSignatureSize`] if `signature` is not [`SIGNATURE_SIZE`] bytes
/// - [`Error::InvalidPublicKeySize`] if `public_key` is not [`PUBLIC_KEY_SIZE`] bytes
pub fn verify(signature: &[u8], message: &[u8], public_key: &[u8]) -> Result<bool> {
    let signature: [u8; SIGNATURE_SIZE] = signature
        .try_into()
        .map_err(|_| Error::InvalidSignatureSize(signature.len()))?;
    let public_key: [u8; PUBLIC_KEY_SIZE] = public_key
        .try_into()
        .map_err(|_| Error::InvalidPublicKeySize(public_key.len()))?;

    let Ok(verifying_key) = VerifyingKey::from_bytes(&public_key) else {
        return Ok(false);
    };

    let signature = Signature::from_bytes(&signature);
    Ok(verifying_key.verify(message, &signature).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keypair_layout() {
        let pair = generate_keypair();

        assert_eq!(pair.private_key().len(), PRIVATE_KEY_SIZE);
        assert_eq!(pair.public_key().len(), PUBLIC_KEY_SIZE);
        assert_eq!(&pair.private_key()[SECRET_KEY_SIZE..], pair.public_key());
    }

    #[test]
    fn keypairs_are_fresh() {
        let a = generate_keypair();
        let b = generate_keypair();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn rfc8032_test_vector_1() {
        // RFC 8032 section 7.1, TEST 1 (empty message)
        let seed: [u8; 32] =
            hex::decode("9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60")
                .unwrap()
                .try_into()
                .unwrap();
        let pair = KeyPair::from_seed(&seed);

        assert_eq!(
            hex::encode(pair.public_key()),
            "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a"
        );

        let sig = sign(b"", pair.private_key()).unwrap();
        assert_eq!(
            hex::encode(sig),
            "e5564300c360ac729086e2cc806e828a84877f1eb8e5d974d873e06522490155\
             5fb8821590a33bacc61e39701cf9b46bd25bf5f0595bbe24655141438e7a100b"
        );
        assert!(verify(&sig, b"", pair.public_key()).unwrap());
    }

    #[test]
    fn sign_with_bare_seed_matches_pair() {
        let pair = KeyPair::from_seed(&[3u8; 32]);

        let from_pair = sign(b"message", pair.private_key()).unwrap();
        let from_seed = sign(b"message", &pair.private_key()[..SECRET_KEY_SIZE]).unwrap();

        assert_eq!(from_pair, from_seed);
    }

    #[test]
    fn sign_is_deterministic() {
        let pair = KeyPair::from_seed(&[9u8; 32]);
        assert_eq!(
            sign(b"abc", pair.private_key()).unwrap(),
            sign(b"abc", pair.private_key()).unwrap()
        );
    }

    #[test]
    fn sign_rejects_bad_key_size() {
        let err = sign(b"m", &[0u8; 31]).unwrap_err();
        assert!(matches!(err, Error::InvalidKeySize(31)));

        let err = sign(b"m", &[0u8; 65]).unwrap_err();
        assert!(matches!(err, Error::InvalidKeySize(65)));
    }

    #[test]
    fn verify_rejects_bad_sizes() {
        let pair = KeyPair::from_seed(&[1u8; 32]);

        let err = verify(&[0u8; 63], b"m", pair.public_key()).unwrap_err();
        assert!(matches!(err, Error::InvalidSignatureSize(63)));

        let err = verify(&[0u8; 64], b"m", &[0u8; 33]).unwrap_err();
        assert!(matches!(err, Error::InvalidPublicKeySize(33)));
    }

    #[test]
    fn verify_detects_wrong_key_and_message() {
        let pair = KeyPair::from_seed(&[1u8; 32]);
        let other = KeyPair::from_seed(&[2u8; 32]);
        let sig = sign(b"payload", pair.private_key()).unwrap();

        assert!(verify(&sig, b"payload", pair.public_key()).unwrap());
        assert!(!verify(&sig, b"payload", other.public_key()).unwrap());
        assert!(!verify(&sig, b"payload!", pair.public_key()).unwrap());

        let mut flipped = sig;
        flipped[10] ^= 0x01;
        assert!(!verify(&flipped, b"payload", pair.public_key()).unwrap());
    }

    #[test]
    fn debug_hides_private_key() {
        let pair = KeyPair::from_seed(&[5u8; 32]);
        let debug = format!("{pair:?}");
        assert!(debug.contains(&hex::encode(pair.public_key())));
        assert!(!debug.contains(&hex::encode(&pair.private_key()[..SECRET_KEY_SIZE])));
    }
}
