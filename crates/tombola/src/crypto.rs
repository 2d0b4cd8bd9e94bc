//! crypto - opaque primitive wrappers
//!
//! signatures: ed25519. symmetric deck keys: ChaCha20-Poly1305 with a
//! fresh random nonce per encryption, carried as a prefix of the
//! ciphertext. hashing: sha-256, hex encoded. all wire encodings of
//! keys, signatures and ciphertexts are hex strings.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// deck key length in bytes (ChaCha20-Poly1305)
pub const DECK_KEY_LEN: usize = 32;
/// AEAD nonce length in bytes
pub const NONCE_LEN: usize = 12;

/// sha-256 of `data`, hex encoded
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// random alphanumeric challenge string
pub fn random_challenge(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// per-session ed25519 signing keypair. the private half never leaves
/// the owning process
pub struct SessionKeys {
    signing: SigningKey,
}

impl SessionKeys {
    /// generate from 32 fresh random bytes
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    /// deterministic construction from a seed
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self { signing: SigningKey::from_bytes(&seed) }
    }

    /// hex public key as sent during registration
    pub fn public_hex(&self) -> String {
        hex::encode(self.signing.verifying_key().to_bytes())
    }

    /// hex signature over `message`
    pub fn sign_hex(&self, message: &[u8]) -> String {
        hex::encode(self.signing.sign(message).to_bytes())
    }
}

/// verify a hex signature against a hex ed25519 public key
pub fn verify_hex(public_hex: &str, message: &[u8], signature_hex: &str) -> Result<()> {
    let key_bytes: [u8; 32] = hex::decode(public_hex)
        .ok()
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| Error::BadSignature(format!("bad public key: {public_hex}")))?;
    let key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|_| Error::BadSignature(format!("bad public key: {public_hex}")))?;

    let sig_bytes: [u8; 64] = hex::decode(signature_hex)
        .ok()
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| Error::BadSignature(format!("bad signature: {signature_hex}")))?;
    let signature = Signature::from_bytes(&sig_bytes);

    key.verify(message, &signature)
        .map_err(|_| Error::BadSignature(format!("signature rejected by key {public_hex}")))
}

/// software stand-in for the hardware signing token used only for the
/// initial identity challenge. exposes sign and public key, nothing
/// else of the underlying key material
pub struct IdentityCard {
    keys: SessionKeys,
}

impl IdentityCard {
    pub fn generate() -> Self {
        Self { keys: SessionKeys::generate() }
    }

    /// deterministic identity, so a deployment can preconfigure the
    /// coordinator with the matching public key
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self { keys: SessionKeys::from_seed(seed) }
    }

    pub fn public_key(&self) -> String {
        self.keys.public_hex()
    }

    pub fn sign(&self, message: &[u8]) -> String {
        self.keys.sign_hex(message)
    }
}

/// per-participant symmetric deck key. secret until the reveal phase,
/// after which it doubles as the deterministic permutation seed
#[derive(Clone, PartialEq, Eq)]
pub struct DeckKey([u8; DECK_KEY_LEN]);

impl DeckKey {
    pub fn generate() -> Self {
        let mut key = [0u8; DECK_KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn from_bytes(key: [u8; DECK_KEY_LEN]) -> Self {
        Self(key)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        hex::decode(s)
            .ok()
            .and_then(|b| b.try_into().ok())
            .map(Self)
            .ok_or_else(|| Error::BadFormat(format!("bad deck key: {s}")))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// permutation seed: the raw key bytes. only meaningful once the
    /// key has been publicly revealed
    pub fn seed(&self) -> [u8; DECK_KEY_LEN] {
        self.0
    }

    /// encrypt with a fresh random nonce; output is `nonce || ct`
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0).expect("valid key length");
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ct = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .expect("encryption failed");

        let mut out = Vec::with_capacity(NONCE_LEN + ct.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ct);
        out
    }

    /// decrypt a `nonce || ct` slot
    pub fn decrypt(&self, data: &[u8]) -> Option<Vec<u8>> {
        if data.len() < NONCE_LEN {
            return None;
        }
        let (nonce, ct) = data.split_at(NONCE_LEN);
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0).ok()?;
        cipher.decrypt(Nonce::from_slice(nonce), ct).ok()
    }
}

impl std::fmt::Debug for DeckKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print key material
        write!(f, "DeckKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let keys = SessionKeys::generate();
        let sig = keys.sign_hex(b"deck state");
        verify_hex(&keys.public_hex(), b"deck state", &sig).unwrap();
        assert!(verify_hex(&keys.public_hex(), b"other", &sig).is_err());
    }

    #[test]
    fn test_verify_rejects_garbage_inputs() {
        let keys = SessionKeys::generate();
        assert!(verify_hex("zz", b"m", &keys.sign_hex(b"m")).is_err());
        assert!(verify_hex(&keys.public_hex(), b"m", "abcd").is_err());
    }

    #[test]
    fn test_aead_round_trip_fresh_nonces() {
        let key = DeckKey::generate();
        let a = key.encrypt(b"41");
        let b = key.encrypt(b"41");
        // fresh nonce per call: same plaintext, different ciphertext
        assert_ne!(a, b);
        assert_eq!(key.decrypt(&a).unwrap(), b"41");
        assert_eq!(key.decrypt(&b).unwrap(), b"41");
    }

    #[test]
    fn test_aead_wrong_key_fails() {
        let ct = DeckKey::generate().encrypt(b"7");
        assert!(DeckKey::generate().decrypt(&ct).is_none());
    }

    #[test]
    fn test_deck_key_hex_round_trip() {
        let key = DeckKey::generate();
        let back = DeckKey::from_hex(&key.to_hex()).unwrap();
        assert_eq!(key, back);
    }

    #[test]
    fn test_challenge_length() {
        assert_eq!(random_challenge(14).len(), 14);
    }
}
