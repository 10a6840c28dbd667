//! secp256k1 Recoverable Signatures
//!
//! Signatures are 65 bytes `r || s || v` over a 32-byte Keccak digest, with
//! `v` in `{27, 28}` (`{0, 1}` is accepted on input). Addresses are the last
//! 20 bytes of the Keccak-256 of the uncompressed public key.

use cn_core::canon::keccak256;
use cn_core::{Address, H256};
use rand::RngCore;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, SecretKey, SECP256K1};

use crate::error::{SignerError, SignerResult};

/// Length of an encoded signature
pub const SIGNATURE_LEN: usize = 65;

/// Produces signatures over digests
pub trait Signer: Send + Sync {
    /// Address the signatures recover to
    fn address(&self) -> Address;

    /// Sign a 32-byte digest
    fn sign_digest(&self, digest: &H256) -> SignerResult<[u8; SIGNATURE_LEN]>;

    /// Sign a digest and hex-encode the signature with a `0x` prefix
    fn sign_digest_hex(&self, digest: &H256) -> SignerResult<String> {
        Ok(format!("0x{}", hex::encode(self.sign_digest(digest)?)))
    }
}

/// Checks signatures against expected signers
pub trait SigValidator: Send + Sync {
    /// Recover the signer of `digest`
    fn recover(&self, digest: &H256, signature: &[u8]) -> SignerResult<Address>;

    /// Require `signature` over `digest` to come from `address`
    fn verify(&self, address: &Address, digest: &H256, signature: &[u8]) -> SignerResult<()> {
        let recovered = self.recover(digest, signature)?;
        if recovered != *address {
            return Err(SignerError::InvalidSignature {
                expected: address.to_hex(),
                recovered: recovered.to_hex(),
            });
        }
        Ok(())
    }
}

/// Address of a public key
pub fn public_key_address(public_key: &PublicKey) -> Address {
    let uncompressed = public_key.serialize_uncompressed();
    let hash = keccak256(&uncompressed[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash.0[12..]);
    Address(address)
}

/// secp256k1 key pair
#[derive(Clone)]
pub struct EcdsaSigner {
    secret_key: SecretKey,
    address: Address,
}

impl EcdsaSigner {
    /// Generate a new random key
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let mut bytes = [0u8; 32];
            rng.fill_bytes(&mut bytes);
            if let Ok(secret_key) = SecretKey::from_slice(&bytes) {
                return Self::from_secret_key(secret_key);
            }
        }
    }

    fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(SECP256K1, &secret_key);
        Self {
            secret_key,
            address: public_key_address(&public_key),
        }
    }

    /// Create from secret key bytes (32 bytes)
    pub fn from_bytes(bytes: &[u8; 32]) -> SignerResult<Self> {
        let secret_key = SecretKey::from_slice(bytes)
            .map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Create from a hex-encoded secret key, with or without `0x`
    pub fn from_hex(hex_str: &str) -> SignerResult<Self> {
        let trimmed = hex_str.trim();
        let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(stripped)
            .map_err(|e| SignerError::InvalidKey(format!("Invalid hex: {}", e)))?;
        let arr: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            SignerError::InvalidKey(format!(
                "Invalid key length: expected 32, got {}",
                bytes.len()
            ))
        })?;
        Self::from_bytes(&arr)
    }

    /// Secret key as lowercase hex without prefix
    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }
}

impl std::fmt::Debug for EcdsaSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcdsaSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl Signer for EcdsaSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn sign_digest(&self, digest: &H256) -> SignerResult<[u8; SIGNATURE_LEN]> {
        let message = Message::from_digest(digest.0);
        let signature = SECP256K1.sign_ecdsa_recoverable(&message, &self.secret_key);
        let (recovery_id, compact) = signature.serialize_compact();

        let v = u8::try_from(recovery_id.to_i32())
            .map_err(|e| SignerError::SigningFailed(e.to_string()))?;
        let mut out = [0u8; SIGNATURE_LEN];
        out[..64].copy_from_slice(&compact);
        out[64] = 27 + v;
        Ok(out)
    }
}

/// Stateless validator for wallet signatures
#[derive(Clone, Copy, Debug, Default)]
pub struct EcdsaValidator;

impl SigValidator for EcdsaValidator {
    fn recover(&self, digest: &H256, signature: &[u8]) -> SignerResult<Address> {
        recover(digest, signature)
    }
}

/// Recover the address that signed `digest`
pub fn recover(digest: &H256, signature: &[u8]) -> SignerResult<Address> {
    if signature.len() != SIGNATURE_LEN {
        return Err(SignerError::InvalidEncoding(format!(
            "expected {} bytes, got {}",
            SIGNATURE_LEN,
            signature.len()
        )));
    }
    let v = match signature[64] {
        0 | 27 => 0,
        1 | 28 => 1,
        other => {
            return Err(SignerError::InvalidEncoding(format!(
                "invalid recovery byte {}",
                other
            )))
        }
    };
    let recovery_id =
        RecoveryId::from_i32(v).map_err(|e| SignerError::Recovery(e.to_string()))?;
    let signature = RecoverableSignature::from_compact(&signature[..64], recovery_id)
        .map_err(|e| SignerError::Recovery(e.to_string()))?;
    let public_key = SECP256K1
        .recover_ecdsa(&Message::from_digest(digest.0), &signature)
        .map_err(|e| SignerError::Recovery(e.to_string()))?;
    Ok(public_key_address(&public_key))
}

/// Decode a hex signature, with or without `0x`
pub fn decode_signature_hex(sig: &str) -> SignerResult<Vec<u8>> {
    let stripped = sig.strip_prefix("0x").unwrap_or(sig);
    hex::decode(stripped).map_err(|e| SignerError::InvalidEncoding(e.to_string()))
}

/// Recover the signer of a hex-encoded signature
pub fn recover_hex(digest: &H256, sig: &str) -> SignerResult<Address> {
    recover(digest, &decode_signature_hex(sig)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_recover() {
        let signer = EcdsaSigner::generate();
        let digest = keccak256(b"clearnode");
        let sig = signer.sign_digest(&digest).unwrap();
        assert!(sig[64] == 27 || sig[64] == 28);
        assert_eq!(recover(&digest, &sig).unwrap(), signer.address());
        assert!(EcdsaValidator.verify(&signer.address(), &digest, &sig).is_ok());
    }

    #[test]
    fn test_wrong_digest_recovers_other_address() {
        let signer = EcdsaSigner::generate();
        let sig = signer.sign_digest(&keccak256(b"a")).unwrap();
        let err = EcdsaValidator
            .verify(&signer.address(), &keccak256(b"b"), &sig)
            .unwrap_err();
        assert!(matches!(err, SignerError::InvalidSignature { .. }));
    }

    #[test]
    fn test_known_address() {
        // Secret key 1 maps to the well-known generator-point address
        let mut key = [0u8; 32];
        key[31] = 1;
        let signer = EcdsaSigner::from_bytes(&key).unwrap();
        assert_eq!(
            signer.address().to_hex(),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn test_hex_round_trip() {
        let signer = EcdsaSigner::generate();
        let restored = EcdsaSigner::from_hex(&format!("0x{}", signer.secret_hex())).unwrap();
        assert_eq!(restored.address(), signer.address());
        assert!(EcdsaSigner::from_hex("0x1234").is_err());
    }

    #[test]
    fn test_bad_lengths_rejected() {
        let digest = keccak256(b"x");
        assert!(matches!(
            recover(&digest, &[0u8; 64]),
            Err(SignerError::InvalidEncoding(_))
        ));
    }
}
