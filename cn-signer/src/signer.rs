//! Signer classes
//!
//! App session signatures carry a one-byte class prefix ahead of the 65-byte
//! ECDSA signature:
//!
//! | Prefix | Class | Resolves to |
//! |--------|-------|-------------|
//! | `0x00` | Wallet | the recovered address itself |
//! | `0x01` | Session key | the wallet that delegated to the recovered key |

use async_trait::async_trait;
use cn_core::{Address, AppSessionId, H256};
use tracing::debug;

use crate::crypto::{decode_signature_hex, recover, Signer, SIGNATURE_LEN};
use crate::error::{SignerError, SignerResult};

/// Signer class
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignerType {
    Wallet,
    SessionKey,
}

impl SignerType {
    pub fn prefix(&self) -> u8 {
        match self {
            Self::Wallet => 0x00,
            Self::SessionKey => 0x01,
        }
    }

    pub fn from_prefix(prefix: u8) -> SignerResult<Self> {
        match prefix {
            0x00 => Ok(Self::Wallet),
            0x01 => Ok(Self::SessionKey),
            other => Err(SignerError::UnknownSignerType(other)),
        }
    }
}

/// What a signature is authorizing, used to scope session keys
#[derive(Clone, Copy, Debug)]
pub struct SigningScope<'a> {
    pub application: &'a str,
    pub app_session_id: Option<&'a AppSessionId>,
}

impl<'a> SigningScope<'a> {
    pub fn new(application: &'a str, app_session_id: Option<&'a AppSessionId>) -> Self {
        Self {
            application,
            app_session_id,
        }
    }
}

/// Maps a session key to the wallet that delegated to it
#[async_trait]
pub trait SessionKeyResolver: Send + Sync {
    /// Owning wallet of `session_key`, if the key is live and in scope
    async fn resolve_owner(
        &self,
        session_key: &Address,
        scope: SigningScope<'_>,
    ) -> SignerResult<Address>;
}

/// Resolver that accepts no session keys
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSessionKeys;

#[async_trait]
impl SessionKeyResolver for NoSessionKeys {
    async fn resolve_owner(
        &self,
        session_key: &Address,
        _scope: SigningScope<'_>,
    ) -> SignerResult<Address> {
        Err(SignerError::UnauthorizedSessionKey {
            session_key: session_key.to_hex(),
            reason: "session keys are not accepted".to_string(),
        })
    }
}

/// Class-prefixed app signature
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppSignature {
    pub signer_type: SignerType,
    pub signature: [u8; SIGNATURE_LEN],
}

impl AppSignature {
    /// Sign `digest` and tag the signature with `signer_type`
    pub fn sign<S: Signer + ?Sized>(
        signer: &S,
        signer_type: SignerType,
        digest: &H256,
    ) -> SignerResult<Self> {
        Ok(Self {
            signer_type,
            signature: signer.sign_digest(digest)?,
        })
    }

    /// Decode from `0x`-prefixed or bare hex
    pub fn decode(sig: &str) -> SignerResult<Self> {
        let bytes = decode_signature_hex(sig)?;
        let (prefix, rest) = bytes
            .split_first()
            .ok_or_else(|| SignerError::InvalidEncoding("empty signature".to_string()))?;
        let signer_type = SignerType::from_prefix(*prefix)?;
        let signature: [u8; SIGNATURE_LEN] = rest.try_into().map_err(|_| {
            SignerError::InvalidEncoding(format!(
                "expected {} signature bytes, got {}",
                SIGNATURE_LEN,
                rest.len()
            ))
        })?;
        Ok(Self {
            signer_type,
            signature,
        })
    }

    /// Encode as `0x`-prefixed hex
    pub fn to_hex(&self) -> String {
        let mut bytes = Vec::with_capacity(1 + SIGNATURE_LEN);
        bytes.push(self.signer_type.prefix());
        bytes.extend_from_slice(&self.signature);
        format!("0x{}", hex::encode(bytes))
    }

    /// Wallet this signature speaks for
    pub async fn resolve_wallet(
        &self,
        digest: &H256,
        resolver: &dyn SessionKeyResolver,
        scope: SigningScope<'_>,
    ) -> SignerResult<Address> {
        let recovered = recover(digest, &self.signature)?;
        match self.signer_type {
            SignerType::Wallet => Ok(recovered),
            SignerType::SessionKey => {
                let owner = resolver.resolve_owner(&recovered, scope).await?;
                debug!(
                    session_key = %recovered,
                    wallet = %owner,
                    "Session key resolved"
                );
                Ok(owner)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::EcdsaSigner;
    use cn_core::canon::keccak256;

    #[test]
    fn test_decode_round_trip() {
        let signer = EcdsaSigner::generate();
        let sig = AppSignature::sign(&signer, SignerType::SessionKey, &keccak256(b"x")).unwrap();
        let decoded = AppSignature::decode(&sig.to_hex()).unwrap();
        assert_eq!(decoded, sig);
    }

    #[test]
    fn test_unknown_prefix() {
        let mut bytes = vec![0x07u8];
        bytes.extend_from_slice(&[0u8; SIGNATURE_LEN]);
        let err = AppSignature::decode(&hex::encode(bytes)).unwrap_err();
        assert_eq!(err, SignerError::UnknownSignerType(0x07));
    }

    #[tokio::test]
    async fn test_session_key_rejected_without_resolver() {
        let signer = EcdsaSigner::generate();
        let digest = keccak256(b"x");
        let sig = AppSignature::sign(&signer, SignerType::SessionKey, &digest).unwrap();
        let err = sig
            .resolve_wallet(&digest, &NoSessionKeys, SigningScope::new("app", None))
            .await
            .unwrap_err();
        assert!(matches!(err, SignerError::UnauthorizedSessionKey { .. }));
    }
}
