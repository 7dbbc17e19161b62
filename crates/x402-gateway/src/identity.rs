//! The service's own signing identity.
//!
//! Used for the pay-to fallback address and the discovery document's
//! ownership proof. Verification and settlement stay with the remote
//! facilitator; this key never touches a chain.

use alloy::primitives::Address;
use alloy::signers::local::{LocalSignerError, PrivateKeySigner};
use alloy::signers::SignerSync;

pub struct FacilitatorIdentity {
    signer: PrivateKeySigner,
}

impl FacilitatorIdentity {
    pub fn from_key(private_key: &str) -> Result<Self, LocalSignerError> {
        let signer: PrivateKeySigner = private_key.parse()?;
        Ok(Self { signer })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// EIP-191 personal-message signature over the service origin. Proves
    /// control of the payment address to discovery indexes.
    pub fn sign_origin(&self, origin: &str) -> Result<String, alloy::signers::Error> {
        let signature = self.signer.sign_message_sync(origin.as_bytes())?;
        Ok(alloy::hex::encode_prefixed(signature.as_bytes()))
    }
}
