//! Anonymous identities
//!
//! Every caller gets an owner ID without logging in. The ID travels in a self-certifying token:
//! the 8 ID bytes followed by an HMAC-SHA256 signature over them, hex encoded. Nothing is stored
//! server side, changing the secret invalidates every token out there.

use std::sync::Arc;

use hmac::Hmac;
use hmac::Mac;
use rand_core::OsRng;
use rand_core::TryRngCore;
use sha2::Sha256;
use thiserror::Error;

use crate::links::OwnerId;

type HmacSha256 = Hmac<Sha256>;

/// Bytes of the owner ID in a token
const OWNER_ID_LENGTH: usize = 8;

/// Bytes of the signature in a token
const SIGNATURE_LENGTH: usize = 32;

/// Identity errors
#[derive(Debug, Error)]
pub enum Error {
    /// Token is missing, malformed or forged
    #[error("Invalid identity token")]
    InvalidToken,

    /// The OS random generator failed
    #[error("Could not generate random bytes: {0}")]
    Random(String),
}

/// A freshly issued identity
#[derive(Debug)]
pub struct Token {
    /// The external token, hex encoded
    pub value: String,

    /// The owner ID inside the token
    pub owner_id: OwnerId,
}

/// The secret used to sign and verify identity tokens
#[derive(Clone)]
pub struct IdentityKeys {
    /// Signing secret
    secret: Arc<[u8]>,
}

impl IdentityKeys {
    /// Create the keys from a server-held secret
    pub fn new(secret: &[u8]) -> Self {
        Self {
            secret: Arc::from(secret),
        }
    }

    /// Issue a token for a new, random owner
    pub fn issue(&self) -> Result<Token, Error> {
        let mut owner_id = [0_u8; OWNER_ID_LENGTH];
        OsRng
            .try_fill_bytes(&mut owner_id)
            .map_err(|err| Error::Random(err.to_string()))?;

        let mut mac = self.mac();
        mac.update(&owner_id);
        let signature = mac.finalize().into_bytes();

        let mut raw = Vec::with_capacity(OWNER_ID_LENGTH + SIGNATURE_LENGTH);
        raw.extend_from_slice(&owner_id);
        raw.extend_from_slice(&signature);

        Ok(Token {
            value: hex::encode(raw),
            owner_id: OwnerId::from_be_bytes(owner_id),
        })
    }

    /// Verify a token and get the owner ID out of it
    ///
    /// The signature is compared in constant time
    pub fn verify(&self, token: Option<&str>) -> Result<OwnerId, Error> {
        let token = token.ok_or(Error::InvalidToken)?;

        let raw = hex::decode(token).map_err(|_| Error::InvalidToken)?;
        if raw.len() != OWNER_ID_LENGTH + SIGNATURE_LENGTH {
            return Err(Error::InvalidToken);
        }

        let (owner_id, signature) = raw.split_at(OWNER_ID_LENGTH);

        let mut mac = self.mac();
        mac.update(owner_id);
        mac.verify_slice(signature).map_err(|_| Error::InvalidToken)?;

        let owner_id =
            <[u8; OWNER_ID_LENGTH]>::try_from(owner_id).map_err(|_| Error::InvalidToken)?;

        Ok(OwnerId::from_be_bytes(owner_id))
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts keys of any length")
    }
}

/// Generate a random secret, used when none is configured
pub fn generate_secret() -> Result<String, Error> {
    let mut secret = [0_u8; 32];
    OsRng
        .try_fill_bytes(&mut secret)
        .map_err(|err| Error::Random(err.to_string()))?;

    Ok(hex::encode(secret))
}
