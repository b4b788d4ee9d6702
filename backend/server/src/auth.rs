//! Wallet sign-in and session tokens.
//!
//! A client signs `Sign in to SciFund with address {address}` with its wallet
//! (EIP-191 `personal_sign`). The gate recovers the signer, finds or creates
//! the user and hands back an HS256 session token. Every authenticated request
//! resolves that token once into an [`Identity`].

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    RequestPartsExt,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use once_cell::sync::Lazy;
use secp256k1::{
    ecdsa::{RecoverableSignature, RecoveryId},
    All, Message, Secp256k1,
};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use tracing::{info, warn};

use crate::errors::{Result, ServiceError};
use crate::models::{NewUser, User};
use crate::repository::Repository;
use crate::AppState;

static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// Session token claims.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub address: String,
    pub iat: u64,
    pub exp: u64,
}

/// The authenticated caller, resolved once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    /// Lowercase wallet address.
    pub address: String,
}

impl Identity {
    /// Case-insensitive address comparison.
    pub fn is(&self, address: &str) -> bool {
        self.address.eq_ignore_ascii_case(address)
    }
}

pub fn sign_in_message(address: &str) -> String {
    format!("Sign in to SciFund with address {address}")
}

/// `0x` followed by 40 hex digits.
pub fn is_valid_address(address: &str) -> bool {
    address.len() == 42
        && address.starts_with("0x")
        && address[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Keccak-256 of the EIP-191 prefixed message.
fn personal_message_hash(message: &str) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(format!("\x19Ethereum Signed Message:\n{}", message.len()).as_bytes());
    hasher.update(message.as_bytes());
    hasher.finalize().into()
}

/// Recover the lowercase address that produced `signature` over `message`.
pub fn recover_address(message: &str, signature: &str) -> Result<String> {
    let invalid = || ServiceError::Unauthorized("Invalid signature".to_string());

    let bytes = hex::decode(signature.trim_start_matches("0x")).map_err(|_| invalid())?;
    if bytes.len() != 65 {
        return Err(invalid());
    }
    let v = match bytes[64] {
        27 | 28 => bytes[64] - 27,
        0 | 1 => bytes[64],
        _ => return Err(invalid()),
    };

    let recovery_id = RecoveryId::from_i32(i32::from(v)).map_err(|_| invalid())?;
    let sig = RecoverableSignature::from_compact(&bytes[..64], recovery_id).map_err(|_| invalid())?;
    let msg = Message::from_digest(personal_message_hash(message));
    let public_key = SECP256K1_CONTEXT
        .recover_ecdsa(&msg, &sig)
        .map_err(|_| invalid())?;

    let uncompressed = public_key.serialize_uncompressed();
    let digest = Keccak256::digest(&uncompressed[1..]);
    Ok(format!("0x{}", hex::encode(&digest[12..])))
}

fn now_secs() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| ServiceError::Config("System clock before unix epoch".to_string()))
}

pub struct AuthGate {
    repo: Arc<dyn Repository>,
    secret: String,
    ttl_secs: u64,
}

impl AuthGate {
    pub fn new(repo: Arc<dyn Repository>, secret: impl Into<String>, ttl_secs: u64) -> Self {
        Self {
            repo,
            secret: secret.into(),
            ttl_secs,
        }
    }

    /// Verify the wallet signature and open a session, creating the user on
    /// first sign-in. Nothing is written when verification fails.
    pub async fn sign_in(&self, address: &str, signature: &str) -> Result<(String, User)> {
        if !is_valid_address(address) {
            return Err(ServiceError::Unauthorized("Invalid address".to_string()));
        }
        let recovered = recover_address(&sign_in_message(address), signature)?;
        if !recovered.eq_ignore_ascii_case(address) {
            warn!("Sign-in rejected: signature recovers to {recovered}, not {address}");
            return Err(ServiceError::Unauthorized("Invalid signature".to_string()));
        }

        let address = address.to_ascii_lowercase();
        let user = match self.repo.find_user_by_address(&address).await? {
            Some(user) => user,
            None => {
                let user = self.repo.insert_user(new_wallet_user(&address)).await?;
                info!("Registered user {} for {}", user.id, user.address);
                user
            }
        };

        let token = self.issue_token(&user)?;
        Ok((token, user))
    }

    pub fn issue_token(&self, user: &User) -> Result<String> {
        let now = now_secs()?;
        let claims = Claims {
            sub: user.id.to_string(),
            address: user.address.clone(),
            iat: now,
            exp: now + self.ttl_secs,
        };
        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?)
    }

    /// Validate a session token.
    pub fn resolve(&self, token: &str) -> Result<Identity> {
        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|_| ServiceError::Unauthorized("Invalid session".to_string()))?;

        let user_id = claims
            .sub
            .parse()
            .map_err(|_| ServiceError::Unauthorized("Invalid session".to_string()))?;
        Ok(Identity {
            user_id,
            address: claims.address,
        })
    }

    pub async fn current_user(&self, identity: &Identity) -> Result<User> {
        self.repo
            .find_user(identity.user_id)
            .await?
            .ok_or_else(|| ServiceError::Unauthorized("Unauthorized".to_string()))
    }
}

fn new_wallet_user(address: &str) -> NewUser {
    NewUser {
        address: address.to_string(),
        name: format!("{}...{}", &address[..6], &address[address.len() - 4..]),
        avatar: format!("https://api.dicebear.com/6.x/identicon/svg?seed={address}"),
        institution: None,
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Identity {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| ServiceError::Unauthorized("Unauthorized".to_string()))?;

        state.auth.resolve(bearer.token())
    }
}

#[cfg(test)]
pub(crate) mod test_wallet {
    //! Deterministic wallets for signing in from tests.

    use secp256k1::{PublicKey, SecretKey};

    use super::*;

    pub struct Wallet {
        secret: SecretKey,
        pub address: String,
    }

    impl Wallet {
        pub fn from_seed(seed: u8) -> Self {
            let secret = SecretKey::from_slice(&[seed; 32]).expect("valid key");
            let public = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret);
            let digest = Keccak256::digest(&public.serialize_uncompressed()[1..]);
            Self {
                secret,
                address: format!("0x{}", hex::encode(&digest[12..])),
            }
        }

        /// `personal_sign` over `message`, hex encoded with `v` in {27, 28}.
        pub fn sign(&self, message: &str) -> String {
            let msg = Message::from_digest(personal_message_hash(message));
            let sig = SECP256K1_CONTEXT.sign_ecdsa_recoverable(&msg, &self.secret);
            let (recovery_id, compact) = sig.serialize_compact();
            let mut bytes = compact.to_vec();
            bytes.push(recovery_id.to_i32() as u8 + 27);
            format!("0x{}", hex::encode(bytes))
        }
    }
}
