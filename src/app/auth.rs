use std::sync::Arc;

use anyhow::{anyhow, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use pasetors::claims::{Claims, ClaimsValidationRules};
use pasetors::keys::SymmetricKey;
use pasetors::token::UntrustedToken;
use pasetors::{local, version4::V4, Local};
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::domain::session::TokenPair;
use crate::domain::user::{NewUser, User};
use crate::store::{IdentityStore, StoreError};

const TOKEN_ISSUER: &str = "unmute";

#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user_id: Uuid,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("early access is closed")]
    EarlyAccessClosed,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid refresh token")]
    InvalidRefreshToken,
    #[error("username already taken")]
    UsernameTaken,
    #[error("email already registered")]
    EmailTaken,
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(constraint) if constraint.contains("username") => {
                Self::UsernameTaken
            }
            StoreError::Conflict(constraint) if constraint.contains("email") => Self::EmailTaken,
            other => Self::Store(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignUp {
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub password: String,
}

#[derive(Clone)]
pub struct AuthService {
    identity: Arc<dyn IdentityStore>,
    access_key: [u8; 32],
    refresh_key: [u8; 32],
    access_ttl_minutes: u64,
    refresh_ttl_days: u64,
    early_access_open: bool,
}

impl AuthService {
    pub fn new(
        identity: Arc<dyn IdentityStore>,
        access_key: [u8; 32],
        refresh_key: [u8; 32],
        access_ttl_minutes: u64,
        refresh_ttl_days: u64,
        early_access_open: bool,
    ) -> Self {
        Self {
            identity,
            access_key,
            refresh_key,
            access_ttl_minutes,
            refresh_ttl_days,
            early_access_open,
        }
    }

    pub async fn signup(&self, request: SignUp) -> Result<User, AuthError> {
        if !self.early_access_open {
            return Err(AuthError::EarlyAccessClosed);
        }

        let username = request.username.trim().to_string();
        let email = request.email.trim().to_lowercase();
        if username.is_empty() || username.len() > 30 {
            return Err(AuthError::Invalid("username must be 1-30 characters".to_string()));
        }
        if !username
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '.')
        {
            return Err(AuthError::Invalid(
                "username may only contain letters, digits, '_' and '.'".to_string(),
            ));
        }
        if !email.contains('@') {
            return Err(AuthError::Invalid("email is invalid".to_string()));
        }
        if request.password.len() < 8 {
            return Err(AuthError::Invalid(
                "password must be at least 8 characters".to_string(),
            ));
        }

        let display_name = match request.display_name.trim() {
            "" => username.clone(),
            name => name.to_string(),
        };
        let password_hash = hash_password(&request.password)?;

        let user = self
            .identity
            .create_user(NewUser {
                username,
                email,
                display_name,
                password_hash,
            })
            .await?;

        tracing::info!(user_id = %user.id, "user signed up");
        Ok(user)
    }

    pub async fn login(&self, identifier: &str, password: &str) -> Result<TokenPair, AuthError> {
        let credentials = self
            .identity
            .find_credentials(identifier.trim())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if credentials.password_hash.is_empty()
            || !verify_password(password, &credentials.password_hash)?
        {
            return Err(AuthError::InvalidCredentials);
        }

        self.issue_token_pair(credentials.user_id).await
    }

    /// Rotates a refresh token. The presented token is revoked before the
    /// replacement is stored, so a token can only be redeemed once.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let (user_id, refresh_id) = self
            .verify_refresh_token(refresh_token)
            .map_err(|_| AuthError::InvalidRefreshToken)?;
        let token_hash = hash_token(refresh_token);

        let replacement = self.build_token_pair(user_id)?;
        let revoked = self
            .identity
            .revoke_refresh_token(refresh_id, user_id, &token_hash, Some(replacement.refresh_id))
            .await?;
        if !revoked {
            return Err(AuthError::InvalidRefreshToken);
        }

        self.store_refresh_token(user_id, &replacement).await?;
        Ok(replacement.pair)
    }

    pub async fn revoke_refresh_token(&self, refresh_token: &str) -> Result<bool, AuthError> {
        let (user_id, refresh_id) = match self.verify_refresh_token(refresh_token) {
            Ok(ids) => ids,
            Err(_) => return Ok(false),
        };
        let token_hash = hash_token(refresh_token);
        Ok(self
            .identity
            .revoke_refresh_token(refresh_id, user_id, &token_hash, None)
            .await?)
    }

    pub async fn authenticate_access_token(&self, token: &str) -> Result<Option<AuthSession>> {
        let claims = match self.decrypt_claims(token, self.access_key)? {
            Some(claims) => claims,
            None => return Ok(None),
        };
        if !has_token_type(&claims, "access") {
            return Ok(None);
        }
        let user_id = claim_uuid(&claims, "sub")?;
        Ok(Some(AuthSession { user_id }))
    }

    fn decrypt_claims(&self, token: &str, key_bytes: [u8; 32]) -> Result<Option<Claims>> {
        let key = SymmetricKey::<V4>::from(&key_bytes)?;
        let mut rules = ClaimsValidationRules::new();
        rules.validate_issuer_with(TOKEN_ISSUER);
        rules.validate_audience_with(TOKEN_ISSUER);

        let untrusted = match UntrustedToken::<Local, V4>::try_from(token) {
            Ok(token) => token,
            Err(_) => return Ok(None),
        };
        let trusted = match local::decrypt(&key, &untrusted, &rules, None, None) {
            Ok(token) => token,
            Err(_) => return Ok(None),
        };
        Ok(trusted.payload_claims().cloned())
    }

    fn build_access_claims(&self, user_id: Uuid) -> Result<(Claims, OffsetDateTime)> {
        let duration = std::time::Duration::from_secs(self.access_ttl_minutes * 60);
        let mut claims = Claims::new_expires_in(&duration)?;
        claims.issuer(TOKEN_ISSUER)?;
        claims.audience(TOKEN_ISSUER)?;
        claims.subject(&user_id.to_string())?;
        claims.add_additional("typ", "access")?;
        let expires_at =
            OffsetDateTime::now_utc() + Duration::minutes(self.access_ttl_minutes as i64);
        Ok((claims, expires_at))
    }

    fn build_refresh_claims(
        &self,
        user_id: Uuid,
        refresh_id: Uuid,
    ) -> Result<(Claims, OffsetDateTime)> {
        let duration = std::time::Duration::from_secs(self.refresh_ttl_days * 24 * 60 * 60);
        let mut claims = Claims::new_expires_in(&duration)?;
        claims.issuer(TOKEN_ISSUER)?;
        claims.audience(TOKEN_ISSUER)?;
        claims.subject(&user_id.to_string())?;
        claims.token_identifier(&refresh_id.to_string())?;
        claims.add_additional("typ", "refresh")?;
        let expires_at = OffsetDateTime::now_utc() + Duration::days(self.refresh_ttl_days as i64);
        Ok((claims, expires_at))
    }

    fn build_token_pair(&self, user_id: Uuid) -> Result<IssuedTokens> {
        let (access_claims, access_expires_at) = self.build_access_claims(user_id)?;
        let access_key = SymmetricKey::<V4>::from(&self.access_key)?;
        let access_token = local::encrypt(&access_key, &access_claims, None, None)?;

        let refresh_id = Uuid::new_v4();
        let (refresh_claims, refresh_expires_at) =
            self.build_refresh_claims(user_id, refresh_id)?;
        let refresh_key = SymmetricKey::<V4>::from(&self.refresh_key)?;
        let refresh_token = local::encrypt(&refresh_key, &refresh_claims, None, None)?;

        Ok(IssuedTokens {
            refresh_id,
            pair: TokenPair {
                access_token,
                refresh_token,
                access_expires_at,
                refresh_expires_at,
            },
        })
    }

    pub async fn issue_token_pair(&self, user_id: Uuid) -> Result<TokenPair, AuthError> {
        let issued = self.build_token_pair(user_id)?;
        self.store_refresh_token(user_id, &issued).await?;
        Ok(issued.pair)
    }

    async fn store_refresh_token(
        &self,
        user_id: Uuid,
        issued: &IssuedTokens,
    ) -> Result<(), AuthError> {
        let token_hash = hash_token(&issued.pair.refresh_token);
        self.identity
            .insert_refresh_token(
                issued.refresh_id,
                user_id,
                &token_hash,
                issued.pair.refresh_expires_at,
            )
            .await?;
        Ok(())
    }

    fn verify_refresh_token(&self, token: &str) -> Result<(Uuid, Uuid)> {
        let claims = match self.decrypt_claims(token, self.refresh_key)? {
            Some(claims) => claims,
            None => return Err(anyhow!("invalid refresh token")),
        };
        if !has_token_type(&claims, "refresh") {
            return Err(anyhow!("invalid refresh token"));
        }
        let user_id = claim_uuid(&claims, "sub")?;
        let refresh_id = claim_uuid(&claims, "jti")?;
        Ok((user_id, refresh_id))
    }
}

struct IssuedTokens {
    refresh_id: Uuid,
    pair: TokenPair,
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {}", err))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|err| anyhow!("failed to parse password hash: {}", err))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn claim_uuid(claims: &Claims, name: &str) -> Result<Uuid> {
    let value = claims
        .get_claim(name)
        .and_then(|value| value.as_str())
        .ok_or_else(|| anyhow!("missing {} claim", name))?;
    Ok(Uuid::parse_str(value)?)
}

fn has_token_type(claims: &Claims, expected: &str) -> bool {
    claims
        .get_claim("typ")
        .and_then(|value| value.as_str())
        .map(|value| value == expected)
        .unwrap_or(false)
}
