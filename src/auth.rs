/*!
Password hashing and session tokens.

Passwords are stored as argon2id PHC strings. Sessions are HS256 JWTs with
a fixed lifetime; nothing is kept server-side, so a token stays good (and
keeps the role and institute code it was issued with) until it expires.
*/
use argon2::{
    Argon2,
    password_hash::{
        rand_core::OsRng,
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
    },
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Duration, OffsetDateTime};

use crate::user::{Role, User};

/// How long an issued token remains valid.
pub const TOKEN_LIFETIME: Duration = Duration::days(7);

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unable to hash password: {0}")]
    Hash(String),
    #[error("unable to issue token: {0}")]
    Issue(jsonwebtoken::errors::Error),
    #[error("invalid token: {0}")]
    InvalidToken(jsonwebtoken::errors::Error),
}

/// Token payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub id: i32,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub institute_code: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn is_admin(&self) -> bool { self.role == Role::Admin }

    /// The institute this caller is confined to, or `None` for admins.
    pub fn scope(&self) -> Option<&str> {
        match self.role {
            Role::Admin => None,
            Role::User => Some(self.institute_code.as_str()),
        }
    }

    /// Whether this caller may see or touch records of `institute_code`.
    pub fn may_access(&self, institute_code: &str) -> bool {
        match self.scope() {
            None => true,
            Some(code) => code == institute_code,
        }
    }
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// False for a wrong password and for an unparseable stored hash alike.
pub fn check_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            log::warn!("Stored password hash is unparseable: {}", &e);
            false
        },
    }
}

pub struct Auth {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    lifetime: Duration,
}

impl Auth {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
            lifetime: TOKEN_LIFETIME,
        }
    }

    /// Override the token lifetime; only tests want this.
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn issue_token(&self, u: &User) -> Result<String, AuthError> {
        log::trace!("Auth::issue_token( {:?} ) called.", &u.email);

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = Claims {
            id: u.id,
            email: u.email.clone(),
            role: u.role,
            institute_code: u.institute_code.clone(),
            iat: now,
            exp: now + self.lifetime.whole_seconds(),
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(AuthError::Issue)
    }

    pub fn check_token(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(AuthError::InvalidToken)
    }
}
