//! Accounts and cookie sessions.
//!
//! A session token has the form `ys_{prefix}_{secret}`. Only the SHA-256 digest
//! of the secret is stored; the prefix locates the row.

use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordVerifier,
    password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
};
use metrics::counter;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::repos::{
    CreateSessionParams, CreateUserParams, RepoError, SessionsRepo, UsersRepo,
};
use crate::domain::entities::UserRecord;
use crate::domain::users::SignupDraft;
use crate::domain::validation::FieldErrors;
use crate::infra::telemetry::METRIC_LOGIN_FAILURES;

const TOKEN_PREFIX: &str = "ys";
const MIN_SECRET_LEN: usize = 32;
pub const INVALID_LOGIN_MESSAGE: &str = "Please enter a correct username and password. Note that both fields may be case-sensitive.";
pub const DUPLICATE_USERNAME_MESSAGE: &str = "A user with that username already exists.";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid account data: {0}")]
    Invalid(FieldErrors),
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("user not found")]
    UserNotFound,
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionAuthError {
    #[error("invalid session token")]
    Invalid,
    #[error("expired session")]
    Expired,
}

/// The user a request acts for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub username: String,
}

#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: OffsetDateTime,
    pub identity: Identity,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UsersRepo>,
    sessions: Arc<dyn SessionsRepo>,
    session_ttl: Duration,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        sessions: Arc<dyn SessionsRepo>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            users,
            sessions,
            session_ttl,
        }
    }

    /// Validate a sign-up form and create the account.
    pub async fn signup(
        &self,
        username: &str,
        password: &str,
        confirmation: &str,
    ) -> Result<UserRecord, AuthError> {
        let draft =
            SignupDraft::parse(username, password, confirmation).map_err(AuthError::Invalid)?;
        self.register(draft).await
    }

    pub async fn register(&self, draft: SignupDraft) -> Result<UserRecord, AuthError> {
        if self.users.find_by_username(&draft.username).await?.is_some() {
            return Err(AuthError::Invalid(FieldErrors::single(
                "username",
                DUPLICATE_USERNAME_MESSAGE,
            )));
        }

        let password_hash = hash_password(draft.password).await?;
        let user = self
            .users
            .create_user(CreateUserParams {
                username: draft.username,
                password_hash,
            })
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => AuthError::Invalid(FieldErrors::single(
                    "username",
                    DUPLICATE_USERNAME_MESSAGE,
                )),
                other => AuthError::Repo(other),
            })?;

        info!(
            target: "yatube::auth",
            user_id = user.id,
            username = %user.username,
            "user registered"
        );
        Ok(user)
    }

    /// Check credentials and open a session.
    pub async fn login(&self, username: &str, password: &str) -> Result<IssuedSession, AuthError> {
        let user = match self.users.find_by_username(username.trim()).await? {
            Some(user) => user,
            None => {
                counter!(METRIC_LOGIN_FAILURES).increment(1);
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !verify_password(password.to_string(), user.password_hash.clone()).await? {
            counter!(METRIC_LOGIN_FAILURES).increment(1);
            info!(target: "yatube::auth", user_id = user.id, "login rejected");
            return Err(AuthError::InvalidCredentials);
        }

        self.start_session(&user).await
    }

    pub async fn start_session(&self, user: &UserRecord) -> Result<IssuedSession, AuthError> {
        let prefix = generate_prefix();
        let secret = generate_secret();
        let token = format!("{TOKEN_PREFIX}_{prefix}_{secret}");
        let expires_at = OffsetDateTime::now_utc() + self.session_ttl;

        self.sessions
            .create_session(CreateSessionParams {
                user_id: user.id,
                prefix,
                hashed_secret: hash_secret(&secret),
                expires_at,
            })
            .await?;

        info!(target: "yatube::auth", user_id = user.id, "session started");
        Ok(IssuedSession {
            token,
            expires_at,
            identity: Identity {
                user_id: user.id,
                username: user.username.clone(),
            },
        })
    }

    /// Resolve a session cookie into the user it belongs to.
    pub async fn authenticate(&self, token: &str) -> Result<Identity, SessionAuthError> {
        let parsed = parse_token(token).ok_or(SessionAuthError::Invalid)?;
        let record = self
            .sessions
            .find_by_prefix(&parsed.prefix)
            .await
            .map_err(|err| {
                warn!(target: "yatube::auth", error = %err, "session lookup failed");
                SessionAuthError::Invalid
            })?
            .ok_or(SessionAuthError::Invalid)?;

        let hashed_input = hash_secret(&parsed.secret);
        if record.hashed_secret.ct_eq(&hashed_input).unwrap_u8() == 0 {
            return Err(SessionAuthError::Invalid);
        }

        if record.expires_at <= OffsetDateTime::now_utc() {
            if let Err(err) = self.sessions.delete_session(&record.prefix).await {
                warn!(
                    target: "yatube::auth",
                    prefix = %record.prefix,
                    error = %err,
                    "failed to remove expired session"
                );
            }
            return Err(SessionAuthError::Expired);
        }

        let user = self
            .users
            .find_by_id(record.user_id)
            .await
            .map_err(|_| SessionAuthError::Invalid)?
            .ok_or(SessionAuthError::Invalid)?;

        Ok(Identity {
            user_id: user.id,
            username: user.username,
        })
    }

    /// End the session behind `token`. Unknown tokens are ignored.
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        if let Some(parsed) = parse_token(token) {
            self.sessions.delete_session(&parsed.prefix).await?;
        }
        Ok(())
    }

    /// Remove an account along with its posts, comments, follows and sessions.
    pub async fn delete_user(&self, username: &str) -> Result<UserRecord, AuthError> {
        let user = self
            .users
            .find_by_username(username)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        self.users.delete_user(user.id).await?;

        info!(target: "yatube::auth", user_id = user.id, username = %user.username, "user deleted");
        Ok(user)
    }
}

async fn hash_password(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| AuthError::Hashing(err.to_string()))
    })
    .await
    .map_err(|err| AuthError::Hashing(err.to_string()))?
}

async fn verify_password(password: String, stored: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || {
        let parsed =
            PasswordHash::new(&stored).map_err(|err| AuthError::Hashing(err.to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    })
    .await
    .map_err(|err| AuthError::Hashing(err.to_string()))?
}

fn hash_secret(secret: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().to_vec()
}

fn generate_prefix() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

fn generate_secret() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

struct ParsedToken {
    prefix: String,
    secret: String,
}

fn parse_token(token: &str) -> Option<ParsedToken> {
    let mut parts = token.splitn(3, '_');
    if parts.next()? != TOKEN_PREFIX {
        return None;
    }
    let prefix = parts.next()?;
    let secret = parts.next()?;
    if prefix.is_empty() || secret.len() < MIN_SECRET_LEN {
        return None;
    }
    Some(ParsedToken {
        prefix: prefix.to_string(),
        secret: secret.to_string(),
    })
}
