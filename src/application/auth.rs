//! Session resolution and role guards.
//!
//! Bearer tokens (`st_<prefix>_<secret>`) are stored as SHA-256 digests and
//! compared in constant time. Guards run before any data access: a failed
//! guard aborts the protected operation with zero side effects, and any
//! repository failure during resolution denies rather than allows.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::application::repos::{CreateSessionParams, RepoError, SessionsRepo};
use crate::domain::entities::{SessionRecord, UserRecord};
use crate::domain::types::UserRole;

const TOKEN_PREFIX: &str = "st";
const MIN_SECRET_LEN: usize = 32;

/// The resolved caller identity, one variant per role. Protected boundaries
/// match exhaustively on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Session {
    Guest,
    User { id: Uuid },
    Admin { id: Uuid },
}

impl Session {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Session::Guest => None,
            Session::User { id } | Session::Admin { id } => Some(*id),
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Session::Admin { .. })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing session token")]
    Missing,
    #[error("invalid session token")]
    Invalid,
    #[error("expired session token")]
    Expired,
    #[error("revoked session token")]
    Revoked,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthzError {
    #[error("administrator role required")]
    AdminRequired,
}

/// Failure of a protected-route guard: either no usable session or the
/// wrong role. Mapped to 401/403 by the HTTP layer, never folded into a
/// result envelope.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GuardError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Authz(#[from] AuthzError),
}

#[derive(Debug, Clone)]
pub struct SessionIssued {
    pub record: SessionRecord,
    pub token: String,
}

#[derive(Clone)]
pub struct AuthService {
    repo: Arc<dyn SessionsRepo>,
    bootstrap_admin_digest: Option<Vec<u8>>,
    default_ttl: Option<Duration>,
}

impl AuthService {
    pub fn new(repo: Arc<dyn SessionsRepo>) -> Self {
        Self {
            repo,
            bootstrap_admin_digest: None,
            default_ttl: None,
        }
    }

    /// Lifetime applied to issued sessions when the caller does not name one.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Accept a configured operator token as an admin session, so a fresh
    /// deployment can reach the back office before any user exists.
    pub fn with_bootstrap_admin_token(mut self, token: Option<&str>) -> Self {
        self.bootstrap_admin_digest = token
            .filter(|token| !token.trim().is_empty())
            .map(|token| hash_secret(token.trim()));
        self
    }

    /// Issue a session token for a user. The plaintext token is returned
    /// exactly once; only its digest is persisted. A `ttl` of `None` falls
    /// back to the configured default lifetime, if any.
    pub async fn issue(
        &self,
        user: &UserRecord,
        ttl: Option<Duration>,
    ) -> Result<SessionIssued, RepoError> {
        let prefix = generate_prefix();
        let secret = generate_secret();
        let token = format!("{TOKEN_PREFIX}_{prefix}_{secret}");
        let expires_at = ttl
            .or(self.default_ttl)
            .map(|ttl| OffsetDateTime::now_utc() + ttl);

        let record = self
            .repo
            .create_session(CreateSessionParams {
                user_id: user.id,
                token_prefix: prefix,
                hashed_secret: hash_secret(&secret),
                expires_at,
            })
            .await?;

        Ok(SessionIssued { record, token })
    }

    pub async fn revoke(&self, id: Uuid) -> Result<(), RepoError> {
        self.repo
            .revoke_session(id, OffsetDateTime::now_utc())
            .await
    }

    pub async fn revoke_for_user(&self, user_id: Uuid) -> Result<u64, RepoError> {
        self.repo
            .revoke_sessions_for_user(user_id, OffsetDateTime::now_utc())
            .await
    }

    /// Resolve the caller's session, mapping every failure to `Guest`.
    pub async fn current_session(&self, token: Option<&str>) -> Session {
        match token {
            Some(token) => self.authenticate(token).await.unwrap_or(Session::Guest),
            None => Session::Guest,
        }
    }

    /// Require an authenticated (user or admin) session.
    pub async fn require_user(&self, token: Option<&str>) -> Result<Session, GuardError> {
        let token = token.ok_or(AuthError::Missing)?;
        let session = self.authenticate(token).await?;
        match session {
            Session::Guest => Err(AuthError::Invalid.into()),
            authenticated => Ok(authenticated),
        }
    }

    /// Require an admin session. Fails closed: a valid non-admin session is
    /// an authorization error, everything else an authentication error.
    pub async fn require_admin(&self, token: Option<&str>) -> Result<Session, GuardError> {
        let session = self.require_user(token).await?;
        match session {
            Session::Admin { .. } => Ok(session),
            Session::User { .. } | Session::Guest => Err(AuthzError::AdminRequired.into()),
        }
    }

    async fn authenticate(&self, token: &str) -> Result<Session, AuthError> {
        if let Some(digest) = self.bootstrap_admin_digest.as_ref() {
            let candidate = hash_secret(token);
            if digest.ct_eq(&candidate).unwrap_u8() == 1 {
                return Ok(Session::Admin { id: Uuid::nil() });
            }
        }

        let parsed = parse_token(token).ok_or(AuthError::Invalid)?;
        let record = self
            .repo
            .find_by_prefix(&parsed.prefix)
            .await
            .map_err(|_| AuthError::Invalid)?
            .ok_or(AuthError::Invalid)?;

        let now = OffsetDateTime::now_utc();
        if let Some(revoked_at) = record.revoked_at
            && revoked_at <= now
        {
            return Err(AuthError::Revoked);
        }
        if let Some(expires_at) = record.expires_at
            && expires_at <= now
        {
            return Err(AuthError::Expired);
        }

        let hashed_input = hash_secret(&parsed.secret);
        if record.hashed_secret.ct_eq(&hashed_input).unwrap_u8() == 0 {
            return Err(AuthError::Invalid);
        }

        // best-effort last_seen update; do not block resolution
        let repo = self.repo.clone();
        let session_id = record.id;
        tokio::spawn(async move {
            let _ = repo.update_last_seen(session_id, now).await;
        });

        Ok(match record.role {
            UserRole::Admin => Session::Admin {
                id: record.user_id,
            },
            UserRole::User => Session::User {
                id: record.user_id,
            },
        })
    }
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
    let prefix_tag = parts.next()?;
    if prefix_tag != TOKEN_PREFIX {
        return None;
    }
    let prefix = parts.next()?;
    let secret = parts.next()?;
    if secret.len() < MIN_SECRET_LEN || prefix.is_empty() {
        return None;
    }
    Some(ParsedToken {
        prefix: prefix.to_string(),
        secret: secret.to_string(),
    })
}
