use std::collections::HashMap;

use async_trait::async_trait;
use base64::Engine;
use chrono::{Duration, Utc};
use keel_protocol::{
    is_valid_email, AuthResponse, Role, SessionInfo, SessionView, SignInEmail, SignUpEmail,
    UserView,
};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{AuthError, SeedFile, MAX_PASSWORD_LEN, MIN_PASSWORD_LEN};

/// Seven days.
pub const DEFAULT_SESSION_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Storage and credential checks behind the `/api/auth` routes.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Register a user and open a session for them.
    async fn sign_up(&self, request: SignUpEmail) -> Result<AuthResponse, AuthError>;
    async fn sign_in(&self, request: SignInEmail) -> Result<AuthResponse, AuthError>;
    /// Active session for `token`; expired sessions are dropped and reported as `None`.
    async fn session(&self, token: &str) -> Result<Option<SessionView>, AuthError>;
    async fn sign_out(&self, token: &str) -> Result<(), AuthError>;
    async fn list_users(&self) -> Result<Vec<UserView>, AuthError>;
    fn session_ttl(&self) -> Duration;
}

struct UserRecord {
    view: UserView,
    salt: String,
    digest: String,
}

struct SessionRecord {
    info: SessionInfo,
}

#[derive(Default)]
struct Store {
    users: HashMap<String, UserRecord>,
    by_email: HashMap<String, String>,
    sessions: HashMap<String, SessionRecord>,
}

/// In-process provider: users and sessions live as long as the server does.
pub struct MemoryAuthProvider {
    store: RwLock<Store>,
    ttl: Duration,
}

impl Default for MemoryAuthProvider {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_SESSION_TTL_SECS))
    }
}

impl MemoryAuthProvider {
    pub fn new(ttl: Duration) -> Self {
        Self {
            store: RwLock::new(Store::default()),
            ttl,
        }
    }

    /// Create every user in `seed`. Existing emails are left untouched.
    pub fn seed(&self, seed: &SeedFile) -> Result<usize, AuthError> {
        let mut created = 0;
        for user in &seed.users {
            let role = user.role.unwrap_or_default();
            let mut record = self.create_user(&user.email, &user.password, &user.name, role)?;
            record.view.email_verified = user.email_verified.unwrap_or(false);
            match self.insert_user(record) {
                Ok(_) => created += 1,
                Err(AuthError::UserExists) => {
                    tracing::debug!(email = %user.email, "seed user already present");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(created)
    }

    fn create_user(
        &self,
        email: &str,
        password: &str,
        name: &str,
        role: Role,
    ) -> Result<UserRecord, AuthError> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(AuthError::InvalidEmail);
        }
        check_password(password)?;
        let salt = hex::encode(rand::random::<[u8; 16]>());
        let digest = password_digest(&salt, password);
        Ok(UserRecord {
            view: UserView {
                id: Uuid::new_v4().to_string(),
                email,
                name: name.trim().to_string(),
                role,
                email_verified: false,
                created_at: Utc::now(),
            },
            salt,
            digest,
        })
    }

    fn insert_user(&self, record: UserRecord) -> Result<UserView, AuthError> {
        let view = record.view.clone();
        let mut store = self.store.write();
        if store.by_email.contains_key(&view.email) {
            return Err(AuthError::UserExists);
        }
        store.by_email.insert(view.email.clone(), view.id.clone());
        store.users.insert(view.id.clone(), record);
        Ok(view)
    }

    fn open_session(&self, user: UserView) -> AuthResponse {
        let token = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(rand::random::<[u8; 32]>());
        let now = Utc::now();
        let info = SessionInfo {
            id: Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            expires_at: now + self.ttl,
            created_at: now,
        };
        let mut store = self.store.write();
        store.sessions.retain(|_, record| record.info.expires_at > now);
        store
            .sessions
            .insert(token.clone(), SessionRecord { info });
        AuthResponse { token, user }
    }
}

#[async_trait]
impl AuthProvider for MemoryAuthProvider {
    async fn sign_up(&self, request: SignUpEmail) -> Result<AuthResponse, AuthError> {
        let record =
            self.create_user(&request.email, &request.password, &request.name, Role::User)?;
        let user = self.insert_user(record)?;
        tracing::info!(user_id = %user.id, "user signed up");
        Ok(self.open_session(user))
    }

    async fn sign_in(&self, request: SignInEmail) -> Result<AuthResponse, AuthError> {
        let email = normalize_email(&request.email);
        let user = {
            let store = self.store.read();
            let record = store
                .by_email
                .get(&email)
                .and_then(|id| store.users.get(id))
                .ok_or(AuthError::InvalidCredentials)?;
            if password_digest(&record.salt, &request.password) != record.digest {
                return Err(AuthError::InvalidCredentials);
            }
            record.view.clone()
        };
        tracing::info!(user_id = %user.id, "user signed in");
        Ok(self.open_session(user))
    }

    async fn session(&self, token: &str) -> Result<Option<SessionView>, AuthError> {
        {
            let store = self.store.read();
            let Some(record) = store.sessions.get(token) else {
                return Ok(None);
            };
            if record.info.expires_at > Utc::now() {
                return Ok(store.users.get(&record.info.user_id).map(|user| SessionView {
                    session: record.info.clone(),
                    user: user.view.clone(),
                }));
            }
        }
        self.store.write().sessions.remove(token);
        Ok(None)
    }

    async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
        self.store.write().sessions.remove(token);
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<UserView>, AuthError> {
        let mut users: Vec<UserView> = self
            .store
            .read()
            .users
            .values()
            .map(|r| r.view.clone())
            .collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.email.cmp(&b.email)));
        Ok(users)
    }

    fn session_ttl(&self) -> Duration {
        self.ttl
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn check_password(password: &str) -> Result<(), AuthError> {
    let len = password.chars().count();
    if (MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
        Ok(())
    } else {
        Err(AuthError::InvalidPassword)
    }
}

fn password_digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SeedUser;

    fn sign_up(email: &str) -> SignUpEmail {
        SignUpEmail {
            email: email.into(),
            password: "correct horse".into(),
            name: "Ada".into(),
        }
    }

    fn sign_in(email: &str, password: &str) -> SignInEmail {
        SignInEmail {
            email: email.into(),
            password: password.into(),
            remember_me: None,
        }
    }

    #[tokio::test]
    async fn sign_up_then_sign_in() {
        let auth = MemoryAuthProvider::default();
        let created = auth.sign_up(sign_up("Ada@Example.com")).await.unwrap();
        assert_eq!(created.user.email, "ada@example.com");
        assert_eq!(created.user.role, Role::User);

        let session = auth.sign_in(sign_in("ada@example.com", "correct horse")).await.unwrap();
        assert_ne!(session.token, created.token);
        let view = auth.session(&session.token).await.unwrap().unwrap();
        assert_eq!(view.user.id, created.user.id);
        assert!(view.session.expires_at > view.session.created_at);
    }

    #[tokio::test]
    async fn rejects_bad_credentials_and_duplicates() {
        let auth = MemoryAuthProvider::default();
        auth.sign_up(sign_up("ada@example.com")).await.unwrap();
        assert!(matches!(
            auth.sign_up(sign_up("ADA@example.com")).await,
            Err(AuthError::UserExists)
        ));
        assert!(matches!(
            auth.sign_in(sign_in("ada@example.com", "wrong horse")).await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.sign_in(sign_in("bob@example.com", "correct horse")).await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn validates_sign_up_fields() {
        let auth = MemoryAuthProvider::default();
        let mut req = sign_up("not-an-email");
        assert!(matches!(auth.sign_up(req.clone()).await, Err(AuthError::InvalidEmail)));
        req.email = "ada@example.com".into();
        req.password = "short".into();
        assert!(matches!(auth.sign_up(req.clone()).await, Err(AuthError::InvalidPassword)));
        req.password = "x".repeat(MAX_PASSWORD_LEN + 1);
        assert!(matches!(auth.sign_up(req).await, Err(AuthError::InvalidPassword)));
    }

    #[tokio::test]
    async fn sign_out_and_expiry_end_sessions() {
        let auth = MemoryAuthProvider::default();
        let created = auth.sign_up(sign_up("ada@example.com")).await.unwrap();
        auth.sign_out(&created.token).await.unwrap();
        assert!(auth.session(&created.token).await.unwrap().is_none());

        let expired = MemoryAuthProvider::new(Duration::seconds(-1));
        let created = expired.sign_up(sign_up("ada@example.com")).await.unwrap();
        assert!(expired.session(&created.token).await.unwrap().is_none());
        assert!(expired.store.read().sessions.is_empty());
    }

    #[tokio::test]
    async fn opening_a_session_drops_expired_ones() {
        let auth = MemoryAuthProvider::new(Duration::seconds(-1));
        auth.sign_up(sign_up("ada@example.com")).await.unwrap();
        for _ in 0..3 {
            auth.sign_in(sign_in("ada@example.com", "correct horse")).await.unwrap();
        }
        assert_eq!(auth.store.read().sessions.len(), 1);

        let live = MemoryAuthProvider::default();
        live.sign_up(sign_up("ada@example.com")).await.unwrap();
        live.sign_in(sign_in("ada@example.com", "correct horse")).await.unwrap();
        assert_eq!(live.store.read().sessions.len(), 2);
    }

    #[tokio::test]
    async fn seeds_admins() {
        let auth = MemoryAuthProvider::default();
        let seed = SeedFile {
            users: vec![SeedUser {
                email: "root@example.com".into(),
                name: "Root".into(),
                password: "hunter2hunter2".into(),
                role: Some(Role::Admin),
                email_verified: Some(true),
            }],
        };
        assert_eq!(auth.seed(&seed).unwrap(), 1);
        assert_eq!(auth.seed(&seed).unwrap(), 0);
        let session = auth.sign_in(sign_in("root@example.com", "hunter2hunter2")).await.unwrap();
        assert_eq!(session.user.role, Role::Admin);
        assert!(session.user.email_verified);
        assert_eq!(auth.list_users().await.unwrap().len(), 1);
    }
}
