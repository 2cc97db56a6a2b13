use keel_protocol::{
    AuthResponse, ListUsersResponse, SessionView, SignInEmail, SignOutResponse, SignUpEmail,
};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{ClientError, Link};

const AUTH_BASE: &str = "/api/auth";

/// Client for the `/api/auth` endpoints. Session cookies land in the link's [`Credentials`].
///
/// [`Credentials`]: crate::Credentials
#[derive(Debug, Clone)]
pub struct AuthClient {
    link: Link,
}

impl AuthClient {
    pub fn new(link: Link) -> Self {
        Self { link }
    }

    pub fn link(&self) -> &Link {
        &self.link
    }

    pub async fn sign_up_email(&self, request: &SignUpEmail) -> Result<AuthResponse, ClientError> {
        self.post("/sign-up/email", Some(request)).await
    }

    pub async fn sign_in_email(&self, request: &SignInEmail) -> Result<AuthResponse, ClientError> {
        self.post("/sign-in/email", Some(request)).await
    }

    /// Current session, or `None` when signed out or expired.
    pub async fn get_session(&self) -> Result<Option<SessionView>, ClientError> {
        let value = self.request::<()>(Method::GET, "/get-session", None).await?;
        self.decode(value)
    }

    /// Ends the session server-side. Local credentials are dropped even when the call fails.
    pub async fn sign_out(&self) -> Result<SignOutResponse, ClientError> {
        let result = self.post::<(), _>("/sign-out", None).await;
        self.link.credentials().clear();
        result
    }

    pub async fn list_users(&self) -> Result<ListUsersResponse, ClientError> {
        let value = self
            .request::<()>(Method::GET, "/admin/list-users", None)
            .await?;
        self.decode(value)
    }

    async fn post<B, T>(&self, path: &str, body: Option<&B>) -> Result<T, ClientError>
    where
        B: serde::Serialize,
        T: DeserializeOwned,
    {
        let value = self.request(Method::POST, path, body).await?;
        self.decode(value)
    }

    async fn request<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<Value, ClientError>
    where
        B: serde::Serialize,
    {
        let path = format!("{AUTH_BASE}{path}");
        self.link
            .send::<(), B>(method, &path, None, body)
            .await
            .map_err(|err| self.link.intercept(err))
    }

    fn decode<T: DeserializeOwned>(&self, value: Value) -> Result<T, ClientError> {
        serde_json::from_value(value)
            .map_err(|err| self.link.intercept(ClientError::Decode(err.to_string())))
    }
}
