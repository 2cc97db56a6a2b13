//! Admin dashboard sign-in flow.

use keel_api::{SignInForm, Validate};
use keel_protocol::{FieldIssue, Role, SessionView, SignInEmail};

use crate::{AuthClient, ClientError};

pub const SIGNIN_SUCCESS: &str = "Signin successful";
pub const NOT_AUTHORIZED: &str = "You are not authorized to access this page";
pub const SIGNIN_FALLBACK: &str = "Failed to sign in. Please try again.";

#[derive(Debug, thiserror::Error)]
pub enum SignInError {
    #[error("{}", .0.iter().map(|i| i.message.as_str()).collect::<Vec<_>>().join("; "))]
    Invalid(Vec<FieldIssue>),
    #[error("You are not authorized to access this page")]
    NotAuthorized,
    #[error("{0}")]
    Failed(String),
}

impl SignInError {
    /// Message shown to the user for a failed call.
    fn from_client(err: &ClientError) -> Self {
        let message = match err {
            ClientError::Remote { problem, .. } => problem.message().trim().to_string(),
            ClientError::Transport(err) => err
                .status()
                .and_then(|s| s.canonical_reason())
                .unwrap_or_default()
                .to_string(),
            _ => String::new(),
        };
        if message.is_empty() {
            SignInError::Failed(SIGNIN_FALLBACK.to_string())
        } else {
            SignInError::Failed(message)
        }
    }
}

/// Validate the form, sign in, and require the `admin` role.
///
/// A session without the admin role, or one that cannot be read back, is signed out again
/// before [`SignInError::NotAuthorized`] is returned.
pub async fn admin_sign_in(auth: &AuthClient, form: &SignInForm) -> Result<SessionView, SignInError> {
    form.validate().map_err(SignInError::Invalid)?;

    let request = SignInEmail {
        email: form.email.trim().to_string(),
        password: form.password.clone(),
        remember_me: None,
    };
    auth.sign_in_email(&request)
        .await
        .map_err(|err| SignInError::from_client(&err))?;

    match auth.get_session().await {
        Ok(Some(session)) if session.role() == Role::Admin => {
            tracing::info!(user = %session.user.email, "{SIGNIN_SUCCESS}");
            Ok(session)
        }
        outcome => {
            if let Err(err) = outcome {
                tracing::warn!("session lookup after sign-in failed: {err}");
            }
            if let Err(err) = auth.sign_out().await {
                tracing::debug!("sign-out after rejected sign-in failed: {err}");
            }
            Err(SignInError::NotAuthorized)
        }
    }
}
