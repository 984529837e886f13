//! Login handshake.
//!
//! ```text
//! <- login:␠
//! -> <user><CR><LF>
//! <- password:␠
//! -> <password><CR><LF>        (never logged)
//! <- ... QNET>␠                success
//! <- bad login ... login:      failure
//! ```

use crate::{Session, Transport};
use bytes::Bytes;
use qslink_core::{
    Error, Result,
    constants::{LINE_TERMINATOR, LOGIN_PROMPT, LOGIN_RETRY_PROMPT, PASSWORD_PROMPT, PROMPT},
};
use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// User name and password for one processor.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user: String,
    pub token: SecretString,
}

impl Credentials {
    pub fn new(user: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            token: SecretString::from(token.into()),
        }
    }
}

/// Resolves credentials by the key id configured for a controller.
pub trait CredentialStore: Send + Sync {
    /// # Errors
    ///
    /// Returns [`Error::MissingCredentials`] for an unknown key id.
    fn lookup(&self, key_id: &str) -> Result<Credentials>;
}

/// Run the login handshake over `session`.
///
/// # Errors
///
/// - [`Error::Login`] if the operational prompt is not reached
/// - any transport error or [`Error::Cancelled`] from the session
pub async fn login<T: Transport>(
    session: &Session<T>,
    credentials: &Credentials,
    cancel: &CancellationToken,
) -> Result<()> {
    let user = credentials.user.as_str();

    session
        .read_until(&[LOGIN_PROMPT], cancel)
        .await
        .inspect_err(|e| warn!(user, error = %e, "No login prompt"))?;
    session
        .send(Bytes::from(format!("{user}{LINE_TERMINATOR}")), cancel)
        .await?;

    session
        .read_until(&[PASSWORD_PROMPT], cancel)
        .await
        .inspect_err(|e| warn!(user, error = %e, "No password prompt"))?;
    let password = format!("{}{LINE_TERMINATOR}", credentials.token.expose_secret());
    session.send_sensitive(Bytes::from(password), cancel).await?;

    let reply = session
        .read_until(&[PROMPT, LOGIN_RETRY_PROMPT], cancel)
        .await?;
    if !reply.ends_with(PROMPT.as_bytes()) {
        warn!(user, "Login rejected");
        return Err(Error::Login);
    }

    info!(user, "Logged in");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IdleTimer, mock::MockTransport};
    use rstest::rstest;
    use std::sync::Arc;
    use std::time::Duration;

    fn session(transport: &MockTransport) -> Session<MockTransport> {
        Session::new(
            transport.clone(),
            Arc::new(IdleTimer::new(Duration::from_secs(60))),
        )
    }

    #[tokio::test]
    async fn test_login_success() {
        let transport = MockTransport::processor("lutron", "integration");
        let session = session(&transport);
        let cancel = CancellationToken::new();

        login(&session, &Credentials::new("lutron", "integration"), &cancel)
            .await
            .unwrap();

        let sent = transport.sent();
        assert_eq!(&sent[0][..], b"lutron\r\n");
        assert_eq!(&sent[1][..], b"integration\r\n");
    }

    #[rstest]
    #[case("wrong")]
    #[case("")]
    #[case("Integration")]
    #[case("integration ")]
    #[tokio::test]
    async fn test_login_bad_password(#[case] password: &str) {
        let transport = MockTransport::processor("lutron", "integration");
        let session = session(&transport);
        let cancel = CancellationToken::new();

        let err = login(&session, &Credentials::new("lutron", password), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Login));
        assert_eq!(transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_login_without_prompt_times_out() {
        let transport = MockTransport::new();
        let session = session(&transport);
        let cancel = CancellationToken::new();

        let err = login(&session, &Credentials::new("lutron", "integration"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_credentials_debug_redacts_token() {
        let creds = Credentials::new("lutron", "integration");
        let debug = format!("{creds:?}");
        assert!(debug.contains("lutron"));
        assert!(!debug.contains("integration"));
    }
}
