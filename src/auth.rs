//! Login flow against the CYBERHOME/enecoQ portal.
//!
//! The portal exposes no API token; the only way in is the login form.
//! Selectors and the signed-in marker below are site contract and must
//! track the portal's own markup and text exactly.

use std::fmt;

use tracing::{debug, warn};

use crate::driver::{LoadState, PageSession};
use crate::error::{Error, Result};

/// CYBERHOME login endpoint.
pub const LOGIN_URL: &str = "https://www.cyberhome.ne.jp/app/sslLogin.do";

/// Login form selectors.
pub const EMAIL_SELECTOR: &str = "input[name=\"user_id\"]";
pub const PASSWORD_SELECTOR: &str = "input[name=\"password\"]";
pub const SUBMIT_SELECTOR: &str = "button[type=\"submit\"]";

/// Generic error-banner region shown on failed login.
pub const ERROR_MESSAGE_SELECTOR: &str = ".error, .alert, [class*=\"error\"]";

/// Visible text of the sign-out anchor. The portal's sign-out affordance
/// has no stable href, so the signed-in check matches by text.
pub const LOGOUT_TEXT: &str = "ログアウト";

/// Account credentials, held for the lifetime of one fetch operation.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"****")
            .finish()
    }
}

/// Drives the portal login form and verifies the post-login state.
pub struct Authenticator {
    credentials: Credentials,
}

impl Authenticator {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// Log in on the given page.
    ///
    /// Structural and verification failures come back as `Authentication`
    /// and are never retried. Driver-level transient failures (navigation
    /// timeouts, connection drops) pass through unchanged so the caller's
    /// retry loop can handle them.
    pub async fn login(&self, page: &dyn PageSession) -> Result<()> {
        debug!("navigating to login page");
        page.navigate(LOGIN_URL).await?;
        page.wait_for_state(LoadState::NetworkIdle).await?;

        let email_inputs = page.locate(EMAIL_SELECTOR).await?;
        let email_input = email_inputs
            .first()
            .ok_or_else(|| Error::authentication("login form not found on page"))?;
        if !email_input.is_visible().await.unwrap_or(false) {
            return Err(Error::authentication("login form not found on page"));
        }
        email_input.fill(&self.credentials.email).await?;

        let password_inputs = page.locate(PASSWORD_SELECTOR).await?;
        let password_input = password_inputs
            .first()
            .ok_or_else(|| Error::authentication("login form not found on page"))?;
        password_input.fill(self.credentials.password()).await?;

        let submit_buttons = page.locate(SUBMIT_SELECTOR).await?;
        let submit = submit_buttons
            .first()
            .ok_or_else(|| Error::authentication("login form has no submit control"))?;
        submit.click().await?;

        page.wait_for_state(LoadState::NetworkIdle).await?;

        if self.is_logged_in(page).await {
            debug!("signed-in marker present");
            return Ok(());
        }

        // Look for a portal error banner to surface a concrete reason.
        let mut message = String::from("authentication failed");
        match page.locate(ERROR_MESSAGE_SELECTOR).await {
            Ok(banners) => {
                if let Some(banner) = banners.first() {
                    if let Ok(Some(text)) = banner.text_content().await {
                        let text = text.trim();
                        if !text.is_empty() {
                            message = format!("authentication failed: {text}");
                        }
                    }
                }
            }
            Err(err) => warn!("could not read error banner: {err}"),
        }
        Err(Error::authentication(message))
    }

    /// Whether the page currently shows the signed-in marker.
    ///
    /// Never fails: any driver error during the check counts as not
    /// logged in.
    pub async fn is_logged_in(&self, page: &dyn PageSession) -> bool {
        let anchors = match page.locate("a").await {
            Ok(anchors) => anchors,
            Err(_) => return false,
        };
        for anchor in anchors {
            if let Ok(Some(text)) = anchor.text_content().await {
                if text.contains(LOGOUT_TEXT) {
                    return true;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::FakePortal;
    use crate::driver::SessionDriver;

    #[tokio::test]
    async fn test_is_logged_in_swallows_driver_errors() {
        let portal = FakePortal::builder().fail_all_locates().build();
        let session = portal.open_session().await.unwrap();
        let auth = Authenticator::new(Credentials::new("user@example.com", "secret"));
        assert!(!auth.is_logged_in(session.as_ref()).await);
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::new("user@example.com", "hunter2");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("user@example.com"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("****"));
    }
}
