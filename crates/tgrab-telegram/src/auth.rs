//! First-run sign-in.

use grammers_client::{Client, SignInError};
use tracing::info;

use tgrab_core::{Error, Result};

/// Operator prompts needed during interactive sign-in; the binary answers
/// them on stdin.
pub trait AuthPrompt: Send + Sync {
    fn login_code(&self) -> Result<String>;
    fn password(&self, hint: &str) -> Result<String>;
}

/// Run the code (and, for 2FA accounts, password) sign-in sequence.
pub(crate) async fn sign_in(
    client: &Client,
    phone: &str,
    prompt: &dyn AuthPrompt,
) -> Result<()> {
    info!(phone, "session not authorized, starting sign-in");

    let token = client
        .request_login_code(phone)
        .await
        .map_err(|e| Error::Transport(format!("login code request failed: {e}")))?;
    let code = prompt.login_code()?;

    match client.sign_in(&token, &code).await {
        Ok(user) => {
            info!(user = user.id(), "signed in");
            Ok(())
        }
        Err(SignInError::PasswordRequired(password_token)) => {
            let hint = password_token
                .hint()
                .map(|h| h.to_string())
                .unwrap_or_default();
            let password = prompt.password(&hint)?;
            let user = client
                .check_password(password_token, password.trim())
                .await
                .map_err(|e| Error::Transport(format!("password check failed: {e}")))?;
            info!(user = user.id(), "signed in with password");
            Ok(())
        }
        Err(e) => Err(Error::Transport(format!("sign-in failed: {e}"))),
    }
}
