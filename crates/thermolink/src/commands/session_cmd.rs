//! Login flow: prompt, authenticate, cache the token.

use secrecy::SecretString;
use tracing::debug;

use crate::cli::{GlobalOpts, LoginArgs};
use crate::error::CliError;
use crate::output;

pub async fn login(args: &LoginArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let ctx = super::open(global)?;

    let email = args.email.clone().unwrap_or_else(|| ctx.profile.email.clone());
    if email.is_empty() {
        return Err(CliError::NoCredentials {
            profile: ctx.profile.name.clone(),
        });
    }

    let password = match ctx.profile.password.clone() {
        Some(password) => password,
        None => {
            let raw = rpassword::prompt_password(format!("Password for {email}: "))?;
            SecretString::from(raw)
        }
    };

    if ctx.bridge.login(&email, &password).await? {
        if ctx.profile.use_keyring {
            if let Err(e) = thermolink_config::save_keyring_password(&email, &password) {
                debug!(error = %e, "keyring not updated");
            }
        }
        println!("{} logged in as {email}", output::ok_marker());
        Ok(())
    } else {
        Err(CliError::AuthFailed {
            message: "the service rejected the credentials".into(),
        })
    }
}
