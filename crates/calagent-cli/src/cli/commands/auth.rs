//! Auth command handlers.

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Context, Result, anyhow};
use calagent_core::config::{Config, paths};
use calagent_core::session::{AUTH_TOKEN_KEY, CallbackListener, SessionClient, callback, jwt};
use calagent_core::storage::{FileStorage, LocalStorage};
use chrono::{DateTime, Utc};

use super::session_client;

pub async fn login(config: &Config, no_browser: bool, callback_url: Option<&str>) -> Result<()> {
    let client = session_client(config)?;

    // Redirect already in hand: skip the provider round-trip.
    if let Some(input) = callback_url {
        let token = callback::parse_callback_input(input)
            .ok_or_else(|| anyhow!("No token found in callback URL"))?;
        return finish_login(&client, &token).await;
    }

    let auth_url = client.start_login().await.context("start login")?;

    println!("To sign in to Calendar Agent:");
    println!();
    println!("  1. A browser window will open (or visit the URL below)");
    println!("  2. Sign in with {} and authorize access", config.provider);
    println!("  3. If redirected to localhost, return here to continue");
    println!("  4. Otherwise, paste the full redirect URL");
    println!();
    println!("Authorization URL:");
    println!("  {auth_url}");
    println!();

    if !no_browser && let Err(err) = open::that(auth_url.as_str()) {
        tracing::warn!(error = %err, "failed to open browser");
    }

    // Prefer the local callback in interactive sessions, fall back to manual paste.
    let from_redirect = if io::stdin().is_terminal() {
        wait_for_redirect(config).await
    } else {
        None
    };
    let token = match from_redirect {
        Some(token) => token,
        None => prompt_for_token()?,
    };

    finish_login(&client, &token).await
}

async fn wait_for_redirect(config: &Config) -> Option<String> {
    let listener = match CallbackListener::bind(config.callback.port, &config.callback.path).await
    {
        Ok(listener) => listener,
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "callback listener unavailable");
            return None;
        }
    };

    if let Ok(uri) = listener.redirect_uri() {
        println!("Waiting for redirect on {uri} ...");
    }
    match listener.wait_for_token(config.callback.timeout()).await {
        Ok(Some(callback)) => {
            tracing::debug!(url = %callback.scrubbed_url, "received login redirect");
            Some(callback.token)
        }
        Ok(None) => None,
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "callback listener failed");
            None
        }
    }
}

fn prompt_for_token() -> Result<String> {
    print!("Paste the redirect URL (or token): ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    callback::parse_callback_input(&input).ok_or_else(|| anyhow!("Token cannot be empty"))
}

async fn finish_login(client: &SessionClient, token: &str) -> Result<()> {
    let profile = client
        .complete_login_callback(token)
        .await
        .context("complete login")?;

    println!();
    println!("✓ Signed in as {}", profile.display_name());
    if let Some(email) = profile.email.as_deref() {
        println!("  Email: {email}");
    }
    println!("  Token ({}) saved to: {}", jwt::mask_token(token), paths::storage_path().display());
    Ok(())
}

pub fn logout(config: &Config) -> Result<()> {
    let storage = FileStorage::open_default();
    let had_token = storage
        .get(AUTH_TOKEN_KEY)
        .context("read session store")?
        .is_some();

    session_client(config)?.logout();

    if had_token {
        println!("✓ Signed out");
        println!("  Token removed from: {}", storage.path().display());
    } else {
        println!("Not signed in (no token found).");
    }
    Ok(())
}

pub async fn whoami(config: &Config) -> Result<()> {
    let client = session_client(config)?;

    match client.initialize().await {
        Ok(Some(profile)) => {
            println!("{}", profile.display_name());
            if let Some(email) = profile.email.as_deref() {
                println!("  Email: {email}");
            }
            if let Some(id) = &profile.id {
                println!("  ID: {id}");
            }
            Ok(())
        }
        Ok(None) => {
            println!("Not signed in. Run `calagent login`.");
            Ok(())
        }
        Err(err) if err.is_auth_expired() => {
            anyhow::bail!("Session expired. Run `calagent login` to sign in again.")
        }
        Err(err) => Err(err).context("verify session"),
    }
}

/// Local-only view of the stored token.
pub fn status() -> Result<()> {
    let storage = FileStorage::open_default();
    let Some(token) = storage.get(AUTH_TOKEN_KEY).context("read session store")? else {
        println!("Not signed in.");
        return Ok(());
    };

    println!("Token: {}", jwt::mask_token(&token));
    println!("{}", describe_expiry(&token, Utc::now()));
    println!("Storage: {}", storage.path().display());
    Ok(())
}

fn describe_expiry(token: &str, now: DateTime<Utc>) -> String {
    match jwt::decode_expiry(token).and_then(|exp| DateTime::from_timestamp(exp, 0)) {
        Some(expires_at) if expires_at < now => format!("Expired: {}", expires_at.to_rfc3339()),
        Some(expires_at) => format!("Expires: {}", expires_at.to_rfc3339()),
        None => "Expires: unknown (token will be treated as expired)".to_string(),
    }
}
