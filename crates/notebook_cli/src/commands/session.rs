//! Session command implementation.

use super::CommandResult;
use chrono::Utc;
use notebook_sync_engine::{
    CredentialProvider, FileSecureStorage, SessionCookies, DEFAULT_CREDENTIAL_KEY,
};
use std::fs;
use std::path::{Path, PathBuf};

/// Where a new session comes from.
pub enum SessionSource {
    /// A JSON cookie blob on disk.
    Import(PathBuf),
    /// A sign-in against a server.
    Login {
        /// Server base URL.
        server: String,
        /// User name.
        user: String,
    },
}

/// Stores a session if a source is given, then lists the valid cookies.
pub async fn run(dir: &Path, source: Option<SessionSource>) -> CommandResult<()> {
    let provider = CredentialProvider::new(FileSecureStorage::new(dir), DEFAULT_CREDENTIAL_KEY);

    match source {
        Some(SessionSource::Import(file)) => {
            let cookies: SessionCookies = serde_json::from_str(&fs::read_to_string(&file)?)?;
            provider.store_session(&cookies)?;
            println!("Imported {} cookie(s) from {}", cookies.len(), file.display());
        }
        Some(SessionSource::Login { server, user }) => {
            let cookies = login(&server, &user).await?;
            provider.store_session(&cookies)?;
            println!("Signed in as {user}");
        }
        None => {}
    }

    let valid = provider.valid_cookie_names_at(Utc::now())?;
    if valid.is_empty() {
        println!("No valid cookies: sign in required");
    } else {
        println!("Valid cookies: {}", valid.join(", "));
    }
    Ok(())
}

async fn login(server: &str, user: &str) -> CommandResult<SessionCookies> {
    let url = format!("{}/auth/session", server.trim_end_matches('/'));
    let response = reqwest::Client::new()
        .post(url)
        .json(&serde_json::json!({ "user": user }))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(format!("sign in failed ({}): {}", status.as_u16(), body).into());
    }
    Ok(response.json().await?)
}
