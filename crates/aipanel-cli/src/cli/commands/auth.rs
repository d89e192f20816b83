//! Login/logout handlers for the stored session token.

use aipanel_core::auth::SessionStore;
use anyhow::{Context, Result};

pub fn login(token: &str) -> Result<()> {
    let store = SessionStore::default_location();
    store.set_token(token).context("save session token")?;
    println!("Saved session token to {}", store.path().display());
    Ok(())
}

pub fn logout() -> Result<()> {
    let store = SessionStore::default_location();
    if store.clear().context("clear session token")? {
        println!("Logged out.");
    } else {
        println!("No stored session.");
    }
    Ok(())
}
