//! User profile endpoint (/me)

use anyhow::{Context, Result};
use serde::Deserialize;

use super::client::SpotifyClient;
use crate::config::Config;

#[derive(Debug, Deserialize)]
struct Profile {
    id: String,
    display_name: Option<String>,
    email: Option<String>,
    country: Option<String>,
    product: Option<String>,
}

/// Fetch and display the current user's profile (verify auth works).
pub async fn whoami(config: &Config) -> Result<()> {
    let client = SpotifyClient::new(config)?;
    let resp = client.get("/me").await?;
    let profile: Profile = resp.json().await.context("Failed to parse /me response")?;

    println!();
    println!(
        "Display Name: {}",
        profile.display_name.as_deref().unwrap_or("(none)")
    );
    println!(
        "Email:        {}",
        profile.email.as_deref().unwrap_or("(none)")
    );
    println!(
        "Country:      {}",
        profile.country.as_deref().unwrap_or("(none)")
    );
    println!(
        "Product:      {}",
        profile.product.as_deref().unwrap_or("(none)")
    );
    println!("ID:           {}", profile.id);

    Ok(())
}
