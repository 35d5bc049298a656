//! API client module for the Spotify Web API

pub mod client;
mod me;
mod player;

use anyhow::{bail, Context, Result};
use reqwest::Method;

use crate::config::Config;

/// Show current user profile
pub async fn whoami(config: &Config) -> Result<()> {
    me::whoami(config).await
}

/// Show current playback state
pub async fn playback(config: &Config) -> Result<()> {
    player::playback(config).await
}

/// Issue an arbitrary authenticated request against the resource API and
/// print the response body (pretty-printed when it is JSON).
pub async fn call_raw(
    config: &Config,
    method: &str,
    path: &str,
    query: &[String],
    body: Option<&str>,
) -> Result<()> {
    let method: Method = method
        .to_uppercase()
        .parse()
        .map_err(|_| anyhow::anyhow!("Unsupported HTTP method: {method}"))?;

    let query = query
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => Ok((k.to_string(), v.to_string())),
            None => bail!("Query parameter must be key=value, got: {pair}"),
        })
        .collect::<Result<Vec<_>>>()?;

    let body = body
        .map(|raw| serde_json::from_str::<serde_json::Value>(raw).context("Body is not valid JSON"))
        .transpose()?;

    let client = client::SpotifyClient::new(config)?;
    let resp = client.request(method, path, &query, body.as_ref()).await?;

    if resp.status() == reqwest::StatusCode::NO_CONTENT {
        println!("(no content)");
        return Ok(());
    }

    let text = resp.text().await.context("Failed to read response body")?;
    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Err(_) => println!("{text}"),
    }
    Ok(())
}
