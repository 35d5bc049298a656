//! Playback state endpoint (/me/player)

use anyhow::{Context, Result};
use serde::Deserialize;

use super::client::SpotifyClient;
use crate::config::Config;

#[derive(Debug, Deserialize)]
struct PlaybackState {
    is_playing: bool,
    progress_ms: Option<u64>,
    device: Option<Device>,
    item: Option<Track>,
}

#[derive(Debug, Deserialize)]
struct Device {
    name: String,
    volume_percent: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct Track {
    name: String,
    duration_ms: u64,
    artists: Vec<Artist>,
    album: Album,
}

#[derive(Debug, Deserialize)]
struct Artist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Album {
    name: String,
}

/// Fetch and display the current playback state.
pub async fn playback(config: &Config) -> Result<()> {
    let client = SpotifyClient::new(config)?;
    let resp = client.get("/me/player").await?;

    // 204 means no active device
    if resp.status() == reqwest::StatusCode::NO_CONTENT {
        println!("Nothing playing.");
        return Ok(());
    }

    let state: PlaybackState = resp
        .json()
        .await
        .context("Failed to parse /me/player response")?;

    println!();
    match &state.item {
        Some(track) => {
            let artists = track
                .artists
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            println!("Track:   {} - {}", artists, track.name);
            println!("Album:   {}", track.album.name);
            println!(
                "At:      {} / {}",
                format_ms(state.progress_ms.unwrap_or(0)),
                format_ms(track.duration_ms)
            );
        }
        None => println!("Track:   (none)"),
    }
    println!("Playing: {}", if state.is_playing { "yes" } else { "paused" });
    if let Some(device) = &state.device {
        match device.volume_percent {
            Some(vol) => println!("Device:  {} ({}%)", device.name, vol),
            None => println!("Device:  {}", device.name),
        }
    }

    Ok(())
}

fn format_ms(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{}:{:02}", secs / 60, secs % 60)
}
