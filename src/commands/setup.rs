//! First-run setup: check and save credentials

use std::io::{self, BufRead, Write};
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::api::RestClient;
use crate::config::RuntimeContext;
use crate::local_state::CredentialStore;

pub async fn run(ctx: &RuntimeContext, skip_check: bool) -> Result<()> {
    let server = match ctx
        .global
        .server
        .clone()
        .or_else(|| ctx.config.homeassistant.server.clone())
    {
        Some(server) => server,
        None => prompt("Home Assistant URL (e.g. http://homeassistant.local:8123): ")?,
    };
    let token = match ctx
        .global
        .token
        .clone()
        .or_else(|| ctx.config.homeassistant.token.clone())
    {
        Some(token) => token,
        None => prompt("Long-lived access token: ")?,
    };

    if server.is_empty() {
        bail!("Server URL must not be empty");
    }
    if token.is_empty() {
        bail!("Access token must not be empty");
    }

    let client = RestClient::new(
        &server,
        &token,
        Duration::from_secs(ctx.timeout()),
        ctx.insecure(),
    )?;

    if skip_check {
        log::info!("Skipping connection check for {}", client.base_url());
    } else {
        let info = client
            .probe()
            .await
            .with_context(|| format!("checking {}", client.base_url()))?;
        println!(
            "Connected to {} (Home Assistant {}, {})",
            info.location_name, info.version, info.time_zone
        );
    }

    ctx.state_file()
        .save_credentials(client.base_url(), &token)?;
    println!("Saved credentials to {}", ctx.state_file().path().display());
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    let mut stderr = io::stderr();
    write!(stderr, "{label}")?;
    stderr.flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading from stdin")?;
    Ok(line.trim().to_string())
}
