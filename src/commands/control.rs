//! Device control commands

use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::commands::hub;
use crate::config::RuntimeContext;
use crate::connection::{HubClient, HubEvent};
use crate::controls::{self, brightness_call, switch_call, Dimmer, ServiceCall};
use crate::protocol::domain_of;
use crate::resolve::resolve_entity;

#[derive(Debug, Clone, Copy)]
pub enum Action {
    Toggle,
    On,
    Off,
}

pub async fn run(ctx: &RuntimeContext, action: Action, target: &str) -> Result<()> {
    let client = hub::connect(ctx).await?;

    let call = client.with_store(|store| -> Result<ServiceCall> {
        let entity_id = resolve_entity(store, target)?;
        match action {
            Action::Toggle => {
                let record = store
                    .entity(&entity_id)
                    .ok_or_else(|| anyhow!("{entity_id} has no state"))?;
                controls::toggle_action(&record.state).ok_or_else(|| {
                    anyhow!(
                        "{entity_id} cannot be toggled ({} devices have no tap action)",
                        record.state.domain()
                    )
                })
            }
            Action::On => Ok(switch_call(&entity_id, true)),
            Action::Off => Ok(switch_call(&entity_id, false)),
        }
    })?;

    send(&client, &call).await?;
    client.shutdown();
    Ok(())
}

async fn send(client: &HubClient, call: &ServiceCall) -> Result<()> {
    client
        .call_service_acked(&call.domain, &call.service, call.data.clone())
        .await
        .with_context(|| format!("calling {}.{}", call.domain, call.service))?;
    println!(
        "{}.{} {}",
        call.domain,
        call.service,
        call.data["entity_id"].as_str().unwrap_or_default()
    );
    Ok(())
}

/// Parse a brightness argument like `40` or `40%`
pub fn parse_percent(value: &str) -> Result<u8> {
    let digits = value.trim().trim_end_matches('%');
    let pct: u16 = digits
        .parse()
        .map_err(|_| anyhow!("'{value}' is not a brightness percentage"))?;
    if pct > 100 {
        bail!("Brightness must be between 0 and 100, got {pct}");
    }
    Ok(pct as u8)
}

pub async fn dim(ctx: &RuntimeContext, target: &str, value: &str) -> Result<()> {
    // validate before connecting
    let single = match value {
        "-" => None,
        other => Some(parse_percent(other)?),
    };

    let client = hub::connect(ctx).await?;
    let entity_id = client.with_store(|store| resolve_entity(store, target))?;
    if domain_of(&entity_id) != "light" {
        bail!("{entity_id} is not a light");
    }

    match single {
        Some(pct) => send(&client, &brightness_call(&entity_id, pct)).await?,
        None => dim_stream(ctx, &client, &entity_id).await?,
    }

    client.shutdown();
    Ok(())
}

/// Feed stdin lines through a dimmer, like dragging a slider
async fn dim_stream(ctx: &RuntimeContext, client: &HubClient, entity_id: &str) -> Result<()> {
    let mut dimmer = Dimmer::new(client, entity_id, ctx.debounce(), ctx.optimistic_window());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut events = client.subscribe();
    let mut sent = 0usize;

    loop {
        let deadline = dimmer.next_deadline();
        tokio::select! {
            Ok(HubEvent::StateChanged(changed)) = events.recv() => {
                if changed == entity_id {
                    dimmer.observe();
                }
            }
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_percent(&line) {
                    Ok(pct) => dimmer.drag(pct, Instant::now()),
                    Err(err) => log::warn!("{err}"),
                }
            }
            () = sleep_until(deadline) => {
                if let Some(pct) = dimmer.poll(Instant::now())? {
                    sent += 1;
                    log::info!("{entity_id} -> {pct}%");
                }
            }
        }
    }

    if let Some(pct) = dimmer.flush()? {
        sent += 1;
        log::info!("{entity_id} -> {pct}%");
    }

    // make sure the queued calls reached the hub before exiting
    client.ping().await?;
    println!(
        "{entity_id}: sent {sent} brightness update(s), showing {}%",
        dimmer.display(Instant::now())
    );
    Ok(())
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at.into()).await,
        None => std::future::pending().await,
    }
}
