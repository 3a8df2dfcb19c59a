//! Live state change stream

use anyhow::Result;
use chrono::Local;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use crate::commands::hub;
use crate::config::RuntimeContext;
use crate::connection::{HubClient, HubEvent};
use crate::controls::brightness_pct;
use crate::output;
use crate::resolve::resolve_area;

#[derive(Debug, Serialize)]
struct Change {
    time: String,
    entity_id: String,
    name: String,
    room: Option<String>,
    state: Option<String>,
}

pub async fn run(ctx: &RuntimeContext, room: Option<String>) -> Result<()> {
    let client = hub::connect(ctx).await?;
    let opts = hub::view_options(ctx, false)?;
    let area_id = match &room {
        Some(name) => Some(client.with_store(|store| resolve_area(store, name))?),
        None => None,
    };

    let mut events = client.subscribe();
    eprintln!("Watching for changes, Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(HubEvent::StateChanged(entity_id)) => {
                    if !opts.filter.is_entity_visible(&entity_id) {
                        continue;
                    }
                    let change = describe(&client, &entity_id);
                    if area_id.is_some() && change.room_id != area_id {
                        continue;
                    }
                    print_change(ctx, &change.change)?;
                }
                Ok(HubEvent::Connection(state)) => log::info!("Connection: {state:?}"),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("Skipped {skipped} events while busy");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    client.shutdown();
    Ok(())
}

struct Described {
    room_id: Option<String>,
    change: Change,
}

fn describe(client: &HubClient, entity_id: &str) -> Described {
    client.with_store(|store| {
        let record = store.entity(entity_id);
        let room_id = store.effective_area(entity_id).map(str::to_string);
        let state = record.map(|r| match r.state.domain() {
            "light" if r.state.state == "on" => format!("on {}%", brightness_pct(&r.state)),
            _ => r.state.state.clone(),
        });
        Described {
            change: Change {
                time: Local::now().format("%H:%M:%S").to_string(),
                entity_id: entity_id.to_string(),
                name: record.map_or_else(
                    || entity_id.to_string(),
                    |r| r.state.display_name().to_string(),
                ),
                room: store.area_of(entity_id).map(|a| a.name.clone()),
                state,
            },
            room_id,
        }
    })
}

fn print_change(ctx: &RuntimeContext, change: &Change) -> Result<()> {
    if ctx.is_table_output() {
        println!(
            "{}  {:<20} {:<28} {}",
            change.time,
            output::truncate(change.room.as_deref().unwrap_or("-"), 20),
            output::truncate(&change.name, 28),
            change.state.as_deref().unwrap_or("(removed)")
        );
    } else {
        // one compact document per line
        println!("{}", serde_json::to_string(change)?);
    }
    Ok(())
}
