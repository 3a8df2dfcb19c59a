//! Room listing commands

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tabled::Tabled;

use crate::cli::RoomsArgs;
use crate::commands::hub;
use crate::config::RuntimeContext;
use crate::output;
use crate::resolve::resolve_area;
use crate::rooms::{self, EntityView, RoomSummary, RoomView};

pub async fn run(ctx: &RuntimeContext, args: RoomsArgs) -> Result<()> {
    let client = hub::connect(ctx).await?;
    let opts = hub::view_options(ctx, args.all)?;

    client.with_store(|store| {
        if args.unassigned {
            let rows: Vec<EntityRow> = rooms::unassigned(store, &opts)
                .iter()
                .map(EntityRow::from)
                .collect();
            return output::print_table(ctx, &rows);
        }

        if args.floors {
            let floors = rooms::floors(store, &opts);
            if !ctx.is_table_output() {
                return output::print_output(ctx, &floors);
            }
            for floor in floors.iter().filter(|f| !f.rooms.is_empty()) {
                println!("{}", floor.name.as_deref().unwrap_or("No floor"));
                let rows: Vec<RoomRow> = floor.rooms.iter().map(RoomRow::from).collect();
                output::print_table(ctx, &rows)?;
            }
            return Ok(());
        }

        let rooms = rooms::rooms(store, &opts);
        if ctx.is_table_output() {
            let rows: Vec<RoomRow> = rooms.iter().map(RoomRow::from).collect();
            output::print_table(ctx, &rows)
        } else {
            let listed: Vec<RoomListing> = rooms.iter().map(RoomListing::from).collect();
            output::print_output(ctx, &listed)
        }
    })?;

    client.shutdown();
    Ok(())
}

/// Devices in one room
pub async fn show(ctx: &RuntimeContext, name: &str, all: bool) -> Result<()> {
    let client = hub::connect(ctx).await?;
    let opts = hub::view_options(ctx, all)?;

    client.with_store(|store| {
        let area_id = resolve_area(store, name)?;
        let Some(room) = rooms::find_room(store, &opts, &area_id) else {
            anyhow::bail!("Room '{name}' has no view");
        };

        if !ctx.is_table_output() {
            return output::print_output(ctx, &RoomListing::from(&room));
        }

        let summary = room.summary();
        println!("{} ({})", room.name, describe(&summary));
        let rows: Vec<EntityRow> = room.entities.iter().map(EntityRow::from).collect();
        output::print_table(ctx, &rows)
    })?;

    client.shutdown();
    Ok(())
}

fn describe(summary: &RoomSummary) -> String {
    let mut parts = vec![format!(
        "{}/{} lights on",
        summary.lights_on, summary.lights_total
    )];
    if let Some(pct) = summary.average_brightness {
        parts.push(format!("{pct}%"));
    }
    if let Some(temp) = summary.temperature {
        parts.push(format!("{temp}°"));
    }
    parts.join(", ")
}

/// Room with its summary, for JSON and YAML output
#[derive(Debug, Serialize)]
struct RoomListing<'a> {
    #[serde(flatten)]
    room: &'a RoomView,
    summary: RoomSummary,
}

impl<'a> From<&'a RoomView> for RoomListing<'a> {
    fn from(room: &'a RoomView) -> Self {
        Self {
            room,
            summary: room.summary(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Tabled)]
struct RoomRow {
    #[tabled(rename = "ORDER")]
    order: u32,
    #[tabled(rename = "ROOM")]
    name: String,
    #[tabled(rename = "LIGHTS")]
    lights: String,
    #[tabled(rename = "BRIGHTNESS")]
    brightness: String,
    #[tabled(rename = "ACTIVE")]
    active: usize,
    #[tabled(rename = "TEMP")]
    temperature: String,
}

impl From<&RoomView> for RoomRow {
    fn from(room: &RoomView) -> Self {
        let summary = room.summary();
        let mut name = output::truncate(&room.name, 32);
        if room.hidden {
            name.push_str(" (hidden)");
        }
        Self {
            order: room.order,
            name,
            lights: format!("{}/{}", summary.lights_on, summary.lights_total),
            brightness: summary
                .average_brightness
                .map_or_else(|| "-".to_string(), |pct| format!("{pct}%")),
            active: summary.active,
            temperature: summary
                .temperature
                .map_or_else(|| "-".to_string(), |t| format!("{t}°")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Tabled)]
struct EntityRow {
    #[tabled(rename = "ORDER")]
    order: u32,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "ENTITY")]
    entity_id: String,
    #[tabled(rename = "STATE")]
    state: String,
    #[tabled(rename = "CHANGED")]
    changed: String,
}

impl From<&EntityView> for EntityRow {
    fn from(entity: &EntityView) -> Self {
        let mut name = output::truncate(&entity.name, 32);
        if entity.hidden {
            name.push_str(" (hidden)");
        }
        Self {
            order: entity.order,
            name,
            entity_id: entity.entity_id.clone(),
            state: output::format_state(&entity.state, entity.brightness),
            changed: output::changed_ago(&entity.last_changed, Utc::now()),
        }
    }
}
