//! Manual ordering and visibility commands

use anyhow::{bail, Result};
use serde::Serialize;
use tabled::Tabled;

use crate::cli::{OrderCommand, VisibilityArgs};
use crate::commands::hub;
use crate::config::RuntimeContext;
use crate::connection::HubClient;
use crate::order::{self, assign_orders, encode_order, move_item, LabelTarget, ORDER_GAP};
use crate::output;
use crate::resolve::{resolve_area, resolve_entity};
use crate::rooms::{self, ViewOptions};
use crate::store::HubStore;

pub async fn run(ctx: &RuntimeContext, command: OrderCommand) -> Result<()> {
    let client = hub::connect(ctx).await?;
    let result = match command {
        OrderCommand::Get { room } => get(ctx, &client, room.as_deref()),
        OrderCommand::Set {
            target,
            value,
            area,
        } => set(&client, &target, value, area).await,
        OrderCommand::Move {
            target,
            position,
            area,
        } => move_to(ctx, &client, &target, position, area).await,
    };
    client.shutdown();
    result
}

pub async fn visibility(ctx: &RuntimeContext, args: VisibilityArgs, hidden: bool) -> Result<()> {
    let client = hub::connect(ctx).await?;
    let id = resolve(&client, &args.target, args.area)?;
    let target = label_target(&id, args.area);

    order::set_hidden(&client, target, hidden).await?;
    println!("{} {id}", if hidden { "Hidden" } else { "Unhidden" });

    client.shutdown();
    Ok(())
}

#[derive(Debug, Clone, Serialize, Tabled)]
struct OrderRow {
    #[tabled(rename = "ORDER")]
    order: u32,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "HIDDEN")]
    hidden: bool,
}

fn get(ctx: &RuntimeContext, client: &HubClient, room: Option<&str>) -> Result<()> {
    let opts = hub::view_options(ctx, true)?;
    let rows = client.with_store(|store| -> Result<Vec<OrderRow>> {
        let rows = match room {
            None => rooms::rooms(store, &opts)
                .into_iter()
                .map(|room| OrderRow {
                    order: room.order,
                    name: room.name,
                    id: room.area_id,
                    hidden: room.hidden,
                })
                .collect(),
            Some(name) => {
                let area_id = resolve_area(store, name)?;
                rooms::find_room(store, &opts, &area_id)
                    .map(|room| room.entities)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|entity| OrderRow {
                        order: entity.order,
                        name: entity.name,
                        id: entity.entity_id,
                        hidden: entity.hidden,
                    })
                    .collect()
            }
        };
        Ok(rows)
    })?;

    output::print_table(ctx, &rows)
}

fn resolve(client: &HubClient, query: &str, area: bool) -> Result<String> {
    client.with_store(|store| {
        if area {
            resolve_area(store, query)
        } else {
            resolve_entity(store, query)
        }
    })
}

fn label_target(id: &str, area: bool) -> LabelTarget<'_> {
    if area {
        LabelTarget::Area(id)
    } else {
        LabelTarget::Entity(id)
    }
}

async fn set(client: &HubClient, query: &str, value: u32, area: bool) -> Result<()> {
    let id = resolve(client, query, area)?;
    order::set_order(client, label_target(&id, area), value).await?;
    println!("{id} -> {}", encode_order(value));
    Ok(())
}

/// Ids and order values of the list `id` belongs to, in display order
fn siblings(store: &HubStore, opts: &ViewOptions, id: &str, area: bool) -> Vec<(String, u32)> {
    if area {
        return rooms::rooms(store, opts)
            .into_iter()
            .map(|room| (room.area_id, room.order))
            .collect();
    }

    let entities = match store.effective_area(id) {
        Some(area_id) => rooms::find_room(store, opts, area_id)
            .map(|room| room.entities)
            .unwrap_or_default(),
        None => rooms::unassigned(store, opts),
    };
    entities
        .into_iter()
        .map(|entity| (entity.entity_id, entity.order))
        .collect()
}

async fn move_to(
    ctx: &RuntimeContext,
    client: &HubClient,
    query: &str,
    position: u64,
    area: bool,
) -> Result<()> {
    let id = resolve(client, query, area)?;
    let opts = hub::view_options(ctx, true)?;

    let mut items = client.with_store(|store| siblings(store, &opts, &id, area));
    let Some(from) = items.iter().position(|(item, _)| *item == id) else {
        bail!("{id} is not shown on the dashboard");
    };
    let to = usize::try_from(position.saturating_sub(1))
        .unwrap_or(usize::MAX)
        .min(items.len() - 1);

    move_item(&mut items, from, to);
    let orders: Vec<u32> = items.iter().map(|(_, order)| *order).collect();
    let changes = assign_orders(&orders, to, ORDER_GAP);
    log::debug!(
        "Moving {id} from {} to {}: {} order changes",
        from + 1,
        to + 1,
        changes.len()
    );

    for change in &changes {
        let (item, current) = &items[change.index];
        if *current == change.order {
            continue;
        }
        order::set_order(client, label_target(item, area), change.order).await?;
    }

    println!("Moved {id} to position {}", to + 1);
    Ok(())
}
