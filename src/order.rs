//! Manual ordering and visibility stored in hub labels
//!
//! The hub has no manual sort field for areas or entities, so the sort key
//! is written into a label name: `roomdeck:order:0042`. The zero padding
//! keeps lexical and numeric label order in agreement. Hidden items carry
//! the `roomdeck:hidden` label.
//!
//! Writes are not atomic: two clients creating the same padded label at
//! the same time may both succeed. Only display order is affected.

use serde_json::{json, Map, Value};

use crate::connection::Hub;
use crate::error::HubResult;
use crate::protocol::{Command, Label, RegistryKind};
use crate::store::HubStore;

pub const ORDER_LABEL_PREFIX: &str = "roomdeck:order:";
pub const HIDDEN_LABEL: &str = "roomdeck:hidden";

/// Order of items without an order label
pub const DEFAULT_ORDER: u32 = 99;

/// Spacing used when renumbering
pub const ORDER_GAP: u32 = 10;

/// Largest value that fits the padded label
pub const MAX_ORDER: u32 = 9999;

const ORDER_WIDTH: usize = 4;

/// Something that can carry labels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelTarget<'a> {
    Area(&'a str),
    Entity(&'a str),
}

impl LabelTarget<'_> {
    fn registry(self) -> RegistryKind {
        match self {
            Self::Area(_) => RegistryKind::Area,
            Self::Entity(_) => RegistryKind::Entity,
        }
    }

    fn noun(self) -> &'static str {
        match self {
            Self::Area(_) => "area",
            Self::Entity(_) => "entity",
        }
    }

    fn key(&self) -> &str {
        match self {
            Self::Area(id) | Self::Entity(id) => id,
        }
    }

    /// Label ids currently attached to the target
    pub fn labels(self, store: &HubStore) -> Vec<String> {
        match self {
            Self::Area(id) => store.area(id).map(|a| a.labels.clone()),
            Self::Entity(id) => store.entity_entry(id).map(|e| e.labels.clone()),
        }
        .unwrap_or_default()
    }
}

/// Label name for an order value
pub fn encode_order(value: u32) -> String {
    format!("{ORDER_LABEL_PREFIX}{value:0ORDER_WIDTH$}")
}

/// Order value of a label name, if it is an order label
pub fn decode_order(name: &str) -> Option<u32> {
    let digits = name.strip_prefix(ORDER_LABEL_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Decode the first order label among `names`, or the default
pub fn order_from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> u32 {
    names
        .into_iter()
        .find_map(decode_order)
        .unwrap_or(DEFAULT_ORDER)
}

/// Current order value of an area or entity
pub fn order_of(store: &HubStore, target: LabelTarget<'_>) -> u32 {
    let labels = target.labels(store);
    let order = order_from_names(store.label_names(&labels));
    order
}

pub fn is_hidden(store: &HubStore, target: LabelTarget<'_>) -> bool {
    let labels = target.labels(store);
    let hidden = store.label_names(&labels).any(|name| name == HIDDEN_LABEL);
    hidden
}

/// Write a new order value for an area or entity
pub async fn set_order<H: Hub>(hub: &H, target: LabelTarget<'_>, value: u32) -> HubResult<()> {
    let name = encode_order(value);
    let mut labels = hub.with_store(|store| {
        let current = target.labels(store);
        current
            .into_iter()
            .filter(|id| {
                store
                    .label(id)
                    .map_or(true, |label| decode_order(&label.name).is_none())
            })
            .collect::<Vec<_>>()
    });

    let label_id = ensure_label(hub, &name).await?;
    labels.push(label_id);

    log::debug!("Setting {} {} order to {value}", target.noun(), target.key());
    write_labels(hub, target, labels).await
}

/// Add or remove the hidden label
pub async fn set_hidden<H: Hub>(hub: &H, target: LabelTarget<'_>, hidden: bool) -> HubResult<()> {
    let (mut labels, existing) = hub.with_store(|store| {
        (
            target.labels(store),
            store.label_by_name(HIDDEN_LABEL).map(|l| l.label_id.clone()),
        )
    });

    if hidden {
        let label_id = match existing {
            Some(id) => id,
            None => ensure_label(hub, HIDDEN_LABEL).await?,
        };
        if labels.contains(&label_id) {
            return Ok(());
        }
        labels.push(label_id);
    } else {
        let Some(label_id) = existing else {
            return Ok(());
        };
        let before = labels.len();
        labels.retain(|id| *id != label_id);
        if labels.len() == before {
            return Ok(());
        }
    }

    write_labels(hub, target, labels).await
}

/// Reuse a label with this name or create it
async fn ensure_label<H: Hub>(hub: &H, name: &str) -> HubResult<String> {
    if let Some(id) = hub.with_store(|store| store.label_by_name(name).map(|l| l.label_id.clone()))
    {
        return Ok(id);
    }

    log::debug!("Creating label {name}");
    let created = hub.request(Command::create_label(name)).await?;
    let label: Label = serde_json::from_value(created)?;
    Ok(label.label_id)
}

async fn write_labels<H: Hub>(
    hub: &H,
    target: LabelTarget<'_>,
    labels: Vec<String>,
) -> HubResult<()> {
    let mut fields = Map::new();
    fields.insert("labels".to_string(), json!(labels));
    hub.request(Command::update(target.registry(), target.key(), fields))
        .await
        .map(|_: Value| ())
}

/// Move one element of `items` from `from` to `to`
pub fn move_item<T>(items: &mut Vec<T>, from: usize, to: usize) {
    if from >= items.len() || from == to {
        return;
    }
    let item = items.remove(from);
    let to = to.min(items.len());
    items.insert(to, item);
}

/// New order value for one item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderChange {
    pub index: usize,
    pub order: u32,
}

/// Order values for a list after one item moved to `moved`
///
/// `orders` holds the current order values already arranged in the new
/// visual order. Returns either a single change for the moved item or a
/// renumbering of the whole list at `gap` spacing.
pub fn assign_orders(orders: &[u32], moved: usize, gap: u32) -> Vec<OrderChange> {
    let len = orders.len();
    if moved >= len {
        return Vec::new();
    }
    if len == 1 {
        return if orders[0] == 0 {
            vec![OrderChange {
                index: 0,
                order: gap,
            }]
        } else {
            Vec::new()
        };
    }

    let candidate = if moved == 0 {
        Some((orders[1] / 2).max(1))
    } else if moved == len - 1 {
        orders[moved - 1].checked_add(gap)
    } else {
        let (prev, next) = (orders[moved - 1], orders[moved + 1]);
        Some(prev + next.saturating_sub(prev) / 2)
    };

    if let Some(order) = candidate.filter(|&order| order <= MAX_ORDER) {
        let fits = orders.iter().enumerate().all(|(i, &o)| {
            let value = if i == moved { order } else { o };
            i == 0 || {
                let previous = if i - 1 == moved { order } else { orders[i - 1] };
                previous < value
            }
        });
        if fits {
            return vec![OrderChange {
                index: moved,
                order,
            }];
        }
    }

    // shrink the gap so long lists still fit below MAX_ORDER
    let count = u32::try_from(len).unwrap_or(u32::MAX);
    let gap = gap.min(MAX_ORDER / count).max(1);
    (0..len)
        .map(|index| OrderChange {
            index,
            order: renumbered(index, gap),
        })
        .collect()
}

fn renumbered(index: usize, gap: u32) -> u32 {
    u32::try_from(index + 1)
        .unwrap_or(u32::MAX)
        .saturating_mul(gap)
}

/// Apply `changes` to a copy of `orders`
pub fn apply_changes(orders: &[u32], changes: &[OrderChange]) -> Vec<u32> {
    let mut next = orders.to_vec();
    for change in changes {
        if let Some(slot) = next.get_mut(change.index) {
            *slot = change.order;
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::testing::FakeHub;

    fn strictly_increasing(orders: &[u32]) -> bool {
        orders.windows(2).all(|w| w[0] < w[1])
    }

    /// Reorder `orders` as a drag from `from` to `to` would
    fn drag(orders: &[u32], from: usize, to: usize) -> Vec<u32> {
        let mut arranged = orders.to_vec();
        move_item(&mut arranged, from, to);
        apply_changes(&arranged, &assign_orders(&arranged, to, ORDER_GAP))
    }

    #[test]
    fn test_order_label_codec() {
        assert_eq!(encode_order(42), "roomdeck:order:0042");
        assert_eq!(decode_order("roomdeck:order:0042"), Some(42));
        assert_eq!(decode_order("roomdeck:order:"), None);
        assert_eq!(decode_order("roomdeck:order:12a"), None);
        assert_eq!(decode_order("roomdeck:order:-1"), None);
        assert_eq!(decode_order("favourites"), None);
        for value in 1..=9999 {
            assert_eq!(decode_order(&encode_order(value)), Some(value));
        }
    }

    #[test]
    fn test_padding_keeps_lexical_order() {
        let mut names: Vec<String> = [500, 9, 1200, 70].into_iter().map(encode_order).collect();
        names.sort();
        let decoded: Vec<u32> = names.iter().filter_map(|n| decode_order(n)).collect();
        assert_eq!(decoded, vec![9, 70, 500, 1200]);
    }

    #[test]
    fn test_order_defaults_to_sentinel() {
        assert_eq!(order_from_names(["kitchen", "roomdeck:order:xx"]), DEFAULT_ORDER);
        assert_eq!(order_from_names(["kitchen", "roomdeck:order:0007"]), 7);
    }

    #[test]
    fn test_move_item_keeps_relative_order() {
        let mut items = vec!["a", "b", "c", "d", "e", "f"];
        move_item(&mut items, 3, 0);
        assert_eq!(items, vec!["d", "a", "b", "c", "e", "f"]);

        move_item(&mut items, 0, 10);
        assert_eq!(items, vec!["a", "b", "c", "e", "f", "d"]);
    }

    #[test]
    fn test_move_to_front_halves_next() {
        let orders = [10, 20, 30, 40];
        let arranged = {
            let mut o = orders.to_vec();
            move_item(&mut o, 2, 0);
            o
        };
        let changes = assign_orders(&arranged, 0, ORDER_GAP);
        assert_eq!(changes, vec![OrderChange { index: 0, order: 5 }]);
    }

    #[test]
    fn test_move_to_front_never_below_one() {
        let result = drag(&[2, 3, 4], 2, 0);
        assert_eq!(result, vec![1, 2, 3]);
    }

    #[test]
    fn test_move_to_end_adds_gap() {
        let changes = assign_orders(&[20, 30, 10], 2, ORDER_GAP);
        assert_eq!(changes, vec![OrderChange { index: 2, order: 40 }]);
    }

    #[test]
    fn test_move_to_end_stays_within_label_range() {
        let result = drag(&[9000, 9995, 9990], 1, 2);
        assert_eq!(result, vec![10, 20, 30]);

        let long = vec![DEFAULT_ORDER; 2000];
        let result = drag(&long, 0, 1999);
        assert!(strictly_increasing(&result));
        assert!(result.iter().all(|&o| o <= MAX_ORDER));
    }

    #[test]
    fn test_move_between_takes_midpoint() {
        let changes = assign_orders(&[10, 40, 20, 50], 1, ORDER_GAP);
        assert_eq!(changes, vec![OrderChange { index: 1, order: 15 }]);
    }

    #[test]
    fn test_collision_renumbers_everything() {
        let changes = assign_orders(&[10, 30, 11, 40], 1, ORDER_GAP);
        assert_eq!(changes.len(), 4);
        assert_eq!(
            apply_changes(&[10, 30, 11, 40], &changes),
            vec![10, 20, 30, 40]
        );
    }

    #[test]
    fn test_default_orders_are_renumbered() {
        let result = drag(&[DEFAULT_ORDER; 5], 4, 1);
        assert_eq!(result, vec![10, 20, 30, 40, 50]);
    }

    #[test]
    fn test_assignment_always_strictly_increasing() {
        let cases: [&[u32]; 5] = [
            &[10, 20, 30, 40, 50, 60],
            &[1, 2, 3, 4, 5, 6],
            &[99, 99, 99, 99],
            &[5, 5, 10, 10, 30],
            &[1, 1000, 1001, 1002],
        ];
        for orders in cases {
            for from in 0..orders.len() {
                for to in 0..orders.len() {
                    let result = drag(orders, from, to);
                    assert!(
                        strictly_increasing(&result),
                        "{orders:?} {from}->{to} gave {result:?}"
                    );
                }
            }
        }
    }

    fn labelled_store() -> HubStore {
        let mut store = HubStore::new();
        store
            .replace_registry(
                RegistryKind::Label,
                json!([
                    {"label_id": "fav", "name": "favourites"},
                    {"label_id": "o5", "name": "roomdeck:order:0005"}
                ]),
            )
            .unwrap();
        store
            .replace_registry(
                RegistryKind::Area,
                json!([{"area_id": "kitchen", "name": "Kitchen", "labels": ["fav", "o5"]}]),
            )
            .unwrap();
        store
            .replace_registry(
                RegistryKind::Entity,
                json!([{"entity_id": "light.kitchen", "labels": []}]),
            )
            .unwrap();
        store
    }

    #[test]
    fn test_labels_read_from_store() {
        let mut store = labelled_store();
        store
            .replace_registry(
                RegistryKind::Label,
                json!([
                    {"label_id": "o5", "name": "roomdeck:order:0005"},
                    {"label_id": "hide", "name": HIDDEN_LABEL}
                ]),
            )
            .unwrap();

        assert!(!is_hidden(&store, LabelTarget::Area("kitchen")));
        assert_eq!(order_of(&store, LabelTarget::Area("kitchen")), 5);
        assert!(!is_hidden(&store, LabelTarget::Entity("light.missing")));
        assert_eq!(order_of(&store, LabelTarget::Entity("light.missing")), DEFAULT_ORDER);

        store
            .replace_registry(
                RegistryKind::Entity,
                json!([{"entity_id": "light.kitchen", "labels": ["hide", "o5"]}]),
            )
            .unwrap();
        assert!(is_hidden(&store, LabelTarget::Entity("light.kitchen")));
        assert_eq!(order_of(&store, LabelTarget::Entity("light.kitchen")), 5);
    }

    #[tokio::test]
    async fn test_set_order_replaces_label() {
        let hub = FakeHub::new(labelled_store());
        assert_eq!(hub.with_store(|s| order_of(s, LabelTarget::Area("kitchen"))), 5);

        set_order(&hub, LabelTarget::Area("kitchen"), 30)
            .await
            .unwrap();

        hub.with_store(|s| {
            assert_eq!(order_of(s, LabelTarget::Area("kitchen")), 30);
            let labels = LabelTarget::Area("kitchen").labels(s);
            assert!(labels.contains(&"fav".to_string()));
            assert!(!labels.contains(&"o5".to_string()));
        });

        let requests = hub.requests.lock().unwrap();
        assert_eq!(requests[0]["type"], "config/label_registry/create");
        assert_eq!(requests[0]["name"], "roomdeck:order:0030");
        assert_eq!(requests[1]["type"], "config/area_registry/update");
    }

    #[tokio::test]
    async fn test_set_order_reuses_existing_label() {
        let hub = FakeHub::new(labelled_store());
        set_order(&hub, LabelTarget::Entity("light.kitchen"), 5)
            .await
            .unwrap();

        let requests = hub.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0]["type"], "config/entity_registry/update");
        assert_eq!(requests[0]["labels"], json!(["o5"]));
        drop(requests);
        assert_eq!(
            hub.with_store(|s| order_of(s, LabelTarget::Entity("light.kitchen"))),
            5
        );
    }

    #[tokio::test]
    async fn test_hidden_flag_round_trip() {
        let hub = FakeHub::new(labelled_store());
        let target = LabelTarget::Entity("light.kitchen");
        assert!(!hub.with_store(|s| is_hidden(s, target)));

        set_hidden(&hub, target, true).await.unwrap();
        assert!(hub.with_store(|s| is_hidden(s, target)));

        set_hidden(&hub, target, true).await.unwrap();
        set_hidden(&hub, target, false).await.unwrap();
        assert!(!hub.with_store(|s| is_hidden(s, target)));

        // create, update, update (second hide was a no-op)
        assert_eq!(hub.requests.lock().unwrap().len(), 3);
    }
}
