//! Room and floor view models built from the store

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::controls::{brightness_pct, is_active};
use crate::order::{is_hidden, order_of, LabelTarget};
use crate::protocol::{domain_of, Area};
use crate::store::{EntityRecord, HubStore};

/// Domains shown when the user has not picked any
pub const DEFAULT_DOMAINS: &[&str] = &[
    "light",
    "switch",
    "fan",
    "cover",
    "climate",
    "media_player",
    "lock",
    "scene",
    "script",
    "input_boolean",
    "sensor",
    "binary_sensor",
];

/// Which entity domains appear on the dashboard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainFilter {
    enabled: BTreeSet<String>,
}

impl DomainFilter {
    /// An empty list shows every domain
    pub fn new<S: AsRef<str>>(domains: &[S]) -> Self {
        Self {
            enabled: domains.iter().map(|d| d.as_ref().to_string()).collect(),
        }
    }

    pub fn all() -> Self {
        Self {
            enabled: BTreeSet::new(),
        }
    }

    pub fn is_entity_visible(&self, entity_id: &str) -> bool {
        self.enabled.is_empty() || self.enabled.contains(domain_of(entity_id))
    }

    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.enabled.iter().map(String::as_str)
    }
}

impl Default for DomainFilter {
    fn default() -> Self {
        Self::new(DEFAULT_DOMAINS)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ViewOptions {
    pub filter: DomainFilter,
    pub show_hidden: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityView {
    pub entity_id: String,
    pub name: String,
    pub domain: String,
    pub state: String,
    pub order: u32,
    pub hidden: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u8>,
    pub active: bool,
    pub last_changed: String,
}

impl EntityView {
    fn new(store: &HubStore, record: &EntityRecord) -> Self {
        let state = &record.state;
        let target = LabelTarget::Entity(&state.entity_id);
        let name = store
            .entity_entry(&state.entity_id)
            .and_then(|entry| entry.name.clone())
            .unwrap_or_else(|| state.display_name().to_string());

        Self {
            entity_id: state.entity_id.clone(),
            name,
            domain: state.domain().to_string(),
            state: state.state.clone(),
            order: order_of(store, target),
            hidden: is_hidden(store, target),
            brightness: (state.domain() == "light").then(|| brightness_pct(state)),
            active: is_active(state),
            last_changed: state.last_changed.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomView {
    pub area_id: String,
    pub name: String,
    pub floor_id: Option<String>,
    pub icon: Option<String>,
    pub order: u32,
    pub hidden: bool,
    pub entities: Vec<EntityView>,
    #[serde(skip)]
    temperatures: Vec<f64>,
}

/// At-a-glance numbers for a room tile
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomSummary {
    pub lights_on: usize,
    pub lights_total: usize,
    /// Mean brightness over lights that are on
    pub average_brightness: Option<u8>,
    pub active: usize,
    pub temperature: Option<f64>,
}

impl RoomView {
    pub fn summary(&self) -> RoomSummary {
        let lights: Vec<&EntityView> = self
            .entities
            .iter()
            .filter(|e| e.domain == "light")
            .collect();
        let lit: Vec<u8> = lights
            .iter()
            .filter(|e| e.state == "on")
            .filter_map(|e| e.brightness)
            .collect();

        let average_brightness = (!lit.is_empty()).then(|| {
            let total: u32 = lit.iter().map(|&b| u32::from(b)).sum();
            (total as f64 / lit.len() as f64).round() as u8
        });

        let temperature = (!self.temperatures.is_empty()).then(|| {
            let mean = self.temperatures.iter().sum::<f64>() / self.temperatures.len() as f64;
            (mean * 10.0).round() / 10.0
        });

        RoomSummary {
            lights_on: lights.iter().filter(|e| e.state == "on").count(),
            lights_total: lights.len(),
            average_brightness,
            active: self
                .entities
                .iter()
                .filter(|e| !matches!(e.domain.as_str(), "sensor" | "binary_sensor"))
                .filter(|e| e.active)
                .count(),
            temperature,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FloorView {
    /// None for rooms that are not on any floor
    pub floor_id: Option<String>,
    pub name: Option<String>,
    pub level: Option<i32>,
    pub rooms: Vec<RoomView>,
}

fn is_entity_visible(store: &HubStore, record: &EntityRecord, opts: &ViewOptions) -> bool {
    let entity_id = record.state.entity_id.as_str();
    if !opts.filter.is_entity_visible(entity_id) {
        return false;
    }
    if opts.show_hidden {
        return true;
    }
    let registry_hidden = store
        .entity_entry(entity_id)
        .is_some_and(|entry| entry.hidden_by.is_some() || entry.disabled_by.is_some());
    !registry_hidden && !is_hidden(store, LabelTarget::Entity(entity_id))
}

fn sort_entities(entities: &mut [EntityView]) {
    entities.sort_by(|a, b| {
        a.order
            .cmp(&b.order)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
            .then_with(|| a.entity_id.cmp(&b.entity_id))
    });
}

fn room_view(
    store: &HubStore,
    area: &Area,
    members: Vec<&EntityRecord>,
    opts: &ViewOptions,
) -> RoomView {
    let target = LabelTarget::Area(&area.area_id);

    let temperatures = members
        .iter()
        .filter(|r| r.state.domain() == "climate")
        .filter_map(|r| r.state.attribute_f64("current_temperature"))
        .collect();

    let mut entities: Vec<EntityView> = members
        .into_iter()
        .filter(|record| is_entity_visible(store, record, opts))
        .map(|record| EntityView::new(store, record))
        .collect();
    sort_entities(&mut entities);

    RoomView {
        area_id: area.area_id.clone(),
        name: area.name.clone(),
        floor_id: area.floor_id.clone(),
        icon: area.icon.clone(),
        order: order_of(store, target),
        hidden: is_hidden(store, target),
        entities,
        temperatures,
    }
}

/// Every visible area with its entities, in display order
pub fn rooms(store: &HubStore, opts: &ViewOptions) -> Vec<RoomView> {
    let mut members: HashMap<&str, Vec<&EntityRecord>> = HashMap::new();
    for record in store.entities() {
        if let Some(area_id) = record.area_id.as_deref() {
            members.entry(area_id).or_default().push(record);
        }
    }

    let mut rooms: Vec<RoomView> = store
        .areas()
        .map(|area| {
            let entities = members.remove(area.area_id.as_str()).unwrap_or_default();
            room_view(store, area, entities, opts)
        })
        .filter(|room| opts.show_hidden || !room.hidden)
        .collect();

    rooms.sort_by(|a, b| {
        a.order
            .cmp(&b.order)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
            .then_with(|| a.area_id.cmp(&b.area_id))
    });
    rooms
}

/// Rooms grouped by floor; rooms without a floor come last
pub fn floors(store: &HubStore, opts: &ViewOptions) -> Vec<FloorView> {
    let mut by_floor: HashMap<Option<String>, Vec<RoomView>> = HashMap::new();
    for room in rooms(store, opts) {
        let key = room
            .floor_id
            .clone()
            .filter(|floor_id| store.floor(floor_id).is_some());
        by_floor.entry(key).or_default().push(room);
    }

    let mut floors: Vec<FloorView> = store
        .floors()
        .map(|floor| FloorView {
            floor_id: Some(floor.floor_id.clone()),
            name: Some(floor.name.clone()),
            level: floor.level,
            rooms: by_floor.remove(&Some(floor.floor_id.clone())).unwrap_or_default(),
        })
        .collect();

    floors.sort_by(|a, b| {
        let level = |f: &FloorView| (f.level.is_none(), f.level.unwrap_or_default());
        level(a)
            .cmp(&level(b))
            .then_with(|| a.name.cmp(&b.name))
    });

    if let Some(rooms) = by_floor.remove(&None) {
        floors.push(FloorView {
            floor_id: None,
            name: None,
            level: None,
            rooms,
        });
    }
    floors
}

/// Visible entities with no effective area
pub fn unassigned(store: &HubStore, opts: &ViewOptions) -> Vec<EntityView> {
    let mut entities: Vec<EntityView> = store
        .entities()
        .filter(|record| record.area_id.is_none())
        .filter(|record| is_entity_visible(store, record, opts))
        .map(|record| EntityView::new(store, record))
        .collect();
    sort_entities(&mut entities);
    entities
}

/// Find a room by id or case-insensitive name, even when it is hidden
pub fn find_room(store: &HubStore, opts: &ViewOptions, query: &str) -> Option<RoomView> {
    let area = store
        .areas()
        .find(|area| area.area_id == query || area.name.eq_ignore_ascii_case(query))?;
    let members = store
        .entities()
        .filter(|record| record.area_id.as_deref() == Some(area.area_id.as_str()))
        .collect();
    Some(room_view(store, area, members, opts))
}
