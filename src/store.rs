//! In-memory mirror of hub state
//!
//! Holds the registries (areas, floors, devices, entity registry, labels)
//! and the live entity states. Registry lists replace a whole map; registry
//! mutation acknowledgements and `state_changed` events patch single rows.
//!
//! Whenever entity-registry or device-registry data changes, the effective
//! area of every entity is re-resolved (entity override, then device area)
//! and cached so lookups stay O(1).

use std::collections::{HashMap, HashSet};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::protocol::{
    Area, Command, Device, EntityEntry, EntityState, Floor, Label, RegistryKind, StateChanged,
};

/// An entity state merged with its resolved area
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub state: EntityState,
    pub area_id: Option<String>,
}

#[derive(Debug, Default)]
pub struct HubStore {
    states: HashMap<String, EntityRecord>,
    areas: HashMap<String, Area>,
    floors: HashMap<String, Floor>,
    devices: HashMap<String, Device>,
    entries: HashMap<String, EntityEntry>,
    labels: HashMap<String, Label>,
    /// entity_id -> area_id
    area_index: HashMap<String, String>,
    loaded: HashSet<RegistryKind>,
    states_loaded: bool,
}

impl HubStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all entity states with a `get_states` snapshot
    pub fn replace_states(&mut self, states: Vec<EntityState>) {
        self.states = states
            .into_iter()
            .map(|state| {
                let area_id = self.area_index.get(&state.entity_id).cloned();
                (state.entity_id.clone(), EntityRecord { state, area_id })
            })
            .collect();
        self.states_loaded = true;
    }

    /// Apply a `state_changed` event; a missing new state removes the entity
    pub fn apply_state_changed(&mut self, change: StateChanged) {
        match change.new_state {
            Some(state) => {
                let area_id = self.area_index.get(&change.entity_id).cloned();
                self.states
                    .insert(change.entity_id, EntityRecord { state, area_id });
            }
            None => {
                self.states.remove(&change.entity_id);
            }
        }
    }

    /// Replace one registry with a `config/<registry>/list` result
    pub fn replace_registry(
        &mut self,
        kind: RegistryKind,
        payload: Value,
    ) -> Result<usize, serde_json::Error> {
        let count = match kind {
            RegistryKind::Area => {
                self.areas = keyed(payload, |a: &Area| a.area_id.clone())?;
                self.areas.len()
            }
            RegistryKind::Floor => {
                self.floors = keyed(payload, |f: &Floor| f.floor_id.clone())?;
                self.floors.len()
            }
            RegistryKind::Device => {
                self.devices = keyed(payload, |d: &Device| d.id.clone())?;
                self.devices.len()
            }
            RegistryKind::Entity => {
                self.entries = keyed(payload, |e: &EntityEntry| e.entity_id.clone())?;
                self.entries.len()
            }
            RegistryKind::Label => {
                self.labels = keyed(payload, |l: &Label| l.label_id.clone())?;
                self.labels.len()
            }
        };

        self.loaded.insert(kind);
        if matches!(kind, RegistryKind::Entity | RegistryKind::Device) {
            self.resolve_areas();
        }
        Ok(count)
    }

    /// Merge the acknowledgement of a registry create/update/delete
    pub fn apply_mutation(
        &mut self,
        kind: RegistryKind,
        command: &Command,
        result: Value,
    ) -> Result<(), serde_json::Error> {
        if command.kind().ends_with("/delete") {
            let id = command
                .body()
                .get(kind.id_field())
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            self.remove_row(kind, &id);
        } else {
            self.upsert_row(kind, result)?;
        }

        if matches!(kind, RegistryKind::Entity | RegistryKind::Device) {
            self.resolve_areas();
        }
        Ok(())
    }

    fn upsert_row(&mut self, kind: RegistryKind, result: Value) -> Result<(), serde_json::Error> {
        match kind {
            RegistryKind::Area => {
                let area: Area = serde_json::from_value(result)?;
                self.areas.insert(area.area_id.clone(), area);
            }
            RegistryKind::Floor => {
                let floor: Floor = serde_json::from_value(result)?;
                self.floors.insert(floor.floor_id.clone(), floor);
            }
            RegistryKind::Device => {
                let device: Device = serde_json::from_value(result)?;
                self.devices.insert(device.id.clone(), device);
            }
            RegistryKind::Entity => {
                // entity_registry/update wraps the row in `entity_entry`
                let row = match result {
                    Value::Object(mut map) if map.contains_key("entity_entry") => map
                        .remove("entity_entry")
                        .unwrap_or(Value::Null),
                    other => other,
                };
                let entry: EntityEntry = serde_json::from_value(row)?;
                self.entries.insert(entry.entity_id.clone(), entry);
            }
            RegistryKind::Label => {
                let label: Label = serde_json::from_value(result)?;
                self.labels.insert(label.label_id.clone(), label);
            }
        }
        Ok(())
    }

    fn remove_row(&mut self, kind: RegistryKind, id: &str) {
        match kind {
            RegistryKind::Area => {
                self.areas.remove(id);
            }
            RegistryKind::Floor => {
                self.floors.remove(id);
            }
            RegistryKind::Device => {
                self.devices.remove(id);
            }
            RegistryKind::Entity => {
                self.entries.remove(id);
            }
            RegistryKind::Label => {
                self.labels.remove(id);
            }
        }
    }

    /// Rebuild the entity -> area index and stamp it onto cached states
    fn resolve_areas(&mut self) {
        self.area_index = self
            .entries
            .values()
            .filter_map(|entry| {
                let area_id = entry.area_id.clone().or_else(|| {
                    entry
                        .device_id
                        .as_ref()
                        .and_then(|device_id| self.devices.get(device_id))
                        .and_then(|device| device.area_id.clone())
                })?;
                Some((entry.entity_id.clone(), area_id))
            })
            .collect();

        for (entity_id, record) in &mut self.states {
            record.area_id = self.area_index.get(entity_id).cloned();
        }
    }

    // --- Lookups ---

    pub fn entity(&self, entity_id: &str) -> Option<&EntityRecord> {
        self.states.get(entity_id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityRecord> {
        self.states.values()
    }

    /// Resolved area id of an entity
    pub fn effective_area(&self, entity_id: &str) -> Option<&str> {
        self.area_index.get(entity_id).map(String::as_str)
    }

    /// Resolved area of an entity
    pub fn area_of(&self, entity_id: &str) -> Option<&Area> {
        self.effective_area(entity_id)
            .and_then(|area_id| self.areas.get(area_id))
    }

    pub fn area(&self, area_id: &str) -> Option<&Area> {
        self.areas.get(area_id)
    }

    pub fn areas(&self) -> impl Iterator<Item = &Area> {
        self.areas.values()
    }

    pub fn floor(&self, floor_id: &str) -> Option<&Floor> {
        self.floors.get(floor_id)
    }

    pub fn floors(&self) -> impl Iterator<Item = &Floor> {
        self.floors.values()
    }

    pub fn device(&self, device_id: &str) -> Option<&Device> {
        self.devices.get(device_id)
    }

    pub fn entity_entry(&self, entity_id: &str) -> Option<&EntityEntry> {
        self.entries.get(entity_id)
    }

    pub fn label(&self, label_id: &str) -> Option<&Label> {
        self.labels.get(label_id)
    }

    pub fn label_by_name(&self, name: &str) -> Option<&Label> {
        self.labels.values().find(|label| label.name == name)
    }

    /// Names of the given label ids; unknown ids are skipped
    pub fn label_names<'a>(&'a self, label_ids: &'a [String]) -> impl Iterator<Item = &'a str> {
        label_ids
            .iter()
            .filter_map(|id| self.labels.get(id))
            .map(|label| label.name.as_str())
    }

    pub fn is_loaded(&self, kind: RegistryKind) -> bool {
        self.loaded.contains(&kind)
    }

    pub fn has_states(&self) -> bool {
        self.states_loaded
    }

    /// Snapshot of the resolved area index, for diagnostics and tests
    pub fn area_index(&self) -> &HashMap<String, String> {
        &self.area_index
    }
}

fn keyed<T: DeserializeOwned>(
    payload: Value,
    key: impl Fn(&T) -> String,
) -> Result<HashMap<String, T>, serde_json::Error> {
    let rows: Vec<T> = serde_json::from_value(payload)?;
    Ok(rows.into_iter().map(|row| (key(&row), row)).collect())
}
