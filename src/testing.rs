//! In-memory hub for unit tests

use std::future::Future;
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::broadcast;

use crate::connection::{Hub, HubEvent};
use crate::error::HubResult;
use crate::protocol::{Command, RegistryKind};
use crate::store::HubStore;

/// Records service calls and answers registry commands from its own store
pub(crate) struct FakeHub {
    pub store: Mutex<HubStore>,
    pub requests: Mutex<Vec<Value>>,
    pub calls: Mutex<Vec<(String, String, Value)>>,
    events: broadcast::Sender<HubEvent>,
}

impl FakeHub {
    pub fn new(store: HubStore) -> Self {
        Self {
            store: Mutex::new(store),
            requests: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            events: broadcast::channel(16).0,
        }
    }

    pub fn calls(&self) -> Vec<(String, String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    /// Registry row the hub would echo back for `command`
    fn acknowledge(&self, kind: RegistryKind, command: &Command) -> Value {
        let mut body = command.body().clone();
        let fields = body.as_object_mut().unwrap();
        fields.remove("type");

        if command.kind().ends_with("/create") {
            let name = fields["name"].as_str().unwrap_or_default().to_string();
            fields.insert(
                kind.id_field().to_string(),
                Value::String(name.replace(':', "_")),
            );
            return body;
        }

        let id = fields[kind.id_field()].as_str().unwrap_or_default().to_string();
        let store = self.store.lock().unwrap();
        let mut row = match kind {
            RegistryKind::Area => serde_json::to_value(store.area(&id)),
            RegistryKind::Floor => serde_json::to_value(store.floor(&id)),
            RegistryKind::Device => serde_json::to_value(store.device(&id)),
            RegistryKind::Entity => serde_json::to_value(store.entity_entry(&id)),
            RegistryKind::Label => serde_json::to_value(store.label(&id)),
        }
        .unwrap();
        if row.is_null() {
            return Value::Null;
        }
        for (key, value) in fields.iter() {
            row[key.as_str()] = value.clone();
        }

        if kind == RegistryKind::Entity {
            serde_json::json!({ "entity_entry": row })
        } else {
            row
        }
    }
}

impl Hub for FakeHub {
    fn connect(&self) -> HubResult<()> {
        Ok(())
    }

    fn call_service(&self, domain: &str, service: &str, data: Value) -> HubResult<u64> {
        let mut calls = self.calls.lock().unwrap();
        calls.push((domain.to_string(), service.to_string(), data));
        Ok(calls.len() as u64)
    }

    fn request(&self, command: Command) -> impl Future<Output = HubResult<Value>> + Send {
        self.requests.lock().unwrap().push(command.body().clone());

        let result = match command.mutated_registry() {
            Some(kind) => {
                let ack = self.acknowledge(kind, &command);
                if !ack.is_null() || command.kind().ends_with("/delete") {
                    self.store
                        .lock()
                        .unwrap()
                        .apply_mutation(kind, &command, ack.clone())
                        .unwrap();
                }
                ack
            }
            None => Value::Null,
        };
        std::future::ready(Ok(result))
    }

    fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.events.subscribe()
    }

    fn with_store<R>(&self, f: impl FnOnce(&HubStore) -> R) -> R {
        f(&self.store.lock().unwrap())
    }
}
