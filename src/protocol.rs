//! Home Assistant WebSocket frames and registry records
//!
//! Inbound frames are decoded into [`Inbound`]; outbound commands are built
//! with the [`Command`] constructors and stamped with a message id right
//! before they go on the wire.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Frames sent by the hub
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum Inbound {
    AuthRequired {
        #[serde(default)]
        ha_version: Option<String>,
    },
    AuthOk {
        #[serde(default)]
        ha_version: Option<String>,
    },
    AuthInvalid {
        #[serde(default)]
        message: Option<String>,
    },
    Result {
        id: u64,
        success: bool,
        #[serde(default)]
        result: Value,
        #[serde(default)]
        error: Option<WsError>,
    },
    Event {
        #[serde(default)]
        id: u64,
        event: WsEvent,
    },
    Pong {
        id: u64,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WsError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsEvent {
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub time_fired: String,
}

/// Payload of a `state_changed` event
#[derive(Debug, Clone, Deserialize)]
pub struct StateChanged {
    pub entity_id: String,
    #[serde(default)]
    pub new_state: Option<EntityState>,
}

/// Last known state of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub last_changed: String,
    #[serde(default)]
    pub last_updated: String,
}

impl EntityState {
    /// Domain part of the entity id (`light` for `light.kitchen`)
    pub fn domain(&self) -> &str {
        domain_of(&self.entity_id)
    }

    pub fn friendly_name(&self) -> Option<&str> {
        self.attributes.get("friendly_name").and_then(Value::as_str)
    }

    /// Friendly name, falling back to the object id
    pub fn display_name(&self) -> &str {
        self.friendly_name().unwrap_or_else(|| {
            self.entity_id
                .split_once('.')
                .map_or(self.entity_id.as_str(), |(_, object_id)| object_id)
        })
    }

    pub fn attribute_f64(&self, key: &str) -> Option<f64> {
        self.attributes.get(key).and_then(Value::as_f64)
    }
}

/// Domain part of an entity id; the whole id when it has no dot
pub fn domain_of(entity_id: &str) -> &str {
    entity_id
        .split_once('.')
        .map_or(entity_id, |(domain, _)| domain)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Area {
    pub area_id: String,
    pub name: String,
    #[serde(default)]
    pub floor_id: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Floor {
    pub floor_id: String,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub level: Option<i32>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub name_by_user: Option<String>,
    #[serde(default)]
    pub area_id: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Row of the entity registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityEntry {
    pub entity_id: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub area_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub hidden_by: Option<String>,
    #[serde(default)]
    pub disabled_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub label_id: String,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

/// The server-side registries mirrored by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryKind {
    Area,
    Floor,
    Device,
    Entity,
    Label,
}

impl RegistryKind {
    /// Registries loaded on every (re)connect, in request order
    pub const ALL: [Self; 5] = [
        Self::Area,
        Self::Floor,
        Self::Device,
        Self::Entity,
        Self::Label,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            Self::Area => "config/area_registry",
            Self::Floor => "config/floor_registry",
            Self::Device => "config/device_registry",
            Self::Entity => "config/entity_registry",
            Self::Label => "config/label_registry",
        }
    }

    /// Field holding the record id in this registry
    pub fn id_field(self) -> &'static str {
        match self {
            Self::Area => "area_id",
            Self::Floor => "floor_id",
            Self::Device => "device_id",
            Self::Entity => "entity_id",
            Self::Label => "label_id",
        }
    }
}

/// Outbound command frame without its message id
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    body: Value,
}

impl Command {
    fn new(body: Value) -> Self {
        Self { body }
    }

    pub fn get_states() -> Self {
        Self::new(json!({ "type": "get_states" }))
    }

    pub fn subscribe_events(event_type: &str) -> Self {
        Self::new(json!({
            "type": "subscribe_events",
            "event_type": event_type
        }))
    }

    pub fn call_service(domain: &str, service: &str, service_data: Value) -> Self {
        Self::new(json!({
            "type": "call_service",
            "domain": domain,
            "service": service,
            "service_data": service_data
        }))
    }

    pub fn list(kind: RegistryKind) -> Self {
        Self::new(json!({ "type": format!("{}/list", kind.prefix()) }))
    }

    pub fn create(kind: RegistryKind, fields: Map<String, Value>) -> Self {
        let mut body = fields;
        body.insert(
            "type".to_string(),
            json!(format!("{}/create", kind.prefix())),
        );
        Self::new(Value::Object(body))
    }

    /// Registry update; `id` is written under the registry's id field
    pub fn update(kind: RegistryKind, id: &str, fields: Map<String, Value>) -> Self {
        let mut body = fields;
        body.insert(
            "type".to_string(),
            json!(format!("{}/update", kind.prefix())),
        );
        body.insert(kind.id_field().to_string(), json!(id));
        Self::new(Value::Object(body))
    }

    pub fn delete(kind: RegistryKind, id: &str) -> Self {
        let mut body = Map::new();
        body.insert(
            "type".to_string(),
            json!(format!("{}/delete", kind.prefix())),
        );
        body.insert(kind.id_field().to_string(), json!(id));
        Self::new(Value::Object(body))
    }

    pub fn create_label(name: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("name".to_string(), json!(name));
        Self::create(RegistryKind::Label, fields)
    }

    pub fn ping() -> Self {
        Self::new(json!({ "type": "ping" }))
    }

    /// Frame type, e.g. `config/area_registry/update`
    pub fn kind(&self) -> &str {
        self.body
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Registry this command mutates, if any
    pub fn mutated_registry(&self) -> Option<RegistryKind> {
        let kind = self.kind();
        let (prefix, action) = kind.rsplit_once('/')?;
        if !matches!(action, "create" | "update" | "delete") {
            return None;
        }
        RegistryKind::ALL.into_iter().find(|k| k.prefix() == prefix)
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Serialize with the given message id
    pub fn to_frame(&self, id: u64) -> String {
        let mut body = self.body.clone();
        body["id"] = json!(id);
        body.to_string()
    }
}

/// The auth frame, the only outbound frame without an id
pub fn auth_frame(access_token: &str) -> String {
    json!({
        "type": "auth",
        "access_token": access_token
    })
    .to_string()
}
