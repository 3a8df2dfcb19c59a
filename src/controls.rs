//! Service calls behind dashboard controls

use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{json, Value};

use crate::connection::Hub;
use crate::debounce::Debouncer;
use crate::error::HubResult;
use crate::optimistic::Optimistic;
use crate::protocol::{domain_of, EntityState};

/// A service call ready to be sent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    pub data: Value,
}

impl ServiceCall {
    pub fn new(domain: &str, service: &str, data: Value) -> Self {
        Self {
            domain: domain.to_string(),
            service: service.to_string(),
            data,
        }
    }

    fn for_entity(domain: &str, service: &str, entity_id: &str) -> Self {
        Self::new(domain, service, json!({ "entity_id": entity_id }))
    }

    /// Queue the call on the hub
    pub fn send<H: Hub>(&self, hub: &H) -> HubResult<u64> {
        log::debug!("Calling {}.{} {}", self.domain, self.service, self.data);
        hub.call_service(&self.domain, &self.service, self.data.clone())
    }
}

/// What a tap on the entity's tile does
pub fn toggle_action(state: &EntityState) -> Option<ServiceCall> {
    let entity_id = state.entity_id.as_str();
    let domain = state.domain();
    let service = match domain {
        "light" | "switch" | "fan" | "input_boolean" => "toggle",
        "cover" => match state.state.as_str() {
            "open" | "opening" => "close_cover",
            _ => "open_cover",
        },
        "scene" | "script" => "turn_on",
        "climate" => match state.state.as_str() {
            "off" => "turn_on",
            _ => "turn_off",
        },
        _ => return None,
    };
    Some(ServiceCall::for_entity(domain, service, entity_id))
}

/// Explicit on/off for any entity id
pub fn switch_call(entity_id: &str, on: bool) -> ServiceCall {
    let domain = domain_of(entity_id);
    match (domain, on) {
        ("cover", true) => ServiceCall::for_entity(domain, "open_cover", entity_id),
        ("cover", false) => ServiceCall::for_entity(domain, "close_cover", entity_id),
        ("lock", true) => ServiceCall::for_entity(domain, "unlock", entity_id),
        ("lock", false) => ServiceCall::for_entity(domain, "lock", entity_id),
        (_, true) => ServiceCall::for_entity(domain, "turn_on", entity_id),
        (_, false) => ServiceCall::for_entity(domain, "turn_off", entity_id),
    }
}

/// Brightness change for a light; zero turns it off
pub fn brightness_call(entity_id: &str, pct: u8) -> ServiceCall {
    if pct == 0 {
        ServiceCall::for_entity("light", "turn_off", entity_id)
    } else {
        ServiceCall::new(
            "light",
            "turn_on",
            json!({ "entity_id": entity_id, "brightness_pct": pct.min(100) }),
        )
    }
}

/// Brightness in percent as reported by the hub, zero when off
pub fn brightness_pct(state: &EntityState) -> u8 {
    if state.state != "on" {
        return 0;
    }
    state
        .attribute_f64("brightness")
        .map_or(100, |raw| (raw.clamp(0.0, 255.0) * 100.0 / 255.0).round() as u8)
}

/// Whether the entity counts as active on a dashboard
pub fn is_active(state: &EntityState) -> bool {
    matches!(
        state.state.as_str(),
        "on" | "open" | "opening" | "playing" | "heat" | "cool" | "heat_cool" | "auto" | "dry"
            | "fan_only" | "unlocked"
    )
}

/// Slider state for one light
///
/// Values pushed while dragging show immediately and are sent once the
/// slider has been still for the debounce delay.
pub struct Dimmer<'a, H> {
    hub: &'a H,
    entity_id: String,
    optimistic: Optimistic<u8>,
    debouncer: Debouncer<u8>,
    window: Duration,
}

impl<'a, H: Hub> Dimmer<'a, H> {
    pub fn new(
        hub: &'a H,
        entity_id: impl Into<String>,
        debounce: Duration,
        window: Duration,
    ) -> Self {
        Self {
            hub,
            entity_id: entity_id.into(),
            optimistic: Optimistic::new(),
            debouncer: Debouncer::new(debounce),
            window,
        }
    }

    /// Slider moved to `pct`
    pub fn drag(&mut self, pct: u8, now: Instant) {
        let pct = pct.min(100);
        self.optimistic.set(pct, now, self.window);
        self.debouncer.push(pct, now);
    }

    /// Send the settled value if the debounce delay has passed
    pub fn poll(&mut self, now: Instant) -> HubResult<Option<u8>> {
        self.optimistic.tick(now);
        match self.debouncer.poll(now) {
            Some(pct) => {
                brightness_call(&self.entity_id, pct).send(self.hub)?;
                Ok(Some(pct))
            }
            None => Ok(None),
        }
    }

    /// Send whatever is pending right away
    pub fn flush(&mut self) -> HubResult<Option<u8>> {
        match self.debouncer.flush() {
            Some(pct) => {
                brightness_call(&self.entity_id, pct).send(self.hub)?;
                Ok(Some(pct))
            }
            None => Ok(None),
        }
    }

    /// When [`poll`](Self::poll) next has something to do
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.debouncer.deadline(), self.optimistic.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Record the brightness the hub currently reports
    pub fn observe(&mut self) {
        if let Some(record) = self.hub.entity(&self.entity_id) {
            self.optimistic.observe(&brightness_pct(&record.state));
        }
    }

    /// Brightness to show right now
    pub fn display(&self, now: Instant) -> u8 {
        let actual = self
            .hub
            .entity(&self.entity_id)
            .map_or(0, |record| brightness_pct(&record.state));
        self.optimistic.display(actual, now)
    }
}
