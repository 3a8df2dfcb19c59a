//! Optimistic display values
//!
//! A control shows the value the user picked right away, then waits for the
//! hub to report it. If no matching state arrives before the window closes,
//! the control falls back to whatever the hub says.

use std::time::{Duration, Instant};

/// Default confirmation window
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, PartialEq)]
pub enum Optimistic<T> {
    /// Showing the hub's value
    Authoritative,
    /// Showing a local value until `deadline`
    Pending { value: T, deadline: Instant },
    /// The hub reported the local value; display follows the hub again
    Confirmed { value: T },
}

impl<T> Default for Optimistic<T> {
    fn default() -> Self {
        Self::Authoritative
    }
}

impl<T: Clone + PartialEq> Optimistic<T> {
    pub fn new() -> Self {
        Self::Authoritative
    }

    /// Show `value` locally until the hub confirms it or `window` passes
    pub fn set(&mut self, value: T, now: Instant, window: Duration) {
        *self = Self::Pending {
            value,
            deadline: now + window,
        };
    }

    /// Feed a value reported by the hub
    pub fn observe(&mut self, reported: &T) {
        let matches = match &*self {
            Self::Pending { value, .. } | Self::Confirmed { value } => value == reported,
            Self::Authoritative => false,
        };
        if matches {
            *self = Self::Confirmed {
                value: reported.clone(),
            };
        } else if let Self::Confirmed { .. } = self {
            *self = Self::Authoritative;
        }
    }

    /// Expire a pending value whose window has passed
    pub fn tick(&mut self, now: Instant) {
        if let Self::Pending { deadline, .. } = self {
            if now >= *deadline {
                log::debug!("Optimistic value not confirmed, reverting");
                *self = Self::Authoritative;
            }
        }
    }

    /// Value to render given what the hub currently reports
    pub fn display(&self, authoritative: T, now: Instant) -> T {
        match self {
            Self::Pending { value, deadline } if now < *deadline => value.clone(),
            _ => authoritative,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    /// Deadline of a pending value
    pub fn deadline(&self) -> Option<Instant> {
        match self {
            Self::Pending { deadline, .. } => Some(*deadline),
            _ => None,
        }
    }
}
