//! Notification delivery interface.
//!
//! Delivery itself (email, SMS, push) is an external collaborator; the
//! engine only chooses a delivery group and hands over subject and body.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum DeliveryGroup {
    /// Operator alerts for fatal classifications and residual amounts.
    Exceptions,
    /// Positions that closed after enough ladder fills.
    HighProfit,
    /// Administrative notices (pump cooldowns and the like).
    Admin,
}

impl fmt::Display for DeliveryGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryGroup::Exceptions => write!(f, "exceptions"),
            DeliveryGroup::HighProfit => write!(f, "high-profit"),
            DeliveryGroup::Admin => write!(f, "admin"),
        }
    }
}

pub trait Notifier: Send + Sync + fmt::Debug {
    fn notify(&self, group: DeliveryGroup, subject: &str, body: &str);
}

/// Default implementation: structured log lines, one level per group.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, group: DeliveryGroup, subject: &str, body: &str) {
        match group {
            DeliveryGroup::Exceptions => error!(%group, subject, body, "notification"),
            DeliveryGroup::Admin => warn!(%group, subject, body, "notification"),
            DeliveryGroup::HighProfit => info!(%group, subject, body, "notification"),
        }
    }
}

/// Test double that records every delivery.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(DeliveryGroup, String, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(DeliveryGroup, String, String)> {
        self.messages.lock().clone()
    }

    pub fn count_for(&self, group: DeliveryGroup) -> usize {
        self.messages
            .lock()
            .iter()
            .filter(|(delivered, _, _)| *delivered == group)
            .count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, group: DeliveryGroup, subject: &str, body: &str) {
        self.messages
            .lock()
            .push((group, subject.to_string(), body.to_string()));
    }
}
