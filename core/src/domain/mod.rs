//! Domain entities and identifiers.

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

/// Accounts bound to one venue.
pub mod account;

/// Orders with reference shadow columns.
pub mod order;

/// Positions and the lifecycle state machine.
pub mod position;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Deserialize,
            Serialize,
            Display,
            From,
        )]
        pub struct $name(pub u64);
    };
}

id_type!(AccountId);
id_type!(PositionId);
id_type!(OrderId);
id_type!(StepId);

/// Global engine flags: one persistent backing record, re-read every
/// scheduler tick and once per new-position attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct EngineFlags {
    pub allow_opening_positions: bool,
}

impl Default for EngineFlags {
    fn default() -> Self {
        Self {
            allow_opening_positions: true,
        }
    }
}
