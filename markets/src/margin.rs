/// Internal margin mode vocabulary.
///
/// Venues use divergent wire values (`ISOLATED`/`CROSSED`, `isolated`/`cross`,
/// `fixed`/`crossed`); the adapters translate from this canonical pair.
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarginMode {
    Isolated,
    Crossed,
}

impl fmt::Display for MarginMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarginMode::Isolated => write!(f, "isolated"),
            MarginMode::Crossed => write!(f, "crossed"),
        }
    }
}
