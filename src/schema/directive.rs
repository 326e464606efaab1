use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::path::KeyPath;

/// One parsed `(path, value)` instruction extracted from generator text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Directive {
    pub path: KeyPath,
    pub value: Value,
}

impl Directive {
    pub fn new(path: KeyPath, value: Value) -> Self {
        Self { path, value }
    }
}
