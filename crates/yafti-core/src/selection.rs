//! Parsing of the action selection payload posted by the UI.
//!
//! The payload is a JSON object mapping action ID to its checkbox state. The
//! UI historically sends the state as the strings `"true"` / `"false"`; JSON
//! booleans are accepted as well. Anything else is a `MalformedSelection`.

use crate::error::{Result, YaftiError};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    states: BTreeMap<String, bool>,
}

impl Selection {
    pub fn parse(payload: &str) -> Result<Self> {
        let payload = payload.trim();
        if payload.is_empty() {
            return Err(YaftiError::MalformedSelection("empty payload".into()));
        }

        let value: Value = serde_json::from_str(payload)
            .map_err(|e| YaftiError::MalformedSelection(e.to_string()))?;
        let Value::Object(map) = value else {
            return Err(YaftiError::MalformedSelection(
                "expected a JSON object of action id to state".into(),
            ));
        };

        let mut states = BTreeMap::new();
        for (id, state) in map {
            if id.trim().is_empty() {
                return Err(YaftiError::MalformedSelection("empty action id".into()));
            }
            let selected = match &state {
                Value::Bool(b) => *b,
                Value::String(s) if s == "true" => true,
                Value::String(s) if s == "false" => false,
                other => {
                    return Err(YaftiError::MalformedSelection(format!(
                        "invalid state for '{id}': {other}"
                    )))
                }
            };
            states.insert(id, selected);
        }
        Ok(Self { states })
    }

    /// Sorted, duplicate-free IDs of the actions marked selected.
    pub fn resolve(&self) -> Vec<String> {
        normalize_ids(
            self.states
                .iter()
                .filter(|(_, selected)| **selected)
                .map(|(id, _)| id.clone())
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl FromIterator<(String, bool)> for Selection {
    fn from_iter<I: IntoIterator<Item = (String, bool)>>(iter: I) -> Self {
        Self {
            states: iter.into_iter().collect(),
        }
    }
}

/// Sort and de-duplicate a list of IDs.
pub fn normalize_ids(mut ids: Vec<String>) -> Vec<String> {
    ids.sort();
    ids.dedup();
    ids
}
