//! Versioned profile document and transactional path updates.
//!
//! A profile is a JSON object of named sections. Changes address values by dotted
//! path (`interaction_style.adaptations.low_user_satisfaction.weight`); numeric
//! segments index into arrays. Resolution rules:
//! - the first segment must name an existing section that is an object;
//! - missing intermediate keys under an object are created as empty objects;
//! - traversing through a scalar, or an out-of-range array index, is invalid;
//! - an existing non-null leaf may only be replaced by a value of the same JSON kind.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{EvolutionError, Result};
use crate::types::ProposedChanges;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Profile(Value);

impl Profile {
    pub fn new(root: Value) -> Result<Self> {
        if !root.is_object() {
            return Err(EvolutionError::invalid_change(
                "$",
                "profile root must be an object",
            ));
        }
        Ok(Self(root))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup(&self.0, path)
    }

    pub fn sections(&self) -> Vec<String> {
        self.0
            .as_object()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Apply every change or none. On error `self` is left exactly as it was.
    pub fn apply_changes(&mut self, changes: &ProposedChanges) -> Result<ProfileDiff> {
        let mut staged = self.0.clone();
        let mut diff = ProfileDiff::default();
        for (path, value) in changes {
            let before = set_path(&mut staged, path, value.clone())?;
            diff.entries.push(DiffEntry {
                path: path.clone(),
                before,
                after: value.clone(),
            });
        }
        self.0 = staged;
        Ok(diff)
    }

    /// Dry-run of [`Profile::apply_changes`].
    pub fn validate_changes(&self, changes: &ProposedChanges) -> Result<()> {
        self.clone().apply_changes(changes).map(|_| ())
    }
}

/// Per-path record of what an applied proposal changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileDiff {
    pub entries: Vec<DiffEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub path: String,
    /// None when the leaf did not exist before.
    pub before: Option<Value>,
    pub after: Value,
}

impl ProfileDiff {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn paths(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.path.as_str()).collect()
    }
}

/// Read a dotted path from any JSON value.
pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut node = root;
    for segment in path.split('.') {
        node = match node {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(node)
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn check_compatible(path: &str, existing: &Value, new: &Value) -> Result<()> {
    if existing.is_null() || kind(existing) == kind(new) {
        Ok(())
    } else {
        Err(EvolutionError::invalid_change(
            path,
            format!("type mismatch: existing {} vs new {}", kind(existing), kind(new)),
        ))
    }
}

/// Write `value` at `path`, returning the previous leaf value.
fn set_path(root: &mut Value, path: &str, value: Value) -> Result<Option<Value>> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(EvolutionError::invalid_change(path, "empty path segment"));
    }
    let Some((leaf, parents)) = segments.split_last() else {
        return Err(EvolutionError::invalid_change(path, "empty path"));
    };

    let sections = root
        .as_object_mut()
        .ok_or_else(|| EvolutionError::invalid_change(path, "profile root is not an object"))?;
    let section = segments[0];
    match sections.get(section) {
        Some(Value::Object(_)) => {}
        Some(other) => {
            return Err(EvolutionError::invalid_change(
                path,
                format!("section '{}' is a {}, not an object", section, kind(other)),
            ))
        }
        None => {
            return Err(EvolutionError::invalid_change(
                path,
                format!("unknown profile section '{}'", section),
            ))
        }
    }

    if parents.is_empty() {
        // Whole-section replacement.
        let existing = &sections[section];
        check_compatible(path, existing, &value)?;
        return Ok(sections.insert(section.to_string(), value));
    }

    let mut node = root;
    for segment in parents {
        node = match node {
            Value::Object(map) => map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            Value::Array(items) => {
                let idx = parse_index(path, segment, items.len())?;
                &mut items[idx]
            }
            other => {
                return Err(EvolutionError::invalid_change(
                    path,
                    format!("cannot traverse '{}' through a {}", segment, kind(other)),
                ))
            }
        };
    }

    match node {
        Value::Object(map) => {
            if let Some(existing) = map.get(*leaf) {
                check_compatible(path, existing, &value)?;
            }
            Ok(map.insert(leaf.to_string(), value))
        }
        Value::Array(items) => {
            let idx = parse_index(path, leaf, items.len())?;
            check_compatible(path, &items[idx], &value)?;
            Ok(Some(std::mem::replace(&mut items[idx], value)))
        }
        other => Err(EvolutionError::invalid_change(
            path,
            format!("parent of '{}' is a {}", leaf, kind(other)),
        )),
    }
}

fn parse_index(path: &str, segment: &str, len: usize) -> Result<usize> {
    match segment.parse::<usize>() {
        Ok(i) if i < len => Ok(i),
        Ok(i) => Err(EvolutionError::invalid_change(
            path,
            format!("index {} out of range (len {})", i, len),
        )),
        Err(_) => Err(EvolutionError::invalid_change(
            path,
            format!("'{}' is not an array index", segment),
        )),
    }
}
