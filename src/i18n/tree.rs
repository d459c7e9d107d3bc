use crate::error::I18nError;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

/// Recursively nested translation data: every value is either a leaf string
/// or another namespace level. Arrays (and any other JSON shape) are invalid
/// and rejected at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationTree {
    Leaf(String),
    Node(BTreeMap<String, TranslationTree>),
}

impl TranslationTree {
    /// An empty namespace level.
    pub fn empty() -> Self {
        Self::Node(BTreeMap::new())
    }

    /// Validate and convert a raw JSON payload. The root must be an object;
    /// below it, only strings and nested objects are allowed.
    pub fn from_value(value: Value) -> Result<Self, I18nError> {
        match value {
            Value::Object(_) => convert(value, ""),
            other => Err(I18nError::Validation(format!(
                "translation root must be an object, got {}",
                kind_of(&other)
            ))),
        }
    }

    /// Layer `overlay` on top of `self`: overlay leaves replace, nodes merge
    /// recursively. When the shapes disagree at a key, the overlay wins.
    pub fn merge_from(&mut self, overlay: &Self) {
        match (self, overlay) {
            (Self::Node(base), Self::Node(over)) => {
                for (key, value) in over {
                    match base.get_mut(key) {
                        Some(existing) => existing.merge_from(value),
                        None => {
                            base.insert(key.clone(), value.clone());
                        }
                    }
                }
            }
            (slot, other) => *slot = other.clone(),
        }
    }

    /// Look up a leaf by dotted path, e.g. `"workout.start"`.
    pub fn lookup(&self, key: &str) -> Option<&str> {
        let mut current = self;
        for segment in key.split('.') {
            match current {
                Self::Node(map) => current = map.get(segment)?,
                Self::Leaf(_) => return None,
            }
        }
        match current {
            Self::Leaf(text) => Some(text),
            Self::Node(_) => None,
        }
    }

    /// Look up a leaf, falling back to the key itself as display text.
    pub fn display(&self, key: &str) -> String {
        self.lookup(key).unwrap_or(key).to_string()
    }

    /// All leaves as `(dotted-key, text)` pairs, in key order.
    pub fn flatten(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        collect(self, String::new(), &mut out);
        out
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Leaf(_) => false,
            Self::Node(map) => map.is_empty(),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Leaf(text) => Value::String(text.clone()),
            Self::Node(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect(),
            ),
        }
    }
}

fn convert(value: Value, path: &str) -> Result<TranslationTree, I18nError> {
    match value {
        Value::String(text) => Ok(TranslationTree::Leaf(text)),
        Value::Object(map) => {
            let mut node = BTreeMap::new();
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                node.insert(key, convert(child, &child_path)?);
            }
            Ok(TranslationTree::Node(node))
        }
        other => Err(I18nError::Validation(format!(
            "invalid value at \"{}\": expected string or object, got {}",
            path,
            kind_of(&other)
        ))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn collect(tree: &TranslationTree, prefix: String, out: &mut Vec<(String, String)>) {
    match tree {
        TranslationTree::Leaf(text) => out.push((prefix, text.clone())),
        TranslationTree::Node(map) => {
            for (key, child) in map {
                let child_prefix = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                collect(child, child_prefix, out);
            }
        }
    }
}

impl Serialize for TranslationTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Leaf(text) => serializer.serialize_str(text),
            Self::Node(map) => map.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for TranslationTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(D::Error::custom)
    }
}
