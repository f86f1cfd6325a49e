use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Label meaning "whichever node picks it up first".
pub const ANY_LABEL: &str = "any";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Extra job-builder fields merged over the base definition.
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Project {
    pub fn new(name: &str, labels: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            data: Map::new(),
        }
    }

    /// Job definition pushed to each node's job builder.
    pub fn job_definition(&self) -> Value {
        let mut definition = json!({
            "job": {
                "name": self.name,
                "concurrent": true,
                "node": self.labels.join(" || "),
            }
        });
        for (key, value) in &self.data {
            merge_into(&mut definition, key, value.clone());
        }
        definition
    }
}

// Objects merge key by key, arrays extend, anything else is replaced.
fn merge_into(parent: &mut Value, key: &str, content: Value) {
    let Some(parent) = parent.as_object_mut() else {
        return;
    };
    let content = match parent.get_mut(key) {
        Some(existing) if existing.is_object() && content.is_object() => {
            if let Value::Object(fields) = content {
                for (k, v) in fields {
                    merge_into(existing, &k, v);
                }
            }
            return;
        }
        Some(Value::Array(items)) if content.is_array() => {
            if let Value::Array(more) = content {
                items.extend(more);
            }
            return;
        }
        _ => content,
    };
    parent.insert(key.to_string(), content);
}
