// Module: Context
// Run-scoped variable map with interpolation and conventional key accessors.

use std::collections::HashMap;
use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::protocol::Artifact;

static INTERPOLATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z0-9_.:-]+)\}").expect("valid interpolation regex")
});

/// Holds a run's variable state: tool outputs, extracted values, and
/// conventional slots like `search:results` and `nav:url`.
///
/// Every key is also addressable through `${key}` interpolation in tool
/// input, so the same map serves both typed lookups from core code and
/// textual substitution for tool authors.
#[derive(Debug, Default)]
pub struct Context {
    pub variables: HashMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self { variables: HashMap::new() }
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.variables.insert(key.into(), value);
    }

    pub fn extend(&mut self, entries: &HashMap<String, Value>) {
        for (k, v) in entries {
            self.variables.insert(k.clone(), v.clone());
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    /// Records the payload a step's tool returned under `step:<id>:payload`.
    pub fn set_step_payload(&mut self, step_id: &str, payload: Value) {
        self.set(format!("step:{step_id}:payload"), payload);
    }

    pub fn step_payload(&self, step_id: &str) -> Option<&Value> {
        self.get(&format!("step:{step_id}:payload"))
    }

    /// Records the artifacts a step produced under `step:<id>:artifacts`.
    pub fn set_step_artifacts(&mut self, step_id: &str, artifacts: &[Artifact]) {
        let value = serde_json::to_value(artifacts).unwrap_or(Value::Array(vec![]));
        self.set(format!("step:{step_id}:artifacts"), value);
    }

    /// Convenience accessor for the `search:results` convention populated
    /// by search-style tools.
    pub fn search_results(&self) -> Option<&Value> {
        self.get("search:results")
    }

    /// Convenience accessor for the `nav:url` convention populated by
    /// browser-navigation tools.
    pub fn nav_url(&self) -> Option<&str> {
        self.get("nav:url").and_then(Value::as_str)
    }

    /// Interpolates `${token}` placeholders inside a string.
    pub fn interpolate_str(&self, input: &str) -> Result<String> {
        let mut result = String::new();
        let mut last_index = 0;

        for capture in INTERPOLATION_RE.captures_iter(input) {
            let matched = capture.get(0).unwrap();
            result.push_str(&input[last_index..matched.start()]);
            let token = capture.get(1).unwrap().as_str();
            let resolved = self.resolve_token(token)?;
            result.push_str(&resolved);
            last_index = matched.end();
        }

        result.push_str(&input[last_index..]);
        Ok(result)
    }

    /// Recursively interpolates strings inside a JSON value, leaving other
    /// scalar types untouched.
    pub fn interpolate_value(&self, value: &Value) -> Result<Value> {
        match value {
            Value::String(s) => Ok(Value::String(self.interpolate_str(s)?)),
            Value::Array(items) => {
                let mut result = Vec::with_capacity(items.len());
                for item in items {
                    result.push(self.interpolate_value(item)?);
                }
                Ok(Value::Array(result))
            }
            Value::Object(map) => {
                let mut new_map = Map::with_capacity(map.len());
                for (k, v) in map {
                    new_map.insert(k.clone(), self.interpolate_value(v)?);
                }
                Ok(Value::Object(new_map))
            }
            _ => Ok(value.clone()),
        }
    }

    /// A read-only snapshot handed to tools so they can read context
    /// without holding a lock on it for the duration of their `run()`.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.variables.clone()
    }

    fn resolve_token(&self, token: &str) -> Result<String> {
        if let Some(rest) = token.strip_prefix("ENV_") {
            std::env::var(rest).map_err(|_| anyhow!("missing environment variable '{rest}'"))
        } else if let Some(value) = self.variables.get(token) {
            match value {
                Value::String(s) => Ok(s.clone()),
                primitive => Ok(primitive.to_string()),
            }
        } else {
            Err(anyhow!("missing context variable '{token}'"))
        }
    }
}
