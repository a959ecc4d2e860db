//! Variable interpolation for label text.
//!
//! References take the form `$(connection:name)`. Values are substituted in a
//! single pass, so a value containing another reference is not expanded again.

use std::collections::HashMap;
use std::sync::RwLock;

/// Text substituted for references with no known value.
pub const UNKNOWN_VALUE: &str = "$NA";

pub trait VariableResolver: Send + Sync {
    fn parse_variables(&self, text: &str) -> String;
}

#[derive(Debug, Default)]
pub struct VariableStore {
    values: RwLock<HashMap<String, String>>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        log::debug!("Variable {} = {:?}", name, value);
        if let Ok(mut values) = self.values.write() {
            values.insert(name, value);
        }
    }
}

impl VariableResolver for VariableStore {
    fn parse_variables(&self, text: &str) -> String {
        let Ok(values) = self.values.read() else {
            return text.to_string();
        };

        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find("$(") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];

            let Some(end) = after.find(')') else {
                // Unterminated reference, keep as typed
                out.push_str(&rest[start..]);
                return out;
            };

            let name = &after[..end];
            if let Some(inner) = name.find("$(") {
                // Restart at the nested reference
                out.push_str(&rest[start..start + 2 + inner]);
                rest = &after[inner..];
                continue;
            }
            if name.contains(':') {
                match values.get(name) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(UNKNOWN_VALUE),
                }
            } else {
                out.push_str(&rest[start..start + 2 + end + 1]);
            }
            rest = &after[end + 1..];
        }

        out.push_str(rest);
        out
    }
}
