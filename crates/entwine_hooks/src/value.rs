//! The dynamic value model shared by every hooked callable.
//!
//! Arguments travel as an argument tuple ([`Args`]) of JSON values and results
//! are single JSON values. `Value::Null` plays the role of "no value".

pub use serde_json::{Map, Value, json};

/// An argument tuple.
pub type Args = Vec<Value>;

const DESCRIBE_LIMIT: usize = 256;

/// Best-effort serialization of a value for error messages.
///
/// Long values are truncated on a character boundary.
#[must_use]
pub fn describe(value: &Value) -> String {
    let mut rendered = value.to_string();
    if rendered.len() > DESCRIBE_LIMIT {
        let mut cut = DESCRIBE_LIMIT;
        while !rendered.is_char_boundary(cut) {
            cut -= 1;
        }
        rendered.truncate(cut);
        rendered.push_str("...");
    }
    rendered
}
