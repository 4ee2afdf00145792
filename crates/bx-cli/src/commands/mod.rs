//! CLI command modules.

pub mod start;
pub mod status;
pub mod tasks;

/// Emit a JSON value to stdout if requested.
pub fn emit_json<T: serde::Serialize>(val: &T, json: bool) {
    if json {
        if let Ok(json_str) = serde_json::to_string_pretty(val) {
            println!("{json_str}");
        }
    }
}
