//! Repair of native function-calling payloads.
//!
//! Backends disagree on how a native call looks. Some namespace the tool
//! name, some send the arguments as a JSON string, some route every call
//! through a wrapper function (`tool_calls({name, arguments})`) and some put
//! the real tool name under a `tool` key. Everything is reduced to a
//! [`ParsedToolCall`] validated against the matching [`ToolSpec`].

use serde_json::{Map, Value};
use tracing::{debug, warn};

use toolstream_core::model::NativeToolCall;
use toolstream_core::tool::ToolSpec;

use crate::call::{CallSource, ParsedToolCall};
use crate::markup::render_call;
use crate::parse::strip_namespace;

pub struct ToolCallNormalizer {
    specs: Vec<ToolSpec>,
    wrapper: String,
}

impl ToolCallNormalizer {
    pub fn new(specs: Vec<ToolSpec>, wrapper: impl Into<String>) -> Self {
        Self {
            specs,
            wrapper: wrapper.into(),
        }
    }

    /// Normalize one native call. Unknown tools and invalid arguments are
    /// dropped with a warning.
    pub fn normalize(&self, call: &NativeToolCall) -> Option<ParsedToolCall> {
        let mut name = strip_namespace(&call.name).to_string();
        let Some(mut args) = decode_arguments(&call.arguments) else {
            warn!(call_id = %call.id, tool = %name, "Native call arguments are not a JSON object; dropping");
            return None;
        };

        if name == self.wrapper {
            match unwrap_named(&args) {
                Some((inner, inner_args)) => {
                    name = inner;
                    args = inner_args;
                }
                None => {
                    warn!(call_id = %call.id, "Wrapper call without valid {{name, arguments}}; dropping");
                    return None;
                }
            }
        } else if let Some(unwrapped) = unwrap_tool_key(&args) {
            let Some((inner, inner_args)) = unwrapped else {
                warn!(call_id = %call.id, tool = %name, "Nested tool arguments are not a JSON object; dropping");
                return None;
            };
            debug!(call_id = %call.id, from = %name, to = %inner, "Unwrapped tool key");
            name = inner;
            args = inner_args;
        }

        let Some(spec) = self.specs.iter().find(|s| s.name == name) else {
            warn!(call_id = %call.id, tool = %name, "Native call to unknown tool; dropping");
            return None;
        };

        match spec.validate_arguments(&args) {
            Ok(params) => Some(ParsedToolCall {
                raw_tag_text: render_call(&spec.name, &params),
                tool_name: spec.name.clone(),
                params,
                source: CallSource::Native,
            }),
            Err(errors) => {
                warn!(
                    call_id = %call.id,
                    tool = %name,
                    errors = %errors.join("; "),
                    "Native call failed validation; dropping"
                );
                None
            }
        }
    }
}

/// Arguments as an object. A JSON-encoded string is decoded first. Null and
/// blank strings mean no arguments; anything else that is not an object is
/// `None`.
fn decode_arguments(raw: &Value) -> Option<Map<String, Value>> {
    match raw {
        Value::Null => Some(Map::new()),
        Value::String(s) if s.trim().is_empty() => Some(Map::new()),
        Value::String(s) => match serde_json::from_str::<Value>(s).ok()? {
            Value::Object(map) => Some(map),
            _ => None,
        },
        Value::Object(map) => Some(map.clone()),
        _ => None,
    }
}

/// `{name, arguments}` → (name, arguments).
fn unwrap_named(args: &Map<String, Value>) -> Option<(String, Map<String, Value>)> {
    let name = args.get("name")?.as_str()?;
    let inner = decode_arguments(args.get("arguments")?)?;
    Some((strip_namespace(name).to_string(), inner))
}

/// `{tool, arguments | args | ...rest}` → (tool, arguments).
///
/// The outer `None` means there is no `tool` key; the inner one means the
/// nested arguments could not be decoded.
fn unwrap_tool_key(args: &Map<String, Value>) -> Option<Option<(String, Map<String, Value>)>> {
    let name = args.get("tool")?.as_str()?;
    let inner = match args.get("arguments").or_else(|| args.get("args")) {
        Some(nested) => decode_arguments(nested),
        None => Some(
            args.iter()
                .filter(|(k, _)| k.as_str() != "tool")
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
    };
    Some(inner.map(|inner| (strip_namespace(name).to_string(), inner)))
}
