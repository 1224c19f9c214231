//! Tool trait and tool specifications.
//!
//! A [`ToolSpec`] describes what the model may call: the tool name, the
//! instruction shown to the model and an ordered list of typed parameters.
//! The same spec validates calls from both channels, raw text pulled out of
//! tag bodies and JSON arguments from native function calling.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::ToolError;
use crate::model::ToolDefinition;

/// The value type a parameter accepts, doubling as its validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParamKind {
    String {
        #[serde(default = "default_min_len")]
        min_len: usize,
    },
    Integer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<i64>,
    },
    Number,
    Boolean,
    Enum {
        values: Vec<String>,
    },
    Url,
}

fn default_min_len() -> usize {
    1
}

impl ParamKind {
    /// A non-empty string.
    pub fn string() -> Self {
        Self::String {
            min_len: default_min_len(),
        }
    }

    /// An unbounded integer.
    pub fn integer() -> Self {
        Self::Integer {
            min: None,
            max: None,
        }
    }

    /// Validate a raw text value (already trimmed by the caller).
    pub fn validate_text(&self, raw: &str) -> Result<Value, String> {
        match self {
            Self::String { min_len } => {
                if raw.chars().count() < *min_len {
                    return Err(format!("must be at least {min_len} characters"));
                }
                Ok(Value::String(raw.to_string()))
            }
            Self::Integer { min, max } => {
                let n: i64 = raw
                    .parse()
                    .map_err(|_| format!("expected an integer, got \"{raw}\""))?;
                if let Some(min) = min
                    && n < *min
                {
                    return Err(format!("must be >= {min}"));
                }
                if let Some(max) = max
                    && n > *max
                {
                    return Err(format!("must be <= {max}"));
                }
                Ok(Value::from(n))
            }
            Self::Number => raw
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| format!("expected a number, got \"{raw}\"")),
            Self::Boolean => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(format!("expected true or false, got \"{raw}\"")),
            },
            Self::Enum { values } => {
                if values.iter().any(|v| v == raw) {
                    Ok(Value::String(raw.to_string()))
                } else {
                    Err(format!("must be one of: {}", values.join(", ")))
                }
            }
            Self::Url => {
                let looks_like_url = (raw.starts_with("http://") || raw.starts_with("https://"))
                    && !raw.contains(char::is_whitespace);
                if looks_like_url {
                    Ok(Value::String(raw.to_string()))
                } else {
                    Err(format!("expected an http(s) URL, got \"{raw}\""))
                }
            }
        }
    }

    /// Validate a JSON value from a native tool call. Scalars are coerced
    /// through their text form so `"3"` and `3` are equally acceptable.
    pub fn validate_json(&self, value: &Value) -> Result<Value, String> {
        match value {
            Value::String(s) => self.validate_text(s.trim()),
            Value::Number(_) | Value::Bool(_) => self.validate_text(&value.to_string()),
            Value::Null => Err("must not be null".into()),
            Value::Array(_) | Value::Object(_) => Err("expected a scalar value".into()),
        }
    }

    fn json_schema(&self) -> Value {
        match self {
            Self::String { .. } => serde_json::json!({ "type": "string" }),
            Self::Integer { min, max } => {
                let mut schema = serde_json::json!({ "type": "integer" });
                if let Some(min) = min {
                    schema["minimum"] = Value::from(*min);
                }
                if let Some(max) = max {
                    schema["maximum"] = Value::from(*max);
                }
                schema
            }
            Self::Number => serde_json::json!({ "type": "number" }),
            Self::Boolean => serde_json::json!({ "type": "boolean" }),
            Self::Enum { values } => serde_json::json!({ "type": "string", "enum": values }),
            Self::Url => serde_json::json!({ "type": "string", "format": "uri" }),
        }
    }
}

/// One declared parameter of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(flatten)]
    pub kind: ParamKind,

    #[serde(default)]
    pub required: bool,

    /// Applied when an optional parameter is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            kind,
            required: true,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind)
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Name, instruction and parameter schema of one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,

    /// Shown to the model in the tool instructions.
    #[serde(alias = "description")]
    pub instruction: String,

    /// Declaration order is preserved; it is the order shown to the model.
    #[serde(default)]
    pub params: Vec<ParamSpec>,

    /// The tool returns images for the model to look at.
    #[serde(default)]
    pub views_images: bool,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instruction: instruction.into(),
            params: Vec::new(),
            views_images: false,
        }
    }

    /// Append a parameter.
    pub fn with_param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    /// Mark the tool as image-viewing.
    pub fn viewing_images(mut self) -> Self {
        self.views_images = true;
        self
    }

    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn required_params(&self) -> impl Iterator<Item = &ParamSpec> {
        self.params.iter().filter(|p| p.required)
    }

    /// Validate native-channel arguments against this spec.
    ///
    /// Unknown keys are ignored, defaults are applied to absent optional
    /// parameters, and every failure is reported rather than just the first.
    pub fn validate_arguments(&self, arguments: &Map<String, Value>) -> Result<Map<String, Value>, Vec<String>> {
        let mut params = Map::new();
        let mut errors = Vec::new();

        for param in &self.params {
            match arguments.get(&param.name) {
                Some(value) => match param.kind.validate_json(value) {
                    Ok(v) => {
                        params.insert(param.name.clone(), v);
                    }
                    Err(reason) => errors.push(format!("{}: {reason}", param.name)),
                },
                None if param.required => {
                    errors.push(format!("{}: missing required parameter", param.name));
                }
                None => {
                    if let Some(default) = &param.default {
                        params.insert(param.name.clone(), default.clone());
                    }
                }
            }
        }

        if errors.is_empty() { Ok(params) } else { Err(errors) }
    }

    /// Check that every declared default satisfies its own parameter kind.
    pub fn check_defaults(&self) -> Result<(), String> {
        for param in &self.params {
            if let Some(default) = &param.default {
                param
                    .kind
                    .validate_json(default)
                    .map_err(|reason| format!("{}.{}: default {reason}", self.name, param.name))?;
            }
        }
        Ok(())
    }

    /// Convert this spec into a ToolDefinition for native function calling.
    pub fn to_definition(&self) -> ToolDefinition {
        let mut properties = Map::new();
        for param in &self.params {
            let mut schema = param.kind.json_schema();
            if !param.description.is_empty() {
                schema["description"] = Value::String(param.description.clone());
            }
            if let Some(default) = &param.default {
                schema["default"] = default.clone();
            }
            properties.insert(param.name.clone(), schema);
        }
        let required: Vec<&str> = self.required_params().map(|p| p.name.as_str()).collect();

        ToolDefinition {
            name: self.name.clone(),
            description: self.instruction.clone(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        }
    }
}

/// Structured data folded into the next model turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The tool that produced this result
    pub tool_name: String,

    /// False for expected failures (resource not found, capability disabled)
    pub success: bool,

    /// Text shown to the model
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolResult {
    pub fn ok(tool_name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: true,
            output: output.into(),
            data: None,
        }
    }

    pub fn failure(tool_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: false,
            output: reason.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Delegates the rest of the conversation to a nested agent run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandOff {
    /// Replaces the system prompt for the nested run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Appended as the nested run's user turn
    pub user_prompt: String,
}

/// What a tool execution hands back to the loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolOutput {
    Result(ToolResult),
    HandOff(HandOff),
}

/// The core Tool trait.
///
/// Handlers return `ToolResult::failure` for expected failure modes and keep
/// `Err` for genuinely unexpected ones.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name, instruction and parameters of this tool.
    fn spec(&self) -> &ToolSpec;

    /// Execute the tool with already-validated parameters.
    async fn execute(
        &self,
        params: &Map<String, Value>,
        cancel: CancellationToken,
    ) -> Result<Vec<ToolOutput>, ToolError>;
}

/// A registry of available tools.
///
/// Registration order is remembered: it decides which spec gets the first
/// chance at an ambiguous tag body and the order tools are listed in prompts.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.spec().name.clone();
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!(tool = %name, "Replacing already registered tool");
        } else {
            self.order.push(name);
        }
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// All specs, in registration order.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| t.spec().clone())
            .collect()
    }

    /// Get all tool definitions (for native function calling).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.specs().iter().map(ToolSpec::to_definition).collect()
    }

    /// List all registered tool names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test tool for unit tests.
    struct EchoTool {
        spec: ToolSpec,
    }

    impl EchoTool {
        fn new(name: &str) -> Self {
            Self {
                spec: ToolSpec::new(name, "Echoes back the input")
                    .with_param(ParamSpec::required("text", ParamKind::string())),
            }
        }
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn spec(&self) -> &ToolSpec {
            &self.spec
        }

        async fn execute(
            &self,
            params: &Map<String, Value>,
            _cancel: CancellationToken,
        ) -> Result<Vec<ToolOutput>, ToolError> {
            let text = params["text"].as_str().unwrap_or("").to_string();
            Ok(vec![ToolOutput::Result(ToolResult::ok(&self.spec.name, text))])
        }
    }

    fn search_spec() -> ToolSpec {
        ToolSpec::new("search", "Search the web")
            .with_param(ParamSpec::required("query", ParamKind::string()))
            .with_param(
                ParamSpec::optional(
                    "limit",
                    ParamKind::Integer {
                        min: Some(1),
                        max: Some(20),
                    },
                )
                .with_default(5),
            )
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool::new("echo")));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn registry_keeps_registration_order() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool::new("zeta")));
        registry.register(Box::new(EchoTool::new("alpha")));
        registry.register(Box::new(EchoTool::new("zeta")));
        assert_eq!(registry.names(), vec!["zeta", "alpha"]);
        assert_eq!(registry.specs().len(), 2);
    }

    #[tokio::test]
    async fn echo_tool_executes() {
        let tool = EchoTool::new("echo");
        let mut params = Map::new();
        params.insert("text".into(), Value::String("hello world".into()));
        let out = tool.execute(&params, CancellationToken::new()).await.unwrap();
        assert_eq!(
            out,
            vec![ToolOutput::Result(ToolResult::ok("echo", "hello world"))]
        );
    }

    #[test]
    fn validate_text_per_kind() {
        assert!(ParamKind::string().validate_text("").is_err());
        assert_eq!(ParamKind::integer().validate_text("42"), Ok(Value::from(42)));
        assert!(ParamKind::integer().validate_text("4.2").is_err());
        assert_eq!(ParamKind::Boolean.validate_text("TRUE"), Ok(Value::Bool(true)));
        assert!(ParamKind::Url.validate_text("ftp://x").is_err());
        assert!(ParamKind::Url.validate_text("https://example.com/a b").is_err());
        let kind = ParamKind::Enum {
            values: vec!["asc".into(), "desc".into()],
        };
        assert!(kind.validate_text("desc").is_ok());
        assert!(kind.validate_text("up").is_err());
    }

    #[test]
    fn validate_json_coerces_scalars() {
        assert_eq!(
            ParamKind::integer().validate_json(&Value::String("7".into())),
            Ok(Value::from(7))
        );
        assert_eq!(
            ParamKind::string().validate_json(&Value::from(7)),
            Ok(Value::String("7".into()))
        );
        assert!(ParamKind::string().validate_json(&serde_json::json!(["a"])).is_err());
    }

    #[test]
    fn validate_arguments_applies_defaults_and_collects_errors() {
        let spec = search_spec();

        let args = serde_json::json!({"query": "cats"});
        let params = spec.validate_arguments(args.as_object().unwrap()).unwrap();
        assert_eq!(params["query"], "cats");
        assert_eq!(params["limit"], 5);

        let args = serde_json::json!({"limit": 99});
        let errors = spec.validate_arguments(args.as_object().unwrap()).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn definition_schema_lists_required() {
        let def = search_spec().to_definition();
        assert_eq!(def.name, "search");
        assert_eq!(def.parameters["required"], serde_json::json!(["query"]));
        assert_eq!(def.parameters["properties"]["limit"]["maximum"], 20);
    }

    #[test]
    fn spec_deserializes_with_description_alias() {
        let spec: ToolSpec = serde_json::from_str(
            r#"{"name":"fetch_page","description":"Fetch a page",
                "params":[{"name":"url","kind":"url","required":true},
                          {"name":"raw","kind":"boolean","default":false}]}"#,
        )
        .unwrap();
        assert_eq!(spec.instruction, "Fetch a page");
        assert_eq!(spec.params[0].kind, ParamKind::Url);
        assert!(!spec.params[1].required);
        assert!(spec.check_defaults().is_ok());
    }

    #[test]
    fn bad_default_is_reported() {
        let spec = ToolSpec::new("t", "x")
            .with_param(ParamSpec::optional("n", ParamKind::integer()).with_default("many"));
        assert!(spec.check_defaults().unwrap_err().contains("t.n"));
    }
}
