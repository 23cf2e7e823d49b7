use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use ao_domain::{Error, Result, ToolSchema};

/// An executable tool: a schema plus an async executor.
///
/// Executors receive the decoded argument map and return any
/// JSON-serializable value, or a categorized error.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> &ToolSchema;

    async fn execute(&self, args: &Value) -> Result<Value>;
}

/// Startup-registered name → tool map. Read-only at request time.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    /// Registry preloaded with the built-in tools.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(crate::builtin::CurrentTimeTool::new()));
        registry.register(Arc::new(crate::builtin::CalculateExpressionTool::new()));
        registry.register(Arc::new(crate::builtin::SystemInfoTool::new()));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.schema().name.clone();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "tool registered twice, replacing");
        }
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.tools.get(name).cloned().ok_or_else(|| Error::UnknownTool(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Sorted tool names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Schemas for a requested subset, failing on the first unknown name.
    pub fn schemas_for(&self, names: &[String]) -> Result<Vec<ToolSchema>> {
        names.iter().map(|n| self.get(n).map(|t| t.schema().clone())).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Argument validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Validate a model-produced argument map against a tool's parameter
/// descriptor: the value must be an object, every `required` property must
/// be present, and each present property must match its declared primitive
/// type. Unknown extra properties are tolerated.
pub fn validate_arguments(schema: &ToolSchema, args: &Value) -> Result<()> {
    let invalid = |message: String| Error::InvalidArguments {
        tool: schema.name.clone(),
        message,
    };

    let obj = args
        .as_object()
        .ok_or_else(|| invalid(format!("arguments must be an object, got {}", type_name(args))))?;

    let params = &schema.parameters;

    if let Some(required) = params.get("required").and_then(|r| r.as_array()) {
        for name in required.iter().filter_map(|n| n.as_str()) {
            if !obj.contains_key(name) {
                return Err(invalid(format!("missing required property '{name}'")));
            }
        }
    }

    if let Some(props) = params.get("properties").and_then(|p| p.as_object()) {
        for (name, value) in obj {
            let Some(declared) = props.get(name).and_then(|d| d.get("type")) else {
                continue;
            };
            let Some(expected) = declared.as_str() else { continue };
            if !type_matches(expected, value) {
                return Err(invalid(format!(
                    "property '{name}' must be {expected}, got {}",
                    type_name(value)
                )));
            }
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
