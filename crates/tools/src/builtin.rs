//! Built-in tools.

use chrono::Utc;
use serde_json::Value;

use ao_domain::{Error, Result, ToolSchema};

use crate::registry::Tool;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// get_current_time
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Returns the current wallclock time as ISO-8601 UTC.
pub struct CurrentTimeTool {
    schema: ToolSchema,
}

impl CurrentTimeTool {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema {
                name: "get_current_time".into(),
                description: "Get the current date and time in ISO-8601 format (UTC).".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "timezone": {
                            "type": "string",
                            "description": "IANA timezone name; only UTC is supported",
                            "default": "UTC"
                        }
                    },
                    "required": []
                }),
            },
        }
    }
}

impl Default for CurrentTimeTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Tool for CurrentTimeTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, _args: &Value) -> Result<Value> {
        Ok(serde_json::json!({
            "time": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            "timezone": "UTC",
        }))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// calculate_expression
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Evaluates a basic arithmetic expression (`+ - * / %`, parentheses,
/// unary minus). Model-facing calculator with no function calls or
/// variables, so there is nothing to sandbox.
pub struct CalculateExpressionTool {
    schema: ToolSchema,
}

impl CalculateExpressionTool {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema {
                name: "calculate_expression".into(),
                description: "Evaluate a basic arithmetic expression, e.g. \"(2 + 3) * 4\"."
                    .into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "expression": {
                            "type": "string",
                            "description": "Arithmetic expression to evaluate"
                        }
                    },
                    "required": ["expression"]
                }),
            },
        }
    }
}

impl Default for CalculateExpressionTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Tool for CalculateExpressionTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: &Value) -> Result<Value> {
        let expression = args
            .get("expression")
            .and_then(|e| e.as_str())
            .ok_or_else(|| Error::InvalidArguments {
                tool: self.schema.name.clone(),
                message: "missing 'expression'".into(),
            })?;

        let result = eval(expression).map_err(|message| Error::InvalidArguments {
            tool: self.schema.name.clone(),
            message,
        })?;

        Ok(serde_json::json!({ "expression": expression, "result": result }))
    }
}

/// Recursive-descent evaluation: expr → term (('+'|'-') term)*,
/// term → factor (('*'|'/'|'%') factor)*, factor → number | '(' expr ')' | '-' factor.
fn eval(input: &str) -> std::result::Result<f64, String> {
    let tokens: Vec<char> = input.chars().filter(|c| !c.is_whitespace()).collect();
    let mut pos = 0;
    let value = parse_expr(&tokens, &mut pos)?;
    if pos != tokens.len() {
        return Err(format!("unexpected character at position {pos}"));
    }
    if !value.is_finite() {
        return Err("expression does not evaluate to a finite number".into());
    }
    Ok(value)
}

fn parse_expr(tokens: &[char], pos: &mut usize) -> std::result::Result<f64, String> {
    let mut value = parse_term(tokens, pos)?;
    while let Some(&op) = tokens.get(*pos) {
        match op {
            '+' => {
                *pos += 1;
                value += parse_term(tokens, pos)?;
            }
            '-' => {
                *pos += 1;
                value -= parse_term(tokens, pos)?;
            }
            _ => break,
        }
    }
    Ok(value)
}

fn parse_term(tokens: &[char], pos: &mut usize) -> std::result::Result<f64, String> {
    let mut value = parse_factor(tokens, pos)?;
    while let Some(&op) = tokens.get(*pos) {
        match op {
            '*' => {
                *pos += 1;
                value *= parse_factor(tokens, pos)?;
            }
            '/' => {
                *pos += 1;
                let rhs = parse_factor(tokens, pos)?;
                if rhs == 0.0 {
                    return Err("division by zero".into());
                }
                value /= rhs;
            }
            '%' => {
                *pos += 1;
                let rhs = parse_factor(tokens, pos)?;
                if rhs == 0.0 {
                    return Err("modulo by zero".into());
                }
                value %= rhs;
            }
            _ => break,
        }
    }
    Ok(value)
}

fn parse_factor(tokens: &[char], pos: &mut usize) -> std::result::Result<f64, String> {
    match tokens.get(*pos) {
        Some('-') => {
            *pos += 1;
            Ok(-parse_factor(tokens, pos)?)
        }
        Some('(') => {
            *pos += 1;
            let value = parse_expr(tokens, pos)?;
            if tokens.get(*pos) != Some(&')') {
                return Err("missing closing parenthesis".into());
            }
            *pos += 1;
            Ok(value)
        }
        Some(c) if c.is_ascii_digit() || *c == '.' => {
            let start = *pos;
            while tokens
                .get(*pos)
                .map(|c| c.is_ascii_digit() || *c == '.')
                .unwrap_or(false)
            {
                *pos += 1;
            }
            let text: String = tokens[start..*pos].iter().collect();
            text.parse::<f64>().map_err(|_| format!("invalid number '{text}'"))
        }
        Some(c) => Err(format!("unexpected character '{c}'")),
        None => Err("unexpected end of expression".into()),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// get_system_info
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Static process/platform facts.
pub struct SystemInfoTool {
    schema: ToolSchema,
}

impl SystemInfoTool {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema {
                name: "get_system_info".into(),
                description: "Get static information about the host process and platform.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {},
                    "required": []
                }),
            },
        }
    }
}

impl Default for SystemInfoTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Tool for SystemInfoTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, _args: &Value) -> Result<Value> {
        Ok(serde_json::json!({
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "service_version": env!("CARGO_PKG_VERSION"),
        }))
    }
}
