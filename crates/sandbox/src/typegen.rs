//! TypeScript declarations for the isolate's callable surface.
//!
//! Turns tool definitions into one `interface <Name>Input` per tool plus a
//! `declare const codemode` block, so code generated against the declarations
//! matches exactly what the isolate is given.

use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use codemode_core::types::ToolDefinition;

/// Nesting depth after which schemas render as `unknown`.
const MAX_DEPTH: usize = 8;

/// Render declarations for `definitions`, in their given order.
pub fn generate(definitions: &[ToolDefinition]) -> String {
    let mut out = String::new();

    for def in definitions {
        let root = &def.input_schema;
        if let Some(title) = root.get("description").and_then(Value::as_str) {
            push_doc(&mut out, title, "");
        }
        out.push_str(&format!("interface {}Input ", input_type_name(&def.name)));
        let body = match object_literal(root, root, 0, "") {
            Some(body) => body,
            None => "{}".to_string(),
        };
        out.push_str(&body);
        out.push_str("\n\n");
    }

    out.push_str("declare const codemode: {\n");
    for def in definitions {
        push_doc(&mut out, &def.description, "  ");
        out.push_str(&format!(
            "  {}: (input: {}Input) => Promise<unknown>;\n",
            property_key(&def.name),
            input_type_name(&def.name)
        ));
    }
    out.push_str("};\n");
    out
}

/// `sql_exec_batch` -> `SqlExecBatch`.
pub fn input_type_name(tool: &str) -> String {
    tool.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

fn push_doc(out: &mut String, text: &str, indent: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    let text = text.replace("*/", "*\\/");
    let mut lines = text.lines();
    match (lines.next(), lines.next()) {
        (Some(only), None) => out.push_str(&format!("{}/** {} */\n", indent, only)),
        _ => {
            out.push_str(&format!("{}/**\n", indent));
            for line in text.lines() {
                out.push_str(&format!("{} * {}\n", indent, line).replace(" * \n", " *\n"));
            }
            out.push_str(&format!("{} */\n", indent));
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn property_key(name: &str) -> String {
    if is_identifier(name) {
        name.to_string()
    } else {
        Value::String(name.to_string()).to_string()
    }
}

/// Follow a local `#/definitions/X` or `#/$defs/X` reference.
fn resolve_ref<'a>(reference: &str, root: &'a Value) -> Option<&'a Value> {
    let (section, name) = reference
        .strip_prefix("#/definitions/")
        .map(|name| ("definitions", name))
        .or_else(|| reference.strip_prefix("#/$defs/").map(|name| ("$defs", name)))?;
    root.get(section)?.get(name)
}

/// Render an object schema with properties as a TypeScript object literal.
fn object_literal(schema: &Value, root: &Value, depth: usize, indent: &str) -> Option<String> {
    let properties = schema.get("properties").and_then(Value::as_object)?;
    if properties.is_empty() {
        return Some("{}".to_string());
    }
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let inner = format!("{}  ", indent);
    let mut out = String::from("{\n");
    for (name, prop) in properties {
        if let Some(desc) = prop.get("description").and_then(Value::as_str) {
            push_doc(&mut out, desc, &inner);
        }
        let optional = if required.contains(&name.as_str()) { "" } else { "?" };
        out.push_str(&format!(
            "{}{}{}: {};\n",
            inner,
            property_key(name),
            optional,
            ts_type(prop, root, depth + 1, &inner)
        ));
    }
    out.push_str(indent);
    out.push('}');
    Some(out)
}

fn union(members: Vec<String>) -> String {
    let mut unique: Vec<String> = Vec::new();
    for m in members {
        if !unique.contains(&m) {
            unique.push(m);
        }
    }
    match unique.len() {
        0 => "unknown".to_string(),
        _ if unique.iter().any(|m| m == "unknown") => "unknown".to_string(),
        _ => unique.join(" | "),
    }
}

fn array_of(item: String) -> String {
    if item.contains(' ') && !item.starts_with('{') {
        format!("({})[]", item)
    } else {
        format!("{}[]", item)
    }
}

/// Map one schema node to a TypeScript type expression.
fn ts_type(schema: &Value, root: &Value, depth: usize, indent: &str) -> String {
    if depth > MAX_DEPTH {
        return "unknown".to_string();
    }
    let obj = match schema {
        Value::Object(obj) => obj,
        _ => return "unknown".to_string(),
    };

    if let Some(reference) = obj.get("$ref").and_then(Value::as_str) {
        return match resolve_ref(reference, root) {
            Some(target) => ts_type(target, root, depth + 1, indent),
            None => "unknown".to_string(),
        };
    }
    if let Some(value) = obj.get("const") {
        return value.to_string();
    }
    if let Some(values) = obj.get("enum").and_then(Value::as_array) {
        return union(values.iter().map(Value::to_string).collect());
    }
    for key in ["anyOf", "oneOf"] {
        if let Some(variants) = obj.get(key).and_then(Value::as_array) {
            return union(
                variants
                    .iter()
                    .map(|v| ts_type(v, root, depth + 1, indent))
                    .collect(),
            );
        }
    }
    if let Some(parts) = obj.get("allOf").and_then(Value::as_array) {
        let rendered: Vec<String> = parts
            .iter()
            .map(|v| ts_type(v, root, depth + 1, indent))
            .collect();
        return match rendered.len() {
            0 => "unknown".to_string(),
            1 => rendered.into_iter().next().unwrap_or_default(),
            _ => rendered.join(" & "),
        };
    }

    match obj.get("type") {
        Some(Value::String(t)) => named_type(t, obj, root, depth, indent),
        Some(Value::Array(types)) => union(
            types
                .iter()
                .filter_map(Value::as_str)
                .map(|t| named_type(t, obj, root, depth, indent))
                .collect(),
        ),
        _ if obj.contains_key("properties") => named_type("object", obj, root, depth, indent),
        _ => "unknown".to_string(),
    }
}

fn named_type(
    t: &str,
    obj: &Map<String, Value>,
    root: &Value,
    depth: usize,
    indent: &str,
) -> String {
    match t {
        "string" => "string".to_string(),
        "number" | "integer" => "number".to_string(),
        "boolean" => "boolean".to_string(),
        "null" => "null".to_string(),
        "array" => match obj.get("items") {
            Some(Value::Array(tuple)) => format!(
                "[{}]",
                tuple
                    .iter()
                    .map(|v| ts_type(v, root, depth + 1, indent))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Some(items) => array_of(ts_type(items, root, depth + 1, indent)),
            None => "unknown[]".to_string(),
        },
        "object" => {
            let schema = Value::Object(obj.clone());
            if let Some(literal) = object_literal(&schema, root, depth, indent) {
                return literal;
            }
            match obj.get("additionalProperties") {
                Some(extra @ Value::Object(_)) => {
                    format!("Record<string, {}>", ts_type(extra, root, depth + 1, indent))
                }
                _ => "Record<string, unknown>".to_string(),
            }
        }
        _ => "unknown".to_string(),
    }
}

/// Declarations computed once and reused for the server's lifetime.
#[derive(Default)]
pub struct TypeCache {
    text: OnceLock<String>,
    generations: AtomicUsize,
}

impl TypeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached declarations, generating them from `definitions` on first use.
    pub fn get_or_generate<F>(&self, definitions: F) -> &str
    where
        F: FnOnce() -> Vec<ToolDefinition>,
    {
        self.text.get_or_init(|| {
            self.generations.fetch_add(1, Ordering::SeqCst);
            let text = generate(&definitions());
            tracing::debug!(bytes = text.len(), "Type declarations generated");
            text
        })
    }

    /// How many times generation actually ran.
    pub fn generations(&self) -> usize {
        self.generations.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sql_query_def() -> ToolDefinition {
        ToolDefinition {
            name: "sql_query".into(),
            description: "Execute SELECT queries against SQLite.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "SQL SELECT query to execute." },
                    "params": {
                        "type": ["array", "null"],
                        "items": { "$ref": "#/definitions/SqlValue" }
                    }
                },
                "required": ["query"],
                "definitions": {
                    "SqlValue": {
                        "anyOf": [
                            { "type": "null" },
                            { "type": "boolean" },
                            { "type": "integer" },
                            { "type": "number" },
                            { "type": "string" }
                        ]
                    }
                }
            }),
        }
    }

    #[test]
    fn test_input_type_name() {
        assert_eq!(input_type_name("sql_exec_batch"), "SqlExecBatch");
        assert_eq!(input_type_name("get-weather"), "GetWeather");
    }

    #[test]
    fn test_generate_interfaces_and_surface() {
        let text = generate(&[sql_query_def()]);
        assert!(text.contains("interface SqlQueryInput {"));
        assert!(text.contains("  /** SQL SELECT query to execute. */\n  query: string;"));
        assert!(text.contains("params?: (null | boolean | number | string)[] | null;"));
        assert!(text.contains("declare const codemode: {"));
        assert!(text.contains("  /** Execute SELECT queries against SQLite. */\n  sql_query: (input: SqlQueryInput) => Promise<unknown>;"));
    }

    #[test]
    fn test_nested_objects_and_enums() {
        let def = ToolDefinition {
            name: "sql_exec_batch".into(),
            description: "Batch".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "statements": {
                        "type": "array",
                        "items": { "$ref": "#/$defs/Stmt" }
                    },
                    "mode": { "enum": ["fast", "safe"] },
                    "meta": { "type": "object", "additionalProperties": { "type": "integer" } }
                },
                "required": ["statements"],
                "$defs": {
                    "Stmt": {
                        "type": "object",
                        "properties": { "query": { "type": "string" } },
                        "required": ["query"]
                    }
                }
            }),
        };
        let text = generate(&[def]);
        assert!(text.contains("statements: {\n    query: string;\n  }[];"));
        assert!(text.contains("mode?: \"fast\" | \"safe\";"));
        assert!(text.contains("meta?: Record<string, number>;"));
    }

    #[test]
    fn test_generate_is_deterministic() {
        let defs = vec![sql_query_def()];
        assert_eq!(generate(&defs), generate(&defs));
    }

    #[test]
    fn test_cache_generates_once() {
        let cache = TypeCache::new();
        let first = cache.get_or_generate(|| vec![sql_query_def()]).to_string();
        let second = cache.get_or_generate(Vec::new).to_string();
        assert_eq!(first, second);
        assert_eq!(cache.generations(), 1);
    }

    #[test]
    fn test_empty_input_schema() {
        let def = ToolDefinition {
            name: "sql_tables".into(),
            description: "List tables".into(),
            input_schema: json!({ "type": "object", "properties": {} }),
        };
        assert!(generate(&[def]).contains("interface SqlTablesInput {}"));
    }
}
