// Result schemas and result extraction
//
// An agent's result type `O` is described to the model through its JSON
// schema (schemars) and validated on the way back (serde plus an optional
// `validate` hook). How the model hands the result back is decided by a
// ResultExtraction policy.

use schemars::{json_schema, schema_for, JsonSchema, Schema, SchemaGenerator};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::any::type_name;
use std::borrow::Cow;

use crate::tool_types::ToolDefinition;

/// Name of the tool the model calls to return a structured result
pub const FINAL_RESULT_TOOL: &str = "final_result";

/// Typed, validated shape of an agent's final answer
pub trait ResultSchema: DeserializeOwned + Serialize + JsonSchema + Send + Sync + 'static {
    /// Extra checks serde cannot express
    ///
    /// The returned message is shown to the model in the corrective re-ask.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Plain text result (no declared schema)
impl ResultSchema for String {}

/// Untyped JSON result
impl ResultSchema for Value {}

// ============================================================================
// Bounded integers
// ============================================================================

/// Integer constrained to `MIN..=MAX`
///
/// The bounds are advertised in the JSON schema and enforced when the model's
/// output is deserialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bounded<const MIN: i64, const MAX: i64>(i64);

impl<const MIN: i64, const MAX: i64> Bounded<MIN, MAX> {
    pub fn new(value: i64) -> Result<Self, String> {
        if (MIN..=MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(format!("value {} is out of range {}..={}", value, MIN, MAX))
        }
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl<const MIN: i64, const MAX: i64> std::fmt::Display for Bounded<MIN, MAX> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<const MIN: i64, const MAX: i64> Serialize for Bounded<MIN, MAX> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.0)
    }
}

impl<'de, const MIN: i64, const MAX: i64> Deserialize<'de> for Bounded<MIN, MAX> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = i64::deserialize(deserializer)?;
        Self::new(value).map_err(D::Error::custom)
    }
}

impl<const MIN: i64, const MAX: i64> JsonSchema for Bounded<MIN, MAX> {
    fn schema_name() -> Cow<'static, str> {
        Cow::Owned(format!("Bounded_{}_{}", MIN, MAX))
    }

    fn inline_schema() -> bool {
        true
    }

    fn json_schema(_generator: &mut SchemaGenerator) -> Schema {
        json_schema!({
            "type": "integer",
            "format": "int64",
            "minimum": MIN,
            "maximum": MAX,
        })
    }
}

// ============================================================================
// Extraction policies
// ============================================================================

/// How the final result is taken from the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultExtraction {
    /// The model calls the `final_result` tool; its arguments are the result
    Tool,
    /// Schema instructions go into the system prompt; the reply text is parsed as JSON
    PromptedJson,
    /// The reply text itself is the result
    Text,
}

impl ResultExtraction {
    /// `Text` when `O` is a plain string, `Tool` otherwise
    pub fn default_for<O: ResultSchema>() -> Self {
        if is_plain_string_schema(&result_schema::<O>()) {
            ResultExtraction::Text
        } else {
            ResultExtraction::Tool
        }
    }
}

impl std::fmt::Display for ResultExtraction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResultExtraction::Tool => write!(f, "tool"),
            ResultExtraction::PromptedJson => write!(f, "prompted_json"),
            ResultExtraction::Text => write!(f, "text"),
        }
    }
}

fn is_plain_string_schema(schema: &Value) -> bool {
    schema.get("type").and_then(Value::as_str) == Some("string")
}

/// JSON schema of `T`, without the `$schema` meta key
pub fn json_schema_for<T: JsonSchema>() -> Value {
    let mut schema = schema_for!(T).to_value();
    if let Value::Object(map) = &mut schema {
        map.remove("$schema");
    }
    schema
}

/// JSON schema advertised for an agent's result type
pub fn result_schema<O: JsonSchema>() -> Value {
    json_schema_for::<O>()
}

/// Tool definition advertised under the `Tool` policy
pub fn final_result_tool<O: JsonSchema>() -> ToolDefinition {
    ToolDefinition::new(
        FINAL_RESULT_TOOL,
        "The final response which ends this conversation. Call this tool exactly once \
         with arguments that match the JSON schema.",
        result_schema::<O>(),
    )
}

/// System prompt block used under the `PromptedJson` policy
pub fn prompted_json_instructions<O: JsonSchema>() -> String {
    let schema = serde_json::to_string_pretty(&result_schema::<O>())
        .unwrap_or_else(|_| "{}".to_string());
    let name = type_name::<O>().rsplit("::").next().unwrap_or("Result");

    format!(
        r#"You must respond with a JSON object matching the following schema for type `{}`.

Schema:
```json
{}
```

Rules:
1. Your response MUST be valid JSON matching this exact schema
2. You may wrap the JSON in markdown code blocks (```json ... ```)
3. Do not include explanatory text before or after the JSON
4. All required fields must be present
5. Field types and value ranges must match the schema"#,
        name, schema
    )
}

// ============================================================================
// Parsing
// ============================================================================

/// Deserialize and validate a JSON value as `O`
pub fn parse_structured<O: ResultSchema>(value: Value) -> Result<O, String> {
    let output: O = serde_json::from_value(value).map_err(|e| e.to_string())?;
    output.validate()?;
    Ok(output)
}

/// Parse reply text that should contain a JSON document
pub fn parse_json_text<O: ResultSchema>(text: &str) -> Result<O, String> {
    let body = extract_json_body(text);
    if body.is_empty() {
        return Err("Response did not contain any JSON".to_string());
    }
    let value: Value =
        serde_json::from_str(body).map_err(|e| format!("Response is not valid JSON: {}", e))?;
    parse_structured(value)
}

/// Take the reply text itself as the result
pub fn parse_plain_text<O: ResultSchema>(text: &str) -> Result<O, String> {
    parse_structured(Value::String(text.trim().to_string()))
}

/// Normalize raw tool-call arguments
///
/// JSON carried inside a string is decoded; missing arguments become `{}`.
pub(crate) fn decode_json_string(value: Value) -> Value {
    match value {
        Value::String(raw) => {
            let body = extract_json_body(&raw);
            if body.is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(body).unwrap_or(Value::String(raw))
            }
        }
        Value::Null => Value::Object(Default::default()),
        other => other,
    }
}

fn extract_json_body(text: &str) -> &str {
    let text = text.trim();

    if let Some(start) = text.find("```") {
        let after = &text[start + 3..];
        // skip the language tag line
        let after = match after.find('\n') {
            Some(nl) => &after[nl + 1..],
            None => after,
        };
        let inner = match after.find("```") {
            Some(end) => &after[..end],
            None => after,
        };
        return inner.trim();
    }

    match (text.find(['{', '[']), text.rfind(['}', ']'])) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
    struct Risk {
        advice: String,
        risk: Bounded<0, 10>,
    }

    impl ResultSchema for Risk {}

    #[derive(Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
    struct Even {
        n: i64,
    }

    impl ResultSchema for Even {
        fn validate(&self) -> Result<(), String> {
            if self.n % 2 == 0 {
                Ok(())
            } else {
                Err(format!("n must be even, got {}", self.n))
            }
        }
    }

    #[test]
    fn test_bounded_range() {
        assert_eq!(Bounded::<0, 10>::new(10).unwrap().get(), 10);
        assert!(Bounded::<0, 10>::new(11).is_err());
        assert!(Bounded::<0, 10>::new(-1).is_err());
    }

    #[test]
    fn test_bounded_schema_has_limits() {
        let schema = result_schema::<Risk>();
        let risk = &schema["properties"]["risk"];
        assert_eq!(risk["type"], "integer");
        assert_eq!(risk["minimum"], 0);
        assert_eq!(risk["maximum"], 10);
        assert!(schema.get("$schema").is_none());
    }

    #[test]
    fn test_parse_structured_rejects_out_of_range() {
        let err = parse_structured::<Risk>(json!({"advice": "ok", "risk": 11})).unwrap_err();
        assert!(err.contains("out of range"), "{err}");

        let ok = parse_structured::<Risk>(json!({"advice": "ok", "risk": 7})).unwrap();
        assert_eq!(ok.risk.get(), 7);
    }

    #[test]
    fn test_validate_hook() {
        assert!(parse_structured::<Even>(json!({"n": 4})).is_ok());
        let err = parse_structured::<Even>(json!({"n": 3})).unwrap_err();
        assert_eq!(err, "n must be even, got 3");
    }

    #[test]
    fn test_default_extraction() {
        assert_eq!(ResultExtraction::default_for::<String>(), ResultExtraction::Text);
        assert_eq!(ResultExtraction::default_for::<Risk>(), ResultExtraction::Tool);
    }

    #[test]
    fn test_parse_json_text_variants() {
        let fenced = "Here you go:\n```json\n{\"advice\": \"a\", \"risk\": 2}\n```";
        assert_eq!(parse_json_text::<Risk>(fenced).unwrap().risk.get(), 2);

        let bare = "{\"advice\": \"a\", \"risk\": 3}";
        assert_eq!(parse_json_text::<Risk>(bare).unwrap().risk.get(), 3);

        let chatty = "Sure! {\"advice\": \"a\", \"risk\": 4} Hope that helps.";
        assert_eq!(parse_json_text::<Risk>(chatty).unwrap().risk.get(), 4);

        assert!(parse_json_text::<Risk>("no json here").is_err());
        assert!(parse_json_text::<Risk>("   ").is_err());
    }

    #[test]
    fn test_parse_plain_text() {
        let text: String = parse_plain_text("  Once upon a time.\n").unwrap();
        assert_eq!(text, "Once upon a time.");
    }

    #[test]
    fn test_final_result_tool() {
        let tool = final_result_tool::<Risk>();
        assert_eq!(tool.name, FINAL_RESULT_TOOL);
        assert_eq!(tool.parameters["type"], "object");
    }

    #[test]
    fn test_prompted_json_instructions_include_schema() {
        let instructions = prompted_json_instructions::<Risk>();
        assert!(instructions.contains("`Risk`"));
        assert!(instructions.contains("\"risk\""));
        assert!(instructions.contains("\"maximum\": 10"));
    }

    #[test]
    fn test_decode_json_string() {
        assert_eq!(decode_json_string(json!("{\"a\": 1}")), json!({"a": 1}));
        assert_eq!(decode_json_string(json!("")), json!({}));
        assert_eq!(decode_json_string(json!("not json")), json!("not json"));
        assert_eq!(decode_json_string(json!({"a": 1})), json!({"a": 1}));
        assert_eq!(decode_json_string(Value::Null), json!({}));
    }
}
