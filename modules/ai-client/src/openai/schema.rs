use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Types usable as OpenAI strict structured output.
///
/// Automatically implemented for any `JsonSchema + DeserializeOwned` type.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    /// Generate an OpenAI-compatible JSON schema for this type.
    ///
    /// Strict mode requires:
    /// 1. `additionalProperties: false` on every object schema
    /// 2. every property listed in `required`, nullable ones included
    /// 3. fully inlined schemas (no `$ref`)
    /// 4. no `format` keywords (schemars emits `int64`, `uint8`, ...)
    fn openai_schema() -> Value {
        let schema = schema_for!(Self);
        let mut value = serde_json::to_value(schema).unwrap_or_default();

        inline_refs(&mut value);
        if let Value::Object(map) = &mut value {
            map.remove("definitions");
            map.remove("$schema");
            map.remove("title");
        }
        fix_object_schemas(&mut value);

        value
    }

    /// Schema name as sent on the wire (`[A-Za-z0-9_-]`, at most 64 chars).
    fn schema_name_for_wire() -> String {
        let name: String = <Self as JsonSchema>::schema_name()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .take(64)
            .collect();
        if name.is_empty() {
            "structured_response".to_string()
        } else {
            name
        }
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

fn fix_object_schemas(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if matches!(map.get("format"), Some(Value::String(_))) {
                map.remove("format");
            }

            if map.get("type") == Some(&Value::String("object".to_string())) {
                map.insert("additionalProperties".to_string(), Value::Bool(false));

                if let Some(Value::Object(props)) = map.get("properties") {
                    let all_keys: Vec<Value> =
                        props.keys().map(|k| Value::String(k.clone())).collect();
                    map.insert("required".to_string(), Value::Array(all_keys));
                }
            }

            for (_, v) in map.iter_mut() {
                fix_object_schemas(v);
            }
        }
        Value::Array(arr) => {
            for item in arr.iter_mut() {
                fix_object_schemas(item);
            }
        }
        _ => {}
    }
}

fn inline_refs(value: &mut Value) {
    let definitions = match value {
        Value::Object(map) => map.get("definitions").cloned(),
        _ => None,
    };

    if let Some(defs) = definitions {
        inline_refs_recursive(value, &defs);
    }
}

fn inline_refs_recursive(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(ref_path)) = map.get("$ref").cloned() {
                if let Some(type_name) = ref_path.strip_prefix("#/definitions/") {
                    if let Some(def) = definitions.get(type_name) {
                        *value = def.clone();
                        inline_refs_recursive(value, definitions);
                        return;
                    }
                }
            }

            // schemars wraps referenced fields that carry docs in a one-element allOf
            if let Some(Value::Array(all_of)) = map.get("allOf").cloned() {
                if let [single] = all_of.as_slice() {
                    let description = map.get("description").cloned();
                    *value = single.clone();
                    inline_refs_recursive(value, definitions);
                    if let (Some(desc), Value::Object(inner)) = (description, &mut *value) {
                        inner.entry("description").or_insert(desc);
                    }
                    return;
                }
            }

            for (_, v) in map.iter_mut() {
                inline_refs_recursive(v, definitions);
            }
        }
        Value::Array(arr) => {
            for item in arr.iter_mut() {
                inline_refs_recursive(item, definitions);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    #[serde(rename_all = "snake_case")]
    enum Tone {
        Positive,
        Negative,
    }

    #[derive(Deserialize, JsonSchema)]
    struct Candidate {
        name: String,
        rationale: Option<String>,
    }

    #[derive(Deserialize, JsonSchema)]
    struct Evaluation {
        score: i64,
        /// Overall tone of the coverage.
        tone: Tone,
        candidates: Vec<Candidate>,
    }

    #[test]
    fn every_property_is_required() {
        let schema = Candidate::openai_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();

        assert!(required.contains(&"name"));
        assert!(required.contains(&"rationale"));
        assert_eq!(schema["additionalProperties"], Value::Bool(false));
    }

    #[test]
    fn nested_types_are_inlined() {
        let schema = Evaluation::openai_schema();
        let rendered = serde_json::to_string(&schema).unwrap();

        assert!(!rendered.contains("$ref"));
        assert!(schema.get("definitions").is_none());
        assert!(schema.get("$schema").is_none());

        let item = &schema["properties"]["candidates"]["items"];
        assert_eq!(item["type"], "object");
        assert_eq!(item["additionalProperties"], Value::Bool(false));
    }

    #[test]
    fn enum_field_keeps_variants_and_description() {
        let schema = Evaluation::openai_schema();
        let tone = &schema["properties"]["tone"];
        let variants = serde_json::to_string(tone).unwrap();

        assert!(variants.contains("positive"));
        assert!(variants.contains("negative"));
        assert!(tone.get("description").is_some());
    }

    #[test]
    fn integer_formats_are_stripped() {
        let schema = Evaluation::openai_schema();
        assert_eq!(schema["properties"]["score"]["type"], "integer");
        assert!(schema["properties"]["score"].get("format").is_none());
    }

    #[test]
    fn wire_name_is_sanitized() {
        assert_eq!(Evaluation::schema_name_for_wire(), "Evaluation");
        assert_eq!(Vec::<Candidate>::schema_name_for_wire(), "Array_of_Candidate");
    }
}
