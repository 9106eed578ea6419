// JSON Schema fragments derived from declared inputs and outputs.

use serde_json::{Map, Value, json};

use crate::plugins::{EndpointDescriptor, InputField, OutputSlot, TypeTag};

/// Schema for one input field.
pub fn input_schema(field: &InputField) -> Value {
    let c = &field.constraints;

    if let Some(choices) = &c.choices {
        let mut schema = json!({ "type": "string", "enum": choices });
        if let Some(default) = &c.default {
            schema["default"] = default.clone();
        }
        return schema;
    }

    if field.tag.is_binary() {
        return binary_schema(field.tag);
    }

    let mut schema = Map::new();
    schema.insert("type".into(), Value::from(json_type(field.tag)));
    match field.tag {
        TypeTag::String => {
            if c.multiline {
                schema.insert("format".into(), Value::from("text"));
            }
        }
        TypeTag::Number | TypeTag::Integer => {
            if let Some(min) = c.min {
                schema.insert("minimum".into(), number(min, field.tag));
            }
            if let Some(max) = c.max {
                schema.insert("maximum".into(), number(max, field.tag));
            }
            if let Some(step) = c.step {
                schema.insert("multipleOf".into(), number(step, field.tag));
            }
        }
        _ => {}
    }
    if let Some(default) = &c.default {
        schema.insert("default".into(), default.clone());
    }
    if let Some(placeholder) = &c.placeholder {
        schema.insert("description".into(), Value::from(placeholder.as_str()));
    }
    Value::Object(schema)
}

/// Schema for one output slot.
pub fn output_schema(slot: &OutputSlot) -> Value {
    if slot.tag.is_binary() {
        binary_schema(slot.tag)
    } else {
        json!({ "type": json_type(slot.tag) })
    }
}

/// Object schema for an endpoint request. `required` lists exactly the
/// required declared inputs, in declaration order.
pub fn request_schema(d: &EndpointDescriptor) -> Value {
    let properties: Map<String, Value> = d
        .inputs
        .iter()
        .map(|f| (f.name.clone(), input_schema(f)))
        .collect();
    let required: Vec<&str> = d.required_inputs().map(|f| f.name.as_str()).collect();

    let mut schema = json!({ "type": "object", "properties": properties });
    if !required.is_empty() {
        schema["required"] = json!(required);
    }
    schema
}

pub fn response_schema(d: &EndpointDescriptor) -> Value {
    let properties: Map<String, Value> = d
        .outputs
        .iter()
        .map(|s| (s.name.clone(), output_schema(s)))
        .collect();
    json!({ "type": "object", "properties": properties })
}

/// `text/textAnalyzer` → `TextTextAnalyzer`. Segments split on `/`, `_`, `.`.
pub fn schema_name(path: &str) -> String {
    path.split(['/', '_', '.'])
        .filter(|s| !s.is_empty())
        .map(|s| {
            let mut chars = s.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

fn binary_schema(tag: TypeTag) -> Value {
    json!({
        "type": "string",
        "format": "base64",
        "description": format!("Base64 encoded {}", tag),
    })
}

fn json_type(tag: TypeTag) -> &'static str {
    match tag {
        TypeTag::String | TypeTag::Image | TypeTag::Video | TypeTag::File => "string",
        TypeTag::Number => "number",
        TypeTag::Integer => "integer",
        TypeTag::Boolean => "boolean",
        TypeTag::Object => "object",
        TypeTag::Array => "array",
    }
}

fn number(v: f64, tag: TypeTag) -> Value {
    if tag == TypeTag::Integer && v.fract() == 0.0 {
        json!(v as i64)
    } else {
        json!(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::FieldConstraints;

    fn field(name: &str, tag: TypeTag, required: bool, c: FieldConstraints) -> InputField {
        InputField { name: name.into(), tag, required, constraints: c }
    }

    #[test]
    fn numeric_constraints_are_carried() {
        let s = input_schema(&field(
            "count",
            TypeTag::Integer,
            false,
            FieldConstraints {
                min: Some(1.0),
                max: Some(10.0),
                step: Some(1.0),
                default: Some(json!(3)),
                ..Default::default()
            },
        ));
        assert_eq!(
            s,
            json!({ "type": "integer", "minimum": 1, "maximum": 10, "multipleOf": 1, "default": 3 })
        );
    }

    #[test]
    fn binary_fields_are_base64_strings() {
        let s = input_schema(&field("clip", TypeTag::Video, true, Default::default()));
        assert_eq!(s["type"], "string");
        assert_eq!(s["format"], "base64");
        assert_eq!(s["description"], "Base64 encoded video");
    }

    #[test]
    fn enums_and_multiline_strings() {
        let e = input_schema(&field(
            "mode",
            TypeTag::String,
            false,
            FieldConstraints { choices: Some(vec!["fast".into(), "slow".into()]), ..Default::default() },
        ));
        assert_eq!(e, json!({ "type": "string", "enum": ["fast", "slow"] }));

        let m = input_schema(&field(
            "body",
            TypeTag::String,
            true,
            FieldConstraints { multiline: true, placeholder: Some("Write here".into()), ..Default::default() },
        ));
        assert_eq!(m, json!({ "type": "string", "format": "text", "description": "Write here" }));
    }

    #[test]
    fn structured_tags_map_to_json_types() {
        assert_eq!(input_schema(&field("d", TypeTag::Object, false, Default::default())), json!({ "type": "object" }));
        assert_eq!(input_schema(&field("l", TypeTag::Array, false, Default::default())), json!({ "type": "array" }));
    }

    #[test]
    fn schema_names_are_pascal_case() {
        assert_eq!(schema_name("text/textAnalyzer"), "TextTextAnalyzer");
        assert_eq!(schema_name("media.image/resize_fast"), "MediaImageResizeFast");
    }
}
