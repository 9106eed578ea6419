//! Plugin contract: type tags, endpoint descriptors and the `Handler` trait.
//!
//! Plugin modules are TOML manifests under the plugin root (see
//! [`manifest`]). Each handler declaration names an entry in the compiled
//! [`catalog::HandlerCatalog`]; the [`registry::Registry`] validates every
//! declaration with [`compat::check`] and publishes the accepted ones as a
//! versioned endpoint table.

pub mod builtin;
pub mod catalog;
pub mod compat;
pub mod manifest;
pub mod registry;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

// ── Type tags ───────────────────────────────────────────────────────────────

/// Declared semantic type of an input field or output slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    Image,
    Video,
    File,
}

impl TypeTag {
    /// Case-insensitive, accepting the aliases plugin authors use.
    pub fn parse(raw: &str) -> Option<Self> {
        let tag = match raw.trim().to_ascii_uppercase().as_str() {
            "STRING" => TypeTag::String,
            "NUMBER" | "FLOAT" => TypeTag::Number,
            "INTEGER" | "INT" => TypeTag::Integer,
            "BOOLEAN" | "BOOL" => TypeTag::Boolean,
            "DICT" | "OBJECT" => TypeTag::Object,
            "LIST" | "ARRAY" => TypeTag::Array,
            "IMAGE" => TypeTag::Image,
            "VIDEO" => TypeTag::Video,
            "FILE" => TypeTag::File,
            _ => return None,
        };
        Some(tag)
    }

    /// Carried as base64 on the wire.
    pub fn is_binary(self) -> bool {
        matches!(self, TypeTag::Image | TypeTag::Video | TypeTag::File)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TypeTag::String => "string",
            TypeTag::Number => "number",
            TypeTag::Integer => "integer",
            TypeTag::Boolean => "boolean",
            TypeTag::Object => "object",
            TypeTag::Array => "array",
            TypeTag::Image => "image",
            TypeTag::Video => "video",
            TypeTag::File => "file",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Input / output specs ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldConstraints {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub default: Option<Value>,
    /// Allowed values; turns the field into a string enum.
    pub choices: Option<Vec<String>>,
    pub multiline: bool,
    pub placeholder: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputField {
    pub name: String,
    pub tag: TypeTag,
    pub required: bool,
    pub constraints: FieldConstraints,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputSlot {
    pub name: String,
    pub tag: TypeTag,
}

// ── Handler contract ────────────────────────────────────────────────────────

/// A value as a handler sees it after marshaling.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Json(Value),
    /// Decoded in-memory buffer (image inputs, or any binary output).
    Bytes(Vec<u8>),
    /// Freshly written temporary file (video/file inputs), or a file the
    /// handler wants returned as base64.
    Path(PathBuf),
}

impl From<Value> for NativeValue {
    fn from(v: Value) -> Self {
        NativeValue::Json(v)
    }
}

/// Decoded arguments keyed by input field name.
#[derive(Debug, Default, Clone)]
pub struct HandlerArgs {
    values: HashMap<String, NativeValue>,
}

impl HandlerArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: NativeValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&NativeValue> {
        self.values.get(name)
    }

    pub fn json(&self, name: &str) -> Option<&Value> {
        match self.values.get(name) {
            Some(NativeValue::Json(v)) => Some(v),
            _ => None,
        }
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.json(name).and_then(Value::as_str)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.json(name).and_then(Value::as_bool)
    }

    pub fn f64(&self, name: &str) -> Option<f64> {
        self.json(name).and_then(Value::as_f64)
    }

    pub fn u64(&self, name: &str) -> Option<u64> {
        self.json(name).and_then(Value::as_u64)
    }

    pub fn bytes(&self, name: &str) -> Option<&[u8]> {
        match self.values.get(name) {
            Some(NativeValue::Bytes(b)) => Some(b),
            _ => None,
        }
    }

    pub fn path(&self, name: &str) -> Option<&Path> {
        match self.values.get(name) {
            Some(NativeValue::Path(p)) => Some(p),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// What a handler returns: either a positional tuple zipped with the declared
/// output slot names, or an already-named map used as is.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutput {
    Positional(Vec<NativeValue>),
    Named(Vec<(String, NativeValue)>),
}

impl HandlerOutput {
    pub fn named<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, NativeValue)>,
        K: Into<String>,
    {
        HandlerOutput::Named(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Synchronous plugin entry point. Runs on the blocking pool; may fail or
/// panic without taking the engine down.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, args: HandlerArgs) -> anyhow::Result<HandlerOutput>;
}

impl<F> Handler for F
where
    F: Fn(HandlerArgs) -> anyhow::Result<HandlerOutput> + Send + Sync + 'static,
{
    fn call(&self, args: HandlerArgs) -> anyhow::Result<HandlerOutput> {
        self(args)
    }
}

// ── Endpoint descriptor ─────────────────────────────────────────────────────

/// One validated endpoint. Replaced wholesale on reload, never mutated.
#[derive(Clone)]
pub struct EndpointDescriptor {
    /// `{module}/{endpoint}`
    pub path: String,
    pub module: String,
    pub endpoint: String,
    /// Handler name as declared in the manifest.
    pub handler_name: String,
    pub display_name: String,
    pub description: String,
    pub category: String,
    pub inputs: Vec<InputField>,
    pub outputs: Vec<OutputSlot>,
    pub queue_mode: bool,
    pub handler: Arc<dyn Handler>,
}

impl EndpointDescriptor {
    pub fn input(&self, name: &str) -> Option<&InputField> {
        self.inputs.iter().find(|f| f.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&OutputSlot> {
        self.outputs.iter().find(|s| s.name == name)
    }

    pub fn required_inputs(&self) -> impl Iterator<Item = &InputField> {
        self.inputs.iter().filter(|f| f.required)
    }
}

impl fmt::Debug for EndpointDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointDescriptor")
            .field("path", &self.path)
            .field("queue_mode", &self.queue_mode)
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .finish()
    }
}

/// Endpoint segment of a path: non-alphanumerics removed, first character
/// lower-cased. `"Text Analyzer"` becomes `"textAnalyzer"`.
pub fn endpoint_name(handler_name: &str) -> String {
    let cleaned: String = handler_name.chars().filter(|c| c.is_alphanumeric()).collect();
    let mut chars = cleaned.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tags_accept_aliases_case_insensitively() {
        assert_eq!(TypeTag::parse("FLOAT"), Some(TypeTag::Number));
        assert_eq!(TypeTag::parse("int"), Some(TypeTag::Integer));
        assert_eq!(TypeTag::parse("Dict"), Some(TypeTag::Object));
        assert_eq!(TypeTag::parse("LIST"), Some(TypeTag::Array));
        assert_eq!(TypeTag::parse("AUDIO"), None);
        assert!(TypeTag::Video.is_binary());
        assert!(!TypeTag::String.is_binary());
    }

    #[test]
    fn endpoint_name_strips_and_lowercases() {
        assert_eq!(endpoint_name("Text Analyzer"), "textAnalyzer");
        assert_eq!(endpoint_name("Echo"), "echo");
        assert_eq!(endpoint_name("slow_job"), "slowjob");
        assert_eq!(endpoint_name("__"), "");
    }

    #[test]
    fn args_accessors_match_variants() {
        let mut args = HandlerArgs::new();
        args.insert("text", NativeValue::Json(Value::from("hi")));
        args.insert("img", NativeValue::Bytes(vec![1, 2]));
        assert_eq!(args.str("text"), Some("hi"));
        assert_eq!(args.bytes("img"), Some(&[1u8, 2][..]));
        assert!(args.bytes("text").is_none());
        assert!(args.path("img").is_none());
    }
}
