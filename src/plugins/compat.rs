// Compatibility verdict for a single handler declaration.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::catalog::HandlerCatalog;
use super::manifest::HandlerDecl;
use super::{FieldConstraints, Handler, InputField, OutputSlot, TypeTag};

/// Accepted declaration, already resolved into typed specs.
#[derive(Clone)]
pub struct Compatible {
    pub inputs: Vec<InputField>,
    pub outputs: Vec<OutputSlot>,
    pub handler: Arc<dyn Handler>,
    pub binary_inputs: BTreeSet<String>,
    pub binary_outputs: BTreeSet<String>,
}

pub enum Verdict {
    FullyCompatible(Compatible),
    /// Reserved. Nothing produces it yet and the registry treats it as a reject.
    PartiallyCompatible { reason: String },
    Incompatible { reason: String },
}

impl Verdict {
    pub fn reason(&self) -> Option<&str> {
        match self {
            Verdict::FullyCompatible(_) => None,
            Verdict::PartiallyCompatible { reason } | Verdict::Incompatible { reason } => Some(reason),
        }
    }

    pub fn is_compatible(&self) -> bool {
        matches!(self, Verdict::FullyCompatible(_))
    }

    fn incompatible(reason: impl Into<String>) -> Self {
        Verdict::Incompatible { reason: reason.into() }
    }
}

/// Checks, in order: specs present, entry present, input tags supported and
/// unique, output tags supported and unique, entry resolves in the catalog.
pub fn check(decl: &HandlerDecl, catalog: &HandlerCatalog) -> Verdict {
    let (Some(raw_inputs), Some(raw_outputs)) = (&decl.inputs, &decl.outputs) else {
        return Verdict::incompatible("Missing required attributes (inputs or outputs)");
    };
    let Some(entry) = decl.entry.as_deref().filter(|e| !e.is_empty()) else {
        return Verdict::incompatible("Missing entry attribute");
    };

    let mut inputs = Vec::with_capacity(raw_inputs.len());
    let mut seen = BTreeSet::new();
    for field in raw_inputs {
        let Some(tag) = TypeTag::parse(&field.type_name) else {
            return Verdict::incompatible(format!(
                "Unsupported type {} for field {}",
                field.type_name, field.name
            ));
        };
        if !seen.insert(field.name.as_str()) {
            return Verdict::incompatible(format!("Duplicate input field {}", field.name));
        }
        inputs.push(InputField {
            name: field.name.clone(),
            tag,
            required: field.required,
            constraints: FieldConstraints {
                min: field.min,
                max: field.max,
                step: field.step,
                default: field.default.clone(),
                choices: field.choices.clone(),
                multiline: field.multiline,
                placeholder: field.placeholder.clone(),
            },
        });
    }

    let mut outputs: Vec<OutputSlot> = Vec::with_capacity(raw_outputs.len());
    for (i, slot) in raw_outputs.iter().enumerate() {
        let Some(tag) = TypeTag::parse(&slot.type_name) else {
            return Verdict::incompatible(format!(
                "Unsupported return type {} at position {}",
                slot.type_name, i
            ));
        };
        let name = slot
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("output_{}", i));
        if outputs.iter().any(|o| o.name == name) {
            return Verdict::incompatible(format!("Duplicate output slot {}", name));
        }
        outputs.push(OutputSlot { name, tag });
    }

    let Some(handler) = catalog.get(entry) else {
        return Verdict::incompatible(format!("Function {} not found or not callable", entry));
    };

    let binary_inputs = inputs
        .iter()
        .filter(|f| f.tag.is_binary())
        .map(|f| f.name.clone())
        .collect();
    let binary_outputs = outputs
        .iter()
        .filter(|s| s.tag.is_binary())
        .map(|s| s.name.clone())
        .collect();

    Verdict::FullyCompatible(Compatible {
        inputs,
        outputs,
        handler,
        binary_inputs,
        binary_outputs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::manifest::ModuleManifest;

    fn decl(toml_body: &str) -> HandlerDecl {
        let text = format!("[handlers.H]\n{}", toml_body);
        ModuleManifest::parse(&text).unwrap().handlers["H"].clone()
    }

    fn catalog() -> HandlerCatalog {
        HandlerCatalog::builtin()
    }

    #[test]
    fn accepts_valid_declaration_and_collects_binary_fields() {
        let d = decl(
            r#"entry = "image.inspect"
inputs = [ { name = "image", type = "IMAGE", required = true }, { name = "note", type = "STRING" } ]
outputs = [ { name = "image", type = "IMAGE" }, { type = "STRING" } ]"#,
        );
        let Verdict::FullyCompatible(ok) = check(&d, &catalog()) else {
            panic!("expected compatible");
        };
        assert_eq!(ok.binary_inputs.iter().collect::<Vec<_>>(), vec!["image"]);
        assert_eq!(ok.binary_outputs.iter().collect::<Vec<_>>(), vec!["image"]);
        assert_eq!(ok.outputs[1].name, "output_1");
    }

    #[test]
    fn missing_specs_are_rejected() {
        let v = check(&decl(r#"entry = "text.echo""#), &catalog());
        assert_eq!(v.reason(), Some("Missing required attributes (inputs or outputs)"));
    }

    #[test]
    fn missing_entry_is_rejected() {
        let v = check(&decl("inputs = []\noutputs = []"), &catalog());
        assert_eq!(v.reason(), Some("Missing entry attribute"));
    }

    #[test]
    fn unsupported_input_type_names_the_field() {
        let d = decl(
            r#"entry = "text.echo"
inputs = [ { name = "clip", type = "AUDIO" } ]
outputs = []"#,
        );
        assert_eq!(check(&d, &catalog()).reason(), Some("Unsupported type AUDIO for field clip"));
    }

    #[test]
    fn unsupported_output_type_names_the_position() {
        let d = decl(
            r#"entry = "text.echo"
inputs = []
outputs = [ { name = "a", type = "STRING" }, { name = "b", type = "TENSOR" } ]"#,
        );
        let v = check(&d, &catalog());
        assert!(!v.is_compatible());
        assert_eq!(v.reason(), Some("Unsupported return type TENSOR at position 1"));
    }

    #[test]
    fn duplicate_output_slots_are_rejected() {
        let d = decl(
            r#"entry = "text.echo"
inputs = []
outputs = [ { name = "echoed", type = "STRING" }, { name = "echoed", type = "STRING" } ]"#,
        );
        assert_eq!(check(&d, &catalog()).reason(), Some("Duplicate output slot echoed"));

        // A generated positional name collides too.
        let d = decl(
            r#"entry = "text.echo"
inputs = []
outputs = [ { name = "output_1", type = "STRING" }, { type = "STRING" } ]"#,
        );
        assert_eq!(check(&d, &catalog()).reason(), Some("Duplicate output slot output_1"));
    }

    #[test]
    fn unknown_entry_is_rejected() {
        let d = decl("entry = \"nope.missing\"\ninputs = []\noutputs = []");
        assert_eq!(
            check(&d, &catalog()).reason(),
            Some("Function nope.missing not found or not callable")
        );
    }
}
