//! Configuration validation against a [`Schema`].
//!
//! Validation is an explicit pass run before planning and before any
//! remote call. Every violation becomes one field-level [`Diagnostic`]
//! carrying the dotted attribute path, so a single run reports all problems
//! in a configuration at once.
//!
//! # Example
//!
//! ```
//! use teraswitch_provider::schema::{Attribute, Schema, Validator};
//! use teraswitch_provider::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("region_id", Attribute::required_string())
//!     .with_attribute(
//!         "desired_power_state",
//!         Attribute::optional_string().with_validator(Validator::one_of(["On", "Off"])),
//!     );
//!
//! assert!(validate(&schema, &json!({"region_id": "EWR1"})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({
//!     "region_id": "EWR1",
//!     "desired_power_state": "Sleeping"
//! }));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute.as_deref(), Some("desired_power_state"));
//! ```

use crate::schema::{
    Attribute, AttributeType, Block, BlockNestingMode, Diagnostic, NestedBlock, Schema, Validator,
};
use serde_json::{Map, Value};

/// Validate a configuration value against a schema.
///
/// Checks, per block:
///
/// - the value is an object, and carries no attribute the schema does not know
/// - required attributes are present and non-null
/// - computed-only attributes are not configured
/// - configured values match their declared type
/// - attribute validators (`OneOf`, `AtLeastOneOf`, `Range`) hold
/// - nested blocks respect their item bounds and are validated recursively
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    match value {
        Value::Object(_) => validate_block(&schema.block, value, "", &mut diagnostics),
        other => diagnostics.push(
            Diagnostic::error("Expected object").with_detail(format!("Got {}", type_name(other))),
        ),
    }
    diagnostics
}

/// Validate, returning the diagnostics as the error when there are any.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// True when [`validate`] reports nothing.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

fn validate_block(block: &Block, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let obj = match value {
        Value::Object(map) => map,
        Value::Null => return,
        other => {
            let mut diag =
                Diagnostic::error("Expected object").with_detail(format!("Got {}", type_name(other)));
            if !path.is_empty() {
                diag = diag.with_attribute(path);
            }
            diagnostics.push(diag);
            return;
        },
    };

    for key in obj.keys() {
        if !block.attributes.contains_key(key) && !block.blocks.contains_key(key) {
            let attr_path = join_path(path, key);
            diagnostics.push(
                Diagnostic::error(format!("Unsupported attribute '{}'", attr_path))
                    .with_detail("This attribute is not declared by the schema")
                    .with_attribute(attr_path),
            );
        }
    }

    for (name, attr) in &block.attributes {
        let attr_path = join_path(path, name);
        validate_attribute(attr, obj, name, &attr_path, diagnostics);
    }

    for (name, nested) in &block.blocks {
        let block_path = join_path(path, name);
        validate_nested_block(nested, obj.get(name), &block_path, diagnostics);
    }
}

fn validate_attribute(
    attr: &Attribute,
    siblings: &Map<String, Value>,
    name: &str,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let value = siblings.get(name).filter(|v| !v.is_null());

    if attr.flags.is_computed_only() {
        if value.is_some() {
            diagnostics.push(
                Diagnostic::error(format!("Attribute '{}' is read-only", path))
                    .with_detail("This attribute is set by the provider and cannot be configured")
                    .with_attribute(path),
            );
        }
        return;
    }

    for validator in &attr.validators {
        if let Validator::AtLeastOneOf(others) = validator {
            let any_set = value.is_some()
                || others
                    .iter()
                    .any(|other| siblings.get(other).is_some_and(|v| !v.is_null()));
            if !any_set {
                let mut names = vec![name.to_string()];
                names.extend(others.iter().cloned());
                diagnostics.push(
                    Diagnostic::error("Missing attribute")
                        .with_detail(format!("At least one of [{}] must be set", names.join(", ")))
                        .with_attribute(path),
                );
            }
        }
    }

    let Some(value) = value else {
        if attr.flags.required {
            diagnostics.push(
                Diagnostic::error(format!("Missing required attribute '{}'", path))
                    .with_detail("This attribute is required and must be provided")
                    .with_attribute(path),
            );
        }
        return;
    };

    if !check_type(&attr.attr_type, value, path, diagnostics) {
        return;
    }

    for validator in &attr.validators {
        match validator {
            Validator::OneOf(allowed) => {
                if let Some(s) = value.as_str() {
                    if !allowed.iter().any(|a| a == s) {
                        diagnostics.push(
                            Diagnostic::error("Invalid attribute value")
                                .with_detail(format!(
                                    "Value \"{}\" must be one of: {}",
                                    s,
                                    allowed.join(", ")
                                ))
                                .with_attribute(path),
                        );
                    }
                }
            },
            Validator::Range { min, max } => {
                if let Some(n) = value.as_i64() {
                    let below = min.is_some_and(|m| n < m);
                    let above = max.is_some_and(|m| n > m);
                    if below || above {
                        diagnostics.push(
                            Diagnostic::error("Value out of range")
                                .with_detail(range_detail(n, *min, *max))
                                .with_attribute(path),
                        );
                    }
                }
            },
            Validator::AtLeastOneOf(_) => {},
        }
    }
}

fn range_detail(n: i64, min: Option<i64>, max: Option<i64>) -> String {
    match (min, max) {
        (Some(lo), Some(hi)) => format!("Value {} must be between {} and {}", n, lo, hi),
        (Some(lo), None) => format!("Value {} must be at least {}", n, lo),
        (None, Some(hi)) => format!("Value {} must be at most {}", n, hi),
        (None, None) => format!("Value {} is out of range", n),
    }
}

/// Returns false when a type error was recorded.
fn check_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    let before = diagnostics.len();
    match attr_type {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        },
        AttributeType::Int64 => {
            if !is_int64(value) {
                diagnostics.push(type_error(path, "int64", value));
            }
        },
        AttributeType::Float64 => {
            if !value.is_number() {
                diagnostics.push(type_error(path, "float64", value));
            }
        },
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        },
        AttributeType::List(element) => match value.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    check_type(element, item, &format!("{}.{}", path, i), diagnostics);
                }
            },
            None => diagnostics.push(type_error(path, "list", value)),
        },
        AttributeType::Map(element) => match value.as_object() {
            Some(entries) => {
                for (key, item) in entries {
                    check_type(element, item, &format!("{}.{}", path, key), diagnostics);
                }
            },
            None => diagnostics.push(type_error(path, "map", value)),
        },
    }
    diagnostics.len() == before
}

fn validate_nested_block(
    nested: &NestedBlock,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match (nested.nesting_mode, value) {
        (_, None | Some(Value::Null)) => {
            if nested.min_items > 0 {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Block '{}' requires at least {} item(s)",
                        path, nested.min_items
                    ))
                    .with_attribute(path),
                );
            }
        },
        (BlockNestingMode::Single, Some(v)) => validate_block(&nested.block, v, path, diagnostics),
        (BlockNestingMode::List, Some(Value::Array(items))) => {
            let len = items.len() as u32;
            if len < nested.min_items {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Block '{}' requires at least {} item(s), got {}",
                        path, nested.min_items, len
                    ))
                    .with_attribute(path),
                );
            }
            if nested.max_items > 0 && len > nested.max_items {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Block '{}' allows at most {} item(s), got {}",
                        path, nested.max_items, len
                    ))
                    .with_attribute(path),
                );
            }
            for (i, item) in items.iter().enumerate() {
                let item_path = format!("{}.{}", path, i);
                match item {
                    Value::Object(_) => {
                        validate_block(&nested.block, item, &item_path, diagnostics)
                    },
                    other => diagnostics.push(type_error(&item_path, "object", other)),
                }
            }
        },
        (BlockNestingMode::List, Some(other)) => {
            diagnostics.push(
                Diagnostic::error(format!("Expected list for block '{}'", path))
                    .with_detail(format!("Got {}", type_name(other)))
                    .with_attribute(path),
            );
        },
    }
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_int64(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.is_i64() || n.as_f64().is_some_and(|f| f.fract() == 0.0),
        _ => false,
    }
}

fn type_error(path: &str, expected: &str, actual: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, type_name(actual)))
        .with_attribute(path)
}
