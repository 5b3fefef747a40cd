//! Defaulting and change planning.
//!
//! [`apply_defaults`] fills unset attributes from their schema defaults.
//! [`plan`] compares prior state with a proposed configuration, carries
//! provider-computed values forward, lists the attribute changes and decides
//! whether the change can be applied in place or forces a replacement.

use crate::schema::{ReplacePolicy, Schema};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A change to a single attribute during a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// The attribute name.
    pub path: String,
    /// The value before the change (None if creating).
    pub before: Option<Value>,
    /// The value after the change (None if removing).
    pub after: Option<Value>,
    /// Whether this change alone forces replacement.
    #[serde(default)]
    pub requires_replace: bool,
}

impl AttributeChange {
    /// Create a new attribute change.
    pub fn new(path: impl Into<String>, before: Option<Value>, after: Option<Value>) -> Self {
        Self {
            path: path.into(),
            before,
            after,
            requires_replace: false,
        }
    }

    /// A value appearing for the first time.
    pub fn added(path: impl Into<String>, value: Value) -> Self {
        Self::new(path, None, Some(value))
    }

    /// A value being removed.
    pub fn removed(path: impl Into<String>, value: Value) -> Self {
        Self::new(path, Some(value), None)
    }

    /// A value changing.
    pub fn modified(path: impl Into<String>, before: Value, after: Value) -> Self {
        Self::new(path, Some(before), Some(after))
    }

    fn forcing_replace(mut self, replace: bool) -> Self {
        self.requires_replace = replace;
        self
    }
}

/// The result of a plan operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    /// The state expected after apply.
    pub planned_state: Value,
    /// Attribute changes between prior and planned state.
    pub changes: Vec<AttributeChange>,
    /// Whether the resource must be destroyed and recreated.
    pub requires_replace: bool,
}

impl PlanResult {
    /// A plan with no changes.
    pub fn no_change(state: Value) -> Self {
        Self {
            planned_state: state,
            changes: Vec::new(),
            requires_replace: false,
        }
    }

    /// A plan with changes.
    pub fn with_changes(
        planned_state: Value,
        changes: Vec<AttributeChange>,
        requires_replace: bool,
    ) -> Self {
        Self {
            planned_state,
            changes,
            requires_replace,
        }
    }

    /// True when nothing changes.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Names of the attributes that force replacement.
    pub fn replace_paths(&self) -> Vec<&str> {
        self.changes
            .iter()
            .filter(|c| c.requires_replace)
            .map(|c| c.path.as_str())
            .collect()
    }
}

/// Fill unset (absent or null) top-level attributes from schema defaults.
///
/// Non-object values are returned unchanged.
pub fn apply_defaults(schema: &Schema, config: &Value) -> Value {
    let Value::Object(obj) = config else {
        return config.clone();
    };

    let mut out = obj.clone();
    for (name, attr) in &schema.block.attributes {
        if let Some(default) = &attr.default {
            let unset = out.get(name).map_or(true, Value::is_null);
            if unset {
                out.insert(name.clone(), default.clone());
            }
        }
    }
    Value::Object(out)
}

/// Plan the transition from `prior` state to the `proposed` configuration.
///
/// - With no prior state (absent or null) every configured attribute is an
///   addition and nothing is replaced.
/// - A null `proposed` plans a destroy.
/// - Computed-only attributes carry over from prior state, as do
///   `IfConfigured` attributes the configuration no longer sets.
/// - A changed `Always` attribute or nested block, or a changed `IfConfigured`
///   attribute with a configured value, marks the plan `requires_replace`.
pub fn plan(schema: &Schema, prior: Option<&Value>, proposed: &Value) -> PlanResult {
    let prior = prior.and_then(Value::as_object);

    if proposed.is_null() {
        let changes = prior
            .map(|p| {
                p.iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| AttributeChange::removed(k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
        return PlanResult::with_changes(Value::Null, changes, false);
    }

    let planned = apply_defaults(schema, proposed);
    let Value::Object(mut planned) = planned else {
        return PlanResult::no_change(planned);
    };

    let Some(prior) = prior else {
        let changes = planned
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| AttributeChange::added(k.clone(), v.clone()))
            .collect();
        return PlanResult::with_changes(Value::Object(planned), changes, false);
    };

    let mut changes = Vec::new();

    for (name, attr) in &schema.block.attributes {
        let before = non_null(prior, name);

        if attr.flags.is_computed_only() {
            if let Some(value) = before {
                planned.insert(name.clone(), value.clone());
            }
            continue;
        }

        let mut after = non_null(&planned, name).cloned();
        if after.is_none() && attr.replace == ReplacePolicy::IfConfigured {
            if let Some(value) = before {
                planned.insert(name.clone(), value.clone());
                after = Some(value.clone());
            }
        }

        if before == after.as_ref() {
            continue;
        }

        let replace = match attr.replace {
            ReplacePolicy::InPlace => false,
            ReplacePolicy::Always => true,
            ReplacePolicy::IfConfigured => after.is_some(),
        };
        changes.push(
            AttributeChange::new(name.clone(), before.cloned(), after).forcing_replace(replace),
        );
    }

    for (name, nested) in &schema.block.blocks {
        let before = non_null(prior, name);
        let after = non_null(&planned, name);
        if before == after {
            continue;
        }
        changes.push(
            AttributeChange::new(name.clone(), before.cloned(), after.cloned())
                .forcing_replace(nested.replace == ReplacePolicy::Always),
        );
    }

    let requires_replace = changes.iter().any(|c| c.requires_replace);
    PlanResult::with_changes(Value::Object(planned), changes, requires_replace)
}

fn non_null<'a>(obj: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    obj.get(name).filter(|v| !v.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, AttributeType, Block, NestedBlock, Validator};
    use serde_json::json;

    fn schema() -> Schema {
        Schema::v0()
            .with_attribute("id", Attribute::computed_int64())
            .with_attribute(
                "project_id",
                Attribute::optional_int64().requires_replace_if_configured(),
            )
            .with_attribute("region_id", Attribute::required_string().requires_replace())
            .with_attribute("display_name", Attribute::optional_string())
            .with_attribute("ip_addresses", Attribute::computed_list(AttributeType::String))
            .with_attribute(
                "desired_power_state",
                Attribute::optional_string()
                    .with_default(json!("On"))
                    .with_validator(Validator::one_of(["On", "Off"])),
            )
            .with_block(
                "partitions",
                NestedBlock::list(Block::new().with_attribute("name", Attribute::required_string()))
                    .requires_replace(),
            )
    }

    fn prior() -> Value {
        json!({
            "id": 42,
            "project_id": 7,
            "region_id": "EWR1",
            "display_name": "web",
            "ip_addresses": ["10.0.0.2"],
            "desired_power_state": "On"
        })
    }

    #[test]
    fn test_apply_defaults() {
        let out = apply_defaults(&schema(), &json!({"region_id": "EWR1"}));
        assert_eq!(out["desired_power_state"], "On");

        let out = apply_defaults(
            &schema(),
            &json!({"region_id": "EWR1", "desired_power_state": "Off"}),
        );
        assert_eq!(out["desired_power_state"], "Off");

        let out = apply_defaults(&schema(), &json!({"desired_power_state": null}));
        assert_eq!(out["desired_power_state"], "On");
    }

    #[test]
    fn test_plan_create() {
        let result = plan(&schema(), None, &json!({"region_id": "EWR1"}));
        assert!(!result.requires_replace);
        assert_eq!(result.planned_state["desired_power_state"], "On");
        assert_eq!(result.changes.len(), 2);
        assert!(result.changes.iter().all(|c| c.before.is_none()));
    }

    #[test]
    fn test_plan_no_change_carries_computed() {
        let proposed = json!({"project_id": 7, "region_id": "EWR1", "display_name": "web"});
        let result = plan(&schema(), Some(&prior()), &proposed);
        assert!(result.is_empty(), "unexpected changes: {:?}", result.changes);
        assert_eq!(result.planned_state["id"], 42);
        assert_eq!(result.planned_state["ip_addresses"], json!(["10.0.0.2"]));
    }

    #[test]
    fn test_plan_in_place_changes() {
        let proposed = json!({
            "project_id": 7,
            "region_id": "EWR1",
            "display_name": "api",
            "desired_power_state": "Off"
        });
        let result = plan(&schema(), Some(&prior()), &proposed);
        assert!(!result.requires_replace);
        assert_eq!(result.changes.len(), 2);
        assert!(result.replace_paths().is_empty());
    }

    #[test]
    fn test_plan_requires_replace() {
        let proposed = json!({"project_id": 7, "region_id": "LAX1", "display_name": "web"});
        let result = plan(&schema(), Some(&prior()), &proposed);
        assert!(result.requires_replace);
        assert_eq!(result.replace_paths(), vec!["region_id"]);
    }

    #[test]
    fn test_plan_replace_if_configured() {
        // Dropping project_id from configuration keeps the remote value.
        let proposed = json!({"region_id": "EWR1", "display_name": "web"});
        let result = plan(&schema(), Some(&prior()), &proposed);
        assert!(!result.requires_replace);
        assert_eq!(result.planned_state["project_id"], 7);

        let proposed = json!({"project_id": 8, "region_id": "EWR1", "display_name": "web"});
        let result = plan(&schema(), Some(&prior()), &proposed);
        assert!(result.requires_replace);
        assert_eq!(result.replace_paths(), vec!["project_id"]);
    }

    #[test]
    fn test_plan_nested_block_replace() {
        let proposed = json!({
            "project_id": 7,
            "region_id": "EWR1",
            "display_name": "web",
            "partitions": [{"name": "root"}]
        });
        let result = plan(&schema(), Some(&prior()), &proposed);
        assert!(result.requires_replace);
        assert_eq!(result.replace_paths(), vec!["partitions"]);
    }

    #[test]
    fn test_plan_destroy() {
        let result = plan(&schema(), Some(&prior()), &Value::Null);
        assert!(result.planned_state.is_null());
        assert!(result.changes.iter().all(|c| c.after.is_none()));
        assert!(!result.requires_replace);
    }

    #[test]
    fn test_attribute_change_constructors() {
        let added = AttributeChange::added("name", json!("test"));
        assert!(added.before.is_none());
        assert!(!added.requires_replace);

        let removed = AttributeChange::removed("name", json!("old"));
        assert!(removed.after.is_none());

        let modified = AttributeChange::modified("size", json!(1), json!(2));
        assert_eq!(modified.before, Some(json!(1)));
        assert_eq!(modified.after, Some(json!(2)));
    }
}
