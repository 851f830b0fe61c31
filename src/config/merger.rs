//! Deep merge algorithm for YAML configuration values.
//!
//! Gantry layers `config.local.yml` over `config.yml`. This module
//! implements the merge semantics.
//!
//! # Merge Rules
//!
//! - Objects are merged recursively
//! - The top-level `steps` list is merged by step `name`: an overlay entry
//!   whose name matches a base entry is merged into it, new names append
//! - Other arrays are replaced entirely (not merged)
//! - Null values in overlay delete the corresponding key from base
//! - Scalars in overlay replace scalars in base

use serde_yaml::{Mapping, Value};

/// Deep merge two YAML values.
///
/// Later values override earlier values at the point of conflict.
/// Objects are merged recursively. Arrays are replaced entirely.
/// Null values in overlay delete the corresponding key from base.
pub fn deep_merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            let mut result = base_map.clone();

            for (key, overlay_value) in overlay_map {
                if overlay_value.is_null() {
                    result.remove(key);
                } else if let Some(base_value) = base_map.get(key) {
                    result.insert(key.clone(), deep_merge(base_value, overlay_value));
                } else {
                    result.insert(key.clone(), overlay_value.clone());
                }
            }

            Value::Mapping(result)
        }

        (_, overlay) => overlay.clone(),
    }
}

/// Merge two config documents, matching `steps` entries by name.
pub fn merge_config_values(base: &Value, overlay: &Value) -> Value {
    let (Value::Mapping(base_map), Value::Mapping(overlay_map)) = (base, overlay) else {
        return deep_merge(base, overlay);
    };

    let steps_key = Value::String("steps".to_string());
    let mut overlay_rest = overlay_map.clone();
    let overlay_steps = overlay_rest.remove(&steps_key);

    let mut merged = match deep_merge(base, &Value::Mapping(overlay_rest)) {
        Value::Mapping(m) => m,
        _ => Mapping::new(),
    };

    if let Some(overlay_steps) = overlay_steps {
        let steps = match (base_map.get(&steps_key), &overlay_steps) {
            (Some(Value::Sequence(base_steps)), Value::Sequence(new_steps)) => {
                Value::Sequence(merge_steps(base_steps, new_steps))
            }
            _ => overlay_steps.clone(),
        };
        if !steps.is_null() {
            merged.insert(steps_key, steps);
        } else {
            merged.remove(&steps_key);
        }
    }

    Value::Mapping(merged)
}

fn merge_steps(base: &[Value], overlay: &[Value]) -> Vec<Value> {
    let mut result = base.to_vec();

    for entry in overlay {
        let position = step_name(entry)
            .and_then(|name| result.iter().position(|s| step_name(s) == Some(name)));

        match position {
            Some(idx) => result[idx] = deep_merge(&result[idx], entry),
            None => result.push(entry.clone()),
        }
    }

    result
}

fn step_name(step: &Value) -> Option<&str> {
    step.get("name").and_then(Value::as_str)
}

/// Merge multiple configs in order (later overrides earlier).
pub fn merge_configs(configs: &[Value]) -> Value {
    configs
        .iter()
        .fold(Value::Mapping(Default::default()), |acc, config| {
            merge_config_values(&acc, config)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn deep_merge_replaces_at_conflict_point() {
        let base = yaml(
            r#"
settings:
  max_parallel: 1
  output_limit: 100
"#,
        );
        let overlay = yaml(
            r#"
settings:
  max_parallel: 4
"#,
        );

        let result = deep_merge(&base, &overlay);

        assert_eq!(result["settings"]["max_parallel"], 4);
        assert_eq!(result["settings"]["output_limit"], 100);
    }

    #[test]
    fn arrays_are_replaced_not_merged() {
        let base = yaml("args: [a, b]");
        let overlay = yaml("args: [c]");

        let result = deep_merge(&base, &overlay);
        let args = result["args"].as_sequence().unwrap();
        assert_eq!(args.len(), 1);
        assert_eq!(args[0], "c");
    }

    #[test]
    fn null_deletes_key() {
        let base = yaml("app_name: demo\nsettings: {}");
        let overlay = yaml("app_name: ~");

        let result = deep_merge(&base, &overlay);
        assert!(result.get("app_name").is_none());
        assert!(result.get("settings").is_some());
    }

    #[test]
    fn steps_merge_by_name() {
        let base = yaml(
            r#"
steps:
  - name: provision
    program: terraform
    args: [apply]
  - name: build
    program: docker
"#,
        );
        let overlay = yaml(
            r#"
steps:
  - name: provision
    args: [apply, -auto-approve]
  - name: smoke
    program: curl
"#,
        );

        let result = merge_configs(&[base, overlay]);
        let steps = result["steps"].as_sequence().unwrap();

        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0]["name"], "provision");
        assert_eq!(steps[0]["program"], "terraform");
        assert_eq!(steps[0]["args"][1], "-auto-approve");
        assert_eq!(steps[1]["name"], "build");
        assert_eq!(steps[2]["name"], "smoke");
    }

    #[test]
    fn merge_configs_without_steps_keeps_base_steps() {
        let base = yaml("steps:\n  - name: a\n    program: echo");
        let overlay = yaml("app_name: other");

        let result = merge_configs(&[base, overlay]);
        assert_eq!(result["steps"][0]["name"], "a");
        assert_eq!(result["app_name"], "other");
    }
}
