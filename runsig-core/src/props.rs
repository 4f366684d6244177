#![forbid(unsafe_code)]

use std::sync::Arc;

use runsig_object::{ClassRegistry, Value};

use crate::config::Configuration;

/// Copy `value` deeply enough that mutating the copy cannot affect the
/// original.
///
/// Containers are rebuilt element by element. Objects whose class, or an
/// ancestor of it, is in the configured scalar allowlist are treated as
/// immutable and shared; any other object gets a fresh identity with
/// deep-cloned instance variables.
pub fn deep_clone_object(classes: &ClassRegistry, config: &Configuration, value: &Value) -> Value {
    let scalars = config.scalar_types();
    clone_with(classes, &|name: &str| scalars.contains(name), value)
}

fn clone_with(classes: &ClassRegistry, is_scalar: &dyn Fn(&str) -> bool, value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| clone_with(classes, is_scalar, v))
                .collect(),
        ),
        Value::Set(items) => Value::Set(
            items
                .iter()
                .map(|v| clone_with(classes, is_scalar, v))
                .collect(),
        ),
        Value::Hash(entries) => Value::Hash(
            entries
                .iter()
                .map(|(k, v)| {
                    (
                        clone_with(classes, is_scalar, k),
                        clone_with(classes, is_scalar, v),
                    )
                })
                .collect(),
        ),
        Value::Object(obj) => {
            let shared = classes
                .ancestors(obj.class())
                .into_iter()
                .any(|c| is_scalar(classes.name(c)));
            if shared {
                return value.clone();
            }
            let ivars = obj
                .ivars()
                .iter()
                .map(|(k, v)| (k.clone(), clone_with(classes, is_scalar, v)))
                .collect();
            Value::Object(Arc::new(obj.duplicate(ivars)))
        }
        _ => value.clone(),
    }
}
