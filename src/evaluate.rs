//! Override evaluation - turns an [`OverrideMap`] into concrete values.
//!
//! Plain values are copied, thunks invoked and nested bundles built through
//! the factory. Computed fields run last, in declaration order, each after
//! its dependencies: a dependency may itself be computed, and a declared
//! dependency nobody overrode is generated by the factory first so the
//! instance and the computed value agree.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::EvaluateError;
use crate::factory::InstanceFactory;
use crate::links::ComputedFrom;
use crate::resolver::{Override, OverrideMap};
use crate::types::Schema;

/// Evaluate every override of one schema level.
///
/// # Errors
///
/// Returns `EvaluateError::ComputedCycle` when computed fields depend on each
/// other in a loop, and `EvaluateError::UnknownDependency` when a computed
/// field names a field its schema does not declare.
pub fn evaluate(
    overrides: &OverrideMap,
    factory: &mut dyn InstanceFactory,
) -> Result<Map<String, Value>, EvaluateError> {
    let mut values = Map::new();
    let mut computed: Vec<(&str, &ComputedFrom)> = Vec::new();

    for (name, entry) in overrides.iter() {
        match entry {
            Override::Value(value) => {
                values.insert(name.to_string(), value.clone());
            }
            Override::Thunk(thunk) => {
                values.insert(name.to_string(), thunk.call());
            }
            Override::Nested(nested) => {
                let nested_values = evaluate(nested, factory)?;
                let instance = factory.build(nested.schema(), nested_values);
                values.insert(name.to_string(), instance);
            }
            Override::Computed(link) => computed.push((name, link)),
        }
    }

    if !computed.is_empty() {
        let pending: HashMap<&str, &ComputedFrom> = computed.iter().copied().collect();
        let mut stack = Vec::new();
        for (name, _) in &computed {
            compute_field(
                name,
                &pending,
                overrides.schema(),
                &mut values,
                factory,
                &mut stack,
            )?;
        }
    }

    Ok(values)
}

fn compute_field<'a>(
    name: &'a str,
    pending: &HashMap<&'a str, &'a ComputedFrom>,
    schema: &Schema,
    values: &mut Map<String, Value>,
    factory: &mut dyn InstanceFactory,
    stack: &mut Vec<&'a str>,
) -> Result<(), EvaluateError> {
    if values.contains_key(name) {
        return Ok(());
    }
    if let Some(pos) = stack.iter().position(|n| *n == name) {
        let mut cycle = stack[pos..].to_vec();
        cycle.push(name);
        return Err(EvaluateError::ComputedCycle {
            schema: schema.name().to_string(),
            cycle: cycle.join(" -> "),
        });
    }
    let Some(link) = pending.get(name).copied() else {
        return Ok(());
    };

    stack.push(name);
    let mut args = Vec::with_capacity(link.fields.len());
    for dep in &link.fields {
        if !values.contains_key(dep.as_str()) {
            if pending.contains_key(dep.as_str()) {
                compute_field(dep, pending, schema, values, factory, stack)?;
            } else {
                let field = schema
                    .field(dep)
                    .ok_or_else(|| EvaluateError::UnknownDependency {
                        schema: schema.name().to_string(),
                        field: name.to_string(),
                        dependency: dep.clone(),
                    })?;
                tracing::debug!(
                    schema = schema.name(),
                    field = name,
                    dependency = dep.as_str(),
                    "generating unlinked dependency of computed field"
                );
                let value = factory.generate(&field.ty);
                values.insert(dep.clone(), value);
            }
        }
        args.push(values.get(dep.as_str()).cloned().unwrap_or(Value::Null));
    }
    stack.pop();

    values.insert(name.to_string(), link.compute(&args));
    Ok(())
}
