//! Endpoint linting - static checks of link references.
//!
//! Checks every registered endpoint for:
//! - links naming input fields the input schema does not declare
//! - computed fields depending on fields the output schema does not declare
//! - computed fields that depend on each other in a loop
//! - two endpoints registered for the same (path, method)
//!
//! Plugin, header and cookie links are not checked.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;

use crate::api::EndpointSpec;
use crate::links::{get_link, Link, ThenLink};
use crate::types::{HttpMethod, Schema};

/// Diagnostic codes.
pub mod codes {
    /// Link references an input field that does not exist.
    pub const UNKNOWN_INPUT_FIELD: &str = "E001";
    /// Computed field depends on an output field that does not exist.
    pub const UNKNOWN_DEPENDENCY: &str = "E002";
    /// Computed fields form a dependency cycle.
    pub const COMPUTED_CYCLE: &str = "E003";
    /// Same (path, method) registered twice.
    pub const DUPLICATE_ENDPOINT: &str = "E004";
}

/// A single problem found by linting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub code: &'static str,
    pub method: HttpMethod,
    pub path: String,
    /// Dotted output field path (e.g. "address.city"); empty for endpoint-level problems.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub field: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Check link references of every endpoint.
pub fn check_links(endpoints: &[EndpointSpec]) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for endpoint in endpoints {
        if let Some(output) = &endpoint.output {
            check_schema(endpoint, output.schema(), "", &mut diagnostics);
        }
    }
    diagnostics
}

/// Validate link references; one message per problem, empty when valid.
///
/// Messages name the method, path, dotted output field and the offending
/// reference. The result is stable for an unchanged endpoint set.
pub fn validate_links(endpoints: &[EndpointSpec]) -> Vec<String> {
    check_links(endpoints).into_iter().map(|d| d.message).collect()
}

/// Find (path, method) pairs registered more than once.
///
/// Each repeat after the first registration is reported.
pub fn check_duplicates(endpoints: &[EndpointSpec]) -> Vec<Diagnostic> {
    let mut seen = HashSet::new();
    let mut diagnostics = Vec::new();
    for endpoint in endpoints {
        if !seen.insert((endpoint.path.as_str(), endpoint.method)) {
            diagnostics.push(Diagnostic {
                code: codes::DUPLICATE_ENDPOINT,
                method: endpoint.method,
                path: endpoint.path.clone(),
                field: String::new(),
                message: format!(
                    "Duplicate {} endpoint registered for path '{}'. Register only one handler per (path, method).",
                    endpoint.method, endpoint.path
                ),
            });
        }
    }
    diagnostics
}

pub fn duplicate_endpoint_errors(endpoints: &[EndpointSpec]) -> Vec<String> {
    check_duplicates(endpoints)
        .into_iter()
        .map(|d| d.message)
        .collect()
}

/// Every diagnostic: duplicates first, then link problems.
pub fn lint_diagnostics(endpoints: &[EndpointSpec]) -> Vec<Diagnostic> {
    let mut diagnostics = check_duplicates(endpoints);
    diagnostics.extend(check_links(endpoints));
    diagnostics
}

/// Messages of [`lint_diagnostics`].
pub fn lint(endpoints: &[EndpointSpec]) -> Vec<String> {
    lint_diagnostics(endpoints)
        .into_iter()
        .map(|d| d.message)
        .collect()
}

/// Check one output schema level, recursing into nested object fields.
fn check_schema(
    endpoint: &EndpointSpec,
    schema: &Schema,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let input = endpoint.input.as_ref();

    for field in schema.fields() {
        let field_path = if prefix.is_empty() {
            field.name.clone()
        } else {
            format!("{}.{}", prefix, field.name)
        };

        if let Some(nested) = field.ty.nested_schema() {
            check_schema(endpoint, nested, &field_path, diagnostics);
            continue;
        }

        let Some(link) = get_link(schema, &field.name) else {
            continue;
        };

        let mut missing_input = |label: String, reference: &str| {
            if !input.has_field(reference) {
                diagnostics.push(Diagnostic {
                    code: codes::UNKNOWN_INPUT_FIELD,
                    method: endpoint.method,
                    path: endpoint.path.clone(),
                    field: field_path.clone(),
                    message: format!(
                        "{} {}: output field '{}' uses {}('{}') but input schema '{}' has no field '{}'",
                        endpoint.method,
                        endpoint.path,
                        field_path,
                        label,
                        reference,
                        input.name(),
                        reference
                    ),
                });
            }
        };

        match link {
            Link::FromInput(from) => missing_input("FromInput".into(), &from.field),
            Link::DateRange(range) => {
                missing_input("DateRangeFrom".into(), &range.start);
                missing_input("DateRangeFrom".into(), &range.end);
            }
            Link::When(when) => {
                missing_input("WhenInput".into(), &when.condition_field);
                match &when.then {
                    ThenLink::FromInput(from) => {
                        missing_input("WhenInput then FromInput".into(), &from.field)
                    }
                    ThenLink::DateRange(range) => {
                        missing_input("WhenInput then DateRangeFrom".into(), &range.start);
                        missing_input("WhenInput then DateRangeFrom".into(), &range.end);
                    }
                }
            }
            Link::Computed(computed) => {
                for dep in &computed.fields {
                    if !schema.has_field(dep) {
                        diagnostics.push(Diagnostic {
                            code: codes::UNKNOWN_DEPENDENCY,
                            method: endpoint.method,
                            path: endpoint.path.clone(),
                            field: field_path.clone(),
                            message: format!(
                                "{} {}: output field '{}' uses ComputedFrom with dependency '{}' but output schema '{}' has no field '{}'",
                                endpoint.method,
                                endpoint.path,
                                field_path,
                                dep,
                                schema.name(),
                                dep
                            ),
                        });
                    }
                }
            }
            Link::Header(_) | Link::Cookie(_) | Link::Plugin(_) => {}
        }
    }

    for cycle in computed_cycles(schema) {
        let field = if prefix.is_empty() {
            cycle[0].clone()
        } else {
            format!("{}.{}", prefix, cycle[0])
        };
        diagnostics.push(Diagnostic {
            code: codes::COMPUTED_CYCLE,
            method: endpoint.method,
            path: endpoint.path.clone(),
            field,
            message: format!(
                "{} {}: computed fields of output schema '{}' form a cycle: {}",
                endpoint.method,
                endpoint.path,
                schema.name(),
                cycle.join(" -> ")
            ),
        });
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

/// Dependency cycles among computed fields of one schema level, each reported once.
fn computed_cycles(schema: &Schema) -> Vec<Vec<String>> {
    let deps: HashMap<&str, Vec<&str>> = schema
        .fields()
        .iter()
        .filter_map(|f| match &f.link {
            Some(Link::Computed(c)) => Some((
                f.name.as_str(),
                c.fields.iter().map(String::as_str).collect(),
            )),
            _ => None,
        })
        .collect();

    let mut state: HashMap<&str, Visit> = HashMap::new();
    let mut cycles = Vec::new();
    for field in schema.fields() {
        if deps.contains_key(field.name.as_str()) {
            let mut stack = Vec::new();
            visit(&field.name, &deps, &mut state, &mut stack, &mut cycles);
        }
    }
    cycles
}

fn visit<'a>(
    name: &'a str,
    deps: &HashMap<&'a str, Vec<&'a str>>,
    state: &mut HashMap<&'a str, Visit>,
    stack: &mut Vec<&'a str>,
    cycles: &mut Vec<Vec<String>>,
) {
    match state.get(name) {
        Some(Visit::Done) => return,
        Some(Visit::InProgress) => {
            if let Some(pos) = stack.iter().position(|n| *n == name) {
                let mut cycle: Vec<String> = stack[pos..].iter().map(|s| s.to_string()).collect();
                cycle.push(name.to_string());
                cycles.push(cycle);
            }
            return;
        }
        None => {}
    }

    let Some(next) = deps.get(name) else {
        return;
    };
    state.insert(name, Visit::InProgress);
    stack.push(name);
    for dep in next {
        visit(*dep, deps, state, stack, cycles);
    }
    stack.pop();
    state.insert(name, Visit::Done);
}
