//! Endpoint registry and request handling.
//!
//! A [`MockApi`] holds [`EndpointSpec`]s and answers requests against them:
//! path parameters are merged into the input, the input is validated against
//! its schema, and a response is generated through link resolution.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::config::MockConfig;
use crate::error::{ApiError, ValidateError};
use crate::factory::{build_response, BuildOptions, RandomFactory};
use crate::linter;
use crate::resolver::{MockRng, ResolveContext};
use crate::types::{HttpMethod, OutputType, Schema};
use crate::validator::validate_payload;

/// Request data readable by header and cookie links.
pub trait RequestContext {
    /// Header value; names are case-insensitive.
    fn header(&self, name: &str) -> Option<&str>;
    fn cookie(&self, name: &str) -> Option<&str>;
}

/// Owned headers and cookies of one request.
#[derive(Debug, Clone, Default)]
pub struct RequestParts {
    headers: HashMap<String, String>,
    cookies: HashMap<String, String>,
}

impl RequestParts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }
}

impl RequestContext for RequestParts {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }
}

/// One registered endpoint.
#[derive(Debug, Clone)]
pub struct EndpointSpec {
    pub path: String,
    pub method: HttpMethod,
    pub input: Arc<Schema>,
    /// `None` for endpoints that answer without a body.
    pub output: Option<OutputType>,
    /// Items per list response; falls back to the API configuration.
    pub list_count: Option<usize>,
    /// Keep only list items whose field equals the input value of the same name.
    pub filter_by: Option<String>,
}

impl EndpointSpec {
    pub fn new(
        path: impl Into<String>,
        method: HttpMethod,
        input: Arc<Schema>,
        output: Option<OutputType>,
    ) -> Self {
        Self {
            path: path.into(),
            method,
            input,
            output,
            list_count: None,
            filter_by: None,
        }
    }

    pub fn list_count(&mut self, count: usize) -> &mut Self {
        self.list_count = Some(count);
        self
    }

    pub fn filter_by(&mut self, field: impl Into<String>) -> &mut Self {
        self.filter_by = Some(field.into());
        self
    }

    /// Stable identifier derived from the path, e.g. `/users/{id}` -> `users_id`.
    pub fn route_id(&self) -> String {
        let id: String = self
            .path
            .trim_matches('/')
            .chars()
            .filter(|c| *c != '{' && *c != '}')
            .map(|c| if c == '/' { '_' } else { c })
            .collect();
        if id.is_empty() {
            "root".to_string()
        } else {
            id
        }
    }

    /// Match a concrete request path, capturing `{param}` segments.
    pub fn match_path(&self, path: &str) -> Option<Vec<(String, String)>> {
        let pattern: Vec<&str> = self.path.trim_matches('/').split('/').collect();
        let actual: Vec<&str> = path.trim_matches('/').split('/').collect();
        if pattern.len() != actual.len() {
            return None;
        }

        let mut params = Vec::new();
        for (expected, segment) in pattern.iter().zip(&actual) {
            match expected.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) => {
                    if segment.is_empty() {
                        return None;
                    }
                    params.push((name.to_string(), segment.to_string()));
                }
                None if expected == segment => {}
                None => return None,
            }
        }
        Some(params)
    }
}

/// A set of mock endpoints plus the settings they are served with.
#[derive(Debug, Clone, Default)]
pub struct MockApi {
    endpoints: Vec<EndpointSpec>,
    config: MockConfig,
}

impl MockApi {
    pub fn new(config: MockConfig) -> Self {
        Self {
            endpoints: Vec::new(),
            config,
        }
    }

    /// Register an endpoint. Duplicates are kept and reported by [`lint`](Self::lint).
    pub fn register(&mut self, endpoint: EndpointSpec) -> &mut EndpointSpec {
        tracing::debug!(method = %endpoint.method, path = %endpoint.path, "registered endpoint");
        self.endpoints.push(endpoint);
        let last = self.endpoints.len() - 1;
        &mut self.endpoints[last]
    }

    pub fn get(&mut self, path: &str, input: Arc<Schema>, output: OutputType) -> &mut EndpointSpec {
        self.register(EndpointSpec::new(path, HttpMethod::Get, input, Some(output)))
    }

    pub fn post(&mut self, path: &str, input: Arc<Schema>, output: OutputType) -> &mut EndpointSpec {
        self.register(EndpointSpec::new(path, HttpMethod::Post, input, Some(output)))
    }

    pub fn put(&mut self, path: &str, input: Arc<Schema>, output: OutputType) -> &mut EndpointSpec {
        self.register(EndpointSpec::new(path, HttpMethod::Put, input, Some(output)))
    }

    pub fn patch(&mut self, path: &str, input: Arc<Schema>, output: OutputType) -> &mut EndpointSpec {
        self.register(EndpointSpec::new(path, HttpMethod::Patch, input, Some(output)))
    }

    /// Register a `DELETE` endpoint that answers without a body.
    pub fn delete(&mut self, path: &str, input: Arc<Schema>) -> &mut EndpointSpec {
        self.register(EndpointSpec::new(path, HttpMethod::Delete, input, None))
    }

    pub fn endpoints(&self) -> &[EndpointSpec] {
        &self.endpoints
    }

    pub fn config(&self) -> &MockConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut MockConfig {
        &mut self.config
    }

    /// Serve every list endpoint with `count` items, replacing per-endpoint counts.
    pub fn override_list_count(&mut self, count: usize) {
        self.config.list_count = count;
        for endpoint in &mut self.endpoints {
            endpoint.list_count = Some(count);
        }
    }

    /// Link and duplicate-registration problems, one message each.
    pub fn lint(&self) -> Vec<String> {
        linter::lint(&self.endpoints)
    }

    /// Fail when the endpoint set is unusable.
    ///
    /// Duplicate registrations always fail; link errors only when
    /// `validate_links` is enabled.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidEndpoints` listing every problem found.
    pub fn check(&self) -> Result<(), ApiError> {
        let errors = if self.config.validate_links {
            self.lint()
        } else {
            linter::duplicate_endpoint_errors(&self.endpoints)
        };
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::InvalidEndpoints { errors })
        }
    }

    /// Find the endpoint serving `method path`, with its captured path parameters.
    pub fn find(&self, method: HttpMethod, path: &str) -> Option<(&EndpointSpec, Vec<(String, String)>)> {
        self.endpoints
            .iter()
            .filter(|e| e.method == method)
            .find_map(|e| e.match_path(path).map(|params| (e, params)))
    }

    /// Answer one request.
    ///
    /// Returns `Ok(None)` for endpoints without an output.
    ///
    /// # Errors
    ///
    /// `ApiError::NotFound` when no endpoint matches, `ApiError::InvalidInput`
    /// when the input fails its schema, `ApiError::Evaluate` for computed
    /// field errors and `ApiError::InvalidResponse` when `validate_responses`
    /// is on and the generated body does not match its schema.
    pub fn respond(
        &self,
        method: HttpMethod,
        path: &str,
        input: &Map<String, Value>,
        request: Option<&dyn RequestContext>,
    ) -> Result<Option<Value>, ApiError> {
        let (endpoint, params) = self.find(method, path).ok_or_else(|| ApiError::NotFound {
            method: method.to_string(),
            path: path.to_string(),
        })?;

        let mut merged = input.clone();
        merged.extend(endpoint.input.coerce_params(&params));
        let normalized = endpoint.input.normalize_input(&merged);
        validate_payload(&endpoint.input, &Value::Object(normalized.clone()))
            .map_err(|source| ApiError::InvalidInput { source })?;

        let Some(output) = &endpoint.output else {
            return Ok(None);
        };

        let seed = self.config.seed;
        let mut ctx = ResolveContext::new(&endpoint.input, &normalized, MockRng::from_seed_option(seed));
        if let Some(request) = request {
            ctx = ctx.with_request(request);
        }
        let mut factory = RandomFactory::from_seed_option(seed);
        let options = BuildOptions {
            list_count: endpoint.list_count.unwrap_or(self.config.list_count),
            filter_by: endpoint.filter_by.clone(),
        };

        let body = build_response(output, &ctx, &mut factory, &options)?;
        tracing::info!(method = %method, path, route = %endpoint.route_id(), "generated mock response");

        if self.config.validate_responses {
            validate_response(output, &body).map_err(|source| ApiError::InvalidResponse { source })?;
        }
        Ok(Some(body))
    }
}

fn validate_response(output: &OutputType, body: &Value) -> Result<(), ValidateError> {
    let schema = output.schema();
    match output {
        OutputType::One(_) => validate_payload(schema, body),
        OutputType::List(_) => validate_items(schema, body.as_array()),
        OutputType::Paginated(_) => validate_items(schema, body["items"].as_array()),
    }
}

fn validate_items(schema: &Schema, items: Option<&Vec<Value>>) -> Result<(), ValidateError> {
    let mut errors = Vec::new();
    for (i, item) in items.into_iter().flatten().enumerate() {
        if let Err(ValidateError::Invalid { errors: item_errors }) = validate_payload(schema, item) {
            errors.extend(item_errors.into_iter().map(|mut e| {
                e.path = format!("/{i}{}", e.path);
                e
            }));
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidateError::Invalid { errors })
    }
}
