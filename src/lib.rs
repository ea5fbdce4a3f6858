//! Schema Mock
//!
//! Schema-driven mock responses whose fields follow the request.
//!
//! Output schema fields carry declarative *links* describing where their
//! value comes from. A request is answered in three steps: link resolution
//! turns links into overrides, evaluation turns overrides into values, and
//! an instance factory fills every remaining field with schema-consistent
//! random data.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use schema_mock::{
//!     build_one, ComputedFrom, FieldType, FromInput, MockRng, RandomFactory, ResolveContext,
//!     Schema,
//! };
//! use serde_json::{json, Value};
//!
//! let input = Schema::builder("UserQuery")
//!     .field("first", FieldType::String)
//!     .field("last", FieldType::String)
//!     .build();
//!
//! let output = Arc::new(
//!     Schema::builder("User")
//!         .field("id", FieldType::Uuid)
//!         .linked_field("first", FieldType::String, FromInput::new("first"))
//!         .linked_field("last", FieldType::String, FromInput::new("last"))
//!         .linked_field(
//!             "full_name",
//!             FieldType::String,
//!             ComputedFrom::new(["first", "last"], |v: &[Value]| {
//!                 json!(format!("{} {}", v[0].as_str().unwrap_or(""), v[1].as_str().unwrap_or("")))
//!             }),
//!         )
//!         .build(),
//! );
//!
//! let request = json!({ "first": "Jane", "last": "Smith" });
//! let ctx = ResolveContext::new(&input, request.as_object().unwrap(), MockRng::seeded(7));
//! let user = build_one(&output, &ctx, &mut RandomFactory::seeded(7)).unwrap();
//!
//! assert_eq!(user["full_name"], "Jane Smith");
//! assert!(user["id"].is_string());
//! ```
//!
//! # Link Kinds
//!
//! | Link | Effect on the output field |
//! |------|----------------------------|
//! | `FromInput(f)` | Copy input `f` (skipped when missing or null) |
//! | `DateRangeFrom(s, e)` | Fresh point between inputs `s` and `e` per instance |
//! | `WhenInput(f, v, then)` | Apply `then` only when input `f` equals `v` |
//! | `ComputedFrom(fields, combine)` | Combine other output fields |
//! | `FromHeader(h)` / `FromCookie(c)` | Copy request header / cookie |
//! | plugin | Registered [`LinkPlugin`] decides |
//!
//! Definitions can also be loaded from JSON documents, see [`load_definition`].

mod api;
mod config;
mod error;
mod evaluate;
mod factory;
mod links;
mod linter;
mod loader;
mod plugins;
mod resolver;
mod types;
mod validator;

pub use api::{EndpointSpec, MockApi, RequestContext, RequestParts};
pub use config::{discover_config, load_config, MockConfig, CONFIG_FILE_NAMES};
pub use error::{
    ApiError, ConfigError, DefinitionError, EvaluateError, ResolveError, SchemaError,
    ValidateError,
};
pub use evaluate::evaluate;
pub use factory::{
    build_list, build_one, build_paginated, build_response, BuildOptions, InstanceFactory,
    RandomFactory, MAX_PAGE_LIMIT,
};
pub use links::{
    get_link, Combine, ComputeFn, ComputedFrom, DateRangeFrom, FromCookie, FromHeader, FromInput,
    Link, ThenLink, WhenInput,
};
pub use linter::{
    check_duplicates, check_links, codes as lint_codes, duplicate_endpoint_errors, lint,
    lint_diagnostics, validate_links, Diagnostic,
};
pub use loader::{
    is_url, load_definition, load_definition_auto, load_definition_str, navigate_fragment,
    parse_definition, Definition, LINK_ANNOTATION,
};
pub use plugins::{
    is_kind_registered, is_registered, register_link, registered_links, LinkPlugin,
    PluginLinkType,
};
pub use resolver::{resolve, MockRng, Override, OverrideMap, ResolveContext, Thunk};
pub use types::{json_type_name, Field, FieldType, HttpMethod, OutputType, Schema, SchemaBuilder};
pub use validator::{to_json_schema, validate_against_schema, validate_payload};

#[cfg(feature = "remote")]
pub use loader::load_definition_url;
