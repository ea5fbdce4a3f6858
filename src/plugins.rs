//! Registry for link kinds defined outside this crate.
//!
//! A plugin link implements [`LinkPlugin`]. Registering its type with
//! [`register_link`] makes the resolver call [`LinkPlugin::resolve`] for
//! every field carrying an instance of it, and lets definition documents
//! declare it as `{"plugin": "<kind>", ...params}`.
//!
//! The registry is process-wide and append-only. Register plugin types at
//! startup, before definitions are loaded or requests are served.

use std::any::TypeId;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rand::RngCore;
use serde_json::{Map, Value};

/// A link kind whose value comes from custom code.
pub trait LinkPlugin: fmt::Debug + Send + Sync + 'static {
    /// Registry key for this link kind. Must equal [`PluginLinkType::KIND`].
    fn kind(&self) -> &'static str;

    /// Produce the override for the linked field.
    ///
    /// `input` is the normalized request input; `rng` is the resolution's
    /// random source, seeded when the caller asked for determinism.
    /// Returning `None` (or `null`) leaves the field to the factory.
    fn resolve(&self, input: &Map<String, Value>, rng: &mut dyn RngCore) -> Option<Value>;

    /// Concrete type of this instance, checked against the registry.
    #[doc(hidden)]
    fn plugin_type_id(&self) -> TypeId {
        TypeId::of::<Self>()
    }
}

/// A plugin link type that can be registered and built from parameters.
pub trait PluginLinkType: LinkPlugin + Sized {
    const KIND: &'static str;

    /// Build an instance from the parameters of a definition document
    /// annotation (the annotation object minus its `plugin` key).
    fn from_params(params: &Value) -> Result<Self, String>;
}

type Constructor = fn(&Value) -> Result<Arc<dyn LinkPlugin>, String>;

/// The type registered under a kind, and how to build it.
#[derive(Clone, Copy)]
struct Registration {
    type_id: TypeId,
    construct: Constructor,
}

static REGISTRY: Lazy<RwLock<HashMap<&'static str, Registration>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

fn construct<T: PluginLinkType>(params: &Value) -> Result<Arc<dyn LinkPlugin>, String> {
    T::from_params(params).map(|plugin| Arc::new(plugin) as Arc<dyn LinkPlugin>)
}

/// Register a plugin link type. Registering the same type twice is a no-op.
///
/// A kind belongs to the first type registered under it; a different type
/// claiming the same `KIND` later is ignored with a warning.
pub fn register_link<T: PluginLinkType>() {
    let mut registry = REGISTRY.write();
    match registry.get(T::KIND) {
        None => {
            registry.insert(
                T::KIND,
                Registration {
                    type_id: TypeId::of::<T>(),
                    construct: construct::<T>,
                },
            );
            tracing::debug!(kind = T::KIND, "registered plugin link");
        }
        Some(existing) if existing.type_id != TypeId::of::<T>() => {
            tracing::warn!(
                kind = T::KIND,
                rejected = std::any::type_name::<T>(),
                "plugin kind already registered by another type"
            );
        }
        Some(_) => {}
    }
}

/// Whether `plugin` is an instance of the type registered under its kind.
pub fn is_registered(plugin: &dyn LinkPlugin) -> bool {
    let type_id = plugin.plugin_type_id();
    REGISTRY
        .read()
        .get(plugin.kind())
        .is_some_and(|registration| registration.type_id == type_id)
}

/// Whether a link kind name is registered.
pub fn is_kind_registered(kind: &str) -> bool {
    REGISTRY.read().contains_key(kind)
}

/// Kind names of every registered link type.
pub fn registered_links() -> BTreeSet<&'static str> {
    REGISTRY.read().keys().copied().collect()
}

/// Build a registered plugin from definition parameters.
///
/// Returns `None` when `kind` is not registered.
pub(crate) fn construct_plugin(
    kind: &str,
    params: &Value,
) -> Option<Result<Arc<dyn LinkPlugin>, String>> {
    let registration = REGISTRY.read().get(kind).copied()?;
    Some((registration.construct)(params))
}
