//! Entity registry.
//!
//! Every domain type that may be rendered is registered once with an
//! [`EntityDescriptor`]: the whitelist of attributes a selection may reach,
//! optional computed attributes, and the parameter hooks used by the model
//! mutations. Types without a descriptor are never rendered field by field.

use indexmap::IndexMap;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ApiqlResult;
use crate::render::EntityRenderer;
use crate::value::{Object, Value};

/// Computed attribute. Runs with the renderer (object + context) and the
/// call's positional arguments.
pub type Resolver = Arc<dyn Fn(&EntityRenderer<'_>, &[Value]) -> ApiqlResult<Value> + Send + Sync>;

/// Mutation parameters, keyed by field name.
pub type Params = IndexMap<String, Value>;

/// Rewrites incoming mutation parameters (whitelisting, renaming, coercion).
pub type ParamsHook = Arc<dyn Fn(Params) -> ApiqlResult<Params> + Send + Sync>;

/// One whitelisted attribute.
#[derive(Clone)]
pub struct Attribute {
    name: String,
    resolver: Option<Resolver>,
}

impl Attribute {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the attribute is computed by the entity rather than read from
    /// the object.
    pub fn is_resolvable(&self) -> bool {
        self.resolver.is_some()
    }

    pub fn resolver(&self) -> Option<&Resolver> {
        self.resolver.as_ref()
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("resolvable", &self.is_resolvable())
            .finish()
    }
}

/// Per-type rendering descriptor.
#[derive(Clone)]
pub struct EntityDescriptor {
    type_name: &'static str,
    attributes: IndexMap<String, Attribute>,
    create_params: Option<ParamsHook>,
    update_params: Option<ParamsHook>,
    params: Option<ParamsHook>,
}

impl EntityDescriptor {
    pub fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            attributes: IndexMap::new(),
            create_params: None,
            update_params: None,
            params: None,
        }
    }

    /// Start from everything `parent` exposes.
    ///
    /// Attributes and hooks already declared on `self` win over the parent's.
    pub fn extends(mut self, parent: &EntityDescriptor) -> Self {
        let mut attributes = parent.attributes.clone();
        attributes.extend(self.attributes);
        self.attributes = attributes;
        self.create_params = self.create_params.or_else(|| parent.create_params.clone());
        self.update_params = self.update_params.or_else(|| parent.update_params.clone());
        self.params = self.params.or_else(|| parent.params.clone());
        self
    }

    /// Whitelist plain attributes read straight from the object.
    pub fn attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            self.attributes
                .entry(name.clone())
                .or_insert(Attribute { name, resolver: None });
        }
        self
    }

    /// Whitelist a computed attribute.
    pub fn resolve<F>(mut self, name: impl Into<String>, resolver: F) -> Self
    where
        F: Fn(&EntityRenderer<'_>, &[Value]) -> ApiqlResult<Value> + Send + Sync + 'static,
    {
        let name = name.into();
        self.attributes.insert(
            name.clone(),
            Attribute {
                name,
                resolver: Some(Arc::new(resolver)),
            },
        );
        self
    }

    pub fn map_create_params<F>(mut self, hook: F) -> Self
    where
        F: Fn(Params) -> ApiqlResult<Params> + Send + Sync + 'static,
    {
        self.create_params = Some(Arc::new(hook));
        self
    }

    pub fn map_update_params<F>(mut self, hook: F) -> Self
    where
        F: Fn(Params) -> ApiqlResult<Params> + Send + Sync + 'static,
    {
        self.update_params = Some(Arc::new(hook));
        self
    }

    /// Fallback used when no create/update specific hook is set.
    pub fn map_params<F>(mut self, hook: F) -> Self
    where
        F: Fn(Params) -> ApiqlResult<Params> + Send + Sync + 'static,
    {
        self.params = Some(Arc::new(hook));
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn allows(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    /// Hook applied to `create` parameters.
    pub fn create_hook(&self) -> Option<ParamsHook> {
        self.create_params.clone().or_else(|| self.params.clone())
    }

    /// Hook applied to `update` parameters.
    pub fn update_hook(&self) -> Option<ParamsHook> {
        self.update_params.clone().or_else(|| self.params.clone())
    }
}

impl fmt::Debug for EntityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("type_name", &self.type_name)
            .field("attributes", &self.attributes.values().collect::<Vec<_>>())
            .field("create_params", &self.create_params.is_some())
            .field("update_params", &self.update_params.is_some())
            .field("params", &self.params.is_some())
            .finish()
    }
}

/// Explicit mapping from runtime type to descriptor.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entries: HashMap<TypeId, Arc<EntityDescriptor>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the descriptor for `T`, replacing any earlier one.
    pub fn register<T: Object>(&mut self, descriptor: EntityDescriptor) -> &mut Self {
        tracing::debug!(
            "Registered entity {} with {} attributes",
            descriptor.type_name,
            descriptor.attributes.len()
        );
        self.entries.insert(TypeId::of::<T>(), Arc::new(descriptor));
        self
    }

    pub fn get<T: Object>(&self) -> Option<&EntityDescriptor> {
        self.entries.get(&TypeId::of::<T>()).map(Arc::as_ref)
    }

    pub fn descriptor_for(&self, object: &dyn Object) -> Option<Arc<EntityDescriptor>> {
        self.entries.get(&object.concrete_type_id()).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
