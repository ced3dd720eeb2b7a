//! Value and entity rendering.
//!
//! [`render_value`] dispatches on the runtime shape of a value: `null`
//! short-circuits, maps render as ad-hoc entities without a whitelist, lists
//! render element by element, scalars only render as leaves, and domain
//! objects go through the [`EntityRenderer`] registered for their type.

use indexmap::IndexMap;
use std::sync::Arc;

use crate::ast::{Call, EagerLoad, Selection};
use crate::auth::{Action, Subject};
use crate::context::Context;
use crate::error::{ApiqlError, ApiqlResult};
use crate::merge::{merge_entry, MergePolicy};
use crate::registry::EntityDescriptor;
use crate::value::{Object, ObjectRef, Rendered, RenderedMap, Value};

/// Render `value` against an optional selection.
pub fn render_value(ctx: &Context, value: &Value, selection: Option<&Selection>) -> ApiqlResult<Rendered> {
    let Some(selection) = selection else {
        return Ok(value.to_leaf());
    };

    match value {
        Value::Null => Ok(Rendered::Null),
        Value::Map(map) => HashEntity::new(map, ctx).render(selection),
        Value::List(items) => items
            .iter()
            .map(|item| ctx.contain(render_value(ctx, item, Some(selection)), "[]"))
            .collect::<ApiqlResult<Vec<_>>>()
            .map(Rendered::Array),
        Value::Object(object) => render_object(ctx, object, selection),
        scalar => Err(ApiqlError::Render(format!(
            "{} value cannot take a selection",
            scalar.kind()
        ))),
    }
}

fn render_object(ctx: &Context, object: &ObjectRef, selection: &Selection) -> ApiqlResult<Rendered> {
    let Some(descriptor) = ctx.entities().descriptor_for(object.as_ref()) else {
        return Err(ApiqlError::Render(format!(
            "no entity registered for {}",
            object.type_name()
        )));
    };
    EntityRenderer::new(Arc::clone(object), descriptor, ctx)?.render(selection)
}

/// Load hinted relations on a value read from an attribute, if the value
/// supports it.
fn prefetch(value: Value, hints: &EagerLoad) -> Value {
    if hints.is_empty() {
        return value;
    }
    match &value {
        Value::Object(object) => match object.prefetch(hints) {
            Some(loaded) => {
                tracing::debug!("Prefetched {} for {}", hints, object.type_name());
                loaded
            }
            None => value,
        },
        _ => value,
    }
}

/// Shared field loop of entity-like renderers.
trait Fields {
    fn context(&self) -> &Context;

    /// Raw value behind a (possibly dotted) field.
    fn get_field(&self, call: &Call) -> ApiqlResult<Value>;

    fn render_attribute(&self, call: &Call) -> ApiqlResult<Rendered> {
        let hints = call
            .subselection()
            .map(Selection::eager_loads)
            .unwrap_or_default();
        let data = prefetch(self.get_field(call)?, &hints);
        render_value(self.context(), &data, call.subselection())
    }

    fn render_fields(&self, selection: &Selection) -> ApiqlResult<Rendered> {
        let mut respond = RenderedMap::new();
        for call in selection {
            let value = self
                .context()
                .contain(self.render_attribute(call), call.key())?;
            merge_entry(&mut respond, call.key().to_string(), value, MergePolicy::UNION);
        }
        Ok(Rendered::Object(respond))
    }
}

/// Renders one domain object through its descriptor.
///
/// Only the first segment of a field path is checked against the whitelist;
/// later segments are plain member reads on whatever the first one returned.
pub struct EntityRenderer<'a> {
    object: ObjectRef,
    descriptor: Arc<EntityDescriptor>,
    ctx: &'a Context,
}

impl<'a> EntityRenderer<'a> {
    /// Bind a renderer to `object`. Fails if reading it is not authorized.
    pub fn new(object: ObjectRef, descriptor: Arc<EntityDescriptor>, ctx: &'a Context) -> ApiqlResult<Self> {
        ctx.authorize(Action::Read, Subject::Object(object.as_ref()))?;
        Ok(Self {
            object,
            descriptor,
            ctx,
        })
    }

    pub fn object(&self) -> &dyn Object {
        self.object.as_ref()
    }

    pub fn object_as<T: Object>(&self) -> Option<&T> {
        self.object.downcast_ref::<T>()
    }

    pub fn context(&self) -> &'a Context {
        self.ctx
    }

    pub fn descriptor(&self) -> &EntityDescriptor {
        &self.descriptor
    }

    pub fn render(&self, selection: &Selection) -> ApiqlResult<Rendered> {
        self.render_fields(selection)
    }

    /// Read one whitelisted attribute.
    pub fn field(&self, name: &str, args: &[Value]) -> ApiqlResult<Value> {
        let unknown = || ApiqlError::unknown_attribute(self.object.type_name(), name);
        let attribute = self.descriptor.attribute(name).ok_or_else(unknown)?;
        match attribute.resolver() {
            Some(resolver) => resolver(self, args),
            None => self.object.field(name, args).ok_or_else(unknown),
        }
    }
}

impl Fields for EntityRenderer<'_> {
    fn context(&self) -> &Context {
        self.ctx
    }

    fn get_field(&self, call: &Call) -> ApiqlResult<Value> {
        let args = self.ctx.parse_params(call.args());
        let mut path = call.path();
        let head = path.next().unwrap_or_default();

        let mut value = self.field(head, &args)?;
        for segment in path {
            if value.is_null() {
                break;
            }
            value = value.member(segment, &args).unwrap_or_default();
        }
        Ok(value)
    }
}

/// Renders a plain mapping. Every key is reachable.
pub struct HashEntity<'a> {
    map: &'a IndexMap<String, Value>,
    ctx: &'a Context,
}

impl<'a> HashEntity<'a> {
    pub fn new(map: &'a IndexMap<String, Value>, ctx: &'a Context) -> Self {
        Self { map, ctx }
    }

    pub fn render(&self, selection: &Selection) -> ApiqlResult<Rendered> {
        self.render_fields(selection)
    }
}

impl Fields for HashEntity<'_> {
    fn context(&self) -> &Context {
        self.ctx
    }

    fn get_field(&self, call: &Call) -> ApiqlResult<Value> {
        let mut path = call.path();
        let head = path.next().unwrap_or_default();

        let mut value = self.map.get(head).cloned().unwrap_or_default();
        for segment in path {
            if value.is_null() {
                break;
            }
            value = value.member(segment, &[]).unwrap_or_default();
        }
        Ok(value)
    }
}
