//! Resolution engine.
//!
//! An [`Api`] is the root binding: a table of named operations. Executing a
//! selection invokes each top-level call, forwards eager-load hints for its
//! nested selection, and renders the result under the call's alias.

use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

use crate::ast::{Call, EagerLoad, Selection};
use crate::auth::{Action, Subject};
use crate::context::Context;
use crate::error::{ApiqlError, ApiqlResult};
use crate::merge::{merge_entry, MergePolicy};
use crate::render::{render_value, EntityRenderer};
use crate::value::{Rendered, RenderedMap, Value};

/// A bound operation.
pub type Operation = Arc<dyn Fn(&Invocation<'_>) -> ApiqlResult<Value> + Send + Sync>;

/// Everything an operation sees when it runs.
pub struct Invocation<'a> {
    name: &'a str,
    args: Vec<Value>,
    eager_load: &'a EagerLoad,
    ctx: &'a Context,
}

impl<'a> Invocation<'a> {
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Positional argument, `null` when not supplied.
    pub fn arg(&self, index: usize) -> &Value {
        const NULL: &Value = &Value::Null;
        self.args.get(index).unwrap_or(NULL)
    }

    /// Relations the caller is about to read from the result.
    pub fn eager_load(&self) -> &EagerLoad {
        self.eager_load
    }

    pub fn context(&self) -> &'a Context {
        self.ctx
    }

    pub fn authorize(&self, action: Action, subject: Subject<'_>) -> ApiqlResult<()> {
        self.ctx.authorize(action, subject)
    }
}

/// Root binding: the operations a selection may call.
#[derive(Clone, Default)]
pub struct Api {
    operations: IndexMap<String, Operation>,
}

impl Api {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an operation under `name`, replacing any earlier binding.
    pub fn operation<F>(&mut self, name: impl Into<String>, operation: F) -> &mut Self
    where
        F: Fn(&Invocation<'_>) -> ApiqlResult<Value> + Send + Sync + 'static,
    {
        self.operations.insert(name.into(), Arc::new(operation));
        self
    }

    /// Expose every operation of `other` as `namespace.name`.
    pub fn mount(&mut self, namespace: &str, other: Api) -> &mut Self {
        for (name, operation) in other.operations {
            let name = if namespace.is_empty() {
                name
            } else {
                format!("{}.{}", namespace, name)
            };
            self.operations.insert(name, operation);
        }
        self
    }

    pub fn has_operation(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    pub fn operation_names(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(String::as_str)
    }

    /// Execute a selection against this binding.
    ///
    /// Calls run in order. A contained failure renders its call as `null`
    /// in lenient mode; any other failure aborts the whole resolution. An
    /// operation that refuses the caller outright fails the request in
    /// every mode, while denials met while rendering its result stay
    /// contained.
    pub fn execute(&self, selection: &Selection, ctx: &Context) -> ApiqlResult<RenderedMap> {
        let mut result = RenderedMap::new();
        for call in selection {
            ctx.check_deadline()?;
            let rendered = match self.resolve_call(call, ctx) {
                Ok(rendered) => rendered,
                Err(Failure::Refused(e)) => {
                    tracing::debug!(call = %call, error = %e, "Operation refused the caller");
                    return Err(e);
                }
                Err(Failure::Failed(e)) => ctx.contain(Err(e), call.key())?,
            };
            merge_entry(&mut result, call.key().to_string(), rendered, MergePolicy::REPLACE_ARRAYS);
        }
        Ok(result)
    }

    fn resolve_call(&self, call: &Call, ctx: &Context) -> Result<Rendered, Failure> {
        tracing::trace!(call = %call, "Resolving call");

        let hints = call
            .subselection()
            .map(Selection::eager_loads)
            .unwrap_or_default();
        let args = ctx.parse_params(call.args());
        let data = self.invoke(&call.name, args, &hints, ctx)?;

        match call.subselection() {
            None => Ok(data.to_leaf()),
            Some(selection) => {
                let data = eager_load(data, &hints, ctx)?;
                Ok(render_value(ctx, &data, Some(selection))?)
            }
        }
    }

    fn invoke(&self, name: &str, args: Vec<Value>, hints: &EagerLoad, ctx: &Context) -> Result<Value, Failure> {
        if let Some(operation) = self.operations.get(name) {
            return operation(&Invocation {
                name,
                args,
                eager_load: hints,
                ctx,
            })
            .map_err(Failure::from_operation);
        }

        // `head.rest`: longest bound prefix, then walk the remaining segments
        // through the entity chain.
        let segments: Vec<&str> = name.split('.').collect();
        for split in (1..segments.len()).rev() {
            let head = segments[..split].join(".");
            let Some(operation) = self.operations.get(&head) else {
                continue;
            };
            let no_hints = EagerLoad::default();
            let mut value = operation(&Invocation {
                name: &head,
                args,
                eager_load: &no_hints,
                ctx,
            })
            .map_err(Failure::from_operation)?;
            for segment in &segments[split..] {
                if value.is_null() {
                    break;
                }
                value = member_of(&value, segment, ctx).map_err(|e| match e {
                    ApiqlError::UnknownAttribute { .. } => ApiqlError::UnknownOperation(name.to_string()),
                    other => other,
                })?;
            }
            return Ok(value);
        }

        Err(ApiqlError::UnknownOperation(name.to_string()).into())
    }
}

/// How a top-level call went wrong.
enum Failure {
    /// The operation itself denied the caller.
    Refused(ApiqlError),
    Failed(ApiqlError),
}

impl Failure {
    fn from_operation(error: ApiqlError) -> Self {
        match error {
            ApiqlError::Unauthorized { .. } => Failure::Refused(error),
            other => Failure::Failed(other),
        }
    }
}

impl From<ApiqlError> for Failure {
    fn from(error: ApiqlError) -> Self {
        Failure::Failed(error)
    }
}

/// One step along a dotted operation path.
fn member_of(value: &Value, segment: &str, ctx: &Context) -> ApiqlResult<Value> {
    match value {
        Value::Map(map) => Ok(map.get(segment).cloned().unwrap_or_default()),
        Value::Object(object) => {
            let descriptor = ctx.entities().descriptor_for(object.as_ref()).ok_or_else(|| {
                ApiqlError::Render(format!("no entity registered for {}", object.type_name()))
            })?;
            EntityRenderer::new(Arc::clone(object), descriptor, ctx)?.field(segment, &[])
        }
        other => Err(ApiqlError::Render(format!(
            "{} value has no member '{}'",
            other.kind(),
            segment
        ))),
    }
}

/// Hand eager-load hints to the data layer for a single-record result.
///
/// The object reloads itself when it can; otherwise a record with an id is
/// fetched again through the data-access capability.
fn eager_load(data: Value, hints: &EagerLoad, ctx: &Context) -> ApiqlResult<Value> {
    if hints.is_empty() {
        return Ok(data);
    }
    let Value::Object(object) = &data else {
        return Ok(data);
    };

    if let Some(loaded) = object.prefetch(hints) {
        tracing::debug!("Prefetched {} for {}", hints, object.type_name());
        return Ok(loaded);
    }
    if let (Some(id), Some(access)) = (object.id(), ctx.data_access()) {
        tracing::debug!("Reloading {} with {}", object.type_name(), hints);
        if let Some(reloaded) = access.find_by_id(object.type_name(), &id, hints)? {
            return Ok(reloaded);
        }
    }
    Ok(data)
}

impl fmt::Debug for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Api")
            .field("operations", &self.operations.keys().collect::<Vec<_>>())
            .finish()
    }
}
