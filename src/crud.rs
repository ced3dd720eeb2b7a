//! Model operations.
//!
//! [`Api::model`] binds the five standard operations of a model backed by a
//! [`Repository`]:
//!
//! | Operation                    | Authorizes                 |
//! |------------------------------|----------------------------|
//! | `<plural>(page, page_size)`  | `read` on the type         |
//! | `<singular>(id)`             | `read` on the item         |
//! | `<singular>.create(params)`  | `create` on the type       |
//! | `<singular>.update(id, params)` | `update` on the item    |
//! | `<singular>.destroy(id)`     | `destroy` on the item      |

use std::sync::Arc;

use crate::ast::EagerLoad;
use crate::auth::{Action, Subject};
use crate::config::ApiqlConfig;
use crate::engine::{Api, Invocation};
use crate::error::{ApiqlError, ApiqlResult};
use crate::registry::{EntityDescriptor, Params, ParamsHook};
use crate::value::Value;

/// Storage behind a model.
pub trait Repository: Send + Sync {
    fn count(&self) -> ApiqlResult<u64>;

    /// All records, or the `(offset, limit)` window when given.
    fn list(&self, range: Option<(u64, u64)>, hints: &EagerLoad) -> ApiqlResult<Vec<Value>>;

    fn find(&self, id: &Value, hints: &EagerLoad) -> ApiqlResult<Option<Value>>;

    fn create(&self, params: Params) -> ApiqlResult<Value>;

    fn update(&self, id: &Value, params: Params) -> ApiqlResult<Value>;

    fn destroy(&self, id: &Value) -> ApiqlResult<Value>;
}

/// A model to expose through [`Api::model`].
#[derive(Clone)]
pub struct Model {
    type_name: &'static str,
    singular: String,
    plural: String,
    page_size: u64,
    repository: Arc<dyn Repository>,
    create_hook: Option<ParamsHook>,
    update_hook: Option<ParamsHook>,
}

impl Model {
    pub fn new(
        type_name: &'static str,
        singular: impl Into<String>,
        plural: impl Into<String>,
        repository: impl Repository + 'static,
    ) -> Self {
        Self {
            type_name,
            singular: singular.into(),
            plural: plural.into(),
            page_size: 10,
            repository: Arc::new(repository),
            create_hook: None,
            update_hook: None,
        }
    }

    /// Take the parameter hooks declared on the entity.
    pub fn hooks_from(mut self, descriptor: &EntityDescriptor) -> Self {
        self.create_hook = descriptor.create_hook();
        self.update_hook = descriptor.update_hook();
        self
    }

    /// Apply configured defaults (the listing page size).
    pub fn configured(self, config: &ApiqlConfig) -> Self {
        self.page_size(config.default_page_size)
    }

    /// Page size used when a listing call omits it.
    pub fn page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn find(&self, inv: &Invocation<'_>, hints: &EagerLoad) -> ApiqlResult<Value> {
        let id = inv.arg(0);
        self.repository.find(id, hints)?.ok_or_else(|| {
            ApiqlError::Operation(format!("{} {} not found", self.type_name, display_id(id)))
        })
    }

    fn list(&self, inv: &Invocation<'_>) -> ApiqlResult<Value> {
        inv.authorize(Action::Read, Subject::Type(self.type_name))?;

        let page = inv.arg(0);
        if page.is_null() {
            return Ok(self.repository.list(None, inv.eager_load())?.into());
        }

        let page = non_negative(page, "page")?;
        let page_size = match inv.arg(1) {
            Value::Null => self.page_size,
            size => non_negative(size, "page_size")?,
        };
        let offset = page
            .checked_mul(page_size)
            .ok_or_else(|| ApiqlError::Operation(format!("page {} is out of range", page)))?;
        let items = self
            .repository
            .list(Some((offset, page_size)), &items_hints(inv.eager_load()))?;

        Ok([
            ("total", Value::from(self.repository.count()?)),
            ("items", Value::from(items)),
        ]
        .into_iter()
        .collect())
    }

    fn show(&self, inv: &Invocation<'_>) -> ApiqlResult<Value> {
        let item = self.find(inv, inv.eager_load())?;
        inv.authorize(Action::Read, subject(&item, self.type_name))?;
        Ok(item)
    }

    fn create(&self, inv: &Invocation<'_>) -> ApiqlResult<Value> {
        inv.authorize(Action::Create, Subject::Type(self.type_name))?;
        let params = apply(self.create_hook.as_ref(), params_arg(inv.arg(0))?)?;
        self.repository.create(params)
    }

    fn update(&self, inv: &Invocation<'_>) -> ApiqlResult<Value> {
        let item = self.find(inv, &EagerLoad::default())?;
        inv.authorize(Action::Update, subject(&item, self.type_name))?;
        let params = apply(self.update_hook.as_ref(), params_arg(inv.arg(1))?)?;
        self.repository.update(inv.arg(0), params)
    }

    fn destroy(&self, inv: &Invocation<'_>) -> ApiqlResult<Value> {
        let item = self.find(inv, &EagerLoad::default())?;
        inv.authorize(Action::Destroy, subject(&item, self.type_name))?;
        self.repository.destroy(inv.arg(0))
    }
}

impl Api {
    /// Bind the standard operations of `model`.
    pub fn model(&mut self, model: Model) -> &mut Self {
        let model = Arc::new(model);
        tracing::debug!(
            "Binding model {} as {} / {}",
            model.type_name,
            model.plural,
            model.singular
        );

        let m = Arc::clone(&model);
        self.operation(model.plural.clone(), move |inv| m.list(inv));
        let m = Arc::clone(&model);
        self.operation(model.singular.clone(), move |inv| m.show(inv));
        let m = Arc::clone(&model);
        self.operation(format!("{}.create", model.singular), move |inv| m.create(inv));
        let m = Arc::clone(&model);
        self.operation(format!("{}.update", model.singular), move |inv| m.update(inv));
        let m = Arc::clone(&model);
        self.operation(format!("{}.destroy", model.singular), move |inv| m.destroy(inv))
    }
}

/// A paged listing is rendered as `{ total, items { ... } }`; the hints that
/// matter for the records are the ones under `items`.
fn items_hints(hints: &EagerLoad) -> EagerLoad {
    hints.get("items").cloned().unwrap_or_default()
}

fn subject<'a>(item: &'a Value, type_name: &'a str) -> Subject<'a> {
    match item {
        Value::Object(object) => Subject::Object(object.as_ref()),
        _ => Subject::Type(type_name),
    }
}

fn apply(hook: Option<&ParamsHook>, params: Params) -> ApiqlResult<Params> {
    match hook {
        Some(hook) => hook(params),
        None => Ok(params),
    }
}

fn params_arg(value: &Value) -> ApiqlResult<Params> {
    match value {
        Value::Map(map) => Ok(map.clone()),
        other => Err(ApiqlError::Operation(format!(
            "expected a map of params, got {}",
            other.kind()
        ))),
    }
}

fn non_negative(value: &Value, name: &str) -> ApiqlResult<u64> {
    value
        .as_i64()
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| ApiqlError::Operation(format!("{} must be a non-negative integer", name)))
}

fn display_id(id: &Value) -> String {
    match (id.as_i64(), id) {
        (Some(n), _) => n.to_string(),
        (None, Value::String(s)) => s.clone(),
        (None, other) => other.to_json().to_string(),
    }
}
