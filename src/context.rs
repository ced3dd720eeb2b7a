//! Request-scoped binding context.
//!
//! A [`Context`] lives for one resolution. It carries the caller's bound
//! values (the current actor and the like), the request's named parameters,
//! the strict/lenient switch and the capabilities the engine consults.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::ast::{EagerLoad, Param};
use crate::auth::{Action, AllowAll, Authorizer, Decision, Subject};
use crate::error::{ApiqlError, ApiqlResult};
use crate::registry::EntityRegistry;
use crate::value::{Rendered, Value};

/// How resolution failures surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Unknown fields, denials and unrenderable values raise.
    Strict,
    /// The same failures render as `null`.
    #[default]
    Lenient,
}

/// Data-access capability used to reload a record with relations attached.
pub trait DataAccess: Send + Sync {
    fn find_by_id(&self, type_name: &str, id: &Value, hints: &EagerLoad) -> ApiqlResult<Option<Value>>;
}

pub struct Context {
    bindings: IndexMap<String, Value>,
    params: IndexMap<String, Value>,
    mode: Mode,
    authorizer: Arc<dyn Authorizer>,
    data_access: Option<Arc<dyn DataAccess>>,
    entities: Arc<EntityRegistry>,
    deadline: Option<Instant>,
}

impl Context {
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// A bound value, e.g. `current_user`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    /// A named request parameter.
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_strict(&self) -> bool {
        self.mode == Mode::Strict
    }

    pub fn entities(&self) -> &EntityRegistry {
        &self.entities
    }

    pub fn data_access(&self) -> Option<&dyn DataAccess> {
        self.data_access.as_deref()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Ask the authorizer; a denial becomes [`ApiqlError::Unauthorized`].
    pub fn authorize(&self, action: Action, subject: Subject<'_>) -> ApiqlResult<()> {
        match self.authorizer.check(action, subject) {
            Decision::Allowed => Ok(()),
            Decision::Denied => Err(ApiqlError::Unauthorized {
                action,
                subject: subject.to_string(),
            }),
        }
    }

    /// Resolve call parameters to positional values.
    ///
    /// Named references read the request parameters (`null` when absent);
    /// literals are used as written.
    pub fn parse_params(&self, params: &[Param]) -> Vec<Value> {
        params
            .iter()
            .map(|param| match param {
                Param::Named(name) => self.params.get(name).cloned().unwrap_or_default(),
                Param::Number(n) => Value::Float(*n),
                Param::Literal(s) => Value::String(s.clone()),
            })
            .collect()
    }

    pub fn check_deadline(&self) -> ApiqlResult<()> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(ApiqlError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Keep a subtree failure inside its subtree.
    ///
    /// In lenient mode contained errors render as `null`; in strict mode, and
    /// for errors that are never contained, the error propagates.
    pub fn contain(&self, result: ApiqlResult<Rendered>, key: &str) -> ApiqlResult<Rendered> {
        match result {
            Err(e) if e.is_contained() && !self.is_strict() => {
                tracing::warn!(key, error = %e, "Rendering null for failed field");
                Ok(Rendered::Null)
            }
            other => other,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("bindings", &self.bindings.keys().collect::<Vec<_>>())
            .field("params", &self.params.keys().collect::<Vec<_>>())
            .field("mode", &self.mode)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Context`].
pub struct ContextBuilder {
    bindings: IndexMap<String, Value>,
    params: IndexMap<String, Value>,
    mode: Mode,
    authorizer: Arc<dyn Authorizer>,
    data_access: Option<Arc<dyn DataAccess>>,
    entities: Arc<EntityRegistry>,
    deadline: Option<Instant>,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self {
            bindings: IndexMap::new(),
            params: IndexMap::new(),
            mode: Mode::default(),
            authorizer: Arc::new(AllowAll),
            data_access: None,
            entities: Arc::new(EntityRegistry::new()),
            deadline: None,
        }
    }
}

impl ContextBuilder {
    /// Expose a request-scoped value to every call and entity.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bindings.insert(name.into(), value.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn params<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn authorizer(mut self, authorizer: impl Authorizer + 'static) -> Self {
        self.authorizer = Arc::new(authorizer);
        self
    }

    pub fn shared_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn data_access(mut self, data_access: impl DataAccess + 'static) -> Self {
        self.data_access = Some(Arc::new(data_access));
        self
    }

    pub fn entities(mut self, entities: Arc<EntityRegistry>) -> Self {
        self.entities = entities;
        self
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn timeout(self, timeout: Duration) -> Self {
        self.deadline(Instant::now() + timeout)
    }

    pub fn deadline_at(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn build(self) -> Context {
        Context {
            bindings: self.bindings,
            params: self.params,
            mode: self.mode,
            authorizer: self.authorizer,
            data_access: self.data_access,
            entities: self.entities,
            deadline: self.deadline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::from_fn;

    #[test]
    fn test_parse_params() {
        let ctx = Context::builder().param("page", 2).param("q", "ada").build();
        let params = vec![
            Param::Named("page".into()),
            Param::Named("missing".into()),
            Param::Number(10.0),
            Param::Literal("'x'".into()),
        ];
        assert_eq!(
            ctx.parse_params(&params),
            vec![Value::Int(2), Value::Null, Value::Float(10.0), Value::from("'x'")]
        );
    }

    #[test]
    fn test_authorize() {
        let ctx = Context::builder()
            .authorizer(from_fn(|action, _subject| (action == Action::Read).into()))
            .build();
        assert!(ctx.authorize(Action::Read, Subject::Type("User")).is_ok());
        let err = ctx.authorize(Action::Destroy, Subject::Type("User")).unwrap_err();
        assert_eq!(err.to_string(), "Not authorized to destroy User");
    }

    #[test]
    fn test_contain_by_mode() {
        let lenient = Context::builder().build();
        let strict = Context::builder().mode(Mode::Strict).build();

        let failed = || Err(ApiqlError::Render("no renderer".into()));
        assert_eq!(lenient.contain(failed(), "k").unwrap(), Rendered::Null);
        assert!(strict.contain(failed(), "k").is_err());

        // never contained
        assert!(lenient.contain(Err(ApiqlError::DeadlineExceeded), "k").is_err());
    }

    #[test]
    fn test_deadline() {
        let ctx = Context::builder().deadline(Instant::now()).build();
        assert!(matches!(ctx.check_deadline(), Err(ApiqlError::DeadlineExceeded)));
        let ctx = Context::builder().timeout(Duration::from_secs(60)).build();
        assert!(ctx.check_deadline().is_ok());
    }

    #[test]
    fn test_bindings() {
        let ctx = Context::builder().bind("current_user", "ada").build();
        assert_eq!(ctx.get("current_user"), Some(&Value::from("ada")));
        assert!(ctx.get("other").is_none());
    }
}
