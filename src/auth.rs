//! Authorization capability.
//!
//! The engine asks an [`Authorizer`] before exposing data: `read` on every
//! object an entity renderer is built for, and `read`/`create`/`update`/
//! `destroy` from the model operations. Deciding is the authorizer's job;
//! the engine only enforces the answer.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::value::{Object, Value};

/// Actions a subject can be checked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Create,
    Update,
    Destroy,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Read => "read",
            Action::Create => "create",
            Action::Update => "update",
            Action::Destroy => "destroy",
        };
        f.write_str(name)
    }
}

/// What an action is checked against.
#[derive(Debug, Clone, Copy)]
pub enum Subject<'a> {
    /// A whole type, e.g. before listing or creating records.
    Type(&'a str),
    Object(&'a dyn Object),
    Value(&'a Value),
}

impl Subject<'_> {
    pub fn type_name(&self) -> &str {
        match self {
            Subject::Type(name) => name,
            Subject::Object(object) => object.type_name(),
            Subject::Value(value) => value.kind(),
        }
    }
}

impl fmt::Display for Subject<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied,
}

impl From<bool> for Decision {
    fn from(allowed: bool) -> Self {
        if allowed { Decision::Allowed } else { Decision::Denied }
    }
}

pub trait Authorizer: Send + Sync {
    fn check(&self, action: Action, subject: Subject<'_>) -> Decision;
}

/// Grants everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn check(&self, _action: Action, _subject: Subject<'_>) -> Decision {
        Decision::Allowed
    }
}

/// Authorizer backed by a closure.
pub struct FnAuthorizer<F>(F);

/// Build an authorizer from a closure.
pub fn from_fn<F>(f: F) -> FnAuthorizer<F>
where
    F: Fn(Action, Subject<'_>) -> Decision + Send + Sync,
{
    FnAuthorizer(f)
}

impl<F> Authorizer for FnAuthorizer<F>
where
    F: Fn(Action, Subject<'_>) -> Decision + Send + Sync,
{
    fn check(&self, action: Action, subject: Subject<'_>) -> Decision {
        (self.0)(action, subject)
    }
}

/// Table of allowed actions per type tag.
///
/// `"*"` matches every type. Anything not granted is denied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyAuthorizer {
    rules: HashMap<String, HashSet<Action>>,
}

impl PolicyAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(mut self, type_name: impl Into<String>, actions: impl IntoIterator<Item = Action>) -> Self {
        self.rules
            .entry(type_name.into())
            .or_default()
            .extend(actions);
        self
    }

    fn grants(&self, type_name: &str, action: Action) -> bool {
        self.rules
            .get(type_name)
            .is_some_and(|actions| actions.contains(&action))
    }
}

impl Authorizer for PolicyAuthorizer {
    fn check(&self, action: Action, subject: Subject<'_>) -> Decision {
        let type_name = subject.type_name();
        let allowed = self.grants(type_name, action) || self.grants("*", action);
        if !allowed {
            tracing::debug!("No policy grants {} on {}", action, type_name);
        }
        allowed.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Invoice;

    impl Object for Invoice {
        fn type_name(&self) -> &'static str {
            "Invoice"
        }

        fn field(&self, _name: &str, _args: &[Value]) -> Option<Value> {
            None
        }
    }

    #[test]
    fn test_policy_is_deny_by_default() {
        let policy = PolicyAuthorizer::new().allow("Invoice", [Action::Read]);
        assert_eq!(policy.check(Action::Read, Subject::Object(&Invoice)), Decision::Allowed);
        assert_eq!(policy.check(Action::Destroy, Subject::Object(&Invoice)), Decision::Denied);
        assert_eq!(policy.check(Action::Read, Subject::Type("User")), Decision::Denied);
    }

    #[test]
    fn test_policy_wildcard() {
        let policy = PolicyAuthorizer::new().allow("*", [Action::Read]);
        assert_eq!(policy.check(Action::Read, Subject::Type("User")), Decision::Allowed);
        assert_eq!(policy.check(Action::Update, Subject::Type("User")), Decision::Denied);
    }

    #[test]
    fn test_fn_authorizer() {
        let authorizer = from_fn(|action, subject| {
            (action == Action::Read && subject.type_name() != "Invoice").into()
        });
        assert_eq!(authorizer.check(Action::Read, Subject::Type("User")), Decision::Allowed);
        assert_eq!(authorizer.check(Action::Read, Subject::Object(&Invoice)), Decision::Denied);
    }

    #[test]
    fn test_action_display() {
        assert_eq!(Action::Destroy.to_string(), "destroy");
        assert_eq!(Subject::Value(&Value::from(1)).to_string(), "int");
    }
}
