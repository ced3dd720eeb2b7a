//! Selection tree data model.
//!
//! A [`Selection`] is an ordered list of [`Call`]s. A call names an operation
//! (or attribute), optionally renames it with an alias, passes positional
//! parameters and carries a nested selection when its result is rendered
//! field by field.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A positional parameter as written in the schema text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Param {
    /// Bare identifier, looked up in the request's named parameters.
    Named(String),
    Number(f64),
    Literal(String),
}

impl Param {
    /// Classify a raw parameter token.
    pub fn from_token(token: &str) -> Self {
        let token = token.trim();
        if is_identifier(token) {
            return Param::Named(token.to_string());
        }
        match token.parse::<f64>() {
            Ok(n) if n.is_finite() => Param::Number(n),
            _ => Param::Literal(token.to_string()),
        }
    }
}

/// `^[A-Za-z_]\w*$`
fn is_identifier(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Named(name) => write!(f, "{}", name),
            Param::Number(n) => write!(f, "{}", n),
            Param::Literal(s) => write!(f, "{}", s),
        }
    }
}

/// One requested operation or attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// `None` when written without parentheses, `Some(vec![])` for `name()`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<Param>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<Selection>,
}

impl Call {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            params: None,
            selection: None,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        self.alias = (alias != self.name).then_some(alias);
        self
    }

    pub fn params(mut self, params: impl IntoIterator<Item = Param>) -> Self {
        self.params = Some(params.into_iter().collect());
        self
    }

    pub fn select(mut self, selection: impl Into<Selection>) -> Self {
        self.selection = Some(selection.into());
        self
    }

    /// Output key: the alias, defaulting to the name.
    pub fn key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn args(&self) -> &[Param] {
        self.params.as_deref().unwrap_or(&[])
    }

    pub fn subselection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn is_parameterized(&self) -> bool {
        self.params.is_some()
    }

    pub fn is_dotted(&self) -> bool {
        self.name.contains('.')
    }

    /// Path segments of a dotted name.
    pub fn path(&self) -> std::str::Split<'_, char> {
        self.name.split('.')
    }

    /// Two calls with the same signature are the same request and merge.
    fn same_signature(&self, other: &Call) -> bool {
        self.key() == other.key() && self.name == other.name && self.params == other.params
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(alias) = &self.alias {
            write!(f, "{}: ", alias)?;
        }
        write!(f, "{}", self.name)?;
        if let Some(params) = &self.params {
            let params: Vec<String> = params.iter().map(|p| p.to_string()).collect();
            write!(f, "({})", params.join(", "))?;
        }
        Ok(())
    }
}

/// Ordered sequence of calls.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selection {
    calls: Vec<Call>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Call> {
        self.calls.iter()
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    /// First call rendered under `key`.
    pub fn get(&self, key: &str) -> Option<&Call> {
        self.calls.iter().find(|c| c.key() == key)
    }

    /// Insert a call, merging into an existing call with the same signature.
    ///
    /// A merged call keeps its nested selection and unions the incoming one
    /// into it; a flat duplicate never drops an existing selection.
    /// Returns the index of the call that now holds the request.
    pub fn insert(&mut self, call: Call) -> usize {
        match self.calls.iter().position(|c| c.same_signature(&call)) {
            Some(index) => {
                if let Some(incoming) = call.selection {
                    let existing = self.group_mut(index);
                    for nested in incoming.calls {
                        existing.insert(nested);
                    }
                }
                index
            }
            None => {
                self.calls.push(call);
                self.calls.len() - 1
            }
        }
    }

    /// Nested selection of the call at `index`, created empty if absent.
    pub(crate) fn group_mut(&mut self, index: usize) -> &mut Selection {
        self.calls[index]
            .selection
            .get_or_insert_with(Selection::default)
    }

    /// Eager-load hints for the data behind this selection.
    ///
    /// Only nested calls that carry their own selection are data-fetching;
    /// parameterized and dotted calls are left to their resolvers.
    pub fn eager_loads(&self) -> EagerLoad {
        let mut hints = EagerLoad::default();
        for call in &self.calls {
            let Some(nested) = &call.selection else {
                continue;
            };
            if call.is_parameterized() || call.is_dotted() {
                continue;
            }
            hints.add(&call.name, nested.eager_loads());
        }
        hints
    }
}

impl From<Vec<Call>> for Selection {
    fn from(calls: Vec<Call>) -> Self {
        calls.into_iter().collect()
    }
}

impl FromIterator<Call> for Selection {
    fn from_iter<T: IntoIterator<Item = Call>>(iter: T) -> Self {
        let mut selection = Selection::default();
        for call in iter {
            selection.insert(call);
        }
        selection
    }
}

impl<'a> IntoIterator for &'a Selection {
    type Item = &'a Call;
    type IntoIter = std::slice::Iter<'a, Call>;

    fn into_iter(self) -> Self::IntoIter {
        self.calls.iter()
    }
}

/// Nested set of relation names the resolver is about to read.
///
/// Forwarded untouched to the data-access layer so it can batch-fetch
/// related records before rendering.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct EagerLoad {
    entries: Vec<EagerEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EagerEntry {
    pub name: String,
    #[serde(skip_serializing_if = "EagerLoad::is_empty")]
    pub nested: EagerLoad,
}

impl EagerLoad {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[EagerEntry] {
        &self.entries
    }

    /// Top-level relation names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&EagerLoad> {
        self.entries.iter().find(|e| e.name == name).map(|e| &e.nested)
    }

    fn add(&mut self, name: &str, nested: EagerLoad) {
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => {
                for child in nested.entries {
                    entry.nested.add(&child.name, child.nested);
                }
            }
            None => self.entries.push(EagerEntry {
                name: name.to_string(),
                nested,
            }),
        }
    }
}

impl fmt::Display for EagerLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", entry.name)?;
            if !entry.nested.is_empty() {
                write!(f, "({})", entry.nested)?;
            }
        }
        Ok(())
    }
}
