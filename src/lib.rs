//! # APIQL: client-driven field selection
//!
//! Clients describe the exact shape of the data they want with a compact
//! bracketed schema. The server compiles it once, remembers it under a
//! fingerprint, and resolves it against bound operations and whitelisted
//! entities.
//!
//! ## Quick Example
//!
//! ```rust
//! use apiql::prelude::*;
//!
//! let mut api = Api::new();
//! api.operation("name", |_inv| Ok("Ada".into()));
//!
//! let selection = apiql::compile("name\n").unwrap();
//! let ctx = Context::builder().build();
//! let result = api.execute(&selection, &ctx).unwrap();
//! assert_eq!(result["name"], "Ada");
//! ```
//!
//! ## Schema syntax
//!
//! | Form                 | Meaning                                   |
//! |----------------------|-------------------------------------------|
//! | `name`               | Call an operation / read an attribute     |
//! | `alias: name`        | Render the result under `alias`           |
//! | `name(a, 10, 'x')`   | Positional params: named, number, literal |
//! | `name { ... }`       | Nested selection on the result            |
//! | `a.b.c`              | Dotted path through the result            |

pub mod ast;
pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod context;
pub mod crud;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod merge;
pub mod parser;
pub mod registry;
pub mod render;
pub mod service;
pub mod value;

pub mod prelude {
    pub use crate::ast::{Call, EagerLoad, Param, Selection};
    pub use crate::auth::{Action, AllowAll, Authorizer, Decision, PolicyAuthorizer, Subject};
    pub use crate::cache::{CacheConfig, DurableStore, MemoryStore, PersistedQueryCache};
    pub use crate::client::{Client, ServiceTransport, Transport};
    pub use crate::config::ApiqlConfig;
    pub use crate::context::{Context, DataAccess, Mode};
    pub use crate::crud::{Model, Repository};
    pub use crate::engine::{Api, Invocation};
    pub use crate::error::{ApiqlError, ApiqlResult, ErrorKind};
    pub use crate::fingerprint::fingerprint;
    pub use crate::registry::{EntityDescriptor, EntityRegistry, Params};
    pub use crate::render::EntityRenderer;
    pub use crate::service::{ApiqlRequest, ApiqlResponse, Service};
    pub use crate::value::{Object, Rendered, RenderedMap, Value};
}

/// Compile schema text into a selection tree.
///
/// # Example
///
/// ```
/// let tree = apiql::compile("author: user { id name }").unwrap();
/// let user = tree.get("author").unwrap();
/// assert_eq!(user.name, "user");
/// assert_eq!(user.subselection().unwrap().len(), 2);
/// ```
pub fn compile(text: &str) -> error::ApiqlResult<ast::Selection> {
    parser::compile(text)
}
