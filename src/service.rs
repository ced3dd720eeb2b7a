//! Persisted-query request handling.
//!
//! A request carries the schema fingerprint (`apiql`), the raw schema text
//! (`apiql_request`) when priming the cache, and any number of named
//! parameters as sibling fields:
//!
//! ```json
//! { "apiql": "1962129859", "apiql_request": "users(page) { id }", "page": 2 }
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;

use crate::ast::Selection;
use crate::cache::{CacheConfig, PersistedQueryCache};
use crate::config::ApiqlConfig;
use crate::context::{Context, ContextBuilder};
use crate::engine::Api;
use crate::error::{ApiqlError, ApiqlResult, ErrorKind};
use crate::fingerprint::fingerprint;
use crate::registry::EntityRegistry;
use crate::value::{Rendered, RenderedMap, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiqlRequest {
    #[serde(rename = "apiql", deserialize_with = "fingerprint_token")]
    pub fingerprint: String,

    #[serde(rename = "apiql_request", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(flatten)]
    pub params: IndexMap<String, Rendered>,
}

/// Browser clients send the hash as a JSON number.
fn fingerprint_token<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Token {
        Text(String),
        Number(i64),
    }

    Ok(match Token::deserialize(deserializer)? {
        Token::Text(s) => s,
        Token::Number(n) => n.to_string(),
    })
}

impl ApiqlRequest {
    /// Request for `schema` by fingerprint only.
    pub fn new(schema: &str) -> Self {
        Self {
            fingerprint: fingerprint(schema),
            ..Self::default()
        }
    }

    /// Attach the raw schema so the server can (re)populate its cache.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Rendered>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

/// Transport-neutral response: an HTTP-like status and a JSON body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiqlResponse {
    pub status: u16,
    pub body: Rendered,
}

impl ApiqlResponse {
    pub fn ok(result: RenderedMap) -> Self {
        Self {
            status: 200,
            body: Rendered::Object(result),
        }
    }

    pub fn error(error: &ApiqlError) -> Self {
        let kind = error.kind();
        Self {
            status: kind.status_code(),
            body: serde_json::json!({
                "errors": [error.to_string()],
                "code": kind.code(),
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn an error response back into an error of the same kind.
    pub fn into_result(self) -> ApiqlResult<RenderedMap> {
        if self.is_success() {
            return match self.body {
                Rendered::Object(map) => Ok(map),
                other => Err(ApiqlError::Remote {
                    kind: ErrorKind::Internal,
                    message: format!("expected an object body, got {}", other),
                }),
            };
        }

        let kind = self
            .body
            .get("code")
            .and_then(Rendered::as_str)
            .map(ErrorKind::from_code)
            .unwrap_or(ErrorKind::Internal);
        let message = self
            .body
            .get("errors")
            .and_then(Rendered::as_array)
            .and_then(|errors| errors.first())
            .and_then(Rendered::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("status {}", self.status));
        Err(ApiqlError::Remote { kind, message })
    }
}

/// Request handler: cache lookup, then resolution against the root binding.
pub struct Service {
    api: Arc<Api>,
    cache: Arc<PersistedQueryCache>,
    entities: Arc<EntityRegistry>,
    config: ApiqlConfig,
}

impl Service {
    pub fn new(api: Api, entities: EntityRegistry, config: ApiqlConfig) -> Self {
        let cache = PersistedQueryCache::new(CacheConfig::from(&config));
        Self {
            api: Arc::new(api),
            cache: Arc::new(cache),
            entities: Arc::new(entities),
            config,
        }
    }

    /// Share a cache (for instance one with a durable tier) with this service.
    pub fn with_cache(mut self, cache: Arc<PersistedQueryCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn api(&self) -> &Api {
        &self.api
    }

    pub fn cache(&self) -> &PersistedQueryCache {
        &self.cache
    }

    pub fn config(&self) -> &ApiqlConfig {
        &self.config
    }

    /// Context builder seeded with this service's entities and mode.
    pub fn context(&self) -> ContextBuilder {
        Context::builder()
            .entities(Arc::clone(&self.entities))
            .mode(self.config.mode())
    }

    /// Resolve one request.
    ///
    /// The request's named parameters are added to `builder`. When the
    /// builder carries a deadline, cache I/O is abandoned once it passes.
    pub async fn handle(&self, request: &ApiqlRequest, builder: ContextBuilder) -> ApiqlResult<RenderedMap> {
        let selection = match builder.deadline_at() {
            Some(deadline) => {
                let deadline = tokio::time::Instant::from_std(deadline);
                tokio::time::timeout_at(deadline, self.lookup(request))
                    .await
                    .map_err(|_| ApiqlError::DeadlineExceeded)??
            }
            None => self.lookup(request).await?,
        };

        let ctx = builder
            .params(
                request
                    .params
                    .iter()
                    .map(|(name, value)| (name.clone(), Value::from(value.clone()))),
            )
            .build();
        self.api.execute(&selection, &ctx)
    }

    /// [`Service::handle`], with errors folded into an error response.
    pub async fn respond(&self, request: &ApiqlRequest, builder: ContextBuilder) -> ApiqlResponse {
        match self.handle(request, builder).await {
            Ok(result) => ApiqlResponse::ok(result),
            Err(e) => {
                tracing::debug!(fingerprint = %request.fingerprint, error = %e, "request failed");
                ApiqlResponse::error(&e)
            }
        }
    }

    async fn lookup(&self, request: &ApiqlRequest) -> ApiqlResult<Arc<Selection>> {
        let Some(raw) = &request.schema else {
            return self.cache.resolve(&request.fingerprint).await;
        };

        let computed = fingerprint(raw);
        if computed != request.fingerprint {
            tracing::warn!(
                fingerprint = %request.fingerprint,
                computed = %computed,
                "schema doesn't match provided fingerprint"
            );
        }
        self.cache.store(&request.fingerprint, raw).await
    }
}
