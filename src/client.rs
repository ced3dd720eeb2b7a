//! Reference client.
//!
//! Sends the fingerprint alone first. When the server answers with a cache
//! miss, the same request is sent again with the raw schema attached so the
//! server can compile and remember it.

use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::Arc;

use crate::context::ContextBuilder;
use crate::error::{ApiqlError, ApiqlResult, ErrorKind};
use crate::service::{ApiqlRequest, ApiqlResponse, Service};
use crate::value::{Rendered, RenderedMap};

/// Carries one request to a server and brings back its response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, request: &ApiqlRequest) -> ApiqlResult<ApiqlResponse>;
}

type ErrorCallback = Arc<dyn Fn(&ApiqlError) + Send + Sync>;

pub struct Client<T> {
    transport: T,
    on_error: Option<ErrorCallback>,
}

impl<T: Transport> Client<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            on_error: None,
        }
    }

    /// Called with the error when the server rejects a call as unauthorized,
    /// before the error is returned.
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ApiqlError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn call(&self, schema: &str, params: IndexMap<String, Rendered>) -> ApiqlResult<RenderedMap> {
        let mut request = ApiqlRequest::new(schema);
        request.params = params;

        let result = match self.transport.post(&request).await?.into_result() {
            Err(e) if e.kind() == ErrorKind::CacheMiss => {
                tracing::trace!(fingerprint = %request.fingerprint, "priming server cache");
                let request = request.with_schema(schema);
                self.transport.post(&request).await?.into_result()
            }
            other => other,
        };

        if let Err(e) = &result {
            if e.kind() == ErrorKind::Unauthorized {
                if let Some(callback) = &self.on_error {
                    callback(e);
                }
            }
        }
        result
    }
}

/// Transport that hands requests straight to an in-process [`Service`].
pub struct ServiceTransport {
    service: Arc<Service>,
    context: Arc<dyn Fn(&Service) -> ContextBuilder + Send + Sync>,
}

impl ServiceTransport {
    pub fn new(service: Arc<Service>) -> Self {
        Self {
            service,
            context: Arc::new(Service::context),
        }
    }

    /// Build each request's context with `context` instead of the service
    /// defaults.
    pub fn with_context<F>(mut self, context: F) -> Self
    where
        F: Fn(&Service) -> ContextBuilder + Send + Sync + 'static,
    {
        self.context = Arc::new(context);
        self
    }

    pub fn service(&self) -> &Service {
        &self.service
    }
}

#[async_trait]
impl Transport for ServiceTransport {
    async fn post(&self, request: &ApiqlRequest) -> ApiqlResult<ApiqlResponse> {
        let builder = (self.context)(&self.service);
        Ok(self.service.respond(request, builder).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Action, Decision, from_fn};
    use crate::config::ApiqlConfig;
    use crate::engine::Api;
    use crate::registry::EntityRegistry;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records every request before handing it on.
    struct Recording {
        inner: ServiceTransport,
        sent: Mutex<Vec<ApiqlRequest>>,
    }

    #[async_trait]
    impl Transport for Recording {
        async fn post(&self, request: &ApiqlRequest) -> ApiqlResult<ApiqlResponse> {
            self.sent.lock().unwrap().push(request.clone());
            self.inner.post(request).await
        }
    }

    fn service() -> Arc<Service> {
        let mut api = Api::new();
        api.operation("ping", |_inv| Ok("pong".into()))
            .operation("secret", |inv| {
                inv.authorize(Action::Read, crate::auth::Subject::Type("Secret"))?;
                Ok(42.into())
            });
        Arc::new(Service::new(
            api,
            EntityRegistry::new(),
            ApiqlConfig::builder().strict(true).build(),
        ))
    }

    #[tokio::test]
    async fn test_primes_once_then_uses_fingerprint() {
        let client = Client::new(Recording {
            inner: ServiceTransport::new(service()),
            sent: Mutex::new(Vec::new()),
        });

        let out = client.call("ping", IndexMap::new()).await.unwrap();
        assert_eq!(Rendered::Object(out), json!({"ping": "pong"}));
        client.call("ping", IndexMap::new()).await.unwrap();

        let sent = client.transport().sent.lock().unwrap();
        let primed: Vec<bool> = sent.iter().map(|r| r.schema.is_some()).collect();
        assert_eq!(primed, vec![false, true, false]);
    }

    #[tokio::test]
    async fn test_unauthorized_invokes_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let transport = ServiceTransport::new(service()).with_context(|service| {
            service
                .context()
                .authorizer(from_fn(|_action, _subject| Decision::Denied))
        });
        let client = Client::new(transport).on_error(move |e| {
            assert_eq!(e.kind(), ErrorKind::Unauthorized);
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let err = client.call("secret", IndexMap::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // other failures leave the callback alone
        assert!(client.call("nope", IndexMap::new()).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
