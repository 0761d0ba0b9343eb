//! RPC dispatcher — parses, validates and routes protocol envelopes.
//!
//! The dispatcher owns a handler table built once at startup and nothing
//! else; handlers close over cloned store handles. Every failure mode is
//! converted into a well-formed response envelope at this boundary —
//! nothing escapes to the session or the transport.
//!
//! Routing order for an inbound frame:
//! 1. parse (`-32700` on failure, always `id: null`),
//! 2. the `ping` fast path, answered before validation so it keeps
//!    working through partial outages,
//! 3. envelope validation (`-32600`, inbound `id` passed through),
//! 4. handler table lookup (`-32601`),
//! 5. per-method param validation (`-32602`),
//! 6. handler invocation (`-32000` on failure, `-32603` on panic).
//!
//! A valid envelope with an absent or falsy `id` is a notification: it is
//! routed and executed, but no response is produced.

use crate::auth::AuthProvider;
use crate::channel::ChannelId;
use crate::queue::QueueStore;
use crate::registry::{RegistryStore, ServiceBinding};
use futures::FutureExt;
use meshplane_proto::{Envelope, Response, RpcError};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Failure surfaced by a resolved handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Parameter validation failed; maps to `-32602`.
    #[error("Invalid params")]
    InvalidParams,
    /// The handler ran and failed; maps to `-32000` with this message.
    #[error("{0}")]
    Failed(String),
}

type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, HandlerError>> + Send>>;
type Handler = Box<dyn Fn(ChannelId, Value) -> HandlerFuture + Send + Sync>;

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, HandlerError> {
    serde_json::from_value(params).map_err(|_| HandlerError::InvalidParams)
}

/// Array params are spread positionally; every exposed method takes a
/// single object argument, so a one-element array unwraps to that element
/// and anything else falls through to the method's own validation.
fn normalize_params(params: Option<Value>) -> Value {
    match params {
        None => Value::Null,
        Some(Value::Array(mut items)) if items.len() == 1 => items.remove(0),
        Some(value) => value,
    }
}

#[derive(Debug, Deserialize)]
struct RegisterParams {
    name: String,
    host: String,
    port: u16,
}

#[derive(Debug, Deserialize)]
struct LookupParams {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnqueueParams {
    service_id: String,
    client_id: String,
    body: String,
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AcknowledgeParams {
    service_id: String,
    client_id: String,
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PendingParams {
    service_id: String,
    client_id: String,
}

#[derive(Debug, Deserialize)]
struct CreatePasswordParams {
    password: String,
}

#[derive(Debug, Deserialize)]
struct AuthenticateParams {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct Verify2faParams {
    email: String,
    code: String,
}

/// Routes inbound envelopes to registry, queue and auth handlers.
pub struct Dispatcher {
    service_name: String,
    handlers: HashMap<&'static str, Handler>,
}

impl Dispatcher {
    /// Build the handler table over the given stores and collaborator.
    pub fn new(
        service_name: impl Into<String>,
        registry: RegistryStore,
        queues: QueueStore,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        let mut handlers: HashMap<&'static str, Handler> = HashMap::new();

        {
            let registry = registry.clone();
            handlers.insert(
                "register",
                Box::new(move |channel, params| {
                    let registry = registry.clone();
                    Box::pin(async move {
                        let p: RegisterParams = parse_params(params)?;
                        if p.port == 0 {
                            return Err(HandlerError::InvalidParams);
                        }
                        registry.register(
                            channel,
                            ServiceBinding {
                                name: p.name,
                                host: p.host,
                                port: p.port,
                            },
                        );
                        Ok(json!(true))
                    })
                }),
            );
        }

        {
            let registry = registry.clone();
            handlers.insert(
                "list",
                Box::new(move |_channel, _params| {
                    let registry = registry.clone();
                    Box::pin(async move {
                        serde_json::to_value(registry.list())
                            .map_err(|e| HandlerError::Failed(e.to_string()))
                    })
                }),
            );
        }

        {
            let registry = registry.clone();
            handlers.insert(
                "lookup",
                Box::new(move |_channel, params| {
                    let registry = registry.clone();
                    Box::pin(async move {
                        let p: LookupParams = parse_params(params)?;
                        match registry.lookup(&p.name) {
                            Some(binding) => serde_json::to_value(binding)
                                .map_err(|e| HandlerError::Failed(e.to_string())),
                            None => Ok(Value::Null),
                        }
                    })
                }),
            );
        }

        {
            let queues = queues.clone();
            handlers.insert(
                "enqueue",
                Box::new(move |_channel, params| {
                    let queues = queues.clone();
                    Box::pin(async move {
                        let p: EnqueueParams = parse_params(params)?;
                        queues.enqueue(&p.service_id, &p.client_id, &p.body, &p.id);
                        Ok(json!(true))
                    })
                }),
            );
        }

        {
            let queues = queues.clone();
            handlers.insert(
                "acknowledge",
                Box::new(move |_channel, params| {
                    let queues = queues.clone();
                    Box::pin(async move {
                        let p: AcknowledgeParams = parse_params(params)?;
                        queues.acknowledge(&p.service_id, &p.client_id, &p.id);
                        Ok(json!(true))
                    })
                }),
            );
        }

        {
            let queues = queues.clone();
            handlers.insert(
                "pending",
                Box::new(move |_channel, params| {
                    let queues = queues.clone();
                    Box::pin(async move {
                        let p: PendingParams = parse_params(params)?;
                        serde_json::to_value(queues.pending(&p.service_id, &p.client_id))
                            .map_err(|e| HandlerError::Failed(e.to_string()))
                    })
                }),
            );
        }

        {
            let auth = Arc::clone(&auth);
            handlers.insert(
                "createPassword",
                Box::new(move |_channel, params| {
                    let auth = Arc::clone(&auth);
                    Box::pin(async move {
                        let p: CreatePasswordParams = parse_params(params)?;
                        let hash = auth
                            .create_password(&p.password)
                            .await
                            .map_err(|e| HandlerError::Failed(e.to_string()))?;
                        Ok(json!(hash))
                    })
                }),
            );
        }

        {
            let auth = Arc::clone(&auth);
            handlers.insert(
                "authenticate",
                Box::new(move |_channel, params| {
                    let auth = Arc::clone(&auth);
                    Box::pin(async move {
                        let p: AuthenticateParams = parse_params(params)?;
                        let success = auth
                            .authenticate(&p.email, &p.password)
                            .await
                            .map_err(|e| HandlerError::Failed(e.to_string()))?;
                        Ok(json!({ "success": success }))
                    })
                }),
            );
        }

        {
            let auth = Arc::clone(&auth);
            handlers.insert(
                "verify2FA",
                Box::new(move |_channel, params| {
                    let auth = Arc::clone(&auth);
                    Box::pin(async move {
                        let p: Verify2faParams = parse_params(params)?;
                        let success = auth
                            .verify_2fa(&p.email, &p.code)
                            .await
                            .map_err(|e| HandlerError::Failed(e.to_string()))?;
                        Ok(json!({ "success": success }))
                    })
                }),
            );
        }

        Self {
            service_name: service_name.into(),
            handlers,
        }
    }

    /// The service name reported in method-not-found errors.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Handle one inbound text frame from a channel.
    ///
    /// Returns the response frame to send back, or `None` when the frame
    /// was a notification.
    pub async fn dispatch(&self, channel: ChannelId, raw: &str) -> Option<String> {
        let envelope = match Envelope::decode(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(%channel, error = %e, "Rejected unparseable frame");
                return Some(Response::failure(Value::Null, RpcError::parse_error()).to_text());
            }
        };

        // Ping answers even when the rest of the envelope is invalid or
        // every store is down, mirroring the liveness contract.
        if matches!(&envelope.method, Some(Value::String(m)) if m == "ping") {
            return Some(Response::success(envelope.id, json!("pong")).to_text());
        }

        let id = envelope.id.clone();
        let wants_response = !envelope.is_notification();

        let method = match (envelope.version_ok(), envelope.method_str()) {
            (true, Some(method)) => method.to_string(),
            _ => {
                debug!(%channel, "Rejected invalid envelope");
                return Some(Response::failure(id, RpcError::invalid_request()).to_text());
            }
        };

        let Some(handler) = self.handlers.get(method.as_str()) else {
            debug!(%channel, method, "Unknown method");
            return wants_response.then(|| {
                Response::failure(id, RpcError::method_not_found(&method, &self.service_name))
                    .to_text()
            });
        };

        let params = normalize_params(envelope.params);
        let outcome = AssertUnwindSafe(handler(channel, params)).catch_unwind().await;

        let response = match outcome {
            Ok(Ok(result)) => Response::success(id, result),
            Ok(Err(HandlerError::InvalidParams)) => {
                Response::failure(id, RpcError::invalid_params())
            }
            Ok(Err(HandlerError::Failed(message))) => {
                Response::failure(id, RpcError::handler_failure(message))
            }
            Err(_) => {
                warn!(%channel, method, "Handler panicked");
                Response::failure(id, RpcError::internal())
            }
        };

        wants_response.then(|| response.to_text())
    }

    /// Test hook: install an extra handler under a custom name.
    #[cfg(test)]
    fn insert_handler(&mut self, name: &'static str, handler: Handler) {
        self.handlers.insert(name, handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryAuth;
    use meshplane_proto::{INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR, SERVER_ERROR};

    fn dispatcher() -> Dispatcher {
        dispatcher_with_stores().0
    }

    fn dispatcher_with_stores() -> (Dispatcher, RegistryStore, QueueStore, Arc<MemoryAuth>) {
        let registry = RegistryStore::new();
        let queues = QueueStore::new();
        let auth = Arc::new(MemoryAuth::new());
        let dispatcher = Dispatcher::new(
            "meshplane",
            registry.clone(),
            queues.clone(),
            auth.clone(),
        );
        (dispatcher, registry, queues, auth)
    }

    async fn call(dispatcher: &Dispatcher, channel: ChannelId, raw: &str) -> Value {
        let text = dispatcher.dispatch(channel, raw).await.expect("expected a response");
        serde_json::from_str(&text).unwrap()
    }

    fn error_code(response: &Value) -> i64 {
        response["error"]["code"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_parse_error_has_null_id() {
        let d = dispatcher();
        let resp = call(&d, ChannelId::new(), "{not json").await;
        assert_eq!(error_code(&resp), PARSE_ERROR);
        assert_eq!(resp["id"], Value::Null);
    }

    #[tokio::test]
    async fn test_invalid_version_rejected_with_id_passthrough() {
        let d = dispatcher();
        let resp = call(
            &d,
            ChannelId::new(),
            r#"{"jsonrpc":"1.0","method":"list","id":"req-9"}"#,
        )
        .await;
        assert_eq!(error_code(&resp), INVALID_REQUEST);
        assert_eq!(resp["id"], json!("req-9"));
    }

    #[tokio::test]
    async fn test_missing_method_rejected() {
        let d = dispatcher();
        let resp = call(&d, ChannelId::new(), r#"{"jsonrpc":"2.0","id":1}"#).await;
        assert_eq!(error_code(&resp), INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_non_string_method_rejected() {
        let d = dispatcher();
        let resp = call(&d, ChannelId::new(), r#"{"jsonrpc":"2.0","method":42,"id":1}"#).await;
        assert_eq!(error_code(&resp), INVALID_REQUEST);
        assert_eq!(resp["id"], json!(1));
    }

    #[tokio::test]
    async fn test_non_object_frame_rejected() {
        let d = dispatcher();
        let resp = call(&d, ChannelId::new(), r#"[1,2,3]"#).await;
        assert_eq!(error_code(&resp), INVALID_REQUEST);
        assert_eq!(resp["id"], Value::Null);
    }

    #[tokio::test]
    async fn test_ping_returns_pong() {
        let d = dispatcher();
        let resp = call(&d, ChannelId::new(), r#"{"jsonrpc":"2.0","method":"ping","id":1}"#).await;
        assert_eq!(resp["result"], json!("pong"));
        assert_eq!(resp["id"], json!(1));
    }

    #[tokio::test]
    async fn test_ping_preempts_envelope_validation() {
        // No jsonrpc field at all — ping must still answer.
        let d = dispatcher();
        let resp = call(&d, ChannelId::new(), r#"{"method":"ping","id":7}"#).await;
        assert_eq!(resp["result"], json!("pong"));
    }

    #[tokio::test]
    async fn test_unknown_method_code_and_message() {
        let d = dispatcher();
        let resp = call(&d, ChannelId::new(), r#"{"jsonrpc":"2.0","method":"bogus","id":1}"#).await;
        assert_eq!(error_code(&resp), METHOD_NOT_FOUND);
        assert_eq!(
            resp["error"]["message"],
            json!("Method 'bogus' not found in service 'meshplane'")
        );
    }

    #[tokio::test]
    async fn test_register_then_lookup_from_other_channel() {
        let d = dispatcher();
        let resp = call(
            &d,
            ChannelId::new(),
            r#"{"jsonrpc":"2.0","method":"register","params":{"name":"svc-a","host":"localhost","port":7886},"id":1}"#,
        )
        .await;
        assert_eq!(resp["result"], json!(true));

        let resp = call(
            &d,
            ChannelId::new(),
            r#"{"jsonrpc":"2.0","method":"lookup","params":{"name":"svc-a"},"id":2}"#,
        )
        .await;
        assert_eq!(resp["result"]["host"], json!("localhost"));
        assert_eq!(resp["result"]["port"], json!(7886));
    }

    #[tokio::test]
    async fn test_lookup_missing_returns_null() {
        let d = dispatcher();
        let resp = call(
            &d,
            ChannelId::new(),
            r#"{"jsonrpc":"2.0","method":"lookup","params":{"name":"ghost"},"id":1}"#,
        )
        .await;
        assert_eq!(resp["result"], Value::Null);
    }

    #[tokio::test]
    async fn test_register_invalid_params() {
        let d = dispatcher();
        for params in [
            r#"{"name":"svc","host":"localhost"}"#,
            r#"{"name":"svc","host":"localhost","port":"7886"}"#,
            r#"{"name":"svc","host":"localhost","port":0}"#,
            r#"{"name":7,"host":"localhost","port":7886}"#,
        ] {
            let raw = format!(
                r#"{{"jsonrpc":"2.0","method":"register","params":{params},"id":1}}"#
            );
            let resp = call(&d, ChannelId::new(), &raw).await;
            assert_eq!(error_code(&resp), INVALID_PARAMS, "params: {params}");
        }
    }

    #[tokio::test]
    async fn test_positional_single_object_params_accepted() {
        let d = dispatcher();
        let resp = call(
            &d,
            ChannelId::new(),
            r#"{"jsonrpc":"2.0","method":"register","params":[{"name":"svc-a","host":"h","port":1}],"id":1}"#,
        )
        .await;
        assert_eq!(resp["result"], json!(true));
    }

    #[tokio::test]
    async fn test_list_contains_both_registrations() {
        let d = dispatcher();
        call(
            &d,
            ChannelId::new(),
            r#"{"jsonrpc":"2.0","method":"register","params":{"name":"svc-a","host":"h","port":1},"id":1}"#,
        )
        .await;
        call(
            &d,
            ChannelId::new(),
            r#"{"jsonrpc":"2.0","method":"register","params":{"name":"svc-b","host":"h","port":2},"id":2}"#,
        )
        .await;

        let resp = call(&d, ChannelId::new(), r#"{"jsonrpc":"2.0","method":"list","id":3}"#).await;
        let names: Vec<&str> = resp["result"]
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["name"].as_str().unwrap())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"svc-a"));
        assert!(names.contains(&"svc-b"));
    }

    #[tokio::test]
    async fn test_queue_roundtrip_over_rpc() {
        let d = dispatcher();
        let ch = ChannelId::new();

        call(
            &d,
            ch,
            r#"{"jsonrpc":"2.0","method":"enqueue","params":{"serviceId":"s","clientId":"c","body":"A","id":"m1"},"id":1}"#,
        )
        .await;
        call(
            &d,
            ch,
            r#"{"jsonrpc":"2.0","method":"enqueue","params":{"serviceId":"s","clientId":"c","body":"B","id":"m2"},"id":2}"#,
        )
        .await;

        let resp = call(
            &d,
            ch,
            r#"{"jsonrpc":"2.0","method":"pending","params":{"serviceId":"s","clientId":"c"},"id":3}"#,
        )
        .await;
        let pending = resp["result"].as_array().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0]["id"], json!("m1"));
        assert_eq!(pending[1]["id"], json!("m2"));
        assert!(pending[0]["sequence"].as_u64().unwrap() < pending[1]["sequence"].as_u64().unwrap());

        let resp = call(
            &d,
            ch,
            r#"{"jsonrpc":"2.0","method":"acknowledge","params":{"serviceId":"s","clientId":"c","id":"m1"},"id":4}"#,
        )
        .await;
        assert_eq!(resp["result"], json!(true));

        let resp = call(
            &d,
            ch,
            r#"{"jsonrpc":"2.0","method":"pending","params":{"serviceId":"s","clientId":"c"},"id":5}"#,
        )
        .await;
        assert_eq!(resp["result"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_dedup_over_rpc() {
        let d = dispatcher();
        let ch = ChannelId::new();
        for id in 1..=2 {
            let raw = format!(
                r#"{{"jsonrpc":"2.0","method":"enqueue","params":{{"serviceId":"s","clientId":"c","body":"hello","id":"m1"}},"id":{id}}}"#
            );
            let resp = call(&d, ch, &raw).await;
            assert_eq!(resp["result"], json!(true));
        }

        let resp = call(
            &d,
            ch,
            r#"{"jsonrpc":"2.0","method":"pending","params":{"serviceId":"s","clientId":"c"},"id":9}"#,
        )
        .await;
        assert_eq!(resp["result"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_notification_executes_without_response() {
        let (d, registry, _queues, _auth) = dispatcher_with_stores();
        let ch = ChannelId::new();

        let out = d
            .dispatch(
                ch,
                r#"{"jsonrpc":"2.0","method":"register","params":{"name":"quiet","host":"h","port":5}}"#,
            )
            .await;
        assert!(out.is_none());
        assert_eq!(registry.lookup("quiet").unwrap().port, 5);
    }

    #[tokio::test]
    async fn test_unknown_method_notification_is_silent() {
        let d = dispatcher();
        let out = d
            .dispatch(ChannelId::new(), r#"{"jsonrpc":"2.0","method":"bogus"}"#)
            .await;
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn test_auth_delegation() {
        let (d, _registry, _queues, auth) = dispatcher_with_stores();
        auth.add_account("a@example.com", "hunter2");
        auth.set_code("a@example.com", "123456");
        let ch = ChannelId::new();

        let resp = call(
            &d,
            ch,
            r#"{"jsonrpc":"2.0","method":"createPassword","params":{"password":"hunter2"},"id":1}"#,
        )
        .await;
        assert_eq!(resp["result"].as_str().unwrap().len(), 64);

        let resp = call(
            &d,
            ch,
            r#"{"jsonrpc":"2.0","method":"authenticate","params":{"email":"a@example.com","password":"hunter2"},"id":2}"#,
        )
        .await;
        assert_eq!(resp["result"]["success"], json!(true));

        let resp = call(
            &d,
            ch,
            r#"{"jsonrpc":"2.0","method":"verify2FA","params":{"email":"a@example.com","code":"999999"},"id":3}"#,
        )
        .await;
        assert_eq!(resp["result"]["success"], json!(false));
    }

    #[tokio::test]
    async fn test_auth_failure_wrapped_as_server_error() {
        let d = dispatcher();
        // MemoryAuth rejects empty passwords with an error.
        let resp = call(
            &d,
            ChannelId::new(),
            r#"{"jsonrpc":"2.0","method":"createPassword","params":{"password":""},"id":1}"#,
        )
        .await;
        assert_eq!(error_code(&resp), SERVER_ERROR);
        assert!(resp["error"]["message"].as_str().unwrap().contains("Password"));
    }

    #[tokio::test]
    async fn test_panicking_handler_becomes_internal_error() {
        let (mut d, _registry, _queues, _auth) = dispatcher_with_stores();
        d.insert_handler(
            "boom",
            Box::new(|_channel, _params| Box::pin(async { panic!("kaboom") })),
        );

        let resp = call(&d, ChannelId::new(), r#"{"jsonrpc":"2.0","method":"boom","id":1}"#).await;
        assert_eq!(error_code(&resp), INTERNAL_ERROR);
        assert_eq!(resp["error"]["message"], json!("Internal error"));
    }

    #[tokio::test]
    async fn test_failure_on_one_channel_leaves_others_intact() {
        let d = dispatcher();
        let good = ChannelId::new();
        call(
            &d,
            good,
            r#"{"jsonrpc":"2.0","method":"register","params":{"name":"stable","host":"h","port":9},"id":1}"#,
        )
        .await;

        // A bad frame from a different channel must not disturb it.
        let bad = ChannelId::new();
        let resp = call(&d, bad, "{not json").await;
        assert_eq!(error_code(&resp), PARSE_ERROR);

        let resp = call(
            &d,
            ChannelId::new(),
            r#"{"jsonrpc":"2.0","method":"lookup","params":{"name":"stable"},"id":2}"#,
        )
        .await;
        assert_eq!(resp["result"]["port"], json!(9));
    }
}
