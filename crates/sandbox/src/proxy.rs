//! Call-back proxy.
//!
//! The only channel from an isolate back into the host. Each host context
//! registers its call target under a context id; isolates receive an opaque
//! binding holding the endpoint, a per-execution ticket, and that id. Nothing
//! else about the host crosses the boundary.

use dashmap::DashMap;
use secrecy::{ExposeSecret, Secret};
use serde_json::Value;
use std::sync::Arc;

use codemode_core::{
    traits::IsolateCallTarget,
    types::{ContextId, ProxyCall, ToolOutput},
    Error, Result,
};
use codemode_governance::track_proxy_call;

/// Per-execution bearer credential.
///
/// Grants the right to call [`CallbackProxy::invoke`] for one context id
/// until it is revoked.
pub struct ProxyTicket {
    token: Secret<String>,
    do_id: ContextId,
}

impl ProxyTicket {
    pub fn do_id(&self) -> &ContextId {
        &self.do_id
    }

    pub fn token(&self) -> &Secret<String> {
        &self.token
    }
}

impl std::fmt::Debug for ProxyTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyTicket")
            .field("do_id", &self.do_id)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Routes isolate calls to the host context that started them.
#[derive(Default)]
pub struct CallbackProxy {
    contexts: DashMap<ContextId, Arc<dyn IsolateCallTarget>>,
    tickets: DashMap<String, ContextId>,
}

impl CallbackProxy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `target` reachable under `do_id`, replacing any previous target.
    pub fn register_context(&self, do_id: ContextId, target: Arc<dyn IsolateCallTarget>) {
        tracing::debug!(do_id = %do_id, "Context registered with call-back proxy");
        self.contexts.insert(do_id, target);
    }

    pub fn unregister_context(&self, do_id: &ContextId) {
        self.contexts.remove(do_id);
        self.tickets.retain(|_, id| id != do_id);
    }

    /// Mint a ticket for one execution against `do_id`.
    pub fn open_ticket(&self, do_id: &ContextId) -> ProxyTicket {
        let token = uuid::Uuid::new_v4().simple().to_string();
        self.tickets.insert(token.clone(), do_id.clone());
        ProxyTicket {
            token: Secret::new(token),
            do_id: do_id.clone(),
        }
    }

    pub fn revoke(&self, ticket: &ProxyTicket) {
        self.tickets.remove(ticket.token.expose_secret());
    }

    /// Number of live tickets.
    pub fn open_tickets(&self) -> usize {
        self.tickets.len()
    }

    /// Check that `token` is live and bound to `do_id`.
    pub fn authorize(&self, token: &str, do_id: &ContextId) -> Result<()> {
        let bound = self
            .tickets
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::unauthorized("Invalid or expired proxy ticket"))?;
        if &bound != do_id {
            return Err(Error::forbidden(format!(
                "Proxy ticket is not valid for context '{}'",
                do_id
            )));
        }
        Ok(())
    }

    /// Resolve one call against the context that owns it.
    pub async fn invoke(&self, call: ProxyCall) -> Result<ToolOutput> {
        let target = match self.contexts.get(&call.do_id) {
            Some(entry) => entry.value().clone(),
            None => {
                track_proxy_call("unroutable");
                return Err(Error::proxy_routing(format!(
                    "No host context registered for doId '{}'",
                    call.do_id
                )));
            }
        };

        tracing::debug!(do_id = %call.do_id, function = %call.function_name, "Proxy call");
        let result = target.call_tool(&call.function_name, call.args).await;
        track_proxy_call(if result.is_ok() { "ok" } else { "error" });
        result
    }

    /// Authorize, then invoke. This is what the HTTP endpoint calls.
    pub async fn handle(&self, token: &str, call: ProxyCall) -> Result<ToolOutput> {
        if let Err(e) = self.authorize(token, &call.do_id) {
            track_proxy_call("rejected");
            return Err(e);
        }
        self.invoke(call).await
    }
}

/// Everything an isolate holds: where to call, with what ticket, for which context.
#[derive(Clone)]
pub struct ProxyBinding {
    endpoint: String,
    token: Arc<Secret<String>>,
    do_id: ContextId,
    proxy: Arc<CallbackProxy>,
}

impl ProxyBinding {
    pub fn new(proxy: Arc<CallbackProxy>, endpoint: impl Into<String>, ticket: &ProxyTicket) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: Arc::new(Secret::new(ticket.token.expose_secret().clone())),
            do_id: ticket.do_id.clone(),
            proxy,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn token(&self) -> &str {
        self.token.expose_secret()
    }

    pub fn do_id(&self) -> &ContextId {
        &self.do_id
    }

    /// Make a call exactly as an isolate stub would, in-process.
    pub async fn call(&self, function_name: &str, args: Vec<Value>) -> Result<ToolOutput> {
        let call = ProxyCall {
            do_id: self.do_id.clone(),
            function_name: function_name.to_string(),
            args,
        };
        self.proxy.handle(self.token(), call).await
    }
}
