//! Sandboxed execution gateway.
//!
//! Starts one isolate per `execute` call, hands it a `codemode` object whose
//! methods forward through the call-back proxy, and records every attempt in
//! the execution log.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

use codemode_core::{
    traits::ExecutionLog,
    types::{ContextId, ToolOutput, NO_VALUE_TOKEN},
};
use codemode_governance::{code_fingerprint, track_execution};

use crate::engine::{IsolateHost, IsolateModule, IsolateOutcome, RESULT_SENTINEL};
use crate::proxy::{CallbackProxy, ProxyBinding};

pub const HOST_UNAVAILABLE: &str = "Isolation host is not available. \
execute_code requires a running isolation host (Docker). \
All other tools work independently of Code Mode.";

pub const PROXY_UNAVAILABLE: &str = "Call-back proxy is not configured. \
Set sandbox.proxy_url to an address isolates can reach POST /codemode/proxy on.";

/// Result of one `execute` call. Every variant is data, never a fault.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// The code returned; `None` when it returned nothing.
    Success(Option<Value>),
    /// The code raised, timed out, or the host failed to run it.
    Failed {
        error: String,
        stack: Option<String>,
    },
    /// A required capability is not wired up. Nothing ran, nothing was logged.
    Unavailable { error: String },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Payload returned to the caller of `execute_code`.
    pub fn into_output(self) -> ToolOutput {
        match self {
            Self::Success(Some(value)) => ToolOutput::Value(value),
            Self::Success(None) => ToolOutput::Nothing,
            Self::Failed { error, stack } => match stack {
                Some(stack) => ToolOutput::Value(json!({ "error": error, "stack": stack })),
                None => ToolOutput::Value(json!({ "error": error })),
            },
            Self::Unavailable { error } => ToolOutput::Value(json!({ "error": error })),
        }
    }
}

struct ProxyChannel {
    proxy: Arc<CallbackProxy>,
    endpoint: String,
}

/// Evaluator bound to one host context.
pub struct Evaluator {
    do_id: ContextId,
    callable: Vec<String>,
    host: Option<Arc<dyn IsolateHost>>,
    channel: Option<ProxyChannel>,
    log: Arc<dyn ExecutionLog>,
}

impl Evaluator {
    /// `callable` is the set of names the injected `codemode` object exposes.
    pub fn new(do_id: ContextId, callable: Vec<String>, log: Arc<dyn ExecutionLog>) -> Self {
        Self {
            do_id,
            callable,
            host: None,
            channel: None,
            log,
        }
    }

    pub fn with_host(mut self, host: Arc<dyn IsolateHost>) -> Self {
        self.host = Some(host);
        self
    }

    /// Route isolate calls through `proxy`, reachable from isolates at `endpoint`.
    pub fn with_proxy(mut self, proxy: Arc<CallbackProxy>, endpoint: impl Into<String>) -> Self {
        self.channel = Some(ProxyChannel {
            proxy,
            endpoint: endpoint.into(),
        });
        self
    }

    pub fn do_id(&self) -> &ContextId {
        &self.do_id
    }

    /// Run `code` as the body of an async function inside a fresh isolate.
    ///
    /// The run itself is a spawned task that owns its ticket, its isolate and
    /// its log entry. Dropping the returned future detaches from the run
    /// without cutting it short, so the ticket is still revoked, the isolate
    /// still torn down and the attempt still logged exactly once.
    pub async fn execute(&self, code: &str) -> ExecutionOutcome {
        let Some(host) = &self.host else {
            return ExecutionOutcome::Unavailable {
                error: HOST_UNAVAILABLE.to_string(),
            };
        };
        let Some(channel) = &self.channel else {
            return ExecutionOutcome::Unavailable {
                error: PROXY_UNAVAILABLE.to_string(),
            };
        };

        let run = IsolateRun {
            do_id: self.do_id.clone(),
            code: code.to_string(),
            module: build_module(code, &self.callable),
            host: host.clone(),
            proxy: channel.proxy.clone(),
            endpoint: channel.endpoint.clone(),
            log: self.log.clone(),
        };
        match tokio::spawn(run.complete()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(do_id = %self.do_id, error = %e, "Isolate run task failed");
                let outcome = ExecutionOutcome::Failed {
                    error: format!("Isolate run aborted: {}", e),
                    stack: None,
                };
                record(&self.do_id, self.log.as_ref(), code, &outcome).await;
                outcome
            }
        }
    }
}

/// Everything one isolate run needs, owned so the run can outlive its caller.
struct IsolateRun {
    do_id: ContextId,
    code: String,
    module: IsolateModule,
    host: Arc<dyn IsolateHost>,
    proxy: Arc<CallbackProxy>,
    endpoint: String,
    log: Arc<dyn ExecutionLog>,
}

impl IsolateRun {
    async fn complete(self) -> ExecutionOutcome {
        let fingerprint = code_fingerprint(&self.code);
        let started = Instant::now();
        tracing::info!(do_id = %self.do_id, code = %fingerprint, "Starting isolate");

        let ticket = self.proxy.open_ticket(&self.do_id);
        let binding = ProxyBinding::new(self.proxy.clone(), self.endpoint.clone(), &ticket);
        let run = self.host.run(&self.module, &binding).await;
        self.proxy.revoke(&ticket);

        let outcome = match run {
            Ok(IsolateOutcome::Returned(value)) => ExecutionOutcome::Success(value),
            Ok(IsolateOutcome::Raised { error, stack }) => ExecutionOutcome::Failed { error, stack },
            Err(e) => {
                tracing::error!(do_id = %self.do_id, code = %fingerprint, error = %e, "Isolation host failed");
                ExecutionOutcome::Failed {
                    error: e.payload_message(),
                    stack: None,
                }
            }
        };

        let elapsed = started.elapsed().as_secs_f64();
        match &outcome {
            ExecutionOutcome::Success(_) => {
                track_execution("success", elapsed);
                tracing::info!(code = %fingerprint, elapsed_secs = elapsed, "Isolate returned");
            }
            _ => {
                track_execution("error", elapsed);
                tracing::warn!(code = %fingerprint, elapsed_secs = elapsed, "Isolate raised");
            }
        }

        record(&self.do_id, self.log.as_ref(), &self.code, &outcome).await;
        outcome
    }
}

async fn record(do_id: &ContextId, log: &dyn ExecutionLog, code: &str, outcome: &ExecutionOutcome) {
    let (result, error) = match outcome {
        ExecutionOutcome::Success(Some(value)) => (Some(value.to_string()), None),
        ExecutionOutcome::Success(None) => (Some(NO_VALUE_TOKEN.to_string()), None),
        ExecutionOutcome::Failed { error, .. } => (None, Some(error.clone())),
        ExecutionOutcome::Unavailable { .. } => return,
    };
    if let Err(e) = log.record(code, result, error).await {
        tracing::error!(do_id = %do_id, error = %e, "Failed to write execution log");
    }
}

const MODULE_PRELUDE: &str = r#"const __endpoint = process.env.CODEMODE_PROXY_URL;
const __token = process.env.CODEMODE_PROXY_TOKEN;
const __doId = process.env.CODEMODE_DO_ID;
delete process.env.CODEMODE_PROXY_TOKEN;

const __call = async (functionName, args) => {
  const res = await fetch(__endpoint, {
    method: "POST",
    headers: { "content-type": "application/json", authorization: `Bearer ${__token}` },
    body: JSON.stringify({ doId: __doId, functionName, args }),
  });
  const body = await res.json().catch(() => ({}));
  if (!res.ok) {
    throw new Error(body.error || `Proxy call failed: ${res.status}`);
  }
  return body.result;
};

const __stubs = Object.fromEntries(
  __NAMES__.map((name) => [name, (...args) => __call(name, args)])
);
const codemode = new Proxy(__stubs, {
  get(target, prop) {
    if (typeof prop !== "string" || prop === "then") return undefined;
    return target[prop] ?? ((...args) => __call(prop, args));
  },
});

const __emit = (envelope) => {
  const line = "\n__SENTINEL__" + JSON.stringify(envelope) + "\n";
  return new Promise((resolve) => process.stdout.write(line, resolve));
};

try {
  const __result = await (async () => {
"#;

const MODULE_EPILOGUE: &str = r#"
  })();
  await __emit(__result === undefined ? { ok: true } : { ok: true, value: __result });
} catch (e) {
  await __emit({
    ok: false,
    error: e && e.message ? e.message : String(e),
    stack: e && e.stack ? String(e.stack) : undefined,
  });
}
// Handles left open by the submitted code must not hold the isolate past its result.
process.exit(0);
"#;

/// Wrap `code` as an async function body inside a self-contained ES module.
pub fn build_module(code: &str, callable: &[String]) -> IsolateModule {
    let names = Value::from(callable.to_vec()).to_string();
    let mut source = MODULE_PRELUDE
        .replace("__NAMES__", &names)
        .replace("__SENTINEL__", RESULT_SENTINEL);
    source.push_str(code);
    source.push_str(MODULE_EPILOGUE);
    IsolateModule { source }
}
