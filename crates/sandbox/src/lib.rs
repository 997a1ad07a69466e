#![deny(unused)]
//! Sandboxed code execution for Codemode.
//!
//! This crate runs untrusted JavaScript in a fresh isolate per call and lets
//! that code call back into host tools without holding any host state.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │  execute_code (protocol tool)          │
//! │    ↓ Evaluator::execute                │
//! ├────────────────────────────────────────┤
//! │  Isolation host (DockerIsolateHost)    │
//! │    ↓ Docker API via bollard            │
//! ├────────────────────────────────────────┤
//! │  Isolate (node, read-only rootfs)      │
//! │    codemode.<tool>(input)              │
//! │    ↓ POST /codemode/proxy + ticket     │
//! ├────────────────────────────────────────┤
//! │  CallbackProxy                         │
//! │    ↓ doId -> host context              │
//! │  Tool registry                         │
//! └────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use codemode_sandbox::{CallbackProxy, DockerIsolateHost, Evaluator, IsolateConfig};
//!
//! let host = Arc::new(DockerIsolateHost::new(IsolateConfig::default())?);
//! let proxy = Arc::new(CallbackProxy::new());
//! proxy.register_context(do_id.clone(), registry.clone());
//!
//! let evaluator = Evaluator::new(do_id, registry.callable_names(), log)
//!     .with_host(host)
//!     .with_proxy(proxy, "http://host.docker.internal:8787/codemode/proxy");
//! let outcome = evaluator.execute("return await codemode.sql_tables({});").await;
//! ```

pub mod engine;
pub mod evaluator;
pub mod proxy;
pub mod typegen;

pub use engine::{
    DockerIsolateHost, IsolateConfig, IsolateHost, IsolateId, IsolateModule, IsolateOutcome,
    IsolateScope, MockIsolateHost, NetworkProfile,
};
pub use evaluator::{build_module, Evaluator, ExecutionOutcome};
pub use proxy::{CallbackProxy, ProxyBinding, ProxyTicket};
pub use typegen::{generate, TypeCache};
