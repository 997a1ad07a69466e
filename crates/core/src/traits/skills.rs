//! Skills-layer traits.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::types::{ToolContext, ToolOutput};

/// Handler behind a registered tool.
///
/// Receives the already-validated input and the shared tool context.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, input: Value, ctx: Arc<ToolContext>) -> Result<ToolOutput>;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(Value, Arc<ToolContext>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ToolOutput>> + Send,
{
    async fn call(&self, input: Value, ctx: Arc<ToolContext>) -> Result<ToolOutput> {
        (self)(input, ctx).await
    }
}

/// Host-side target that resolves calls made from inside an isolate.
///
/// Unknown names are reported as data, not as an `Err`; an `Err` means the
/// handler itself failed.
#[async_trait]
pub trait IsolateCallTarget: Send + Sync {
    async fn call_tool(&self, function_name: &str, args: Vec<Value>) -> Result<ToolOutput>;
}
