//! Hook handler trait and adapters.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::errors::HookError;
use crate::types::{HookContext, HookOutcome};

/// A lifecycle hook.
///
/// `input` is the event payload. `output` is state shared by every handler
/// of one dispatch; later handlers see earlier handlers' mutations.
#[async_trait]
pub trait HookHandler: Send + Sync {
    /// Run the hook.
    async fn handle(
        &self,
        input: &Value,
        output: &mut Value,
        ctx: &HookContext,
    ) -> Result<HookOutcome, HookError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> HookHandler for FnHandler<F>
where
    F: Fn(&Value, &mut Value, &HookContext) -> Result<HookOutcome, HookError> + Send + Sync,
{
    async fn handle(
        &self,
        input: &Value,
        output: &mut Value,
        ctx: &HookContext,
    ) -> Result<HookOutcome, HookError> {
        (self.0)(input, output, ctx)
    }
}

/// Wrap a synchronous closure as a handler.
pub fn from_fn<F>(f: F) -> Arc<dyn HookHandler>
where
    F: Fn(&Value, &mut Value, &HookContext) -> Result<HookOutcome, HookError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnHandler(f))
}

struct Isolated {
    inner: Arc<dyn HookHandler>,
}

#[async_trait]
impl HookHandler for Isolated {
    async fn handle(
        &self,
        input: &Value,
        output: &mut Value,
        ctx: &HookContext,
    ) -> Result<HookOutcome, HookError> {
        match self.inner.handle(input, output, ctx).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(error = %e, agent = %ctx.agent, "isolated hook failed, continuing");
                Ok(HookOutcome::Continue)
            }
        }
    }
}

/// Wrap `handler` so its failures are logged and dispatch continues.
pub fn isolated(handler: Arc<dyn HookHandler>) -> Arc<dyn HookHandler> {
    Arc::new(Isolated { inner: handler })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> HookContext {
        HookContext::new("1", 1, "build")
    }

    #[tokio::test]
    async fn closure_handler_mutates_output() {
        let h = from_fn(|input, output, _ctx| {
            output["seen"] = input.clone();
            Ok(HookOutcome::Continue)
        });
        let mut out = json!({});
        let outcome = h.handle(&json!("hi"), &mut out, &ctx()).await.unwrap();
        assert_eq!(outcome, HookOutcome::Continue);
        assert_eq!(out, json!({"seen": "hi"}));
    }

    #[tokio::test]
    async fn isolated_swallows_failure() {
        let failing = from_fn(|_, _, _| Err(HookError::failed("boom")));
        assert!(failing.handle(&Value::Null, &mut Value::Null, &ctx()).await.is_err());

        let wrapped = isolated(failing);
        let outcome = wrapped.handle(&Value::Null, &mut Value::Null, &ctx()).await.unwrap();
        assert_eq!(outcome, HookOutcome::Continue);
    }

    #[tokio::test]
    async fn isolated_passes_abort_through() {
        let wrapped = isolated(from_fn(|_, _, _| Ok(HookOutcome::Abort)));
        let outcome = wrapped.handle(&Value::Null, &mut Value::Null, &ctx()).await.unwrap();
        assert!(outcome.is_abort());
    }
}
