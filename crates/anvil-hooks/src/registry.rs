//! Hook registry.
//!
//! Handlers are kept per [`HookPoint`] in registration order. Dispatch is
//! sequential; a failing handler stops dispatch and its error propagates.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::errors::HookError;
use crate::handler::HookHandler;
use crate::types::{HookContext, HookOutcome, HookPoint, HookScope};

#[derive(Clone)]
pub(crate) struct HookEntry {
    pub(crate) name: String,
    pub(crate) scope: HookScope,
    pub(crate) handler: Arc<dyn HookHandler>,
}

/// Registry of lifecycle hooks, shared behind an `Arc`.
#[derive(Default)]
pub struct HookRegistry {
    hooks: RwLock<HashMap<HookPoint, Vec<HookEntry>>>,
    disabled: RwLock<HashSet<String>>,
}

impl HookRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a global-scope handler.
    pub fn register(
        &self,
        point: HookPoint,
        name: impl Into<String>,
        handler: Arc<dyn HookHandler>,
    ) -> Result<(), HookError> {
        self.register_scoped(point, name, HookScope::Global, handler)
    }

    /// Register a handler with an explicit scope.
    ///
    /// Names are unique per point.
    pub fn register_scoped(
        &self,
        point: HookPoint,
        name: impl Into<String>,
        scope: HookScope,
        handler: Arc<dyn HookHandler>,
    ) -> Result<(), HookError> {
        let name = name.into();
        let mut hooks = self.hooks.write();
        let list = hooks.entry(point).or_default();
        if list.iter().any(|e| e.name == name) {
            return Err(HookError::DuplicateHook { point, name });
        }
        debug!(hook = %name, point = %point, ?scope, "hook registered");
        list.push(HookEntry {
            name,
            scope,
            handler,
        });
        Ok(())
    }

    /// Remove a handler from one point. Returns whether it existed.
    ///
    /// Handlers never see the registry; this is for the owner during setup.
    pub fn unregister(&self, point: HookPoint, name: &str) -> bool {
        let mut hooks = self.hooks.write();
        let Some(list) = hooks.get_mut(&point) else {
            return false;
        };
        let before = list.len();
        list.retain(|e| e.name != name);
        let removed = list.len() < before;
        if removed {
            debug!(hook = name, point = %point, "hook unregistered");
        }
        removed
    }

    /// Skip `name` at dispatch without unregistering it.
    pub fn disable(&self, name: impl Into<String>) {
        let name = name.into();
        debug!(hook = %name, "hook disabled");
        let _ = self.disabled.write().insert(name);
    }

    /// Disable several hooks, e.g. from settings.
    pub fn disable_many<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.disable(name);
        }
    }

    /// Re-enable a disabled hook.
    pub fn enable(&self, name: &str) {
        if self.disabled.write().remove(name) {
            debug!(hook = name, "hook enabled");
        }
    }

    /// Whether `name` is not disabled.
    pub fn is_enabled(&self, name: &str) -> bool {
        !self.disabled.read().contains(name)
    }

    /// Handler names on `point`, in dispatch order.
    pub fn list_for_point(&self, point: HookPoint) -> Vec<String> {
        self.hooks
            .read()
            .get(&point)
            .map(|l| l.iter().map(|e| e.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Total handlers across all points.
    pub fn len(&self) -> usize {
        self.hooks.read().values().map(Vec::len).sum()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every enabled handler on `point` in registration order.
    ///
    /// Returns [`HookOutcome::Abort`] if a handler cut dispatch short.
    pub async fn execute(
        &self,
        point: HookPoint,
        input: &Value,
        output: &mut Value,
        ctx: &HookContext,
    ) -> Result<HookOutcome, HookError> {
        self.dispatch(point, input, output, ctx, |_| true).await
    }

    /// Dispatch to the entries `admit` accepts.
    ///
    /// Entries are snapshotted first so handlers never run under the lock;
    /// the disabled set is consulted per entry.
    pub(crate) async fn dispatch<F>(
        &self,
        point: HookPoint,
        input: &Value,
        output: &mut Value,
        ctx: &HookContext,
        admit: F,
    ) -> Result<HookOutcome, HookError>
    where
        F: Fn(&HookEntry) -> bool + Send + Sync,
    {
        let entries = self.hooks.read().get(&point).cloned().unwrap_or_default();
        for entry in &entries {
            if !self.is_enabled(&entry.name) || !admit(entry) {
                continue;
            }
            match entry.handler.handle(input, output, ctx).await {
                Ok(HookOutcome::Continue) => {}
                Ok(HookOutcome::Abort) => {
                    debug!(hook = %entry.name, point = %point, "hook aborted dispatch");
                    return Ok(HookOutcome::Abort);
                }
                Err(e) => {
                    return Err(HookError::Handler {
                        hook: entry.name.clone(),
                        point,
                        source: Box::new(e),
                    });
                }
            }
        }
        Ok(HookOutcome::Continue)
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hook_count", &self.len())
            .field("disabled", &self.disabled.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{from_fn, isolated};
    use assert_matches::assert_matches;
    use serde_json::json;

    fn ctx() -> HookContext {
        HookContext::new("1", 1, "build")
    }

    fn append(tag: &'static str) -> Arc<dyn HookHandler> {
        from_fn(move |_, output, _| {
            if let Some(list) = output.as_array_mut() {
                list.push(json!(tag));
            }
            Ok(HookOutcome::Continue)
        })
    }

    #[test]
    fn new_registry_is_empty() {
        let reg = HookRegistry::new();
        assert!(reg.is_empty());
        assert!(reg.list_for_point(HookPoint::Event).is_empty());
    }

    #[test]
    fn duplicate_name_on_same_point_is_rejected() {
        let reg = HookRegistry::new();
        reg.register(HookPoint::Event, "a", append("a")).unwrap();
        let err = reg.register(HookPoint::Event, "a", append("b")).unwrap_err();
        assert_matches!(err, HookError::DuplicateHook { point: HookPoint::Event, .. });
        reg.register(HookPoint::ChatMessage, "a", append("c")).unwrap();
        assert_eq!(reg.len(), 2);
    }

    #[tokio::test]
    async fn handlers_run_in_registration_order_and_share_state() {
        let reg = HookRegistry::new();
        reg.register(HookPoint::Event, "first", append("1")).unwrap();
        reg.register(HookPoint::Event, "second", append("2")).unwrap();
        reg.register(
            HookPoint::Event,
            "observer",
            from_fn(|_, output, _| {
                let n = output.as_array().map_or(0, Vec::len);
                if let Some(list) = output.as_array_mut() {
                    list.push(json!(format!("saw {n}")));
                }
                Ok(HookOutcome::Continue)
            }),
        )
        .unwrap();

        let mut out = json!([]);
        let outcome = reg.execute(HookPoint::Event, &Value::Null, &mut out, &ctx()).await.unwrap();
        assert_eq!(outcome, HookOutcome::Continue);
        assert_eq!(out, json!(["1", "2", "saw 2"]));
    }

    #[tokio::test]
    async fn abort_skips_remaining() {
        let reg = HookRegistry::new();
        reg.register(HookPoint::Event, "a", append("a")).unwrap();
        reg.register(HookPoint::Event, "stop", from_fn(|_, _, _| Ok(HookOutcome::Abort))).unwrap();
        reg.register(HookPoint::Event, "c", append("c")).unwrap();

        let mut out = json!([]);
        let outcome = reg.execute(HookPoint::Event, &Value::Null, &mut out, &ctx()).await.unwrap();
        assert!(outcome.is_abort());
        assert_eq!(out, json!(["a"]));
    }

    #[tokio::test]
    async fn failure_propagates_and_stops_dispatch() {
        let reg = HookRegistry::new();
        reg.register(HookPoint::Event, "bad", from_fn(|_, _, _| Err(HookError::failed("boom"))))
            .unwrap();
        reg.register(HookPoint::Event, "after", append("after")).unwrap();

        let mut out = json!([]);
        let err = reg.execute(HookPoint::Event, &Value::Null, &mut out, &ctx()).await.unwrap_err();
        assert_matches!(err, HookError::Handler { ref hook, .. } if hook == "bad");
        assert_eq!(out, json!([]));
    }

    #[tokio::test]
    async fn isolated_failure_lets_dispatch_continue() {
        let reg = HookRegistry::new();
        let bad = from_fn(|_, _, _| Err(HookError::failed("boom")));
        reg.register(HookPoint::Event, "bad", isolated(bad)).unwrap();
        reg.register(HookPoint::Event, "after", append("after")).unwrap();

        let mut out = json!([]);
        let _ = reg.execute(HookPoint::Event, &Value::Null, &mut out, &ctx()).await.unwrap();
        assert_eq!(out, json!(["after"]));
    }

    #[tokio::test]
    async fn disabled_hooks_are_skipped_until_enabled() {
        let reg = HookRegistry::new();
        reg.register(HookPoint::Event, "a", append("a")).unwrap();
        reg.register(HookPoint::Event, "b", append("b")).unwrap();
        reg.disable_many(["a"]);
        assert!(!reg.is_enabled("a"));

        let mut out = json!([]);
        let _ = reg.execute(HookPoint::Event, &Value::Null, &mut out, &ctx()).await.unwrap();
        assert_eq!(out, json!(["b"]));

        reg.enable("a");
        let mut out = json!([]);
        let _ = reg.execute(HookPoint::Event, &Value::Null, &mut out, &ctx()).await.unwrap();
        assert_eq!(out, json!(["a", "b"]));
        assert_eq!(reg.list_for_point(HookPoint::Event), vec!["a", "b"]);
    }

    #[test]
    fn unregister_removes_only_named() {
        let reg = HookRegistry::new();
        reg.register(HookPoint::Event, "a", append("a")).unwrap();
        reg.register(HookPoint::Event, "b", append("b")).unwrap();
        assert!(reg.unregister(HookPoint::Event, "a"));
        assert!(!reg.unregister(HookPoint::Event, "a"));
        assert_eq!(reg.list_for_point(HookPoint::Event), vec!["b"]);
    }

    #[test]
    fn unregister_leaves_other_points_alone() {
        let reg = HookRegistry::new();
        reg.register(HookPoint::Event, "shared", append("e")).unwrap();
        reg.register(HookPoint::ChatMessage, "shared", append("c")).unwrap();
        assert!(!reg.unregister(HookPoint::ToolExecuteBefore, "shared"));
        assert!(reg.unregister(HookPoint::Event, "shared"));
        assert!(reg.list_for_point(HookPoint::Event).is_empty());
        assert_eq!(reg.list_for_point(HookPoint::ChatMessage), vec!["shared"]);
    }

    #[test]
    fn disable_keeps_hook_registered() {
        let reg = HookRegistry::new();
        reg.register(HookPoint::Event, "a", append("a")).unwrap();
        reg.disable("a");
        reg.disable("not-registered");
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.list_for_point(HookPoint::Event), vec!["a"]);
        assert!(!reg.is_enabled("not-registered"));
    }
}
