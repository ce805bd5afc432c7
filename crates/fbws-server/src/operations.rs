//! Operation lookup for remote requests.
//!
//! An operation takes the request's `args` object and resolves to the data
//! returned in a SUCCESS response; any error becomes FAIL.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::{json, Map, Value};

use fbws_core::error::FbwsResult;

pub type Operation =
    Arc<dyn Fn(Map<String, Value>) -> BoxFuture<'static, FbwsResult<Value>> + Send + Sync>;

/// Resolves `(subsys, cmd)` to an operation.
pub trait OperationRegistry: Send + Sync {
    fn find(&self, subsys: &str, cmd: &str) -> Option<Operation>;
}

/// In-memory operation table.
#[derive(Default, Clone)]
pub struct OperationTable {
    ops: HashMap<(String, String), Operation>,
}

impl OperationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation, replacing any previous one for the same pair.
    pub fn register<F, Fut>(&mut self, subsys: &str, cmd: &str, op: F) -> &mut Self
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FbwsResult<Value>> + Send + 'static,
    {
        let op: Operation = Arc::new(move |args| op(args).boxed());
        self.ops.insert((subsys.to_string(), cmd.to_string()), op);
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl OperationRegistry for OperationTable {
    fn find(&self, subsys: &str, cmd: &str) -> Option<Operation> {
        self.ops
            .get(&(subsys.to_string(), cmd.to_string()))
            .cloned()
    }
}

/// Register the `sys` operations every server answers.
///
/// - `sys.ping` echoes its args.
/// - `sys.info` reports the server name, version and uptime.
pub fn register_builtins(table: &mut OperationTable, started: Instant) {
    table.register("sys", "ping", |args| async move { Ok(Value::Object(args)) });
    table.register("sys", "info", move |_args| async move {
        Ok(json!({
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "uptimeSecs": started.elapsed().as_secs(),
        }))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use fbws_core::error::FbwsError;

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn finds_registered_operation() {
        let mut table = OperationTable::new();
        table.register("dev", "read", |args| async move {
            Ok(args.get("id").cloned().unwrap_or(Value::Null))
        });

        let op = table.find("dev", "read").unwrap();
        assert_eq!(op(args(json!({ "id": 7 }))).await.unwrap(), json!(7));
        assert!(table.find("dev", "write").is_none());
        assert!(table.find("gad", "read").is_none());
    }

    #[tokio::test]
    async fn failing_operation_surfaces_its_error() {
        let mut table = OperationTable::new();
        table.register("dev", "write", |_| async {
            Err(FbwsError::Operation("device offline".into()))
        });
        let op = table.find("dev", "write").unwrap();
        assert!(op(Map::new()).await.is_err());
    }

    #[tokio::test]
    async fn builtins() {
        let mut table = OperationTable::new();
        register_builtins(&mut table, Instant::now());
        assert_eq!(table.len(), 2);

        let ping = table.find("sys", "ping").unwrap();
        assert_eq!(
            ping(args(json!({ "hello": "world" }))).await.unwrap(),
            json!({ "hello": "world" })
        );

        let info = table.find("sys", "info").unwrap()(Map::new()).await.unwrap();
        assert_eq!(info["name"], json!("fbws-server"));
        assert!(info["uptimeSecs"].is_u64());
    }
}
