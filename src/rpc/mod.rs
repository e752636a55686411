//! JSON-RPC 2.0 stdio transport.
//!
//! Thin marshalling around the [`LifecycleOrchestrator`]: one line-delimited
//! request frame in, one response frame out, with progress events forwarded
//! as notifications (`event/info`, `event/progress`, `event/error`,
//! `event/result`) interleaved on stdout. Method names match the
//! orchestrator's operations one-to-one.

pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::core::error::{Error, Result};
use crate::core::materializer::ProjectMaterializer;
use crate::core::orchestrator::{LifecycleOrchestrator, ProgressSink};
use crate::core::registry::TemplateRegistry;
use crate::core::types::GenerationRequest;
use types::{
    INTERNAL_ERROR, INVALID_PARAMS, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    METHOD_NOT_FOUND, PARSE_ERROR, error_code,
};

/// Progress sink that forwards events as JSON-RPC notifications
struct EventSink {
    tx: mpsc::UnboundedSender<String>,
}

impl EventSink {
    fn emit(&self, method: &str, params: Value) {
        let notification = JsonRpcNotification::new(method, params);
        if let Ok(frame) = serde_json::to_string(&notification) {
            // receiver gone means the transport is shutting down
            let _ = self.tx.send(frame);
        }
    }
}

#[async_trait]
impl ProgressSink for EventSink {
    async fn info(&self, message: &str) {
        self.emit("event/info", serde_json::json!({ "message": message }));
    }

    async fn progress(&self, message: &str, percent: f64) {
        self.emit(
            "event/progress",
            serde_json::json!({ "message": message, "percent": percent }),
        );
    }

    async fn error(&self, message: &str, kind: &str) {
        self.emit(
            "event/error",
            serde_json::json!({ "message": message, "kind": kind }),
        );
    }

    async fn result(&self, value: &Value) {
        self.emit("event/result", serde_json::json!({ "value": value }));
    }
}

/// A dispatch failure ready to be framed as a response error
struct RpcFailure {
    code: i64,
    message: String,
    kind: Option<&'static str>,
}

impl RpcFailure {
    fn method_not_found(method: &str) -> Self {
        Self {
            code: METHOD_NOT_FOUND,
            message: format!("unknown method '{method}'"),
            kind: None,
        }
    }

    fn internal(message: String) -> Self {
        Self {
            code: INTERNAL_ERROR,
            message,
            kind: None,
        }
    }
}

impl From<Error> for RpcFailure {
    fn from(e: Error) -> Self {
        Self {
            code: error_code(&e),
            kind: Some(e.kind()),
            message: e.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct AddParams {
    url: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Deserialize)]
struct NameParams {
    name: String,
}

#[derive(Deserialize)]
struct UpdateParams {
    name: String,
    #[serde(default)]
    force: bool,
}

#[derive(Deserialize)]
struct CategoryParams {
    category: String,
}

#[derive(Deserialize)]
struct QueryParams {
    query: String,
}

#[derive(Deserialize)]
struct CreateProjectParams {
    template_name: String,
    output_dir: std::path::PathBuf,
    #[serde(default)]
    variables: serde_json::Map<String, Value>,
}

fn parse_params<T: DeserializeOwned>(params: Value) -> std::result::Result<T, RpcFailure> {
    serde_json::from_value(params).map_err(|e| RpcFailure {
        code: INVALID_PARAMS,
        message: format!("invalid params: {e}"),
        kind: Some("validation"),
    })
}

fn to_result<T: serde::Serialize>(value: T) -> std::result::Result<Value, RpcFailure> {
    serde_json::to_value(value).map_err(|e| RpcFailure::internal(e.to_string()))
}

async fn handle(
    orchestrator: &LifecycleOrchestrator,
    method: &str,
    params: Value,
) -> std::result::Result<Value, RpcFailure> {
    match method {
        "list_templates" => to_result(orchestrator.list_templates().await?),
        "list_templates_by_category" => {
            let p: CategoryParams = parse_params(params)?;
            to_result(orchestrator.list_templates_by_category(&p.category).await?)
        }
        "get_categories" => to_result(orchestrator.get_categories().await?),
        "search_templates" => {
            let p: QueryParams = parse_params(params)?;
            to_result(orchestrator.search_templates(&p.query).await?)
        }
        "add_template" => {
            let p: AddParams = parse_params(params)?;
            to_result(
                orchestrator
                    .add_template(&p.url, p.name, p.description, p.category, p.tags)
                    .await?,
            )
        }
        "update_template" => {
            let p: UpdateParams = parse_params(params)?;
            to_result(orchestrator.update_template(&p.name, p.force).await?)
        }
        "remove_template" => {
            let p: NameParams = parse_params(params)?;
            to_result(orchestrator.remove_template(&p.name).await?)
        }
        "discover_templates" => to_result(orchestrator.discover_templates().await?),
        "get_template_variables" => {
            let p: NameParams = parse_params(params)?;
            to_result(orchestrator.get_template_variables(&p.name).await?)
        }
        "create_project" => {
            let p: CreateProjectParams = parse_params(params)?;
            let request = GenerationRequest {
                template_name: p.template_name,
                output_directory: p.output_dir,
                parameter_values: p.variables,
            };
            to_result(orchestrator.create_project(&request).await?)
        }
        other => Err(RpcFailure::method_not_found(other)),
    }
}

/// Dispatch one raw input line; `None` for notifications (requests without
/// an id), which get no response frame.
async fn dispatch(orchestrator: &LifecycleOrchestrator, line: &str) -> Option<String> {
    let request: JsonRpcRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            let response = JsonRpcResponse::failure(
                Value::Null,
                PARSE_ERROR,
                format!("parse error: {e}"),
                None,
            );
            return serde_json::to_string(&response).ok();
        }
    };

    debug!(method = %request.method, "dispatching request");
    let outcome = handle(orchestrator, &request.method, request.params).await;

    let id = request.id?;
    let response = match outcome {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(failure) => JsonRpcResponse::failure(id, failure.code, failure.message, failure.kind),
    };
    serde_json::to_string(&response).ok()
}

/// JSON-RPC server over stdin/stdout
pub struct RpcServer {
    orchestrator: Arc<LifecycleOrchestrator>,
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

impl RpcServer {
    pub fn new(registry: Arc<TemplateRegistry>, materializer: ProjectMaterializer) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Arc::new(EventSink { tx: tx.clone() });
        let orchestrator = Arc::new(LifecycleOrchestrator::new(registry, materializer, sink));
        Self {
            orchestrator,
            tx,
            rx,
        }
    }

    /// Serve until stdin reaches end-of-file, then flush pending frames.
    pub async fn run(self) -> Result<()> {
        let Self {
            orchestrator,
            tx,
            mut rx,
        } = self;

        let writer = tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            while let Some(frame) = rx.recv().await {
                if stdout.write_all(frame.as_bytes()).await.is_err()
                    || stdout.write_all(b"\n").await.is_err()
                    || stdout.flush().await.is_err()
                {
                    warn!("stdout closed, dropping remaining frames");
                    break;
                }
            }
        });

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(response) = dispatch(&orchestrator, line).await {
                if tx.send(response).is_err() {
                    break;
                }
            }
        }

        // Close the channel so the writer drains and exits: the event sink
        // inside the orchestrator holds the other sender clone.
        drop(tx);
        drop(orchestrator);
        writer.await.map_err(|e| Error::Io(std::io::Error::other(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::environment::EnvironmentProvisioner;
    use crate::infrastructure::db::Catalog;
    use crate::infrastructure::exec::ScriptedRunner;
    use serde_json::json;
    use tempfile::tempdir;
    use types::DOMAIN_ERROR;

    const URL: &str = "https://github.com/acme/cookiecutter-pypackage";

    fn server(runner: ScriptedRunner) -> (tempfile::TempDir, RpcServer) {
        let dir = tempdir().unwrap();
        let catalog = Catalog::open(&dir.path().join("catalog.db")).unwrap();
        let provisioner = Arc::new(EnvironmentProvisioner::new(
            dir.path().join("envs"),
            Arc::new(runner),
        ));
        let registry = Arc::new(TemplateRegistry::new(provisioner.clone(), catalog).unwrap());
        let materializer = ProjectMaterializer::new(provisioner);
        (dir, RpcServer::new(registry, materializer))
    }

    async fn roundtrip(server: &RpcServer, line: &str) -> Value {
        let frame = dispatch(&server.orchestrator, line)
            .await
            .expect("request with an id always gets a response");
        serde_json::from_str(&frame).unwrap()
    }

    #[tokio::test]
    async fn test_list_templates_on_empty_registry() {
        let (_dir, server) = server(ScriptedRunner::new());
        let response = roundtrip(
            &server,
            r#"{"jsonrpc": "2.0", "id": 1, "method": "list_templates"}"#,
        )
        .await;
        assert_eq!(response["result"], json!([]));
    }

    #[tokio::test]
    async fn test_add_then_get_variables() {
        let runner =
            ScriptedRunner::new().with_schema(URL, json!({"project_name": "Sample"}));
        let (_dir, server) = server(runner);

        let add = roundtrip(
            &server,
            &format!(
                r#"{{"jsonrpc": "2.0", "id": 1, "method": "add_template", "params": {{"url": "{URL}"}}}}"#
            ),
        )
        .await;
        assert_eq!(add["result"]["name"], "pypackage");

        let vars = roundtrip(
            &server,
            r#"{"jsonrpc": "2.0", "id": 2, "method": "get_template_variables", "params": {"name": "pypackage"}}"#,
        )
        .await;
        assert_eq!(vars["result"][0]["name"], "project_name");
        assert_eq!(vars["result"][0]["kind"], "string");
    }

    #[tokio::test]
    async fn test_unknown_method_code() {
        let (_dir, server) = server(ScriptedRunner::new());
        let response = roundtrip(
            &server,
            r#"{"jsonrpc": "2.0", "id": 1, "method": "no_such_method"}"#,
        )
        .await;
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_missing_params_is_invalid_params() {
        let (_dir, server) = server(ScriptedRunner::new());
        let response = roundtrip(
            &server,
            r#"{"jsonrpc": "2.0", "id": 1, "method": "create_project", "params": {}}"#,
        )
        .await;
        assert_eq!(response["error"]["code"], INVALID_PARAMS);
        assert_eq!(response["error"]["data"]["kind"], "validation");
    }

    #[tokio::test]
    async fn test_domain_error_carries_kind() {
        let (_dir, server) = server(ScriptedRunner::new());
        let response = roundtrip(
            &server,
            r#"{"jsonrpc": "2.0", "id": 1, "method": "remove_template", "params": {"name": "ghost"}}"#,
        )
        .await;
        assert_eq!(response["error"]["code"], DOMAIN_ERROR);
        assert_eq!(response["error"]["data"]["kind"], "not_found");
        assert!(
            response["error"]["message"]
                .as_str()
                .unwrap()
                .contains("ghost")
        );
    }

    #[tokio::test]
    async fn test_parse_error_response() {
        let (_dir, server) = server(ScriptedRunner::new());
        let response = roundtrip(&server, "this is not json").await;
        assert_eq!(response["error"]["code"], PARSE_ERROR);
        assert_eq!(response["id"], Value::Null);
    }

    #[tokio::test]
    async fn test_notification_requests_get_no_response() {
        let (_dir, server) = server(ScriptedRunner::new());
        let frame = dispatch(
            &server.orchestrator,
            r#"{"jsonrpc": "2.0", "method": "list_templates"}"#,
        )
        .await;
        assert!(frame.is_none());
    }

    #[tokio::test]
    async fn test_workflow_emits_event_notifications() {
        let runner =
            ScriptedRunner::new().with_schema(URL, json!({"project_name": "Sample"}));
        let (_dir, mut server) = server(runner);

        roundtrip(
            &server,
            &format!(
                r#"{{"jsonrpc": "2.0", "id": 1, "method": "add_template", "params": {{"url": "{URL}"}}}}"#
            ),
        )
        .await;

        let mut methods = Vec::new();
        while let Ok(frame) = server.rx.try_recv() {
            let value: Value = serde_json::from_str(&frame).unwrap();
            methods.push(value["method"].as_str().unwrap().to_string());
        }
        assert!(methods.contains(&"event/info".to_string()));
        assert!(methods.contains(&"event/progress".to_string()));
        assert_eq!(methods.last().map(String::as_str), Some("event/result"));
    }
}
