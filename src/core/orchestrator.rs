//! Lifecycle orchestrator: the engine's public face.
//!
//! Composes the registry, provisioner, schema extractor, and materializer
//! into the two end-to-end workflows (register a template, generate a
//! project) plus the read-side catalog operations. The orchestrator is the
//! sole emitter of progress events and the place where component failures
//! get workflow context attached before they surface to the transport.
//!
//! Every operation terminates with exactly one `result` or `error` event.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

use crate::core::error::{Error, Result};
use crate::core::materializer::ProjectMaterializer;
use crate::core::registry::TemplateRegistry;
use crate::core::types::{GenerationRequest, ParameterDescriptor, TemplateRecord};

/// Receiver for the progress/event contract emitted during workflows
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn info(&self, message: &str);
    async fn progress(&self, message: &str, percent: f64);
    async fn error(&self, message: &str, kind: &str);
    async fn result(&self, value: &Value);
}

/// Sink that forwards events to the tracing subscriber, used by the CLI
pub struct TracingSink;

#[async_trait]
impl ProgressSink for TracingSink {
    async fn info(&self, message: &str) {
        info!("{message}");
    }

    async fn progress(&self, message: &str, percent: f64) {
        info!(percent, "{message}");
    }

    async fn error(&self, message: &str, kind: &str) {
        error!(kind, "{message}");
    }

    async fn result(&self, _value: &Value) {}
}

/// Sequences the component calls for the public workflows
pub struct LifecycleOrchestrator {
    registry: Arc<TemplateRegistry>,
    materializer: ProjectMaterializer,
    sink: Arc<dyn ProgressSink>,
}

impl LifecycleOrchestrator {
    pub fn new(
        registry: Arc<TemplateRegistry>,
        materializer: ProjectMaterializer,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            registry,
            materializer,
            sink,
        }
    }

    /// Terminate a workflow: emit the result or error event, pass the
    /// outcome through unchanged.
    async fn finish<T: Serialize>(&self, step: &str, outcome: Result<T>) -> Result<T> {
        match outcome {
            Ok(value) => {
                let json = serde_json::to_value(&value)?;
                self.sink.result(&json).await;
                Ok(value)
            }
            Err(e) => {
                self.sink.error(&format!("{step}: {e}"), e.kind()).await;
                Err(e)
            }
        }
    }

    pub async fn list_templates(&self) -> Result<Vec<TemplateRecord>> {
        self.finish("list templates", Ok(self.registry.list().await))
            .await
    }

    pub async fn list_templates_by_category(
        &self,
        category: &str,
    ) -> Result<Vec<TemplateRecord>> {
        self.finish(
            "list templates by category",
            Ok(self.registry.list_by_category(category).await),
        )
        .await
    }

    pub async fn get_categories(&self) -> Result<Vec<String>> {
        let categories = self.registry.categories().await.into_iter().collect();
        self.finish("list categories", Ok(categories)).await
    }

    pub async fn search_templates(&self, query: &str) -> Result<Vec<TemplateRecord>> {
        self.finish("search templates", Ok(self.registry.search(query).await))
            .await
    }

    /// Register a template: provision, clone, extract, persist.
    pub async fn add_template(
        &self,
        url: &str,
        name: Option<String>,
        description: Option<String>,
        category: Option<String>,
        tags: Vec<String>,
    ) -> Result<TemplateRecord> {
        if url.is_empty() {
            let outcome = Err(Error::validation("source url must not be empty"));
            return self.finish("add template", outcome).await;
        }

        self.sink
            .info(&format!("registering template from {url}"))
            .await;
        self.sink
            .progress("provisioning environment and cloning template", 50.0)
            .await;

        let outcome = self
            .registry
            .add(url, name, description, category, tags)
            .await;
        self.finish(&format!("add template from '{url}'"), outcome)
            .await
    }

    /// Re-provision a registered template from its recorded source.
    pub async fn update_template(&self, name: &str, force: bool) -> Result<TemplateRecord> {
        self.sink
            .info(&format!("updating template '{name}'"))
            .await;
        let outcome = self.registry.update(name, force).await;
        self.finish(&format!("update template '{name}'"), outcome)
            .await
    }

    /// Destroy a template's environment and forget its record.
    pub async fn remove_template(&self, name: &str) -> Result<String> {
        let outcome = self
            .registry
            .remove(name)
            .await
            .map(|()| format!("template '{name}' removed"));
        self.finish(&format!("remove template '{name}'"), outcome)
            .await
    }

    pub async fn discover_templates(&self) -> Result<Vec<TemplateRecord>> {
        self.sink.info("discovering curated templates").await;
        let discovered = self.registry.discover().await;
        self.sink
            .progress(&format!("found {} candidate templates", discovered.len()), 100.0)
            .await;
        self.finish("discover templates", Ok(discovered)).await
    }

    pub async fn get_template_variables(&self, name: &str) -> Result<Vec<ParameterDescriptor>> {
        let outcome = self.registry.variables(name).await;
        self.finish(&format!("get variables for '{name}'"), outcome)
            .await
    }

    /// Generate a project from a registered, ready template.
    pub async fn create_project(&self, request: &GenerationRequest) -> Result<String> {
        let step = format!("create project from '{}'", request.template_name);

        if request.template_name.is_empty() {
            let outcome = Err(Error::validation("template_name must not be empty"));
            return self.finish(&step, outcome).await;
        }
        if request.output_directory.as_os_str().is_empty() {
            let outcome = Err(Error::validation("output_directory must not be empty"));
            return self.finish(&step, outcome).await;
        }

        self.sink
            .info(&format!(
                "generating project from template '{}'",
                request.template_name
            ))
            .await;

        let outcome = self.generate(request).await;
        self.finish(&step, outcome).await
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let record = self.registry.get(&request.template_name).await?;
        let path = self
            .materializer
            .materialize(
                &record,
                Path::new(&request.output_directory),
                &request.parameter_values,
            )
            .await?;
        Ok(path.to_string_lossy().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::environment::EnvironmentProvisioner;
    use crate::infrastructure::db::Catalog;
    use crate::infrastructure::exec::ScriptedRunner;
    use serde_json::json;
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Debug, PartialEq)]
    enum Event {
        Info(String),
        Progress(String),
        Error(String, String),
        Result,
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<Event>>,
    }

    #[async_trait]
    impl ProgressSink for RecordingSink {
        async fn info(&self, message: &str) {
            self.events.lock().unwrap().push(Event::Info(message.into()));
        }

        async fn progress(&self, message: &str, _percent: f64) {
            self.events
                .lock()
                .unwrap()
                .push(Event::Progress(message.into()));
        }

        async fn error(&self, message: &str, kind: &str) {
            self.events
                .lock()
                .unwrap()
                .push(Event::Error(message.into(), kind.into()));
        }

        async fn result(&self, _value: &Value) {
            self.events.lock().unwrap().push(Event::Result);
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        orchestrator: LifecycleOrchestrator,
        sink: Arc<RecordingSink>,
        out_dir: std::path::PathBuf,
    }

    const URL: &str = "https://github.com/acme/cookiecutter-pypackage";

    fn fixture(runner: ScriptedRunner) -> Fixture {
        let dir = tempdir().unwrap();
        let catalog = Catalog::open(&dir.path().join("catalog.db")).unwrap();
        let provisioner = Arc::new(EnvironmentProvisioner::new(
            dir.path().join("envs"),
            Arc::new(runner),
        ));
        let registry = Arc::new(TemplateRegistry::new(provisioner.clone(), catalog).unwrap());
        let materializer = ProjectMaterializer::new(provisioner);
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = LifecycleOrchestrator::new(registry, materializer, sink.clone());
        let out_dir = dir.path().join("out");
        Fixture {
            _dir: dir,
            orchestrator,
            sink,
            out_dir,
        }
    }

    fn default_runner() -> ScriptedRunner {
        ScriptedRunner::new().with_schema(URL, json!({"project_name": "Sample"}))
    }

    fn last_event_is_result(sink: &RecordingSink) -> bool {
        matches!(sink.events.lock().unwrap().last(), Some(Event::Result))
    }

    #[tokio::test]
    async fn test_register_workflow_terminates_with_result() {
        let fx = fixture(default_runner());

        let record = fx
            .orchestrator
            .add_template(URL, None, None, None, vec![])
            .await
            .unwrap();

        assert_eq!(record.name, "pypackage");
        assert!(last_event_is_result(&fx.sink));
    }

    #[tokio::test]
    async fn test_failed_workflow_terminates_with_error_event() {
        let fx = fixture(ScriptedRunner::new().failing_on("git clone"));

        let err = fx
            .orchestrator
            .add_template(URL, None, None, None, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Execution { .. }));

        let events = fx.sink.events.lock().unwrap();
        match events.last() {
            Some(Event::Error(message, kind)) => {
                assert!(message.contains(URL), "error event names the workflow");
                assert_eq!(kind, "execution");
            }
            other => panic!("expected a terminating error event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_project_workflow() {
        let fx = fixture(default_runner());
        fx.orchestrator
            .add_template(URL, None, None, None, vec![])
            .await
            .unwrap();

        let request = GenerationRequest {
            template_name: "pypackage".into(),
            output_directory: fx.out_dir.clone(),
            parameter_values: json!({"project_name": "Demo"})
                .as_object()
                .unwrap()
                .clone(),
        };
        let path = fx.orchestrator.create_project(&request).await.unwrap();

        assert!(path.ends_with("sample_project"));
        assert!(last_event_is_result(&fx.sink));
    }

    #[tokio::test]
    async fn test_create_project_unknown_template_is_not_found() {
        let fx = fixture(default_runner());

        let request = GenerationRequest {
            template_name: "ghost".into(),
            output_directory: fx.out_dir.clone(),
            parameter_values: serde_json::Map::new(),
        };
        let err = fx.orchestrator.create_project(&request).await.unwrap_err();

        assert!(matches!(err, Error::NotFound(_)));
        assert!(!fx.out_dir.exists());
    }

    #[tokio::test]
    async fn test_create_project_validates_boundary() {
        let fx = fixture(default_runner());

        let request = GenerationRequest {
            template_name: String::new(),
            output_directory: fx.out_dir.clone(),
            parameter_values: serde_json::Map::new(),
        };
        let err = fx.orchestrator.create_project(&request).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_read_side_operations_emit_results() {
        let fx = fixture(default_runner());
        fx.orchestrator
            .add_template(URL, None, None, Some("packaging".into()), vec![])
            .await
            .unwrap();

        assert_eq!(fx.orchestrator.list_templates().await.unwrap().len(), 1);
        assert_eq!(
            fx.orchestrator.get_categories().await.unwrap(),
            vec!["packaging".to_string()]
        );
        assert_eq!(
            fx.orchestrator
                .list_templates_by_category("packaging")
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            fx.orchestrator
                .get_template_variables("pypackage")
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(fx.orchestrator.discover_templates().await.unwrap().len() >= 4);
        assert!(last_event_is_result(&fx.sink));
    }
}
