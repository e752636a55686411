//! Template registry: the catalog of known templates and the add/update/
//! remove lifecycle around their environments.
//!
//! The in-memory map is the single source of truth while the process runs;
//! the SQLite catalog mirrors it for durability and hydrates it at startup.
//! All mutating operations on a given template name are serialized through a
//! per-name async lock, so two concurrent `add` calls for the same name
//! cannot interleave their provision/persist sequences.
//!
//! State machine per record: `unregistered -> provisioning -> ready` on
//! success; a provisioning failure rolls the environment back and leaves the
//! name unregistered. `ready -> provisioning` on update, `-> removed` on
//! remove. No partially-ready state is observable from the outside.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use once_cell::sync::Lazy;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use url::Url;

use crate::core::environment::{EnvironmentProvisioner, EnvironmentRef};
use crate::core::error::{Error, Result};
use crate::core::schema;
use crate::core::types::{ParameterDescriptor, TemplateRecord};
use crate::infrastructure::db::Catalog;

/// Convention prefix stripped when deriving a template name from its URL
const TEMPLATE_PREFIX: &str = "cookiecutter-";

struct CuratedTemplate {
    name: &'static str,
    url: &'static str,
    description: &'static str,
    category: &'static str,
    tags: Vec<&'static str>,
}

/// Well-known template sources offered by `discover`
static CURATED: Lazy<Vec<CuratedTemplate>> = Lazy::new(|| {
    vec![
        CuratedTemplate {
            name: "python-package",
            url: "https://github.com/audreyfeldroy/cookiecutter-pypackage.git",
            description: "Cookiecutter template for a Python package",
            category: "packaging",
            tags: vec!["python", "pypi"],
        },
        CuratedTemplate {
            name: "django",
            url: "https://github.com/pydanny/cookiecutter-django.git",
            description: "Cookiecutter template for Django projects",
            category: "web",
            tags: vec!["python", "django"],
        },
        CuratedTemplate {
            name: "flask",
            url: "https://github.com/cookiecutter-flask/cookiecutter-flask.git",
            description: "Cookiecutter template for Flask projects",
            category: "web",
            tags: vec!["python", "flask"],
        },
        CuratedTemplate {
            name: "fastapi",
            url: "https://github.com/tiangolo/full-stack-fastapi-postgresql.git",
            description: "Cookiecutter template for FastAPI projects",
            category: "web",
            tags: vec!["python", "fastapi"],
        },
        CuratedTemplate {
            name: "data-science",
            url: "https://github.com/drivendata/cookiecutter-data-science.git",
            description: "Cookiecutter template for data science projects",
            category: "data-science",
            tags: vec!["python", "jupyter"],
        },
    ]
});

/// Derive a registry name from a template source URL.
///
/// Takes the last path segment, strips a `.git` suffix and the
/// `cookiecutter-` prefix; when that leaves nothing, falls back to earlier
/// segments.
pub fn derive_name(source_url: &str) -> Result<String> {
    let path = match Url::parse(source_url) {
        Ok(parsed) => parsed.path().to_string(),
        // scp-style git remotes (git@host:owner/repo.git) are not URLs
        Err(_) => source_url
            .rsplit(':')
            .next()
            .unwrap_or(source_url)
            .to_string(),
    };

    for segment in path.split('/').rev().filter(|s| !s.is_empty()) {
        let name = segment.strip_suffix(".git").unwrap_or(segment);
        let name = name.strip_prefix(TEMPLATE_PREFIX).unwrap_or(name);
        if !name.is_empty() {
            return Ok(name.to_string());
        }
    }

    Err(Error::validation(format!(
        "cannot derive a template name from '{source_url}'"
    )))
}

/// The catalog of known templates, exclusive owner of all [`TemplateRecord`]s
pub struct TemplateRegistry {
    templates: RwLock<HashMap<String, TemplateRecord>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    provisioner: Arc<EnvironmentProvisioner>,
    catalog: Catalog,
}

impl TemplateRegistry {
    /// Build a registry hydrated from the persisted catalog.
    ///
    /// `ready` is re-validated against the filesystem: a record claiming an
    /// environment that no longer holds a template checkout is demoted.
    pub fn new(provisioner: Arc<EnvironmentProvisioner>, catalog: Catalog) -> Result<Self> {
        let mut templates = HashMap::new();
        for mut record in catalog.load_all()? {
            let checkout_present = record
                .environment_handle
                .as_deref()
                .is_some_and(|root| root.join("template").exists());
            if record.ready && !checkout_present {
                warn!(
                    template = %record.name,
                    "persisted record claims a missing environment, demoting to not-ready"
                );
                record.ready = false;
            }
            templates.insert(record.name.clone(), record);
        }

        info!(count = templates.len(), "registry hydrated from catalog");
        Ok(Self {
            templates: RwLock::new(templates),
            locks: Mutex::new(HashMap::new()),
            provisioner,
            catalog,
        })
    }

    async fn name_lock(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Register a template: provision an environment, clone the source into
    /// it, extract the parameter schema, and persist the record.
    ///
    /// On any mid-sequence failure the partially created environment is
    /// destroyed and the original error surfaces; no orphaned environments,
    /// no record.
    pub async fn add(
        &self,
        source_url: &str,
        name: Option<String>,
        description: Option<String>,
        category: Option<String>,
        tags: Vec<String>,
    ) -> Result<TemplateRecord> {
        let name = match name.filter(|n| !n.is_empty()) {
            Some(n) => n,
            None => derive_name(source_url)?,
        };

        let lock = self.name_lock(&name).await;
        let _guard = lock.lock().await;

        if self.templates.read().await.contains_key(&name) {
            return Err(Error::validation(format!(
                "template '{name}' is already registered"
            )));
        }

        self.provision(&name, source_url, description, category, tags)
            .await
    }

    /// Re-provision an existing template from its recorded source URL.
    ///
    /// Every update is a full destroy-and-recreate; `force` is accepted for
    /// interface compatibility but changes nothing. The schema cache is
    /// rebuilt from the fresh checkout, so it is invalidated by construction.
    pub async fn update(&self, name: &str, force: bool) -> Result<TemplateRecord> {
        if force {
            info!(template = name, "force requested; updates always re-provision");
        }

        let lock = self.name_lock(name).await;
        let _guard = lock.lock().await;

        let existing = self
            .templates
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        let description = Some(existing.description).filter(|d| !d.is_empty());
        let result = self
            .provision(
                name,
                &existing.source_url,
                description,
                existing.category,
                existing.tags,
            )
            .await;

        // A failed re-provision has already destroyed the old environment, so
        // the record cannot stay registered as ready.
        if result.is_err() {
            self.catalog.delete(name)?;
            self.templates.write().await.remove(name);
        }
        result
    }

    /// Provision sequence shared by add and update. Caller holds the
    /// per-name lock.
    async fn provision(
        &self,
        name: &str,
        source_url: &str,
        description: Option<String>,
        category: Option<String>,
        tags: Vec<String>,
    ) -> Result<TemplateRecord> {
        info!(template = name, url = source_url, "provisioning template");
        let env = self.provisioner.create(name).await?;

        // Populate and persist inside one rollback scope: a failure anywhere
        // up to and including the catalog write must not leave an environment
        // behind without a record pointing at it.
        let populated: Result<TemplateRecord> = async {
            let record = self
                .populate(&env, name, source_url, description, category, tags)
                .await?;
            self.catalog.upsert(&record)?;
            Ok(record)
        }
        .await;

        let record = match populated {
            Ok(record) => record,
            Err(e) => {
                if let Err(destroy_err) = self.provisioner.destroy(&env).await {
                    warn!(
                        template = name,
                        error = %destroy_err,
                        "failed to roll back environment after provisioning error"
                    );
                }
                return Err(e);
            }
        };

        match self.provisioner.git_head(&env).await {
            Ok(head) => {
                if let Err(e) = self.catalog.record_version(name, &head) {
                    warn!(template = name, error = %e, "failed to record template version");
                }
            }
            Err(e) => warn!(template = name, error = %e, "failed to read checkout head"),
        }

        self.templates
            .write()
            .await
            .insert(name.to_string(), record.clone());
        info!(template = name, "template registered");
        Ok(record)
    }

    async fn populate(
        &self,
        env: &EnvironmentRef,
        name: &str,
        source_url: &str,
        description: Option<String>,
        category: Option<String>,
        tags: Vec<String>,
    ) -> Result<TemplateRecord> {
        self.provisioner.clone_template(env, source_url).await?;

        let checkout = env.template_dir();
        let parameters = schema::extract(&checkout)?;
        let description = description
            .or_else(|| schema::embedded_description(&checkout))
            .unwrap_or_default();

        Ok(TemplateRecord {
            name: name.to_string(),
            source_url: source_url.to_string(),
            description,
            category,
            tags,
            environment_handle: Some(env.root().to_path_buf()),
            ready: true,
            last_updated: Utc::now(),
            parameter_schema_cache: Some(parameters),
        })
    }

    /// Destroy the template's environment and delete its record.
    pub async fn remove(&self, name: &str) -> Result<()> {
        let lock = self.name_lock(name).await;
        let _guard = lock.lock().await;

        if !self.templates.read().await.contains_key(name) {
            return Err(Error::NotFound(name.to_string()));
        }

        let env = self.provisioner.env_ref(name);
        self.provisioner.destroy(&env).await?;
        self.catalog.delete(name)?;
        self.templates.write().await.remove(name);

        // Prune the name's lock entry so the map does not grow unboundedly
        // over the process lifetime. Strong count 1 means only the map still
        // holds the Arc: no other task is waiting on this name.
        drop(_guard);
        drop(lock);
        let mut locks = self.locks.lock().await;
        if locks.get(name).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(name);
        }

        info!(template = name, "template removed");
        Ok(())
    }

    /// Look up a single record by name.
    pub async fn get(&self, name: &str) -> Result<TemplateRecord> {
        self.templates
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    /// All records, ordered by name.
    pub async fn list(&self) -> Vec<TemplateRecord> {
        let mut records: Vec<_> = self.templates.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    /// Records whose category matches exactly, ordered by name.
    pub async fn list_by_category(&self, category: &str) -> Vec<TemplateRecord> {
        let mut records: Vec<_> = self
            .templates
            .read()
            .await
            .values()
            .filter(|r| r.category.as_deref() == Some(category))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    /// The distinct set of categories in use.
    pub async fn categories(&self) -> BTreeSet<String> {
        self.templates
            .read()
            .await
            .values()
            .filter_map(|r| r.category.clone())
            .collect()
    }

    /// Case-insensitive substring search over name, description, category,
    /// and tags. Membership only; no relevance ordering beyond name order.
    pub async fn search(&self, query: &str) -> Vec<TemplateRecord> {
        let needle = query.to_lowercase();
        let mut records: Vec<_> = self
            .templates
            .read()
            .await
            .values()
            .filter(|r| {
                r.name.to_lowercase().contains(&needle)
                    || r.description.to_lowercase().contains(&needle)
                    || r
                        .category
                        .as_ref()
                        .is_some_and(|c| c.to_lowercase().contains(&needle))
                    || r.tags.iter().any(|t| t.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    /// Curated well-known templates not already present in the registry.
    ///
    /// Discovered entries have no environment and `ready == false` until
    /// explicitly added.
    pub async fn discover(&self) -> Vec<TemplateRecord> {
        let registered = self.templates.read().await;
        CURATED
            .iter()
            .filter(|c| !registered.contains_key(c.name))
            .map(|c| {
                TemplateRecord::unprovisioned(
                    c.name,
                    c.url,
                    c.description,
                    Some(c.category.to_string()),
                    c.tags.iter().map(|t| t.to_string()).collect(),
                )
            })
            .collect()
    }

    /// The template's parameter schema, from cache when available.
    ///
    /// Deterministic and cache-stable: once populated, repeated calls return
    /// the same sequence without re-reading the parameter file until an
    /// update re-provisions the template.
    pub async fn variables(&self, name: &str) -> Result<Vec<ParameterDescriptor>> {
        {
            let templates = self.templates.read().await;
            let record = templates
                .get(name)
                .ok_or_else(|| Error::NotFound(name.to_string()))?;
            if let Some(cache) = &record.parameter_schema_cache {
                return Ok(cache.clone());
            }
        }

        // Cache miss: extract from the checkout under the per-name lock.
        let lock = self.name_lock(name).await;
        let _guard = lock.lock().await;

        let record = self.get(name).await?;
        if let Some(cache) = record.parameter_schema_cache {
            return Ok(cache);
        }
        let root = record
            .environment_handle
            .ok_or_else(|| Error::TemplateNotReady(name.to_string()))?;

        let parameters = schema::extract(&root.join("template"))?;
        let mut templates = self.templates.write().await;
        if let Some(record) = templates.get_mut(name) {
            record.parameter_schema_cache = Some(parameters.clone());
            self.catalog.upsert(record)?;
        }
        Ok(parameters)
    }
}
