use std::collections::HashMap;
use std::sync::Arc;

use snapward_core::config::JobConfig;
use tracing::{error, info};

use crate::{
    error::{Result, SchedulerError},
    registry::JobRegistry,
    types::{Cadence, Job, JobAction},
};

/// Builds a job's action from its descriptor (bound targets, arguments).
pub type ActionFactory =
    Box<dyn Fn(&JobConfig) -> anyhow::Result<Arc<dyn JobAction>> + Send + Sync>;

/// Action names from the config file mapped to typed factories, assembled at startup.
#[derive(Default)]
pub struct ActionCatalog {
    factories: HashMap<String, ActionFactory>,
}

impl ActionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, action: &str, factory: F)
    where
        F: Fn(&JobConfig) -> anyhow::Result<Arc<dyn JobAction>> + Send + Sync + 'static,
    {
        self.factories.insert(action.to_string(), Box::new(factory));
    }

    /// Known action names, sorted.
    pub fn actions(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Turn a descriptor into a [`Job`]: parse its cadence and resolve its action.
    pub fn build_job(&self, cfg: &JobConfig) -> Result<Job> {
        let cadence = Cadence::try_from(&cfg.schedule)?;
        let factory =
            self.factories
                .get(&cfg.action)
                .ok_or_else(|| SchedulerError::UnknownAction {
                    job: cfg.name.clone(),
                    action: cfg.action.clone(),
                })?;
        let action = factory(cfg).map_err(|e| SchedulerError::ActionSetup {
            job: cfg.name.clone(),
            reason: format!("{e:#}"),
        })?;

        Ok(Job::new(cfg.name.clone(), cadence, action)
            .with_description(cfg.description.clone())
            .with_enabled(cfg.enabled))
    }
}

/// Which descriptors made it into the registry.
#[derive(Debug, Default)]
pub struct RegistrationReport {
    pub registered: Vec<String>,
    /// `(job name, reason)` for every rejected descriptor.
    pub rejected: Vec<(String, String)>,
}

impl RegistrationReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Register every descriptor; a bad one is logged and skipped, never fatal.
pub async fn register_from_config(
    registry: &JobRegistry,
    catalog: &ActionCatalog,
    jobs: &[JobConfig],
) -> RegistrationReport {
    let mut report = RegistrationReport::default();
    for cfg in jobs {
        let outcome = match catalog.build_job(cfg) {
            Ok(job) => registry.register(job).await.map(|_| ()),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(()) => report.registered.push(cfg.name.clone()),
            Err(e) => {
                error!(job = %cfg.name, error = %e, "job registration failed");
                report.rejected.push((cfg.name.clone(), e.to_string()));
            }
        }
    }
    info!(
        registered = report.registered.len(),
        rejected = report.rejected.len(),
        "job registration complete"
    );
    report
}
