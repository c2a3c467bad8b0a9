use clap::ValueEnum;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;
use url::Url;

use super::plan::ProvisioningPlan;
use super::readiness::{ReadinessPoller, ReadinessSettings};
use super::resources::{self, Provisioned};
use crate::auth::{Authenticator, Credentials};
use crate::error::Result;
use crate::patch::{ConstantPatcher, PatchOutcome};

/// Which dashboard identifier gets written into the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DashboardRef {
    /// The embedded SDK wants the UUID.
    Uuid,
    /// The numeric id, for `/superset/dashboard/<id>/` URLs.
    Id,
}

#[derive(Debug, Clone)]
pub struct PatchTarget {
    pub file: PathBuf,
    pub constant: String,
    pub dashboard_ref: DashboardRef,
}

#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    pub readiness: ReadinessSettings,
    pub credentials: Credentials,
    pub request_timeout: Duration,
    pub plan: ProvisioningPlan,
    /// `None` to leave the backend alone.
    pub patch: Option<PatchTarget>,
}

/// What happened to each step. `None` means the step didn't run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub role: Option<Result<Provisioned>>,
    pub database: Option<Result<Provisioned>>,
    pub dataset: Option<Result<Provisioned>>,
    pub dashboard: Option<Result<Provisioned>>,
    pub patch: Option<Result<PatchOutcome>>,
    pub patch_requested: bool,
}

impl RunReport {
    pub fn dashboard(&self) -> Option<&Provisioned> {
        self.dashboard.as_ref()?.as_ref().ok()
    }

    /// A run succeeds when it ends up with a dashboard, and the backend
    /// (if we were asked to touch it) either points at it or needs a
    /// manual edit we already warned about.
    pub fn succeeded(&self) -> bool {
        let patch_ok = match &self.patch {
            Some(result) => result.is_ok(),
            None => !self.patch_requested,
        };
        self.dashboard().is_some() && patch_ok
    }
}

/// Hands back fatal errors so the run can stop; anything else is kept
/// for the report.
fn checked(step: &str, result: Result<Provisioned>) -> Result<Result<Provisioned>> {
    match result {
        Err(error) if error.is_fatal() => Err(error),
        Err(error) => {
            warn!("{step}: {error}");
            Ok(Err(error))
        }
        ok => Ok(ok),
    }
}

/// Waits for Superset, logs in, and provisions everything in the plan.
///
/// Readiness and login must succeed. Later steps are recorded in the report
/// and the run carries on, unless Superset stops answering altogether.
/// Nothing is rolled back.
pub async fn run(base_url: &Url, options: &ProvisionOptions) -> Result<RunReport> {
    let mut report = RunReport::default();

    ReadinessPoller::new(base_url, options.readiness.clone())?
        .wait()
        .await?;

    let mut session = Authenticator::superset(base_url.clone(), options.request_timeout)
        .authenticate(&options.credentials)
        .await?;

    let plan = &options.plan;
    if let Some(spec) = &plan.role {
        let result = resources::ensure(&mut session, spec).await;
        report.role = Some(checked("role", result)?);
    }

    if let Some(spec) = &plan.database {
        let result = resources::ensure(&mut session, spec).await;
        report.database = Some(checked("database", result)?);
    }

    // A dataset can't exist without its database. Failing to create one,
    // even by timing out, never fails the run.
    if let Some(spec) = &plan.dataset {
        match report.database.as_ref().and_then(|result| result.as_ref().ok()) {
            Some(database) => {
                let spec = spec.clone().with_field("database", json!(database.id));
                let result = resources::ensure(&mut session, &spec).await;
                if let Err(error) = &result {
                    warn!("dataset is optional, continuing: {error}");
                }
                report.dataset = Some(result);
            }
            None => warn!("skipping dataset {:?}: no database connection", spec.name),
        }
    }

    if let Some(spec) = &plan.dashboard {
        let result = resources::ensure_dashboard(&mut session, spec).await;
        report.dashboard = Some(checked("dashboard", result)?);
    }

    if let Some(target) = &options.patch {
        report.patch_requested = true;
        report.patch = patch_backend(report.dashboard(), target);
    }

    Ok(report)
}

fn patch_backend(dashboard: Option<&Provisioned>, target: &PatchTarget) -> Option<Result<PatchOutcome>> {
    let Some(dashboard) = dashboard else {
        warn!("no dashboard to point the backend at");
        return None;
    };

    let value = match target.dashboard_ref {
        DashboardRef::Id => dashboard.id.to_string(),
        DashboardRef::Uuid => match dashboard.uuid {
            Some(uuid) => uuid.to_string(),
            None => {
                warn!(
                    "dashboard {} has no known UUID; not patching {}",
                    dashboard.id,
                    target.file.display()
                );
                return None;
            }
        },
    };

    let result = ConstantPatcher::new(&target.constant)
        .and_then(|patcher| patcher.patch_file(&target.file, &value));
    if let Err(error) = &result {
        warn!("{error}");
    }
    Some(result)
}
