use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::auth::Credentials;
use crate::error::Result;
use crate::patch::{DEFAULT_CONSTANT, DEFAULT_TARGET_FILE};
use crate::superset::{DashboardRef, PatchTarget, ProvisionOptions, ProvisioningPlan, ReadinessSettings};

/// Provision Superset for embedded dashboards
#[derive(Parser, Debug)]
#[command(name = "supersetctl", version)]
pub struct Args {
    /// Superset base URL
    #[arg(long, env = "SUPERSET_URL", default_value = "http://localhost:8088", global = true)]
    pub superset_url: Url,

    /// Superset admin username
    #[arg(long, env = "SUPERSET_USERNAME", default_value = "admin", global = true)]
    pub username: String,

    /// Superset admin password
    #[arg(
        long,
        env = "SUPERSET_PASSWORD",
        default_value = "admin",
        hide_env_values = true,
        hide_default_value = true,
        global = true
    )]
    pub password: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "SUPERSET_TIMEOUT_SECS", default_value_t = 10, global = true)]
    pub timeout_secs: u64,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Wait for Superset, log in, provision resources, and patch the backend
    Provision(ProvisionArgs),
    /// Wait until Superset answers its health check
    Wait(ReadinessArgs),
    /// List dashboards with their ids and UUIDs
    Dashboards,
    /// Set a string constant in a source file
    Patch(PatchArgs),
    /// Check that the backend issues a guest token for a brand
    EmbedCheck(EmbedCheckArgs),
}

#[derive(ClapArgs, Debug)]
pub struct ReadinessArgs {
    /// Path that answers 200 once Superset is up
    #[arg(long, default_value = "/health")]
    pub health_path: String,

    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_attempts: u32,

    /// Seconds between attempts
    #[arg(long, default_value_t = 2)]
    pub interval_secs: u64,

    /// Seconds to wait after the first healthy answer
    #[arg(long)]
    pub settle_secs: Option<u64>,
}

impl ReadinessArgs {
    pub fn settings(&self, default_settle: Duration) -> ReadinessSettings {
        ReadinessSettings {
            health_path: self.health_path.clone(),
            max_attempts: self.max_attempts,
            interval: Duration::from_secs(self.interval_secs),
            settle: self
                .settle_secs
                .map(Duration::from_secs)
                .unwrap_or(default_settle),
            ..ReadinessSettings::default()
        }
    }
}

#[derive(ClapArgs, Debug)]
pub struct ProvisionArgs {
    #[command(flatten)]
    pub readiness: ReadinessArgs,

    /// TOML file overriding the resources to provision
    #[arg(long, env = "SUPERSET_PLAN")]
    pub plan: Option<PathBuf>,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Which dashboard identifier to write into the backend
    #[arg(long, value_enum, default_value_t = DashboardRef::Uuid)]
    pub dashboard_ref: DashboardRef,

    /// Leave the backend source alone
    #[arg(long)]
    pub no_patch: bool,
}

#[derive(ClapArgs, Debug)]
pub struct TargetArgs {
    /// Source file holding the dashboard constant
    #[arg(long, default_value = DEFAULT_TARGET_FILE)]
    pub target_file: PathBuf,

    /// Name of the string constant to rewrite
    #[arg(long, default_value = DEFAULT_CONSTANT)]
    pub constant: String,
}

#[derive(ClapArgs, Debug)]
pub struct PatchArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// The new value
    pub value: String,
}

#[derive(ClapArgs, Debug)]
pub struct EmbedCheckArgs {
    /// Backend base URL
    #[arg(long, env = "BACKEND_URL", default_value = "http://localhost:8080")]
    pub backend_url: Url,

    #[arg(long, env = "BACKEND_EMAIL")]
    pub backend_email: String,

    #[arg(long, env = "BACKEND_PASSWORD", hide_env_values = true)]
    pub backend_password: String,

    /// Brand whose report page embeds the dashboard
    #[arg(long)]
    pub brand_id: String,

    /// Dashboard UUID or id the guest token should grant
    #[arg(long)]
    pub dashboard: Option<String>,
}

impl Args {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            identity: self.username.clone(),
            password: self.password.clone(),
        }
    }

    /// Everything a `provision` run needs, in one place.
    pub fn provision_options(&self, provision: &ProvisionArgs) -> Result<ProvisionOptions> {
        let plan = match &provision.plan {
            Some(path) => ProvisioningPlan::load(path)?,
            None => ProvisioningPlan::default(),
        };
        let patch = (!provision.no_patch).then(|| PatchTarget {
            file: provision.target.target_file.clone(),
            constant: provision.target.constant.clone(),
            dashboard_ref: provision.dashboard_ref,
        });

        Ok(ProvisionOptions {
            readiness: provision.readiness.settings(Duration::from_secs(5)),
            credentials: self.credentials(),
            request_timeout: self.timeout(),
            plan,
            patch,
        })
    }
}

impl EmbedCheckArgs {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            identity: self.backend_email.clone(),
            password: self.backend_password.clone(),
        }
    }
}
