mod auth;
mod backend;
mod config;
mod error;
mod patch;
mod superset;

use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::auth::{jwt, Authenticator, LoginMethod};
use crate::backend::{BackendClient, GuestClaims};
use crate::config::{Args, Command, EmbedCheckArgs, PatchArgs, ProvisionArgs};
use crate::error::Result;
use crate::patch::{ConstantPatcher, PatchOutcome};
use crate::superset::ReadinessPoller;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match run(&args).await {
        Ok(code) => code,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> Result<ExitCode> {
    match &args.command {
        Command::Provision(provision) => provision_command(args, provision).await,
        Command::Wait(readiness) => {
            ReadinessPoller::new(&args.superset_url, readiness.settings(Duration::ZERO))?
                .wait()
                .await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Dashboards => dashboards_command(args).await,
        Command::Patch(patch) => patch_command(patch),
        Command::EmbedCheck(check) => embed_check_command(args, check).await,
    }
}

async fn provision_command(args: &Args, provision: &ProvisionArgs) -> Result<ExitCode> {
    let options = args.provision_options(provision)?;
    let report = superset::run(&args.superset_url, &options).await?;

    if let Some(dashboard) = report.dashboard() {
        info!("dashboard id: {}", dashboard.id);
        match dashboard.uuid {
            Some(uuid) => info!("dashboard UUID: {uuid}"),
            None => warn!("dashboard UUID: unknown"),
        }
    }
    if let Some(Ok(database)) = &report.database {
        info!("database id: {}", database.id);
    }

    match &report.patch {
        Some(Ok(PatchOutcome::Changed { .. })) => {
            info!("restart the backend for the new dashboard to take effect")
        }
        Some(Ok(PatchOutcome::NotFound)) => {
            warn!("setup partially complete: the backend needs a manual update")
        }
        _ => {}
    }

    if report.succeeded() {
        info!("setup complete");
        Ok(ExitCode::SUCCESS)
    } else {
        error!("setup failed");
        Ok(ExitCode::FAILURE)
    }
}

async fn dashboards_command(args: &Args) -> Result<ExitCode> {
    let session = Authenticator::superset(args.superset_url.clone(), args.timeout())
        .authenticate(&args.credentials())
        .await?;
    if session.method() == LoginMethod::Form {
        debug!("listing over a cookie session");
    }
    let dashboards = superset::list_dashboards(&session).await?;

    info!("found {} dashboard(s)", dashboards.len());
    for dashboard in &dashboards {
        let url = session.url(&format!("/superset/dashboard/{}/", dashboard.id))?;
        info!(
            id = dashboard.id,
            uuid = dashboard.uuid.as_deref().unwrap_or("-"),
            slug = dashboard.slug.as_deref().unwrap_or("-"),
            published = dashboard.published.unwrap_or(false),
            %url,
            "{}",
            dashboard.dashboard_title.as_deref().unwrap_or("Untitled")
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn patch_command(patch: &PatchArgs) -> Result<ExitCode> {
    let patcher = ConstantPatcher::new(&patch.target.constant)?;
    // A miss is only a warning; the caller is expected to follow up by hand.
    let outcome = patcher.patch_file(&patch.target.target_file, &patch.value)?;
    if outcome.changed() {
        info!("restart the backend for the change to take effect");
    }
    Ok(ExitCode::SUCCESS)
}

async fn embed_check_command(args: &Args, check: &EmbedCheckArgs) -> Result<ExitCode> {
    let client =
        BackendClient::login(check.backend_url.clone(), &check.credentials(), args.timeout()).await?;
    let token = client.guest_token(&check.brand_id).await?;
    let claims = GuestClaims::decode(&token)?;

    let mut healthy = true;
    match claims.expires_in(jwt::now_timestamp()) {
        Some(seconds) if seconds <= 0 => {
            warn!("guest token expired {}s ago", -seconds);
            healthy = false;
        }
        Some(seconds) => info!("guest token valid for {seconds}s"),
        None => warn!("guest token has no expiry"),
    }
    if !claims.has_audience("superset") {
        warn!("guest token audience is {:?}, expected \"superset\"", claims.aud);
    }

    let granted: Vec<String> = claims.dashboards().collect();
    info!("guest token grants dashboard(s): {}", granted.join(", "));
    if let Some(dashboard) = &check.dashboard {
        if claims.grants_dashboard(dashboard) {
            info!("dashboard {dashboard} is embeddable for brand {}", check.brand_id);
        } else {
            error!("guest token does not grant dashboard {dashboard}");
            healthy = false;
        }
    }

    Ok(if healthy {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
