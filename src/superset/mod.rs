mod plan;
mod provision;
mod readiness;
mod resources;

pub use plan::ProvisioningPlan;
pub use provision::{run, DashboardRef, PatchTarget, ProvisionOptions};
pub use readiness::{ReadinessPoller, ReadinessSettings};
pub use resources::{list_dashboards, ResourceKind};
