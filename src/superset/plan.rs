use serde::Deserialize;
use serde_json::{json, Value};
use std::{fs, path::Path};

use super::resources::{ResourceKind, ResourceSpec};
use crate::error::{Error, Result};

/// The resources a `provision` run makes sure of.
///
/// A `None` entry is skipped entirely. The dataset's `database` field is
/// filled in at run time with whatever id the database step produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisioningPlan {
    pub role: Option<ResourceSpec>,
    pub database: Option<ResourceSpec>,
    pub dataset: Option<ResourceSpec>,
    pub dashboard: Option<ResourceSpec>,
}

impl Default for ProvisioningPlan {
    fn default() -> Self {
        // Superset stores `extra` as a JSON string, not an object.
        let engine_params = json!({
            "engine_params": {
                "connect_args": {
                    "host": "trino",
                    "port": 8080,
                    "catalog": "mongodb",
                    "schema": "default",
                    "user": "admin"
                }
            }
        });

        Self {
            role: Some(ResourceSpec::new(ResourceKind::Role, "Guest", json!({}))),
            database: Some(ResourceSpec::new(
                ResourceKind::Database,
                "MongoDB via Trino",
                json!({
                    "sqlalchemy_uri": "trino://trino:8080/mongodb/default",
                    "configuration_method": "sqlalchemy_form",
                    "expose_in_sqllab": true,
                    "allow_run_async": true,
                    "allow_ctas": false,
                    "allow_cvas": false,
                    "allow_dml": false,
                    "extra": engine_params.to_string(),
                }),
            )),
            dataset: Some(ResourceSpec::new(
                ResourceKind::Dataset,
                "brands",
                json!({ "schema": "default" }),
            )),
            dashboard: Some(ResourceSpec::new(
                ResourceKind::Dashboard,
                "Brand Dashboard",
                json!({
                    "slug": "brand-dashboard",
                    "published": true,
                    "css": "",
                    "json_metadata": json!({
                        "timed_refresh_immune_slices": [],
                        "expanded_slices": {},
                        "refresh_frequency": 0,
                        "default_filters": "{}"
                    })
                    .to_string(),
                }),
            )),
        }
    }
}

/// One `[section]` of a plan file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct PlanEntry {
    name: Option<String>,
    skip: bool,
    /// Replaces the built-in payload when present.
    payload: Option<toml::Table>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct PlanFile {
    role: Option<PlanEntry>,
    database: Option<PlanEntry>,
    dataset: Option<PlanEntry>,
    dashboard: Option<PlanEntry>,
}

impl ProvisioningPlan {
    /// Reads a TOML plan file layered over the defaults.
    ///
    /// ```toml
    /// [dashboard]
    /// name = "Regional Dashboard"
    /// payload = { slug = "regional", published = true }
    ///
    /// [dataset]
    /// skip = true
    /// ```
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|error| Error::Config(format!("unable to read {}: {error}", path.display())))?;
        Self::from_toml(&contents)
            .map_err(|error| Error::Config(format!("{}: {error}", path.display())))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: PlanFile =
            toml::from_str(contents).map_err(|error| Error::Config(error.to_string()))?;
        let defaults = Self::default();

        Ok(Self {
            role: layer(defaults.role, file.role, ResourceKind::Role)?,
            database: layer(defaults.database, file.database, ResourceKind::Database)?,
            dataset: layer(defaults.dataset, file.dataset, ResourceKind::Dataset)?,
            dashboard: layer(defaults.dashboard, file.dashboard, ResourceKind::Dashboard)?,
        })
    }
}

fn layer(
    default: Option<ResourceSpec>,
    entry: Option<PlanEntry>,
    kind: ResourceKind,
) -> Result<Option<ResourceSpec>> {
    let Some(entry) = entry else {
        return Ok(default);
    };
    if entry.skip {
        return Ok(None);
    }

    let (default_name, default_payload) = match default {
        Some(spec) => (Some(spec.name), spec.payload),
        None => (None, json!({})),
    };
    let Some(name) = entry.name.or(default_name) else {
        return Err(Error::Config(format!("{kind} entry needs a name")));
    };
    let payload = match entry.payload {
        Some(table) => serde_json::to_value(table)
            .map_err(|error| Error::Config(format!("{kind} payload: {error}")))?,
        None => default_payload,
    };

    Ok(Some(ResourceSpec::new(kind, name, payload)))
}
