use serde::Deserialize;
use serde_json::Value;

use crate::auth::jwt;
use crate::error::Result;

/// What Superset will let the bearer of a guest token see.
#[derive(Debug, Clone, Deserialize)]
pub struct GuestResource {
    #[serde(rename = "type")]
    pub kind: String,
    /// Either a UUID string or a numeric id, depending on who minted it.
    pub id: Value,
}

impl GuestResource {
    pub fn id_string(&self) -> String {
        match &self.id {
            Value::String(id) => id.clone(),
            other => other.to_string(),
        }
    }
}

/// The `aud` claim: a single audience or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::One(one) => one == audience,
            Audience::Many(many) => many.iter().any(|one| one == audience),
        }
    }
}

/// The claims of a Superset guest token.
#[derive(Debug, Clone, Deserialize)]
pub struct GuestClaims {
    #[serde(default)]
    pub exp: Option<u64>,
    #[serde(default)]
    pub aud: Option<Audience>,
    #[serde(default)]
    pub resources: Vec<GuestResource>,
}

impl GuestClaims {
    pub fn decode(token: &str) -> Result<Self> {
        jwt::decode_claims(token)
    }

    pub fn has_audience(&self, audience: &str) -> bool {
        self.aud.as_ref().is_some_and(|aud| aud.contains(audience))
    }

    pub fn dashboards(&self) -> impl Iterator<Item = String> + '_ {
        self.resources
            .iter()
            .filter(|resource| resource.kind == "dashboard")
            .map(GuestResource::id_string)
    }

    pub fn grants_dashboard(&self, dashboard: &str) -> bool {
        self.dashboards().any(|id| id == dashboard)
    }

    /// Seconds left, negative once expired.
    pub fn expires_in(&self, now: u64) -> Option<i64> {
        self.exp.map(|exp| jwt::seconds_until(exp, now))
    }
}
