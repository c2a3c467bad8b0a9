use reqwest::Client;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use url::Url;

use super::authenticate::Credentials;
use super::http_client::{join, LoginMethod, Session};
use super::jwt;
use crate::error::{Error, Result};

/// Login by POSTing JSON credentials and reading a bearer token back.
#[derive(Debug, Clone)]
pub struct TokenLogin {
    /// Endpoint path, relative to the base URL.
    pub path: String,
    /// Name of the JSON field holding the user's identity.
    pub identity_field: String,
    /// Name of the JSON field the token comes back in.
    pub token_field: String,
    /// Anything else the endpoint wants in the request body.
    pub extra: Map<String, Value>,
}

impl TokenLogin {
    /// Superset's Flask-AppBuilder security API.
    pub fn superset() -> Self {
        let mut extra = Map::new();
        extra.insert("provider".to_string(), json!("db"));
        extra.insert("refresh".to_string(), json!(true));
        Self {
            path: "/api/v1/security/login".to_string(),
            identity_field: "username".to_string(),
            token_field: "access_token".to_string(),
            extra,
        }
    }

    /// The backend service that embeds our dashboards logs in by email.
    pub fn backend() -> Self {
        Self {
            path: "/api/auth/login".to_string(),
            identity_field: "email".to_string(),
            token_field: "accessToken".to_string(),
            extra: Map::new(),
        }
    }

    pub(super) async fn login(
        &self,
        client: &Client,
        base_url: &Url,
        credentials: &Credentials,
    ) -> Result<Session> {
        let mut body = self.extra.clone();
        body.insert(self.identity_field.clone(), json!(credentials.identity));
        body.insert("password".to_string(), json!(credentials.password));

        let url = join(base_url, &self.path)?;
        debug!(%url, "attempting token login");
        let response = client
            .post(url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|source| Error::Connectivity {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Authentication(format!(
                "token endpoint returned {status}: {text}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|error| Error::UnexpectedResponse {
                path: self.path.clone(),
                reason: format!("invalid JSON: {error}"),
            })?;
        let Some(token) = body.get(&self.token_field).and_then(Value::as_str) else {
            return Err(Error::Authentication(format!(
                "token endpoint response has no {:?}",
                self.token_field
            )));
        };

        // Nothing refreshes this token; a long run has to log in again.
        match jwt::expires_in(token) {
            Ok(Some(seconds)) if seconds <= 0 => warn!("access token is already expired"),
            Ok(Some(seconds)) => info!("access token valid for {seconds}s"),
            Ok(None) => {}
            Err(error) => debug!(%error, "access token is not a readable JWT"),
        }

        Ok(Session::new(
            client.clone(),
            base_url.clone(),
            Some(token.to_string()),
            LoginMethod::Token,
        ))
    }
}
