use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

/// Superset hands out a CSRF token for API writes here.
pub const CSRF_TOKEN_PATH: &str = "/api/v1/security/csrf_token/";

/// Builds the client every session is based on.
///
/// Cookies are kept so that form logins carry their session cookie
/// into every later request.
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .cookie_store(true)
        .timeout(timeout)
        .user_agent(concat!("supersetctl/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|error| Error::Config(format!("unable to build HTTP client: {error}")))
}

/// Appends `path` to `base`, keeping any path prefix `base` already has.
pub fn join(base: &Url, path: &str) -> Result<Url> {
    let joined = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&joined).map_err(|error| Error::Config(format!("invalid URL {joined}: {error}")))
}

/// Which login strategy produced a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMethod {
    Token,
    Form,
}

/// An authenticated request context.
///
/// Token logins carry a bearer token; form logins rely on the cookie jar
/// inside `client`. Either may also carry a CSRF token for writes.
#[derive(Debug)]
pub struct Session {
    client: Client,
    base_url: Url,
    bearer: Option<String>,
    csrf_token: Option<String>,
    method: LoginMethod,
}

#[derive(Deserialize)]
struct CsrfResponse {
    result: String,
}

impl Session {
    pub fn new(client: Client, base_url: Url, bearer: Option<String>, method: LoginMethod) -> Self {
        Self {
            client,
            base_url,
            bearer,
            csrf_token: None,
            method,
        }
    }

    pub fn with_csrf_token(mut self, csrf_token: Option<String>) -> Self {
        self.csrf_token = csrf_token;
        self
    }

    pub fn method(&self) -> LoginMethod {
        self.method
    }

    pub fn csrf_token(&self) -> Option<&str> {
        self.csrf_token.as_deref()
    }

    pub fn url(&self, path: &str) -> Result<Url> {
        join(&self.base_url, path)
    }

    /// Builds a request against our base URL with our credentials attached.
    fn request(&self, method: Method, path: &str) -> Result<(Url, RequestBuilder)> {
        let url = self.url(path)?;
        let mut request = self
            .client
            .request(method, url.clone())
            .header(header::ACCEPT, "application/json");
        if let Some(token) = &self.bearer {
            request = request.bearer_auth(token);
        }
        if let Some(csrf_token) = &self.csrf_token {
            request = request.header("X-CSRFToken", csrf_token);
        }
        Ok((url, request))
    }

    async fn send(url: Url, request: RequestBuilder) -> Result<Response> {
        debug!(%url, "sending request");
        request.send().await.map_err(|source| Error::Connectivity {
            url: url.to_string(),
            source,
        })
    }

    pub async fn get(&self, path: &str) -> Result<Response> {
        let (url, request) = self.request(Method::GET, path)?;
        Self::send(url, request).await
    }

    pub async fn get_query<Q: Serialize + ?Sized>(&self, path: &str, query: &Q) -> Result<Response> {
        let (url, request) = self.request(Method::GET, path)?;
        Self::send(url, request.query(query)).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Response> {
        let (url, request) = self.request(Method::POST, path)?;
        Self::send(url, request.json(body)).await
    }

    /// Asks Superset for a fresh CSRF token and attaches it to later requests.
    ///
    /// Failure here is not an error: plenty of deployments disable CSRF
    /// checks for bearer-authenticated API calls.
    pub async fn refresh_csrf_token(&mut self) -> Option<&str> {
        let response = match self.get(CSRF_TOKEN_PATH).await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!(status = %response.status(), "no CSRF token available");
                return self.csrf_token();
            }
            Err(error) => {
                debug!(%error, "unable to fetch CSRF token");
                return self.csrf_token();
            }
        };

        match response.json::<CsrfResponse>().await {
            Ok(body) => self.csrf_token = Some(body.result),
            Err(error) => debug!(%error, "CSRF token response was not understood"),
        }
        self.csrf_token()
    }
}

/// Checks for a 2xx status and parses the body as JSON.
pub async fn decode_json<T: DeserializeOwned>(response: Response, path: &str) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::UnexpectedResponse {
            path: path.to_string(),
            reason: format!("status {status}: {body}"),
        });
    }

    response
        .json()
        .await
        .map_err(|error| Error::UnexpectedResponse {
            path: path.to_string(),
            reason: format!("invalid JSON: {error}"),
        })
}
