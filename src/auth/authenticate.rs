use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use super::form_login::FormLogin;
use super::http_client::{build_client, Session};
use super::token_login::TokenLogin;
use crate::error::{Error, Result};

/// Who we log in as. `identity` is a username for Superset and an email
/// address for the backend service.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub identity: String,
    pub password: String,
}

/// One way of obtaining a session.
#[derive(Debug, Clone)]
pub enum LoginStrategy {
    Token(TokenLogin),
    Form(FormLogin),
}

impl LoginStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            LoginStrategy::Token(_) => "token login",
            LoginStrategy::Form(_) => "form login",
        }
    }
}

/// Tries each login strategy in order until one of them produces a session.
///
/// Every strategy starts from a fresh client so that cookies left behind by
/// a failed attempt cannot leak into the next one. A failure of every
/// strategy is terminal; we never retry credentials.
#[derive(Debug, Clone)]
pub struct Authenticator {
    base_url: Url,
    timeout: Duration,
    strategies: Vec<LoginStrategy>,
}

impl Authenticator {
    pub fn new(base_url: Url, timeout: Duration) -> Self {
        Self {
            base_url,
            timeout,
            strategies: Vec::new(),
        }
    }

    /// Token login first, then the HTML form as a fallback.
    pub fn superset(base_url: Url, timeout: Duration) -> Self {
        Self::new(base_url, timeout)
            .with_strategy(LoginStrategy::Token(TokenLogin::superset()))
            .with_strategy(LoginStrategy::Form(FormLogin::superset()))
    }

    pub fn with_strategy(mut self, strategy: LoginStrategy) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub async fn authenticate(&self, credentials: &Credentials) -> Result<Session> {
        let mut failures = Vec::new();

        for strategy in &self.strategies {
            let client = build_client(self.timeout)?;
            let attempt = match strategy {
                LoginStrategy::Token(login) => login.login(&client, &self.base_url, credentials).await,
                LoginStrategy::Form(login) => login.login(&client, &self.base_url, credentials).await,
            };

            match attempt {
                Ok(session) => {
                    info!("logged in to {} via {}", self.base_url, strategy.name());
                    return Ok(session);
                }
                Err(error) => {
                    warn!("{} failed: {error}", strategy.name());
                    failures.push(format!("{}: {error}", strategy.name()));
                }
            }
        }

        if failures.is_empty() {
            return Err(Error::Authentication(
                "no login strategies configured".to_string(),
            ));
        }
        Err(Error::Authentication(failures.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{jwt, LoginMethod};
    use serde_json::json;
    use wiremock::matchers::{body_json, body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LOGIN_PAGE: &str = r#"<html><form method="post">
        <input id="csrf_token" name="csrf_token" type="hidden" value="csrf-from-page">
        <input name="username"><input name="password" type="password">
        </form></html>"#;

    fn admin() -> Credentials {
        Credentials {
            identity: "admin".to_string(),
            password: "admin".to_string(),
        }
    }

    fn authenticator(server: &MockServer) -> Authenticator {
        Authenticator::superset(
            Url::parse(&server.uri()).unwrap(),
            Duration::from_secs(5),
        )
    }

    async fn mount_form_login(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/login/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_PAGE))
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/login/"))
            .and(body_string_contains("csrf_token=csrf-from-page"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", "/superset/welcome/"),
            )
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/superset/welcome/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_token_login_attaches_bearer() {
        let server = MockServer::start().await;
        let token = jwt::encode_unsigned(&json!({ "sub": 1, "exp": jwt::now_timestamp() + 900 }));
        Mock::given(method("POST"))
            .and(path("/api/v1/security/login"))
            .and(body_json(json!({
                "username": "admin",
                "password": "admin",
                "provider": "db",
                "refresh": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": token,
                "refresh_token": "unused"
            })))
            .mount(&server)
            .await;
        // The form path must not be touched when the token path works.
        Mock::given(method("GET"))
            .and(path("/login/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v1/dashboard/"))
            .and(header("Authorization", format!("Bearer {token}").as_str()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let session = authenticator(&server).authenticate(&admin()).await.unwrap();
        assert_eq!(session.method(), LoginMethod::Token);
        let response = session.get("/api/v1/dashboard/").await.unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn test_token_failure_falls_back_to_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/security/login"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "message": "Not authorized"
            })))
            .expect(1)
            .mount(&server)
            .await;
        mount_form_login(&server).await;

        let session = authenticator(&server).authenticate(&admin()).await.unwrap();
        assert_eq!(session.method(), LoginMethod::Form);
        assert_eq!(session.csrf_token(), Some("csrf-from-page"));
    }

    #[tokio::test]
    async fn test_token_response_without_token_falls_back_to_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/security/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;
        mount_form_login(&server).await;

        let session = authenticator(&server).authenticate(&admin()).await.unwrap();
        assert_eq!(session.method(), LoginMethod::Form);
    }

    #[tokio::test]
    async fn test_all_strategies_failing_is_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/security/login"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/login/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_PAGE))
            .expect(1)
            .mount(&server)
            .await;
        // Bad credentials: Superset just renders the login page again.
        Mock::given(method("POST"))
            .and(path("/login/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_PAGE))
            .expect(1)
            .mount(&server)
            .await;

        let err = authenticator(&server).authenticate(&admin()).await.unwrap_err();
        assert!(err.is_fatal());
        let Error::Authentication(reason) = err else {
            panic!("expected an authentication error, got {err:?}");
        };
        assert!(reason.contains("token login"));
        assert!(reason.contains("form login"));
    }

    #[tokio::test]
    async fn test_no_strategies() {
        let server = MockServer::start().await;
        let authenticator = Authenticator::new(Url::parse(&server.uri()).unwrap(), Duration::from_secs(1));
        let err = authenticator.authenticate(&admin()).await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }
}
