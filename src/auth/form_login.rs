use reqwest::{Client, StatusCode};
use tracing::{debug, warn};
use url::Url;

use super::authenticate::Credentials;
use super::csrf::CsrfPatterns;
use super::http_client::{join, LoginMethod, Session};
use crate::error::{Error, Result};

/// The classic HTML login form, guarded by a CSRF token we scrape off the page.
#[derive(Debug, Clone)]
pub struct FormLogin {
    /// Path of the login page; the form posts back to the same path.
    pub path: String,
    /// Substrings of the post-login URL that mean we got in.
    pub success_markers: Vec<String>,
    pub csrf_patterns: CsrfPatterns,
}

impl FormLogin {
    pub fn superset() -> Self {
        Self {
            path: "/login/".to_string(),
            success_markers: vec!["dashboard".to_string(), "welcome".to_string()],
            csrf_patterns: CsrfPatterns::default(),
        }
    }

    pub(super) async fn login(
        &self,
        client: &Client,
        base_url: &Url,
        credentials: &Credentials,
    ) -> Result<Session> {
        let login_url = join(base_url, &self.path)?;
        let connectivity = |source| Error::Connectivity {
            url: login_url.to_string(),
            source,
        };

        // Fetching the page also gives us the session cookie the token is tied to.
        let page = client
            .get(login_url.clone())
            .send()
            .await
            .map_err(connectivity)?;
        if !page.status().is_success() {
            return Err(Error::Authentication(format!(
                "login page returned {}",
                page.status()
            )));
        }
        let html = page.text().await.map_err(connectivity)?;

        let csrf_token = self.csrf_patterns.extract(&html).map(str::to_string);
        match &csrf_token {
            Some(_) => debug!("found CSRF token on the login page"),
            None => warn!("no CSRF token on the login page; submitting without one"),
        }

        let mut form = vec![
            ("username", credentials.identity.as_str()),
            ("password", credentials.password.as_str()),
        ];
        if let Some(token) = &csrf_token {
            form.push(("csrf_token", token.as_str()));
        }

        let response = client
            .post(login_url.clone())
            .form(&form)
            .send()
            .await
            .map_err(connectivity)?;
        let status = response.status();
        let final_url = response.url().clone();
        debug!(%status, %final_url, "form login answered");

        if !self.accepts(status, &final_url, &login_url) {
            return Err(Error::Authentication(format!(
                "form login returned {status} at {final_url}"
            )));
        }

        Ok(Session::new(client.clone(), base_url.clone(), None, LoginMethod::Form)
            .with_csrf_token(csrf_token))
    }

    /// Superset redirects away from the login page on success and
    /// re-renders it on failure.
    fn accepts(&self, status: StatusCode, final_url: &Url, login_url: &Url) -> bool {
        let final_path = final_url.path();
        if self
            .success_markers
            .iter()
            .any(|marker| final_path.contains(marker.as_str()))
        {
            return true;
        }
        if status == StatusCode::FOUND {
            return true;
        }
        status == StatusCode::OK && final_path != login_url.path()
    }
}
