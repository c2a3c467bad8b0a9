use serde::Deserialize;
use std::time::Duration;
use tracing::info;
use url::Url;

use crate::auth::{decode_json, Authenticator, Credentials, LoginStrategy, Session, TokenLogin};
use crate::error::Result;

/// The backend service that hands guest tokens to the frontend.
#[derive(Debug)]
pub struct BackendClient {
    session: Session,
}

#[derive(Deserialize)]
struct IframeResponse {
    token: String,
}

impl BackendClient {
    /// Logs in by email and password. The backend has no form login.
    pub async fn login(base_url: Url, credentials: &Credentials, timeout: Duration) -> Result<Self> {
        let session = Authenticator::new(base_url, timeout)
            .with_strategy(LoginStrategy::Token(TokenLogin::backend()))
            .authenticate(credentials)
            .await?;
        Ok(Self { session })
    }

    /// Asks for the guest token the brand page would embed its dashboard with.
    pub async fn guest_token(&self, brand_id: &str) -> Result<String> {
        let path = format!("/api/brands/{brand_id}/reports/iframe");
        let response = self.session.get(&path).await?;
        let body: IframeResponse = decode_json(response, &path).await?;
        info!("backend issued a guest token for brand {brand_id}");
        Ok(body.token)
    }
}
