mod authenticate;
mod csrf;
mod form_login;
mod http_client;
pub mod jwt;
mod token_login;

pub use authenticate::{Authenticator, Credentials, LoginStrategy};
pub use http_client::{build_client, decode_json, join, LoginMethod, Session};
pub use token_login::TokenLogin;
