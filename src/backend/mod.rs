mod client;
mod guest_token;

pub use client::BackendClient;
pub use guest_token::GuestClaims;
