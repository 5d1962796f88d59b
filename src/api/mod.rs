//! All API endpoint setup

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use axum::routing::post;

pub use current_owner::CurrentOwner;
pub use current_owner::identify;
pub use links::create_plain;
pub use links::ping;
pub use request::Form;
pub use request::PathParameters;
pub use response::Error;

mod current_owner;
mod links;
mod request;
mod response;

/// Settings the endpoints need from the configuration
#[derive(Clone, Debug)]
pub struct Settings {
    /// Prefix of every short URL handed out
    pub base_url: Arc<str>,

    /// Name of the identity cookie
    pub cookie_name: Arc<str>,
}

impl Settings {
    pub fn new(base_url: &str, cookie_name: &str) -> Self {
        Self {
            base_url: Arc::from(base_url),
            cookie_name: Arc::from(cookie_name),
        }
    }
}

/// Get the Axum router for all API routes
pub fn router() -> Router {
    Router::new()
        .route("/shorten", post(links::create_json))
        .route("/user/urls", get(links::list).delete(links::delete))
}
