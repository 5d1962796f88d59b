//! The root!
//!
//! The most important part of Snipper, the actual redirect logic

use axum::Extension;
use axum::http::HeaderMap;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::http::header::LOCATION;

use crate::api::Error;
use crate::api::PathParameters;
use crate::registry;
use crate::registry::LinkRegistry;

/// The root!
///
/// A lookup in the registry will be done looking for the right code, based on the path
pub async fn root(
    Extension(registry): Extension<LinkRegistry>,
    PathParameters(code): PathParameters<String>,
) -> Result<(StatusCode, HeaderMap), Error> {
    tracing::debug!("Looking for code: /{code}");

    let mut headers = HeaderMap::new();

    let status_code = match registry.resolve(&code).await {
        Ok(url) => {
            tracing::debug!(r#"Code "{code}" redirecting to: {url}"#);

            let location = HeaderValue::from_str(&url).map_err(|err| {
                Error::internal_server_error("Stored URL is not a valid header")
                    .with_description(err)
            })?;
            headers.insert(LOCATION, location);

            StatusCode::TEMPORARY_REDIRECT
        }
        Err(registry::Error::NotFound) => {
            tracing::debug!(r#"Code "{code}" not found"#);

            StatusCode::NOT_FOUND
        }
        Err(registry::Error::Gone) => {
            tracing::debug!(r#"Code "{code}" no longer exists"#);

            StatusCode::GONE
        }
        Err(err) => return Err(err.into()),
    };

    Ok((status_code, headers))
}
