//! Current owner service
//!
//! Get the current owner from the identity cookie, or hand out a new identity

use std::ops::Deref;

use axum::Extension;
use axum::extract::FromRequestParts;
use axum::extract::Request;
use axum::http::HeaderValue;
use axum::http::header::SET_COOKIE;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;
use axum_extra::headers::Cookie;
use axum_extra::headers::HeaderMapExt;

use crate::api::Error;
use crate::api::Settings;
use crate::identity::IdentityKeys;
use crate::links::OwnerId;

/// Current owner service
#[derive(Clone, Copy, Debug)]
pub struct CurrentOwner {
    /// The owner behind the request
    owner_id: OwnerId,
}

impl Deref for CurrentOwner {
    type Target = OwnerId;

    fn deref(&self) -> &Self::Target {
        &self.owner_id
    }
}

impl<S> FromRequestParts<S> for CurrentOwner
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentOwner>()
            .copied()
            .ok_or_else(|| Error::internal_server_error("Could not get the current owner"))
    }
}

/// Identify the owner of every request
///
/// A valid cookie keeps its owner, anything else gets a new owner and a cookie to go with it
pub async fn identify(
    Extension(keys): Extension<IdentityKeys>,
    Extension(settings): Extension<Settings>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .typed_get::<Cookie>()
        .and_then(|cookie| cookie.get(&settings.cookie_name).map(str::to_string));

    let (owner_id, cookie) = match keys.verify(token.as_deref()) {
        Ok(owner_id) => (owner_id, None),
        Err(_) => match keys.issue() {
            Ok(token) => {
                tracing::debug!("Issued a new identity for owner {}", token.owner_id);

                let cookie = format!("{}={}; Path=/; HttpOnly", settings.cookie_name, token.value);

                (token.owner_id, Some(cookie))
            }
            Err(err) => {
                tracing::error!("Could not issue an identity: {err}");

                return Error::internal_server_error("Could not issue an identity")
                    .into_response();
            }
        },
    };

    request.extensions_mut().insert(CurrentOwner { owner_id });

    let mut response = next.run(request).await;

    if let Some(cookie) = cookie {
        match HeaderValue::from_str(&cookie) {
            Ok(cookie) => {
                response.headers_mut().append(SET_COOKIE, cookie);
            }
            Err(err) => tracing::error!("Invalid identity cookie: {err}"),
        }
    }

    response
}
