//! Links API endpoints

use axum::Extension;
use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use serde::Deserialize;
use serde::Serialize;

use crate::api::CurrentOwner;
use crate::api::Error;
use crate::api::Form;
use crate::api::Settings;
use crate::registry;
use crate::registry::Created;
use crate::registry::LinkRegistry;
use crate::registry::short_url;

/// Request to shorten a URL
#[derive(Deserialize)]
pub struct ShortenForm {
    url: String,
}

/// The short URL of a shortened URL
#[derive(Serialize)]
pub struct ShortenResponse {
    result: String,
}

/// `201 Created` for a new link, `409 Conflict` for a URL seen before, deleted or not
fn created_status(created: &Created) -> StatusCode {
    if created.already_existed {
        StatusCode::CONFLICT
    } else {
        StatusCode::CREATED
    }
}

/// Shorten a URL sent as plain text
pub async fn create_plain(
    current_owner: CurrentOwner,
    Extension(registry): Extension<LinkRegistry>,
    Extension(settings): Extension<Settings>,
    body: String,
) -> Result<impl IntoResponse, Error> {
    let created = registry.create(&body, *current_owner).await?;

    Ok((
        created_status(&created),
        short_url(&settings.base_url, &created.code),
    ))
}

/// Shorten a URL sent as JSON
pub async fn create_json(
    current_owner: CurrentOwner,
    Extension(registry): Extension<LinkRegistry>,
    Extension(settings): Extension<Settings>,
    Form(form): Form<ShortenForm>,
) -> Result<impl IntoResponse, Error> {
    let created = registry.create(&form.url, *current_owner).await?;

    Ok((
        created_status(&created),
        Json(ShortenResponse {
            result: short_url(&settings.base_url, &created.code),
        }),
    ))
}

/// List all links of the current owner
pub async fn list(
    current_owner: CurrentOwner,
    Extension(registry): Extension<LinkRegistry>,
    Extension(settings): Extension<Settings>,
) -> Result<Response, Error> {
    match registry
        .list_by_owner(*current_owner, &settings.base_url)
        .await
    {
        Ok(links) => Ok(Json(links).into_response()),
        Err(registry::Error::NoRecords) => Ok(StatusCode::NO_CONTENT.into_response()),
        Err(err) => Err(err.into()),
    }
}

/// Delete links of the current owner
///
/// The links are deleted in the background, the response does not wait for it
pub async fn delete(
    current_owner: CurrentOwner,
    Extension(registry): Extension<LinkRegistry>,
    Form(codes): Form<Vec<String>>,
) -> StatusCode {
    tracing::debug!("Accepted {} codes to delete", codes.len());

    drop(registry.delete_batch(codes, *current_owner));

    StatusCode::ACCEPTED
}

/// Check the connection to the storage
pub async fn ping(Extension(registry): Extension<LinkRegistry>) -> Result<StatusCode, Error> {
    registry.ping().await?;

    Ok(StatusCode::OK)
}
