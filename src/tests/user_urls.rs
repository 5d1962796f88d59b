use axum::http::StatusCode;
use serde_json::json;

use crate::tests::helper;

#[tokio::test]
async fn test_list_without_links() {
    let (mut app, _) = helper::setup_test_app().await;

    let response = helper::list_urls(&mut app, None).await;
    assert_eq!(StatusCode::NO_CONTENT, response.status_code);
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn test_list_own_links() {
    let (mut app, _) = helper::setup_test_app().await;

    let created = helper::shorten_plain(&mut app, None, "https://ya.ru").await;
    let cookie = created.cookie.clone();
    assert!(cookie.is_some());
    let cookie = cookie.as_deref();

    helper::shorten_json(&mut app, cookie, "https://www.example.com/").await;

    // someone else
    helper::shorten_plain(&mut app, None, "https://practicum.yandex.ru/").await;

    let response = helper::list_urls(&mut app, cookie).await;
    assert_eq!(StatusCode::OK, response.status_code);
    assert_eq!(
        json!([
            {
                "short_url": "http://localhost:8080/NTI3NTUw",
                "original_url": "https://www.example.com/",
            },
            {
                "short_url": "http://localhost:8080/OTExOTk3",
                "original_url": "https://ya.ru",
            },
        ]),
        response.json()
    );
}

#[tokio::test]
async fn test_delete_own_links() {
    let (mut app, registry) = helper::setup_test_app().await;

    let created = helper::shorten_plain(&mut app, None, "https://ya.ru").await;
    let cookie = created.cookie.clone();
    let cookie = cookie.as_deref();
    helper::shorten_plain(&mut app, cookie, "https://www.example.com/").await;

    let response = helper::delete_urls(&mut app, cookie, &["OTExOTk3", "unknown0"]).await;
    assert_eq!(StatusCode::ACCEPTED, response.status_code);

    registry.shutdown().await;

    let response = helper::list_urls(&mut app, cookie).await;
    assert_eq!(StatusCode::OK, response.status_code);
    assert_eq!(
        json!([
            {
                "short_url": "http://localhost:8080/NTI3NTUw",
                "original_url": "https://www.example.com/",
            },
        ]),
        response.json()
    );

    // shortening a deleted URL again hands out its code, the link stays deleted
    let response = helper::shorten_plain(&mut app, cookie, "https://ya.ru").await;
    assert_eq!(StatusCode::CONFLICT, response.status_code);
    assert_eq!("http://localhost:8080/OTExOTk3", response.body);

    let response = helper::root(&mut app, "OTExOTk3").await;
    assert_eq!(StatusCode::GONE, response.status_code);

    let response = helper::list_urls(&mut app, cookie).await;
    assert_eq!(1, response.json().as_array().unwrap().len());
}

#[tokio::test]
async fn test_delete_links_of_other_owner() {
    let (mut app, registry) = helper::setup_test_app().await;

    let created = helper::shorten_plain(&mut app, None, "https://ya.ru").await;
    let code = helper::code_of(&created.body).to_string();

    // no cookie, a new owner
    let response = helper::delete_urls(&mut app, None, &[&code]).await;
    assert_eq!(StatusCode::ACCEPTED, response.status_code);

    registry.shutdown().await;

    let response = helper::root(&mut app, &code).await;
    assert_eq!(StatusCode::TEMPORARY_REDIRECT, response.status_code);
}
