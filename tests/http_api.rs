mod common;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use common::Harness;

async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("User-Id", user);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request");

    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn get(router: &Router, uri: &str, user: Option<&str>) -> (StatusCode, Value) {
    send(router, Method::GET, uri, user, None).await
}

#[tokio::test]
async fn create_then_fetch_post() {
    let harness = Harness::new();
    let router = harness.router();

    let (status, created) = send(
        &router,
        Method::POST,
        "/api/v1/posts",
        Some("a1"),
        Some(json!({"text": "hello"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["text"], "hello");
    assert_eq!(created["authorId"], "a1");
    let id = created["id"].as_str().expect("id").to_string();
    assert_eq!(id.len(), 10);
    assert!(created["createdAt"].is_string());
    assert!(created["lastModifiedAt"].is_string());

    let (status, fetched) = get(&router, &format!("/api/v1/posts/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn unknown_post_is_not_found() {
    let harness = Harness::new();
    let (status, body) = get(&harness.router(), "/api/v1/posts/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Post not found");
}

#[tokio::test]
async fn writes_require_a_valid_user_id() {
    let harness = Harness::new();
    let router = harness.router();

    for user in [None, Some(""), Some("NOT-HEX")] {
        let (status, _) = send(
            &router,
            Method::POST,
            "/api/v1/posts",
            user,
            Some(json!({"text": "hello"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn only_the_author_may_modify() {
    let harness = Harness::new();
    let router = harness.router();
    let (_, created) = send(
        &router,
        Method::POST,
        "/api/v1/posts",
        Some("a1"),
        Some(json!({"text": "hello"})),
    )
    .await;
    let uri = format!("/api/v1/posts/{}", created["id"].as_str().expect("id"));

    let (status, _) = send(
        &router,
        Method::PATCH,
        &uri,
        Some("b2"),
        Some(json!({"text": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &router,
        Method::PATCH,
        "/api/v1/posts/missing",
        Some("a1"),
        Some(json!({"text": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, modified) = send(
        &router,
        Method::PATCH,
        &uri,
        Some("a1"),
        Some(json!({"text": "world"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(modified["text"], "world");
    assert_eq!(modified["createdAt"], created["createdAt"]);
}

#[tokio::test]
async fn user_posts_are_paginated() {
    let harness = Harness::new();
    let router = harness.router();
    for n in 0..3 {
        send(
            &router,
            Method::POST,
            "/api/v1/posts",
            Some("a1"),
            Some(json!({"text": format!("post {n}")})),
        )
        .await;
    }

    let (status, first) = get(&router, "/api/v1/users/a1/posts?size=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["posts"].as_array().expect("posts").len(), 2);
    assert_eq!(first["posts"][0]["text"], "post 2");
    let next = first["nextPage"].as_str().expect("next page").to_string();

    let (status, second) = send(
        &router,
        Method::GET,
        &format!("/api/v1/users/a1/posts?page={next}"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["posts"].as_array().expect("posts").len(), 1);
    assert!(second.get("nextPage").is_none());
}

#[tokio::test]
async fn bad_page_parameters_are_rejected() {
    let harness = Harness::new();
    let router = harness.router();

    for uri in [
        "/api/v1/users/a1/posts?size=0",
        "/api/v1/users/a1/posts?size=101",
        "/api/v1/users/a1/posts?size=ten",
    ] {
        let (status, body) = get(&router, uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["message"], "Invalid size", "{uri}");
    }

    let (status, body) = get(&router, "/api/v1/users/a1/posts?page=bogus", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid token");
}

#[tokio::test]
async fn subscribe_and_read_feed() {
    let harness = Harness::new();
    let router = harness.router();

    let (status, _) = send(
        &router,
        Method::POST,
        "/api/v1/users/a1/subscribe",
        Some("b2"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    harness.settle().await;

    let (_, subscribers) = get(&router, "/api/v1/subscribers", Some("a1")).await;
    assert_eq!(subscribers, json!({"users": ["b2"]}));
    let (_, subscriptions) = get(&router, "/api/v1/subscriptions", Some("b2")).await;
    assert_eq!(subscriptions, json!({"users": ["a1"]}));

    let (_, created) = send(
        &router,
        Method::POST,
        "/api/v1/posts",
        Some("a1"),
        Some(json!({"text": "hello"})),
    )
    .await;
    harness.settle().await;

    let (status, feed) = get(&router, "/api/v1/feed", Some("b2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(feed["posts"][0]["id"], created["id"]);
    assert_eq!(feed["posts"][0]["authorId"], "a1");
    assert!(feed.get("nextPage").is_none());
}

#[tokio::test]
async fn self_subscription_is_a_bad_request() {
    let harness = Harness::new();
    let (status, body) = send(
        &harness.router(),
        Method::POST,
        "/api/v1/users/a1/subscribe",
        Some("a1"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Cannot subscribe to yourself");
}

#[tokio::test]
async fn caller_scoped_reads_require_a_user_id() {
    let harness = Harness::new();
    let router = harness.router();

    for uri in ["/api/v1/feed", "/api/v1/subscribers", "/api/v1/subscriptions"] {
        let (status, _) = get(&router, uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
    }

    let (status, body) = get(&router, "/api/v1/subscribers", Some("ab")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"users": []}));
}
