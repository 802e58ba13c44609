use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::application::error::HttpError;

use super::HttpState;
use super::identity::{Author, Viewer};
use super::models::{PageQuery, PostPageResponse, PostTextRequest, PostView, UsersResponse};

const SOURCE: &str = "infra::http::handlers";

/// Parse the raw `size` parameter; an empty value means "not given".
fn parse_size(raw: Option<&str>) -> Result<Option<i64>, HttpError> {
    match raw.filter(|value| !value.is_empty()) {
        None => Ok(None),
        Some(value) => value.parse::<i64>().map(Some).map_err(|err| {
            HttpError::bad_request(
                SOURCE,
                "Invalid size",
                format!("size `{value}` is not an integer: {err}"),
            )
        }),
    }
}

pub async fn get_post(
    State(state): State<HttpState>,
    Path(post_id): Path<String>,
) -> Result<Json<PostView>, HttpError> {
    let post = state.posts.get_post(&post_id).await?;
    Ok(Json(post.into()))
}

pub async fn create_post(
    State(state): State<HttpState>,
    Author(author_id): Author,
    Json(body): Json<PostTextRequest>,
) -> Result<Json<PostView>, HttpError> {
    let post = state.posts.create_post(&author_id, body.text).await?;
    Ok(Json(post.into()))
}

pub async fn modify_post(
    State(state): State<HttpState>,
    Author(user_id): Author,
    Path(post_id): Path<String>,
    Json(body): Json<PostTextRequest>,
) -> Result<Json<PostView>, HttpError> {
    let post = state
        .posts
        .modify_post(&user_id, &post_id, body.text)
        .await?;
    Ok(Json(post.into()))
}

pub async fn list_user_posts(
    State(state): State<HttpState>,
    Path(author_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PostPageResponse>, HttpError> {
    let size = parse_size(query.size.as_deref())?;
    let page = state
        .posts
        .list_posts(&author_id, query.page.as_deref(), size)
        .await?;
    Ok(Json(page.into()))
}

pub async fn subscribe(
    State(state): State<HttpState>,
    Author(subscriber_id): Author,
    Path(subscribee_id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    state
        .subscriptions
        .subscribe(&subscribee_id, &subscriber_id)
        .await?;
    Ok(StatusCode::OK)
}

pub async fn list_subscriptions(
    State(state): State<HttpState>,
    Viewer(user_id): Viewer,
) -> Result<Json<UsersResponse>, HttpError> {
    let users = state.subscriptions.list_subscriptions(&user_id).await?;
    Ok(Json(UsersResponse { users }))
}

pub async fn list_subscribers(
    State(state): State<HttpState>,
    Viewer(user_id): Viewer,
) -> Result<Json<UsersResponse>, HttpError> {
    let users = state.subscriptions.list_subscribers(&user_id).await?;
    Ok(Json(UsersResponse { users }))
}

pub async fn list_feed(
    State(state): State<HttpState>,
    Viewer(user_id): Viewer,
    Query(query): Query<PageQuery>,
) -> Result<Json<PostPageResponse>, HttpError> {
    let size = parse_size(query.size.as_deref())?;
    let page = state
        .feed
        .list_feed(&user_id, query.page.as_deref(), size)
        .await?;
    Ok(Json(page.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_parsing() {
        assert_eq!(parse_size(None).unwrap(), None);
        assert_eq!(parse_size(Some("")).unwrap(), None);
        assert_eq!(parse_size(Some("25")).unwrap(), Some(25));
        assert_eq!(parse_size(Some("-3")).unwrap(), Some(-3));

        let err = parse_size(Some("ten")).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.public_message(), "Invalid size");
    }
}
