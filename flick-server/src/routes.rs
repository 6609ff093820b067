use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use flick_common::non_api_structs::UserRecord;
use flick_common::{FriendAction, MovieId, Registration, Session, UserId};
use serde::Deserialize;

use crate::auth::Caller;
use crate::error::Result;
use crate::relationship::reply;
use crate::AppState;

pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/", get(root))
        .route("/add-user/:id", post(add_user));
    for action in FriendAction::ALL {
        let handler = move |Extension(state): Extension<AppState>,
                            Caller(user): Caller,
                            Query(query): Query<FriendQuery>| async move {
            act(&state, action, user, query).await
        };
        router = router.route(action.path(), post(handler).options(preflight));
    }
    router
        .route("/ratedMovie", post(rated_movie).options(preflight))
        .route("/addedToken", post(added_token).options(preflight))
        .route("/friends", get(get_friends))
        .route("/requests/incoming", get(get_incoming))
        .route("/requests/outgoing", get(get_outgoing))
        .layer(Extension(state))
}

async fn root() -> &'static str {
    "flick"
}

async fn preflight() -> &'static str {
    "OK"
}

async fn add_user(
    Extension(state): Extension<AppState>,
    Path(id): Path<String>,
    Json(registration): Json<Registration>,
) -> Result<Response> {
    let user = UserId::new(id);
    let record = UserRecord {
        name: registration.name,
        picture: registration.picture,
        ..Default::default()
    };
    if !state.store.create(&user, &record).await? {
        return Ok((StatusCode::CONFLICT, "user already exists").into_response());
    }
    let token = state.sessions.issue(&user)?;
    tracing::info!(user = %user, "registered user");
    Ok(Json(Session { user, token }).into_response())
}

#[derive(Deserialize)]
struct FriendQuery {
    #[serde(rename = "friendId")]
    friend_id: Option<String>,
}

async fn act(state: &AppState, action: FriendAction, user: UserId, query: FriendQuery) -> Response {
    let Some(friend) = query.friend_id.filter(|id| !id.is_empty()).map(UserId::new) else {
        return (StatusCode::BAD_REQUEST, "Missing friendId").into_response();
    };
    let relationships = &state.relationships;
    let result = match action {
        FriendAction::Send => relationships.send(&user, &friend).await,
        FriendAction::Accept => relationships.accept(&user, &friend).await,
        FriendAction::Decline => relationships.decline(&user, &friend).await,
        FriendAction::Remove => relationships.remove(&user, &friend).await,
        FriendAction::Revoke => relationships.revoke(&user, &friend).await,
    };
    let (code, message) = reply(result);
    tracing::debug!(%action, user = %user, friend = %friend, code, "friend action");
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, message).into_response()
}

#[derive(Deserialize)]
struct MovieQuery {
    #[serde(rename = "movieId")]
    movie_id: Option<String>,
}

async fn rated_movie(
    Extension(state): Extension<AppState>,
    Caller(user): Caller,
    Query(query): Query<MovieQuery>,
) -> Response {
    let Some(movie) = query.movie_id.filter(|id| !id.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "No movieId provided").into_response();
    };
    state.coalescer.submit(user, MovieId::new(movie));
    (StatusCode::OK, "OK").into_response()
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

async fn added_token(
    Extension(state): Extension<AppState>,
    Caller(user): Caller,
    Query(query): Query<TokenQuery>,
) -> Response {
    let Some(token) = query.token.filter(|token| !token.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "No token provided").into_response();
    };
    match state.relationships.register_device(&user, &token).await {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        Err(err) => err.into_response(),
    }
}

async fn get_friends(
    Extension(state): Extension<AppState>,
    Caller(user): Caller,
) -> Result<Json<Vec<UserId>>> {
    Ok(Json(state.user(&user).await?.friends.into_iter().collect()))
}

async fn get_incoming(
    Extension(state): Extension<AppState>,
    Caller(user): Caller,
) -> Result<Json<Vec<UserId>>> {
    Ok(Json(state.user(&user).await?.incoming_requests.into_iter().collect()))
}

async fn get_outgoing(
    Extension(state): Extension<AppState>,
    Caller(user): Caller,
) -> Result<Json<Vec<UserId>>> {
    Ok(Json(state.user(&user).await?.outgoing_requests.into_iter().collect()))
}
