//! Fake keyword directory served over HTTP

use super::constants::*;
use axum::{
    extract::Query,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use std::collections::BTreeSet;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatchUsersQuery {
    source_id: i64,
}

async fn match_users(
    Query(query): Query<MatchUsersQuery>,
    Json(keywords): Json<Vec<String>>,
) -> Response {
    if query.source_id == FAILING_SOURCE_ID {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let users: BTreeSet<i64> = KEYWORD_SUBSCRIPTIONS
        .iter()
        .filter(|(keyword, _)| keywords.iter().any(|k| k == keyword))
        .flat_map(|(_, users)| users.iter().copied())
        .collect();

    Json(users.into_iter().collect::<Vec<_>>()).into_response()
}

/// Serve the fake directory on a random port until `shutdown_token` is cancelled.
/// Returns its base URL.
pub async fn spawn_keyword_directory(shutdown_token: CancellationToken) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind keyword directory");
    let port = listener
        .local_addr()
        .expect("Failed to get local address")
        .port();

    let app = Router::new().route("/internal/keywords/match-users", post(match_users));
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown_token.cancelled().await })
            .await
            .expect("Keyword directory failed");
    });

    format!("http://127.0.0.1:{}", port)
}
