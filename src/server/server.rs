use anyhow::{Context, Result};
use std::{convert::Infallible, time::Duration};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, patch, post},
    Json, Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::metrics::metrics_handler;
use super::{log_requests, session::Session, state::*};
use crate::matcher::CrawledContent;
use crate::notifications::DEFAULT_PAGE_SIZE;

pub const LAST_EVENT_ID_HEADER: &str = "Last-Event-ID";

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub version: String,
    pub hash: String,
    pub live_connections: usize,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct HistoryQuery {
    pub last_id: Option<i64>,
    pub size: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UnreadCountResponse {
    pub unread: usize,
}

#[derive(Serialize)]
struct IngestResponse {
    pub offset: i64,
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        version: env!("APP_VERSION").to_owned(),
        hash: state.hash.clone(),
        live_connections: state.broadcaster.registry().connection_count(),
    };
    Json(stats)
}

async fn subscribe(
    session: Session,
    State(state): State<ServerState>,
    headers: HeaderMap,
) -> Response {
    let last_event_id = headers
        .get(LAST_EVENT_ID_HEADER)
        .and_then(|value| value.to_str().ok());

    match state.broadcaster.subscribe(session.user_id, last_event_id) {
        Ok(subscription) => {
            debug!("Streaming {} to user {}", subscription.key(), session.user_id);
            let stream = subscription.map(|message| Ok::<Event, Infallible>(message.into()));
            Sse::new(stream)
                .keep_alive(KeepAlive::new().interval(state.config.sse_keep_alive))
                .into_response()
        }
        Err(err) => {
            error!("Failed to open subscription for {}: {}", session.user_id, err);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{}", err)).into_response()
        }
    }
}

async fn get_history(
    session: Session,
    State(history): State<GuardedHistoryReader>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let size = query.size.unwrap_or(DEFAULT_PAGE_SIZE);
    match history.history(session.user_id, query.last_id, size) {
        Ok(page) => Json(page).into_response(),
        Err(err) => {
            error!("Failed to load history of {}: {:?}", session.user_id, err);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{}", err)).into_response()
        }
    }
}

async fn get_unread_count(
    session: Session,
    State(store): State<GuardedNotificationStore>,
) -> Response {
    match store.count_unread(session.user_id) {
        Ok(unread) => Json(UnreadCountResponse { unread }).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{}", err)).into_response(),
    }
}

async fn mark_as_read(
    session: Session,
    State(store): State<GuardedNotificationStore>,
    Path(id): Path<i64>,
) -> Response {
    match store.mark_as_read(session.user_id, id) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{}", err)).into_response(),
    }
}

async fn ingest_content(
    State(state): State<ServerState>,
    Json(content): Json<CrawledContent>,
) -> Response {
    match state.content_publisher.publish(&content) {
        Ok(offset) => {
            debug!(
                "Ingested content of source {} at offset {}",
                content.source_id, offset
            );
            (StatusCode::ACCEPTED, Json(IngestResponse { offset })).into_response()
        }
        Err(err) => {
            error!("Failed to publish ingested content: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{}", err)).into_response()
        }
    }
}

pub fn make_app(state: ServerState) -> Router {
    let notification_routes: Router = Router::new()
        .route("/", get(get_history))
        .route("/subscribe", get(subscribe))
        .route("/unread-count", get(get_unread_count))
        .route("/{id}/read", patch(mark_as_read))
        .with_state(state.clone());

    let internal_routes: Router = Router::new()
        .route("/contents", post(ingest_content))
        .with_state(state.clone());

    Router::new()
        .route("/", get(home))
        .with_state(state.clone())
        .nest("/api/notifications", notification_routes)
        .nest("/internal", internal_routes)
        .layer(middleware::from_fn_with_state(state, log_requests))
}

pub fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Serve the API and the metrics endpoint until `shutdown_token` is cancelled.
pub async fn run_server(state: ServerState, shutdown_token: CancellationToken) -> Result<()> {
    let port = state.config.port;
    let metrics_port = state.config.metrics_port;
    let broadcaster = state.broadcaster.clone();
    let app = make_app(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    let metrics_listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", metrics_port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", metrics_port))?;

    info!("Listening on port {}, metrics on port {}", port, metrics_port);

    let metrics_token = shutdown_token.clone();
    let metrics_server = tokio::spawn(async move {
        axum::serve(metrics_listener, make_metrics_app())
            .with_graceful_shutdown(async move { metrics_token.cancelled().await })
            .await
    });

    // Live streams never finish on their own, close them so the drain can complete
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_token.cancelled().await;
            broadcaster.close_all();
        })
        .await?;

    match metrics_server.await {
        Ok(result) => result?,
        Err(err) => error!("Metrics server task failed: {}", err),
    }

    info!("Server stopped");
    Ok(())
}
