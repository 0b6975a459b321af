use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::consolidation::{ConsolidationResult, Consolidator};
use crate::economics::{EconomicsCounters, EconomicsTracker};
use crate::events::MemoryEvent;
use crate::index::{IndexSummary, TimelineEntry};
use crate::memory::retrieval::{RetrievalRequest, RetrievalResult, Retriever};
use crate::memory::types::{EntityKind, MemoryEntity};
use crate::server::{ApiError, AppState};
use crate::storage::EntityFilter;

pub async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

#[derive(Debug, Deserialize)]
pub struct NamespaceQuery {
    pub namespace: String,
}

/// Layer-1 summary for one namespace.
pub async fn index_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NamespaceQuery>,
) -> Result<Json<IndexSummary>, ApiError> {
    let meta = state.store.read_meta(&query.namespace)?;
    Ok(Json(IndexSummary::from_meta(&query.namespace, &meta)))
}

#[derive(Debug, Deserialize)]
pub struct TimelineQuery {
    pub namespace: String,
    #[serde(default = "default_timeline_limit")]
    pub limit: usize,
}

fn default_timeline_limit() -> usize {
    20
}

#[derive(Debug, Serialize)]
pub struct TimelineResponse {
    pub namespace: String,
    pub entries: Vec<TimelineEntry>,
}

/// Layer-2 timeline for one namespace, newest first.
pub async fn timeline_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TimelineQuery>,
) -> Result<Json<TimelineResponse>, ApiError> {
    let meta = state.store.read_meta(&query.namespace)?;
    Ok(Json(TimelineResponse {
        namespace: query.namespace,
        entries: meta.timeline_page(query.limit).to_vec(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct EntitiesQuery {
    pub namespace: String,
    pub kind: String,
    #[serde(default = "default_list_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_list_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct EntitiesResponse {
    pub entities: Vec<MemoryEntity>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// List entities of one kind, archived episodes included.
pub async fn entities_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EntitiesQuery>,
) -> Result<Json<EntitiesResponse>, ApiError> {
    let kind: EntityKind = query.kind.parse().map_err(ApiError::bad_request)?;

    let entities = state.store.list(
        &query.namespace,
        kind,
        &EntityFilter::new().with_archived(),
    )?;
    let total = entities.len();
    let page: Vec<MemoryEntity> = entities
        .into_iter()
        .skip(query.offset)
        .take(query.limit)
        .collect();

    Ok(Json(EntitiesResponse {
        entities: page,
        total,
        limit: query.limit,
        offset: query.offset,
    }))
}

/// Layer-3 fetch of one entity by kind and id.
pub async fn entity_handler(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, String)>,
    Query(query): Query<NamespaceQuery>,
) -> Result<Json<MemoryEntity>, ApiError> {
    let kind: EntityKind = kind.parse().map_err(ApiError::bad_request)?;
    let id: Uuid = id
        .parse()
        .map_err(|e| ApiError::bad_request(format!("Invalid UUID: {e}")))?;

    let entity = state.store.get(&query.namespace, kind, id)?;
    Ok(Json(entity))
}

/// Budget-aware retrieval: `{namespace, task_type, query, budget}`.
pub async fn retrieve_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RetrievalRequest>,
) -> Result<Json<RetrievalResult>, ApiError> {
    let retriever = Retriever::new(
        &state.store,
        state.similarity.as_ref(),
        &state.config.retrieval,
        &state.config.importance,
    );
    let (result, sample) = retriever.retrieve(&request)?;

    // Bookkeeping failure never fails the retrieval itself.
    if let Err(e) = EconomicsTracker::new(&state.store).record(&request.namespace, sample) {
        tracing::warn!("Failed to record retrieval economics: {e}");
    }

    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct ConsolidateRequest {
    pub namespace: String,
    #[serde(default)]
    pub force: bool,
}

/// Trigger a consolidation run for one namespace.
pub async fn consolidate_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ConsolidateRequest>,
) -> Result<Json<ConsolidationResult>, ApiError> {
    let consolidator = Consolidator::new(
        &state.store,
        state.similarity.as_ref(),
        &state.config.consolidation,
        &state.config.importance,
    );
    let result = consolidator.run(&request.namespace, request.force)?;

    if result.ran {
        state.events.emit(MemoryEvent::consolidation_completed(
            &request.namespace,
            result.pattern_ids.first().copied(),
        ));
    }

    Ok(Json(result))
}

/// Token-economics counters for one namespace.
pub async fn economics_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NamespaceQuery>,
) -> Result<Json<EconomicsCounters>, ApiError> {
    let counters = EconomicsTracker::new(&state.store).read(&query.namespace)?;
    Ok(Json(counters))
}

/// SSE stream of memory events (fire-and-forget hook surface).
pub async fn events_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.events.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(event) => {
                let json = serde_json::to_string(&event).ok()?;
                Some(Ok(Event::default().data(json)))
            }
            Err(_) => None,
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
