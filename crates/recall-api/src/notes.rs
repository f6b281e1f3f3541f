use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use recall_db::models::{NoteRow, UserRow};
use recall_types::api::{CreateNoteRequest, MessageResponse, NoteResponse, SearchResponse, UpdateNoteRequest};

use crate::auth::AppState;
use crate::summarizer::spawn_summary;
use crate::{db_call, parse_id, parse_timestamp};

const MAX_PAGE: u32 = 1000;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub skip: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    100
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

pub(crate) fn note_response(row: NoteRow) -> NoteResponse {
    NoteResponse {
        id: parse_id(&row.id, "note"),
        created_at: parse_timestamp(&row.created_at, "note"),
        updated_at: parse_timestamp(&row.updated_at, "note"),
        content: row.content,
        ai_summary: row.ai_summary,
    }
}

pub async fn create_note(
    State(state): State<AppState>,
    Extension(user): Extension<UserRow>,
    Json(req): Json<CreateNoteRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.content.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let note_id = Uuid::new_v4().to_string();
    let id = note_id.clone();
    let content = req.content.clone();
    let row = db_call(&state, move |db| db.insert_note(&id, &user.id, &content)).await?;

    spawn_summary(&state, note_id, req.content);

    Ok((StatusCode::CREATED, Json(note_response(row))))
}

pub async fn list_notes(
    State(state): State<AppState>,
    Extension(user): Extension<UserRow>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<NoteResponse>>, StatusCode> {
    let limit = query.limit.min(MAX_PAGE);
    let rows = db_call(&state, move |db| db.list_notes(&user.id, query.skip, limit)).await?;
    Ok(Json(rows.into_iter().map(note_response).collect()))
}

pub async fn get_note(
    State(state): State<AppState>,
    Extension(user): Extension<UserRow>,
    Path(note_id): Path<Uuid>,
) -> Result<Json<NoteResponse>, StatusCode> {
    let row = db_call(&state, move |db| db.get_note(&note_id.to_string(), &user.id))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(note_response(row)))
}

/// Content edits keep the existing summary unless a new one is requested.
pub async fn update_note(
    State(state): State<AppState>,
    Extension(user): Extension<UserRow>,
    Path(note_id): Path<Uuid>,
    Json(req): Json<UpdateNoteRequest>,
) -> Result<Json<NoteResponse>, StatusCode> {
    if req.content.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let content = req.content.clone();
    let row = db_call(&state, move |db| {
        db.update_note_content(&note_id.to_string(), &user.id, &content)
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    if req.regenerate_summary {
        spawn_summary(&state, row.id.clone(), req.content);
    }

    Ok(Json(note_response(row)))
}

pub async fn delete_note(
    State(state): State<AppState>,
    Extension(user): Extension<UserRow>,
    Path(note_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, StatusCode> {
    let deleted = db_call(&state, move |db| db.delete_note(&note_id.to_string(), &user.id)).await?;
    if !deleted {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(MessageResponse::new("Note deleted successfully")))
}

pub async fn search_notes(
    State(state): State<AppState>,
    Extension(user): Extension<UserRow>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, StatusCode> {
    let term = query.q.trim().to_string();
    if term.is_empty() {
        return Ok(Json(SearchResponse {
            notes: Vec::new(),
            total_count: 0,
        }));
    }

    let rows = db_call(&state, move |db| db.search_notes(&user.id, &term)).await?;
    let notes: Vec<NoteResponse> = rows.into_iter().map(note_response).collect();

    Ok(Json(SearchResponse {
        total_count: notes.len(),
        notes,
    }))
}
