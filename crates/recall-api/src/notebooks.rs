use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use recall_db::models::{NotebookRow, UserRow};
use recall_types::api::{MessageResponse, NoteResponse, NotebookRequest, NotebookResponse, NotebookWithNotesResponse};

use crate::auth::AppState;
use crate::notes::note_response;
use crate::{db_call, parse_id, parse_timestamp};

fn notebook_response(row: NotebookRow) -> NotebookResponse {
    NotebookResponse {
        id: parse_id(&row.id, "notebook"),
        created_at: parse_timestamp(&row.created_at, "notebook"),
        updated_at: parse_timestamp(&row.updated_at, "notebook"),
        title: row.title,
        note_count: row.note_count,
    }
}

fn valid_title(title: &str) -> Result<String, StatusCode> {
    let title = title.trim();
    if title.is_empty() || title.chars().count() > 200 {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(title.to_string())
}

pub async fn list_notebooks(
    State(state): State<AppState>,
    Extension(user): Extension<UserRow>,
) -> Result<Json<Vec<NotebookResponse>>, StatusCode> {
    let rows = db_call(&state, move |db| db.list_notebooks(&user.id)).await?;
    Ok(Json(rows.into_iter().map(notebook_response).collect()))
}

pub async fn create_notebook(
    State(state): State<AppState>,
    Extension(user): Extension<UserRow>,
    Json(req): Json<NotebookRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let title = valid_title(&req.title)?;
    let id = Uuid::new_v4().to_string();
    let row = db_call(&state, move |db| db.create_notebook(&id, &user.id, &title)).await?;
    Ok((StatusCode::CREATED, Json(notebook_response(row))))
}

pub async fn get_notebook(
    State(state): State<AppState>,
    Extension(user): Extension<UserRow>,
    Path(notebook_id): Path<Uuid>,
) -> Result<Json<NotebookWithNotesResponse>, StatusCode> {
    let (notebook, notes) = db_call(&state, move |db| {
        let id = notebook_id.to_string();
        let Some(notebook) = db.get_notebook(&id, &user.id)? else {
            return Ok(None);
        };
        let notes = db.notebook_notes(&id)?;
        Ok(Some((notebook, notes)))
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(NotebookWithNotesResponse {
        notebook: notebook_response(notebook),
        notes: notes.into_iter().map(note_response).collect(),
    }))
}

pub async fn rename_notebook(
    State(state): State<AppState>,
    Extension(user): Extension<UserRow>,
    Path(notebook_id): Path<Uuid>,
    Json(req): Json<NotebookRequest>,
) -> Result<Json<NotebookResponse>, StatusCode> {
    let title = valid_title(&req.title)?;
    let row = db_call(&state, move |db| {
        db.rename_notebook(&notebook_id.to_string(), &user.id, &title)
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(notebook_response(row)))
}

/// Removes the notebook only; its notes stay in the user's list.
pub async fn delete_notebook(
    State(state): State<AppState>,
    Extension(user): Extension<UserRow>,
    Path(notebook_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, StatusCode> {
    let deleted = db_call(&state, move |db| {
        db.delete_notebook(&notebook_id.to_string(), &user.id)
    })
    .await?;
    if !deleted {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(MessageResponse::new("Notebook deleted successfully")))
}

pub async fn notebook_notes(
    State(state): State<AppState>,
    Extension(user): Extension<UserRow>,
    Path(notebook_id): Path<Uuid>,
) -> Result<Json<Vec<NoteResponse>>, StatusCode> {
    let notes = db_call(&state, move |db| {
        let id = notebook_id.to_string();
        if db.get_notebook(&id, &user.id)?.is_none() {
            return Ok(None);
        }
        db.notebook_notes(&id).map(Some)
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(notes.into_iter().map(note_response).collect()))
}

pub async fn add_note(
    State(state): State<AppState>,
    Extension(user): Extension<UserRow>,
    Path((notebook_id, note_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<MessageResponse>, StatusCode> {
    let added = db_call(&state, move |db| {
        let (notebook_id, note_id) = (notebook_id.to_string(), note_id.to_string());
        // Both sides must belong to the caller.
        if db.get_notebook(&notebook_id, &user.id)?.is_none() || db.get_note(&note_id, &user.id)?.is_none() {
            return Ok(None);
        }
        db.add_note_to_notebook(&notebook_id, &note_id).map(Some)
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    let message = if added {
        "Note added to notebook"
    } else {
        "Note already in notebook"
    };
    Ok(Json(MessageResponse::new(message)))
}

pub async fn remove_note(
    State(state): State<AppState>,
    Extension(user): Extension<UserRow>,
    Path((notebook_id, note_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<MessageResponse>, StatusCode> {
    let removed = db_call(&state, move |db| {
        let notebook_id = notebook_id.to_string();
        if db.get_notebook(&notebook_id, &user.id)?.is_none() {
            return Ok(None);
        }
        db.remove_note_from_notebook(&notebook_id, &note_id.to_string()).map(Some)
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    let message = if removed {
        "Note removed from notebook"
    } else {
        "Note was not in notebook"
    };
    Ok(Json(MessageResponse::new(message)))
}
