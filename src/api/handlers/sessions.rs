// src/api/handlers/sessions.rs
use actix_web::http::header::ContentDisposition;
use actix_web::{web, HttpResponse, Result};
use log::info;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::api::AppState;
use crate::api::handlers::ws::{SessionUpdate, WsBroker};
use crate::codec::{Artifact, ArtifactSink};
use crate::errors::SegError;
use crate::models::{Modality, SelectedFile};
use crate::session::{SessionError, SessionHandle};

#[derive(Deserialize)]
pub struct SelectFileQuery {
    pub name: String,
}

#[derive(Deserialize)]
pub struct OptionsRequest {
    pub modality: Modality,
    #[serde(default)]
    pub slice_idx: Option<u32>,
}

/// Offers an artifact to the browser as a file download.
pub struct AttachmentSink;

impl ArtifactSink for AttachmentSink {
    type Receipt = HttpResponse;

    fn offer(&self, artifact: Artifact) -> crate::errors::Result<HttpResponse> {
        Ok(HttpResponse::Ok()
            .content_type(artifact.mime_type.as_str())
            .insert_header(ContentDisposition::attachment(artifact.filename.as_str()))
            .body(artifact.bytes))
    }
}

pub fn error_response(err: &SessionError) -> HttpResponse {
    let body = json!({ "error": err.to_string(), "kind": err.kind() });
    match err {
        SessionError::NoFileSelected | SessionError::Failed(SegError::Validation(_)) => {
            HttpResponse::BadRequest().json(body)
        }
        SessionError::AlreadySubmitting | SessionError::NotSucceeded => HttpResponse::Conflict().json(body),
        SessionError::NoArtifact => HttpResponse::NotFound().json(body),
        SessionError::Failed(SegError::Decode(_)) => HttpResponse::UnprocessableEntity().json(body),
        SessionError::Failed(_) => HttpResponse::InternalServerError().json(body),
    }
}

fn session_not_found(id: &Uuid) -> HttpResponse {
    HttpResponse::NotFound().json(json!({ "error": format!("session {} not found", id) }))
}

async fn lookup(state: &AppState, id: Uuid) -> std::result::Result<SessionHandle, HttpResponse> {
    state.session(&id).await.ok_or_else(|| session_not_found(&id))
}

pub async fn create_session(state: web::Data<AppState>) -> Result<HttpResponse> {
    let handle = state.create_session().await;
    info!("Created session {}", handle.id());
    Ok(HttpResponse::Created().json(json!({
        "id": handle.id(),
        "session": handle.view().await
    })))
}

pub async fn close_session(state: web::Data<AppState>, path: web::Path<Uuid>) -> Result<HttpResponse> {
    let id = path.into_inner();
    if state.close_session(&id).await {
        info!("Closed session {}", id);
        Ok(HttpResponse::NoContent().finish())
    } else {
        Ok(session_not_found(&id))
    }
}

pub async fn get_session(state: web::Data<AppState>, path: web::Path<Uuid>) -> Result<HttpResponse> {
    let handle = match lookup(&state, path.into_inner()).await {
        Ok(handle) => handle,
        Err(resp) => return Ok(resp),
    };
    Ok(HttpResponse::Ok().json(handle.view().await))
}

pub async fn select_file(
    state: web::Data<AppState>,
    broker: web::Data<WsBroker>,
    path: web::Path<Uuid>,
    query: web::Query<SelectFileQuery>,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let handle = match lookup(&state, path.into_inner()).await {
        Ok(handle) => handle,
        Err(resp) => return Ok(resp),
    };
    let file = match SelectedFile::new(query.into_inner().name, body.to_vec()) {
        Ok(file) => file,
        Err(e) => return Ok(error_response(&SessionError::from(e))),
    };

    let view = handle.select_file(file).await;
    broker.broadcast(SessionUpdate::from_view(handle.id(), &view)).await;
    Ok(HttpResponse::Ok().json(view))
}

pub async fn update_options(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<OptionsRequest>,
) -> Result<HttpResponse> {
    let handle = match lookup(&state, path.into_inner()).await {
        Ok(handle) => handle,
        Err(resp) => return Ok(resp),
    };
    let req = req.into_inner();
    match handle.set_options(req.modality, req.slice_idx).await {
        Ok(view) => Ok(HttpResponse::Ok().json(view)),
        Err(e) => Ok(error_response(&e)),
    }
}

pub async fn submit(
    state: web::Data<AppState>,
    broker: web::Data<WsBroker>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let handle = match lookup(&state, path.into_inner()).await {
        Ok(handle) => handle,
        Err(resp) => return Ok(resp),
    };
    match handle.submit().await {
        Ok(view) => {
            broker.broadcast(SessionUpdate::from_view(handle.id(), &view)).await;
            Ok(HttpResponse::Ok().json(view))
        }
        Err(e) => Ok(error_response(&e)),
    }
}

pub async fn reveal_report(
    state: web::Data<AppState>,
    broker: web::Data<WsBroker>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let handle = match lookup(&state, path.into_inner()).await {
        Ok(handle) => handle,
        Err(resp) => return Ok(resp),
    };
    match handle.reveal_report().await {
        Ok(view) => {
            broker.broadcast(SessionUpdate::from_view(handle.id(), &view)).await;
            Ok(HttpResponse::Ok().json(view))
        }
        Err(e) => Ok(error_response(&e)),
    }
}

pub async fn download_artifact(state: web::Data<AppState>, path: web::Path<Uuid>) -> Result<HttpResponse> {
    let handle = match lookup(&state, path.into_inner()).await {
        Ok(handle) => handle,
        Err(resp) => return Ok(resp),
    };
    match handle.request_download(&AttachmentSink).await {
        Ok(resp) => Ok(resp),
        Err(e) => {
            log::warn!("Artifact download for session {} failed: {}", handle.id(), e);
            Ok(error_response(&e))
        }
    }
}
