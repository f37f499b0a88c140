use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::agents::DocumentSource;
use crate::errors::AppError;
use crate::pipeline::{PipelineRun, ScreeningInput};
use crate::session::SessionId;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ScreeningRequest {
    pub session_id: Option<SessionId>,
    pub cv: DocumentSource,
    pub jd: DocumentSource,
}

/// POST /api/v1/screenings
pub async fn handle_screening(
    State(state): State<AppState>,
    Json(req): Json<ScreeningRequest>,
) -> Result<Json<PipelineRun>, AppError> {
    for document in [&req.cv, &req.jd] {
        if matches!(document, DocumentSource::Path(_)) && !state.config.allow_local_paths {
            return Err(AppError::Validation(
                "Local file paths are disabled; send inline text or upload the PDFs".to_string(),
            ));
        }
    }

    let input = ScreeningInput {
        session_id: req.session_id.unwrap_or_default(),
        cv: req.cv,
        jd: req.jd,
    };
    let run = state.orchestrator.run(input).await?;
    Ok(Json(run))
}

/// POST /api/v1/screenings/upload
/// Multipart form with `cv` and `jd` PDF parts and an optional `session_id`.
pub async fn handle_screening_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<PipelineRun>, AppError> {
    let mut cv = None;
    let mut jd = None;
    let mut session_id = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read part '{name}': {e}")))?;

        match name.as_str() {
            "cv" | "jd" => {
                let document = DocumentSource::Pdf {
                    name: file_name.unwrap_or_else(|| format!("{name}.pdf")),
                    bytes,
                };
                if name == "cv" {
                    cv = Some(document);
                } else {
                    jd = Some(document);
                }
            }
            "session_id" => {
                let raw = String::from_utf8_lossy(&bytes);
                let id = Uuid::parse_str(raw.trim())
                    .map_err(|e| AppError::Validation(format!("Invalid session_id: {e}")))?;
                session_id = Some(SessionId(id));
            }
            other => info!("Ignoring unexpected multipart part '{other}'"),
        }
    }

    let input = ScreeningInput {
        session_id: session_id.unwrap_or_default(),
        cv: cv.ok_or_else(|| AppError::Validation("Missing 'cv' part".to_string()))?,
        jd: jd.ok_or_else(|| AppError::Validation("Missing 'jd' part".to_string()))?,
    };
    let run = state.orchestrator.run(input).await?;
    Ok(Json(run))
}
