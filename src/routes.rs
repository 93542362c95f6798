//! HTTP entry points for PDF capture, health and metrics.

use crate::app_state::AppState;
use crate::render::{RenderError, RenderTarget};
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::http::StatusCode;
use actix_web::{get, web, HttpResponse, Responder, ResponseError};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

impl ResponseError for RenderError {
    fn status_code(&self) -> StatusCode {
        match self {
            RenderError::Overloaded { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.to_string(),
            "kind": self.kind(),
            "stage": self.stage().as_str(),
        }))
    }
}

/// Runs the capture on its own task. If the client goes away the handler is
/// dropped, the guard cancels the token and the render releases its session.
async fn capture(data: &AppState, target: RenderTarget) -> Result<HttpResponse, RenderError> {
    let cancel = CancellationToken::new();
    let _abort_on_disconnect = cancel.clone().drop_guard();

    let orchestrator = Arc::clone(&data.orchestrator);
    let task = actix_web::rt::spawn(async move { orchestrator.capture(target, &cancel).await });

    let result = task.await.map_err(|e| {
        log::error!("Render task for {} aborted: {}", target, e);
        RenderError::Internal(format!("render task for {} did not complete", target))
    })??;

    let disposition = ContentDisposition {
        disposition: DispositionType::Attachment,
        parameters: vec![DispositionParam::Filename(
            result.suggested_filename().to_string(),
        )],
    };

    Ok(HttpResponse::Ok()
        .content_type(result.media_type())
        .insert_header(disposition)
        .body(result.into_bytes()))
}

#[get("/api/pdf/books")]
async fn book_list_pdf(data: web::Data<AppState>) -> Result<HttpResponse, RenderError> {
    capture(&data, RenderTarget::BookList).await
}

#[get("/api/pdf/books/{id}")]
async fn book_detail_pdf(
    data: web::Data<AppState>,
    id: web::Path<u32>,
) -> Result<HttpResponse, RenderError> {
    match RenderTarget::book_detail(id.into_inner()) {
        Some(target) => capture(&data, target).await,
        None => Ok(HttpResponse::BadRequest()
            .json(json!({"error": "book id must be a positive integer"}))),
    }
}

#[get("/health")]
async fn health(data: web::Data<AppState>) -> impl Responder {
    let orchestrator = &data.orchestrator;
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "frontend_url": orchestrator.origin().to_string(),
        "live_sessions": orchestrator.live_sessions(),
        "available_render_slots": orchestrator.available_permits(),
        "uptime_secs": data.uptime_secs(),
    }))
}

#[get("/metrics")]
async fn metrics(data: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(data.orchestrator.metrics().get_all_metrics())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(book_list_pdf)
        .service(book_detail_pdf)
        .service(health)
        .service(metrics);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RenderStage;
    use actix_web::body::to_bytes;
    use std::time::Duration;

    async fn body_of(err: RenderError) -> (StatusCode, serde_json::Value) {
        let resp = err.error_response();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[actix_web::test]
    async fn test_internal_error_body_has_full_shape() {
        let (status, body) = body_of(RenderError::Internal("task panicked".to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["kind"], "internal");
        assert_eq!(body["stage"], "released");
        assert_eq!(body["error"], "render aborted: task panicked");
    }

    #[actix_web::test]
    async fn test_overloaded_is_service_unavailable() {
        let (status, body) = body_of(RenderError::Overloaded {
            waited: Duration::from_secs(30),
        })
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["kind"], "overloaded");
        assert_eq!(body["stage"], RenderStage::Created.as_str());
    }
}
