//! HTTP surface tests, driven through actix's test service.

mod common;

use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use book_capture::app_state::AppState;
use book_capture::routes;
use common::{fast_orchestrator, MockEngine, PageScript};
use serde_json::Value;

fn state(script: PageScript) -> web::Data<AppState> {
    let (engine, _) = MockEngine::new(script);
    web::Data::new(AppState::new(fast_orchestrator(engine)))
}

#[actix_web::test]
async fn test_book_list_pdf() {
    let app = test::init_service(
        App::new()
            .app_data(state(PageScript::default()))
            .configure(routes::configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/pdf/books").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/pdf"
    );
    let disposition = resp
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment"));
    assert!(disposition.contains("books-list-2024-01-01.pdf"));

    let body = test::read_body(resp).await;
    assert!(body.starts_with(b"%PDF-"));
}

#[actix_web::test]
async fn test_book_detail_pdf() {
    let app = test::init_service(
        App::new()
            .app_data(state(PageScript::default()))
            .configure(routes::configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/pdf/books/42").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let disposition = resp.headers().get(header::CONTENT_DISPOSITION).unwrap();
    assert!(disposition
        .to_str()
        .unwrap()
        .contains("book-detail-42-2024-01-01.pdf"));
}

#[actix_web::test]
async fn test_book_id_zero_is_rejected() {
    let app = test::init_service(
        App::new()
            .app_data(state(PageScript::default()))
            .configure(routes::configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/pdf/books/0").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::get().uri("/api/pdf/books/abc").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_render_failure_is_json() {
    let app = test::init_service(
        App::new()
            .app_data(state(PageScript {
                pdf: Err("Target closed".to_string()),
                ..PageScript::default()
            }))
            .configure(routes::configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/pdf/books/3").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["kind"], "export_failure");
    assert_eq!(body["stage"], "ready");
    assert!(body["error"].as_str().unwrap().contains("Target closed"));
}

#[actix_web::test]
async fn test_health_and_metrics() {
    let data = state(PageScript::default());
    let app = test::init_service(
        App::new()
            .app_data(data.clone())
            .configure(routes::configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/pdf/books").to_request();
    assert!(test::call_service(&app, req).await.status().is_success());

    let req = test::TestRequest::get().uri("/health").to_request();
    let health: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["live_sessions"], 0);
    assert_eq!(health["frontend_url"], "http://frontend.test:3000/");

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let metrics: Value = test::call_and_read_body_json(&app, req).await;
    let entries = metrics.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["target_kind"], "books-list");
    assert_eq!(entries[0]["successful_renders"], 1);
    assert_eq!(data.orchestrator.live_sessions(), 0);
}

#[actix_web::test]
async fn test_crashed_render_task_keeps_error_shape() {
    let (engine, recorder) = MockEngine::new(PageScript {
        print_panics: true,
        ..PageScript::default()
    });
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(AppState::new(fast_orchestrator(engine))))
            .configure(routes::configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/pdf/books/9").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["kind"], "internal");
    assert_eq!(body["stage"], "released");
    assert!(body["error"].as_str().unwrap().contains("book-detail #9"));
    assert!(recorder.all_released());
}
