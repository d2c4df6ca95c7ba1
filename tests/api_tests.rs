// tests/api_tests.rs
use actix_web::http::StatusCode;
use actix_web::http::header::CONTENT_DISPOSITION;
use actix_web::{test, web, App};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose};
use liverseg::api::handlers::WsBroker;
use liverseg::api::{configure_routes, AppState};
use liverseg::client::SegmentationApi;
use liverseg::config::AppConfig;
use liverseg::errors::{Result, SegError};
use liverseg::models::{HealthStatus, SegmentationOutcome, SegmentationResult, Statistics, UploadRequest};
use serde_json::Value;
use std::sync::Arc;

/// Answers every submission with the same outcome.
struct StubApi {
    outcome: SegmentationOutcome,
}

#[async_trait]
impl SegmentationApi for StubApi {
    async fn submit(&self, request: UploadRequest) -> SegmentationOutcome {
        assert!(request.file.is_some());
        self.outcome.clone()
    }

    async fn health(&self) -> Result<HealthStatus> {
        Err(SegError::Config("offline".to_string()))
    }
}

fn success(artifact: &str) -> SegmentationOutcome {
    SegmentationOutcome::Success(SegmentationResult {
        overlay_image: "data:image/png;base64,AA==".to_string(),
        segmentation_artifact: Some(artifact.to_string()),
        statistics: Statistics {
            volume_shape: [128, 128, 64],
            liver_voxels: 50000,
            total_voxels: 2000000,
            liver_percentage: 2.5,
            slice_index: 10,
            total_slices: 64,
            modality: "T2".to_string(),
            liver_volume_ml: 980.0,
        },
        medical_report: None,
    })
}

fn state_with(outcome: SegmentationOutcome) -> AppState {
    AppState::new(AppConfig::default(), Arc::new(StubApi { outcome }))
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state))
                .app_data(web::Data::new(WsBroker::new()))
                .configure(configure_routes),
        )
        .await
    };
}

#[actix_rt::test]
async fn full_session_flow() {
    let encoded = general_purpose::STANDARD.encode(b"mask volume");
    let app = app!(state_with(success(&encoded)));

    let req = test::TestRequest::post().uri("/api/v1/sessions").to_request();
    let created: Value = test::call_and_read_body_json(&app, req).await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["session"]["state"], "idle");

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/sessions/{}/submit", id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/sessions/{}/report", id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/sessions/{}/file?name=scan.nii.gz", id))
        .set_payload(b"volume".to_vec())
        .to_request();
    let view: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(view["file_name"], "scan.nii.gz");

    let req = test::TestRequest::put()
        .uri(&format!("/api/v1/sessions/{}/options", id))
        .set_json(serde_json::json!({ "modality": "T2", "slice_idx": 10 }))
        .to_request();
    let view: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(view["modality"], "T2");
    assert_eq!(view["slice_index"], 10);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/sessions/{}/submit", id))
        .to_request();
    let view: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(view["state"], "succeeded");
    assert_eq!(view["statistics"]["liver_percentage"], 2.5);
    assert_eq!(view["has_artifact"], true);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/sessions/{}/artifact", id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let disposition = resp.headers().get(CONTENT_DISPOSITION).unwrap().to_str().unwrap().to_string();
    assert!(disposition.contains("liver_segmentation.nii.gz"));
    let body = test::read_body(resp).await;
    assert_eq!(&body[..], b"mask volume");
}

#[actix_rt::test]
async fn failed_submission_is_reported_in_view() {
    let app = app!(state_with(SegmentationOutcome::failure(
        liverseg::errors::FailureKind::Application,
        "Invalid NIfTI header"
    )));

    let req = test::TestRequest::post().uri("/api/v1/sessions").to_request();
    let created: Value = test::call_and_read_body_json(&app, req).await;
    let id = created["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/sessions/{}/file?name=scan.nii", id))
        .set_payload(b"volume".to_vec())
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/sessions/{}/submit", id))
        .to_request();
    let view: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(view["state"], "failed");
    assert_eq!(view["error"], "Invalid NIfTI header");

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/sessions/{}/artifact", id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[actix_rt::test]
async fn corrupt_artifact_is_unprocessable() {
    let app = app!(state_with(success("%%% not base64 %%%")));

    let req = test::TestRequest::post().uri("/api/v1/sessions").to_request();
    let created: Value = test::call_and_read_body_json(&app, req).await;
    let id = created["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/sessions/{}/file?name=scan.nii", id))
        .set_payload(b"volume".to_vec())
        .to_request();
    test::call_service(&app, req).await;
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/sessions/{}/submit", id))
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/sessions/{}/artifact", id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["kind"], "decode");
}

#[actix_rt::test]
async fn rejects_unknown_sessions_and_non_nifti_files() {
    let app = app!(state_with(success("AA==")));

    let req = test::TestRequest::get()
        .uri("/api/v1/sessions/00000000-0000-0000-0000-000000000000")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::post().uri("/api/v1/sessions").to_request();
    let created: Value = test::call_and_read_body_json(&app, req).await;
    let id = created["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/sessions/{}/file?name=scan.dcm", id))
        .set_payload(b"volume".to_vec())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn closed_sessions_are_not_found() {
    let app = app!(state_with(success("AA==")));

    let req = test::TestRequest::post().uri("/api/v1/sessions").to_request();
    let created: Value = test::call_and_read_body_json(&app, req).await;
    let id = created["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/sessions/{}", id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/sessions/{}", id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/sessions/{}", id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn oldest_session_is_evicted_at_capacity() {
    let mut config = AppConfig::default();
    config.server.max_sessions = 1;
    let app = app!(AppState::new(config, Arc::new(StubApi { outcome: success("AA==") })));

    let req = test::TestRequest::post().uri("/api/v1/sessions").to_request();
    let first: Value = test::call_and_read_body_json(&app, req).await;
    let req = test::TestRequest::post().uri("/api/v1/sessions").to_request();
    let second: Value = test::call_and_read_body_json(&app, req).await;

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/sessions/{}", first["id"].as_str().unwrap()))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/sessions/{}", second["id"].as_str().unwrap()))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
}

#[actix_rt::test]
async fn health_reports_unreachable_service() {
    let app = app!(state_with(success("AA==")));

    let req = test::TestRequest::get().uri("/api/v1/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["segmentation_service"]["status"], "unreachable");
}
