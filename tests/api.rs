mod common;

use actix_web::body::{BodySize, MessageBody};
use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Value};

use common::{test_config, wav_bytes};
use forensic_audio_service::api;
use forensic_audio_service::config::PipelineConfig;
use forensic_audio_service::pipeline::{JobCoordinator, STEM_CATEGORIES};

const BOUNDARY: &str = "----forensic-test-boundary";

fn multipart_body(field: &str, filename: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: audio/wav\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

macro_rules! service {
    ($config:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(JobCoordinator::with_process_engines($config)))
                .configure(api::config),
        )
        .await
    };
}

fn assert_complete_contract(body: &Value) {
    assert_eq!(body["status"], "Success");
    for category in STEM_CATEGORIES {
        assert!(body["stems"][category].is_string(), "missing stem {category}");
    }
    assert!(!body["classification"]["soundEvents"].as_array().unwrap().is_empty());
}

#[actix_web::test]
async fn health_reports_simulation_mode() {
    let root = tempfile::tempdir().unwrap();
    let app = service!(test_config(root.path()));

    let req = test::TestRequest::get().uri("/api/v1/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["status"], "healthy");
    assert_eq!(body["simulation_enabled"], true);
}

#[actix_web::test]
async fn json_upload_without_engines_returns_simulated_contract() {
    let root = tempfile::tempdir().unwrap();
    let app = service!(test_config(root.path()));

    let req = test::TestRequest::post()
        .uri("/api/v1/classify-audio")
        .set_json(json!({
            "audioData": STANDARD.encode(wav_bytes(1)),
            "filename": "job_42"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_complete_contract(&body);
    assert_eq!(body["jobID"], "simulation_mode");
    assert_eq!(body["simulated"], true);
    assert_eq!(body["frequencySpectrum"].as_array().unwrap().len(), 50);
    assert!(!body["debug"].as_array().unwrap().is_empty());
    assert!(common::entries(&root.path().join("work")).is_empty());
}

#[cfg(unix)]
#[actix_web::test]
async fn multipart_upload_runs_both_engines() {
    let root = tempfile::tempdir().unwrap();
    let config = PipelineConfig {
        classifier: common::sh_engine(common::ECHO_CLASSIFIER),
        separator: common::sh_engine(common::HANDOFF_SEPARATOR),
        ..test_config(root.path())
    };
    let app = service!(config);

    let req = test::TestRequest::post()
        .uri("/api/v1/classify-audio/forensic")
        .insert_header((
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(multipart_body("file", "Street Take.wav", &wav_bytes(1)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["jobID"], "street_take_wav");
    assert_eq!(body["simulated"], false);
    assert_eq!(body["classification"]["jobID"], "street_take_wav");
    assert_eq!(
        body["stems"]["vocals"],
        "/separated_audio/htdemucs/street_take_wav/vocals.wav"
    );
    for category in STEM_CATEGORIES {
        assert!(body["stems"].get(category).is_some(), "missing stem slot {category}");
    }
    assert!(body["stems"]["animals"].is_null());
}

#[actix_web::test]
async fn multipart_without_audio_field_is_bad_request() {
    let root = tempfile::tempdir().unwrap();
    let app = service!(test_config(root.path()));

    let req = test::TestRequest::post()
        .uri("/api/v1/classify-audio")
        .insert_header((
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(multipart_body("attachment", "notes.txt", b"hello"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn invalid_base64_is_bad_request() {
    let root = tempfile::tempdir().unwrap();
    let app = service!(test_config(root.path()));

    let req = test::TestRequest::post()
        .uri("/api/v1/classify-audio")
        .set_json(json!({"audioData": "%%% not base64 %%%", "filename": "x.wav"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error_type"], "InvalidRequest");
}

#[actix_web::test]
async fn strict_mode_reports_engine_failure_as_bad_gateway() {
    let root = tempfile::tempdir().unwrap();
    let config = PipelineConfig {
        simulation_enabled: false,
        ..test_config(root.path())
    };
    let app = service!(config);

    let req = test::TestRequest::post()
        .uri("/api/v1/classify-audio")
        .set_json(json!({"audioData": STANDARD.encode(wav_bytes(1)), "filename": "job_42"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error_type"], "SpawnError");
    assert!(common::entries(&root.path().join("work")).is_empty());
}

#[actix_web::test]
async fn serves_separated_stems_and_rejects_traversal() {
    let root = tempfile::tempdir().unwrap();
    let config = test_config(root.path());
    let stem_dir = config.stems_dir.join("htdemucs").join("job_42");
    std::fs::create_dir_all(&stem_dir).unwrap();
    std::fs::write(stem_dir.join("vocals.wav"), b"RIFFdata").unwrap();
    std::fs::write(root.path().join("secret.txt"), b"secret").unwrap();
    let app = service!(config);

    let req = test::TestRequest::get()
        .uri("/separated_audio/htdemucs/job_42/vocals.wav")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("content-type").unwrap(), "audio/wav");
    assert_eq!(test::read_body(resp).await.as_ref(), b"RIFFdata");

    let req = test::TestRequest::get()
        .uri("/separated_audio/htdemucs/job_42/missing.wav")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::get()
        .uri("/separated_audio/..%2Fsecret.txt")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn large_stems_are_streamed_with_their_length() {
    let root = tempfile::tempdir().unwrap();
    let config = test_config(root.path());
    let stem_dir = config.stems_dir.join("htdemucs").join("job_42");
    std::fs::create_dir_all(&stem_dir).unwrap();
    let audio: Vec<u8> = (0..3 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
    std::fs::write(stem_dir.join("no_vocals.wav"), &audio).unwrap();
    let app = service!(config);

    let req = test::TestRequest::get()
        .uri("/separated_audio/htdemucs/job_42/no_vocals.wav")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.response().body().size(), BodySize::Sized(audio.len() as u64));
    assert_eq!(test::read_body(resp).await.as_ref(), audio.as_slice());
}
