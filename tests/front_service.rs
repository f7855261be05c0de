// 该文件是 Shanan Detect （山南西风·识图） 项目的一部分。
// tests/front_service.rs - 前端服务端到端测试
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

mod common;

use std::{
  net::SocketAddr,
  sync::Arc,
  time::{Duration, Instant},
};

use axum::{Router, http::StatusCode, routing::post};
use url::Url;

use shanan_detect::{
  output::{Annotator, ResponsePayload},
  pipeline::{HttpDetectionBackend, Orchestrator, PipelineConfig, RelayMode},
  service::{self, ErrorBody, FrontState},
};

use common::*;

struct Front {
  addr: SocketAddr,
  spool: tempfile::TempDir,
  images: tempfile::TempDir,
}

impl Front {
  fn url(&self, path: &str) -> String {
    format!("http://{}{}", self.addr, path)
  }

  fn spool_entries(&self) -> usize {
    std::fs::read_dir(self.spool.path()).unwrap().count()
  }
}

async fn spawn_front(backend: SocketAddr, relay_mode: RelayMode, deadline: Duration) -> Front {
  let spool = tempfile::tempdir().unwrap();
  let images = tempfile::tempdir().unwrap();
  let config = PipelineConfig {
    deadline,
    spool_root: spool.path().to_path_buf(),
    relay_mode,
    ..PipelineConfig::default()
  };

  let base = Url::parse(&format!("http://{}", backend)).unwrap();
  let backend = HttpDetectionBackend::new(&base).unwrap();
  let orchestrator = Orchestrator::new(Arc::new(backend), Annotator::default(), config).unwrap();
  let state = Arc::new(FrontState::new(orchestrator, images.path()));
  let addr = spawn(service::front::router(state, 16 * service::MIB)).await;
  Front {
    addr,
    spool,
    images,
  }
}

fn error_body(body: &str) -> ErrorBody {
  serde_json::from_str(body).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn upload_round_trip_in_original_coordinates() {
  let backend = spawn(detection_router()).await;
  let front = spawn_front(backend, RelayMode::Reproject, Duration::from_secs(10)).await;

  let form = image_form("image", "scene.jpg", scene_jpeg(1024, 768));
  let (status, body) = post_form(front.url("/upload"), form).await;
  assert_eq!(status, 200, "{}", body);

  let payload: ResponsePayload = serde_json::from_str(&body).unwrap();
  assert_eq!(payload.detections.len(), 1);
  let person = &payload.detections[0];
  assert_eq!(person.label, "person");
  assert!(person.confidence > 0.5);

  let [x1, y1, x2, y2] = person.bbox;
  let (cx, cy) = ((x1 + x2) / 2.0, (y1 + y2) / 2.0);
  assert!((cx - 512.0).abs() < 2.0, "cx = {}", cx);
  assert!((cy - 384.0).abs() < 2.0, "cy = {}", cy);
  assert!((x2 - x1 - 320.0).abs() < 2.0);
  assert!((y2 - y1 - 240.0).abs() < 2.0);

  let annotated = payload.decode_annotated_image().unwrap();
  assert_eq!(annotated.dimensions(), (1024, 768));
  assert_eq!(front.spool_entries(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn verbatim_relay_returns_working_coordinates() {
  let backend = spawn(detection_router()).await;
  let front = spawn_front(backend, RelayMode::Verbatim, Duration::from_secs(10)).await;

  let form = image_form("image", "scene.jpg", scene_jpeg(1024, 768));
  let (status, body) = post_form(front.url("/upload"), form).await;
  assert_eq!(status, 200, "{}", body);

  let payload: ResponsePayload = serde_json::from_str(&body).unwrap();
  let [x1, y1, x2, y2] = payload.detections[0].bbox;
  assert!((x1 - 220.0).abs() < 1.0 && (y1 - 165.0).abs() < 1.0);
  assert!((x2 - 420.0).abs() < 1.0 && (y2 - 315.0).abs() < 1.0);
  assert_eq!(payload.decode_annotated_image().unwrap().dimensions(), (640, 480));
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_field_is_400() {
  let backend = spawn(detection_router()).await;
  let front = spawn_front(backend, RelayMode::Reproject, Duration::from_secs(10)).await;

  let form = image_form("picture", "scene.jpg", scene_jpeg(64, 48));
  let (status, body) = post_form(front.url("/upload"), form).await;
  assert_eq!(status, 400);
  assert_eq!(
    error_body(&body),
    ErrorBody {
      error: "No image file provided".to_string(),
      detail: None,
    }
  );
  assert_eq!(front.spool_entries(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_image_is_400() {
  let backend = spawn(detection_router()).await;
  let front = spawn_front(backend, RelayMode::Reproject, Duration::from_secs(10)).await;

  let form = image_form("image", "scene.jpg", b"GIF89a but not really".to_vec());
  let (status, body) = post_form(front.url("/upload"), form).await;
  assert_eq!(status, 400);
  assert_eq!(error_body(&body).error, "Invalid image");
  assert_eq!(front.spool_entries(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn upstream_error_is_relayed() {
  let failing = Router::new().route(
    "/detect",
    post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model on fire") }),
  );
  let backend = spawn(failing).await;
  let front = spawn_front(backend, RelayMode::Reproject, Duration::from_secs(10)).await;

  let form = image_form("image", "scene.jpg", scene_jpeg(320, 240));
  let (status, body) = post_form(front.url("/upload"), form).await;
  assert_eq!(status, 500);
  assert_eq!(
    error_body(&body),
    ErrorBody {
      error: "AI backend error".to_string(),
      detail: Some("model on fire".to_string()),
    }
  );
  assert_eq!(front.spool_entries(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn stalled_backend_is_503_within_deadline() {
  let stalled = Router::new().route(
    "/detect",
    post(|| async {
      tokio::time::sleep(Duration::from_secs(30)).await;
      "too late"
    }),
  );
  let backend = spawn(stalled).await;
  let front = spawn_front(backend, RelayMode::Reproject, Duration::from_millis(500)).await;

  let started = Instant::now();
  let form = image_form("image", "scene.jpg", scene_jpeg(320, 240));
  let (status, body) = post_form(front.url("/upload"), form).await;
  assert_eq!(status, 503);
  assert_eq!(error_body(&body).error, "AI backend unavailable");
  assert!(started.elapsed() < Duration::from_secs(10));
  assert_eq!(front.spool_entries(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_backend_is_503() {
  let backend = closed_port().await;
  let front = spawn_front(backend, RelayMode::Reproject, Duration::from_secs(5)).await;

  let form = image_form("image", "scene.jpg", scene_jpeg(320, 240));
  let (status, body) = post_form(front.url("/upload"), form).await;
  assert_eq!(status, 503);
  assert_eq!(error_body(&body).error, "AI backend unavailable");
}

#[tokio::test(flavor = "multi_thread")]
async fn uploads_are_served_from_image_folder() {
  let backend = closed_port().await;
  let front = spawn_front(backend, RelayMode::Reproject, Duration::from_secs(5)).await;
  let png = front.images.path().join("sample.png");
  image::RgbImage::new(4, 4).save(&png).unwrap();

  let response = reqwest::get(front.url("/uploads/sample.png")).await.unwrap();
  assert_eq!(response.status().as_u16(), 200);
  assert_eq!(
    response.headers()["content-type"].to_str().unwrap(),
    "image/png"
  );
  let bytes = response.bytes().await.unwrap();
  assert_eq!(bytes.as_ref(), std::fs::read(&png).unwrap().as_slice());

  let missing = reqwest::get(front.url("/uploads/nope.png")).await.unwrap();
  assert_eq!(missing.status().as_u16(), 404);

  for path in ["/uploads/..%2Fsecret.txt", "/uploads/bad..name.png", "/uploads/a%5Cb.png"] {
    let rejected = reqwest::get(front.url(path)).await.unwrap();
    assert_eq!(rejected.status().as_u16(), 400, "{}", path);
  }
}
