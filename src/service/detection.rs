// 该文件是 Shanan Detect （山南西风·识图） 项目的一部分。
// src/service/detection.rs - 检测服务路由
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

use std::{sync::Arc, time::Instant};

use axum::{
  Json, Router,
  extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartRejection},
  routing::{get, post},
};
use tracing::{debug, info};

use crate::{
  codec::ImageCodec,
  model::DetectionEngine,
  output::{Annotator, ResponseAssembler, ResponsePayload},
  service::{error::ServiceError, multipart::read_image_field},
};

pub const LIVENESS_TEXT: &str = "YOLO is up.";

/// 检测服务的共享状态，启动后只读
pub struct DetectionState {
  engine: Arc<DetectionEngine>,
  codec: ImageCodec,
  annotator: Annotator,
  assembler: ResponseAssembler,
}

impl DetectionState {
  pub fn new(engine: DetectionEngine, annotator: Annotator, assembler: ResponseAssembler) -> Self {
    Self {
      engine: Arc::new(engine),
      codec: ImageCodec::default(),
      annotator,
      assembler,
    }
  }

  /// 解码、推理、标注并组装应答；阻塞执行
  pub fn run(&self, bytes: &[u8]) -> Result<ResponsePayload, ServiceError> {
    let started = Instant::now();
    let frame = self
      .codec
      .decode(bytes)
      .map_err(|e| ServiceError::InvalidImage(e.to_string()))?;
    let decoded = started.elapsed();

    let detections = self
      .engine
      .detect(&frame)
      .map_err(|e| ServiceError::Inference(e.to_string()))?;
    let inferred = started.elapsed();

    let annotated = self.annotator.render(&frame, &detections);
    let payload = self
      .assembler
      .build(&detections, &annotated)
      .map_err(|e| ServiceError::Internal(e.to_string()))?;

    info!(
      "检测完成 {}x{}: {} 个目标, 解码 {:?}, 推理 {:?}, 总计 {:?}",
      frame.width(),
      frame.height(),
      detections.len(),
      decoded,
      inferred - decoded,
      started.elapsed()
    );
    Ok(payload)
  }
}

pub fn router(state: Arc<DetectionState>, max_upload_bytes: usize) -> Router {
  Router::new()
    .route("/", get(liveness))
    .route("/detect", post(detect))
    .layer(DefaultBodyLimit::max(max_upload_bytes))
    .with_state(state)
}

async fn liveness() -> &'static str {
  LIVENESS_TEXT
}

async fn detect(
  State(state): State<Arc<DetectionState>>,
  multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ResponsePayload>, ServiceError> {
  let upload = read_image_field(multipart).await?;
  debug!("检测请求: {:?}, {} 字节", upload.filename, upload.bytes.len());

  let payload = tokio::task::spawn_blocking(move || state.run(&upload.bytes))
    .await
    .map_err(|e| ServiceError::Internal(e.to_string()))??;
  Ok(Json(payload))
}
