// 该文件是 Shanan Detect （山南西风·识图） 项目的一部分。
// src/service/front.rs - 前端服务路由
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

use std::{io::ErrorKind, path::PathBuf, sync::Arc};

use axum::{
  Json, Router,
  extract::{DefaultBodyLimit, Multipart, Path, State, multipart::MultipartRejection},
  http::header,
  response::{IntoResponse, Response},
  routing::{get, post},
};
use image::ImageFormat;
use tracing::{debug, info, warn};

use crate::{
  pipeline::{Orchestrator, PipelineOutput},
  service::{error::ServiceError, multipart::read_image_field},
};

pub const LIVENESS_TEXT: &str = "Front service is running";

pub struct FrontState {
  orchestrator: Orchestrator,
  image_folder: PathBuf,
}

impl FrontState {
  pub fn new(orchestrator: Orchestrator, image_folder: impl Into<PathBuf>) -> Self {
    Self {
      orchestrator,
      image_folder: image_folder.into(),
    }
  }
}

pub fn router(state: Arc<FrontState>, max_upload_bytes: usize) -> Router {
  Router::new()
    .route("/", get(liveness))
    .route("/upload", post(upload))
    .route("/uploads/{name}", get(serve_upload))
    .layer(DefaultBodyLimit::max(max_upload_bytes))
    .with_state(state)
}

async fn liveness() -> &'static str {
  LIVENESS_TEXT
}

async fn upload(
  State(state): State<Arc<FrontState>>,
  multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ServiceError> {
  let upload = read_image_field(multipart).await?;
  info!("收到上传: {:?}, {} 字节", upload.filename, upload.bytes.len());

  let output = state.orchestrator.process(upload).await.map_err(|e| {
    warn!("请求终止于 {:?}", e.terminal_state());
    ServiceError::from(e)
  })?;
  match output {
    PipelineOutput::Payload(payload) => Ok(Json(payload).into_response()),
    PipelineOutput::Verbatim(body) => {
      Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
    }
  }
}

/// 只允许单层文件名，拒绝任何路径分隔符与上跳
pub fn is_safe_name(name: &str) -> bool {
  !name.is_empty()
    && !name.contains('/')
    && !name.contains('\\')
    && !name.contains("..")
    && !name.contains('\0')
}

async fn serve_upload(
  State(state): State<Arc<FrontState>>,
  Path(name): Path<String>,
) -> Result<Response, ServiceError> {
  if !is_safe_name(&name) {
    return Err(ServiceError::InvalidName(name));
  }

  let path = state.image_folder.join(&name);
  let bytes = match tokio::fs::read(&path).await {
    Ok(bytes) => bytes,
    Err(e) if e.kind() == ErrorKind::NotFound => return Err(ServiceError::NotFound(name)),
    Err(e) => return Err(ServiceError::Internal(e.to_string())),
  };
  debug!("发送文件 {}, {} 字节", path.display(), bytes.len());

  let mime = ImageFormat::from_path(&path)
    .map(|f| f.to_mime_type())
    .unwrap_or("application/octet-stream");
  Ok(([(header::CONTENT_TYPE, mime)], bytes).into_response())
}
