// 该文件是 Shanan Detect （山南西风·识图） 项目的一部分。
// src/service/error.rs - HTTP 错误映射
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

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

use crate::pipeline::PipelineError;

/// 所有失败应答共用的 JSON 结构
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
  pub error: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub detail: Option<String>,
}

#[derive(Error, Debug)]
pub enum ServiceError {
  #[error("No image file provided")]
  MissingImage,
  #[error("Malformed multipart body: {0}")]
  MalformedBody(String),
  #[error("Invalid image: {0}")]
  InvalidImage(String),
  #[error("Inference failed: {0}")]
  Inference(String),
  #[error("AI backend error ({status})")]
  Backend { status: u16, detail: String },
  #[error("AI backend unavailable: {0}")]
  BackendUnavailable(String),
  #[error("Invalid file name: {0}")]
  InvalidName(String),
  #[error("File not found: {0}")]
  NotFound(String),
  #[error("Internal error: {0}")]
  Internal(String),
}

impl ServiceError {
  pub fn status(&self) -> StatusCode {
    match self {
      ServiceError::MissingImage
      | ServiceError::MalformedBody(_)
      | ServiceError::InvalidImage(_)
      | ServiceError::InvalidName(_) => StatusCode::BAD_REQUEST,
      ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
      ServiceError::Backend { status, .. } => {
        StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
      }
      ServiceError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
      ServiceError::Inference(_) | ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  pub fn body(&self) -> ErrorBody {
    let (error, detail) = match self {
      ServiceError::MissingImage => ("No image file provided", None),
      ServiceError::MalformedBody(d) => ("Malformed multipart body", Some(d.clone())),
      ServiceError::InvalidImage(d) => ("Invalid image", Some(d.clone())),
      ServiceError::Inference(d) => ("Inference failed", Some(d.clone())),
      ServiceError::Backend { detail, .. } => ("AI backend error", Some(detail.clone())),
      ServiceError::BackendUnavailable(d) => ("AI backend unavailable", Some(d.clone())),
      ServiceError::InvalidName(d) => ("Invalid file name", Some(d.clone())),
      ServiceError::NotFound(d) => ("File not found", Some(d.clone())),
      ServiceError::Internal(d) => ("Internal error", Some(d.clone())),
    };
    ErrorBody {
      error: error.to_string(),
      detail,
    }
  }
}

impl From<PipelineError> for ServiceError {
  fn from(err: PipelineError) -> Self {
    match err {
      PipelineError::MissingImage => ServiceError::MissingImage,
      PipelineError::InvalidImage(e) => ServiceError::InvalidImage(e.to_string()),
      PipelineError::DetectionServiceUnavailable(d) => ServiceError::BackendUnavailable(d),
      PipelineError::DetectionServiceError { status, detail } => {
        ServiceError::Backend { status, detail }
      }
      // 远端 200 但应答无法解析，按网关错误处理
      PipelineError::InvalidReply(detail) => ServiceError::Backend {
        status: StatusCode::BAD_GATEWAY.as_u16(),
        detail,
      },
      e @ (PipelineError::PreprocessFailed(_)
      | PipelineError::EncodeFailed(_)
      | PipelineError::Spool(_)
      | PipelineError::Worker(_)) => ServiceError::Internal(e.to_string()),
    }
  }
}

impl IntoResponse for ServiceError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      error!("请求失败 {}: {}", status, self);
    } else {
      warn!("请求被拒绝 {}: {}", status, self);
    }
    (status, Json(self.body())).into_response()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_image_has_no_detail() {
    let body = serde_json::to_value(ServiceError::MissingImage.body()).unwrap();
    assert_eq!(body, serde_json::json!({ "error": "No image file provided" }));
    assert_eq!(ServiceError::MissingImage.status(), StatusCode::BAD_REQUEST);
  }

  #[test]
  fn backend_status_is_preserved() {
    let err = ServiceError::from(PipelineError::DetectionServiceError {
      status: 500,
      detail: "boom".to_string(),
    });
    assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
      err.body(),
      ErrorBody {
        error: "AI backend error".to_string(),
        detail: Some("boom".to_string()),
      }
    );
  }

  #[test]
  fn unavailable_maps_to_503() {
    let err = ServiceError::from(PipelineError::DetectionServiceUnavailable("timeout".into()));
    assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(err.body().error, "AI backend unavailable");
  }
}
