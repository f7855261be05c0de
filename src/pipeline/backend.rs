// 该文件是 Shanan Detect （山南西风·识图） 项目的一部分。
// src/pipeline/backend.rs - 远端检测服务客户端
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

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use thiserror::Error;
use tracing::debug;
use url::Url;

/// multipart 中图像字段的名称
pub const IMAGE_FIELD: &str = "image";

#[derive(Error, Debug)]
pub enum BackendError {
  #[error("检测服务地址无效: {0}")]
  InvalidUrl(String),
  #[error("无法连接检测服务: {0}")]
  Unreachable(String),
}

#[derive(Debug, Clone)]
pub struct DetectRequest {
  pub filename: String,
  pub mime: &'static str,
  pub bytes: Vec<u8>,
}

/// 检测服务的原始应答
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendReply {
  pub status: u16,
  pub body: String,
}

impl BackendReply {
  pub fn is_success(&self) -> bool {
    self.status == 200
  }
}

#[async_trait]
pub trait DetectionBackend: Send + Sync {
  async fn detect(&self, request: DetectRequest) -> Result<BackendReply, BackendError>;
}

/// 通过 HTTP multipart 调用 `POST {base}/detect`
pub struct HttpDetectionBackend {
  client: reqwest::Client,
  endpoint: Url,
}

impl HttpDetectionBackend {
  pub fn new(base_url: &Url) -> Result<Self, BackendError> {
    let mut base = base_url.clone();
    if !base.path().ends_with('/') {
      let path = format!("{}/", base.path());
      base.set_path(&path);
    }
    let endpoint = base
      .join("detect")
      .map_err(|e| BackendError::InvalidUrl(e.to_string()))?;
    let client = reqwest::Client::builder()
      .build()
      .map_err(|e| BackendError::InvalidUrl(e.to_string()))?;
    Ok(Self { client, endpoint })
  }

  pub fn endpoint(&self) -> &Url {
    &self.endpoint
  }
}

#[async_trait]
impl DetectionBackend for HttpDetectionBackend {
  async fn detect(&self, request: DetectRequest) -> Result<BackendReply, BackendError> {
    let part = Part::bytes(request.bytes)
      .file_name(request.filename)
      .mime_str(request.mime)
      .map_err(|e| BackendError::InvalidUrl(e.to_string()))?;
    let form = Form::new().part(IMAGE_FIELD, part);

    debug!("发送检测请求: {}", self.endpoint);
    let response = self
      .client
      .post(self.endpoint.clone())
      .multipart(form)
      .send()
      .await
      .map_err(|e| BackendError::Unreachable(e.to_string()))?;

    let status = response.status().as_u16();
    let body = response
      .text()
      .await
      .map_err(|e| BackendError::Unreachable(e.to_string()))?;
    Ok(BackendReply { status, body })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn endpoint_keeps_base_path() {
    let plain = HttpDetectionBackend::new(&Url::parse("http://ai_backend:5001").unwrap()).unwrap();
    assert_eq!(plain.endpoint().as_str(), "http://ai_backend:5001/detect");

    let nested = HttpDetectionBackend::new(&Url::parse("http://gateway/ai").unwrap()).unwrap();
    assert_eq!(nested.endpoint().as_str(), "http://gateway/ai/detect");
  }
}
