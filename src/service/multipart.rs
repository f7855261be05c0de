// 该文件是 Shanan Detect （山南西风·识图） 项目的一部分。
// src/service/multipart.rs - 读取 multipart 图像字段
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

use axum::extract::{Multipart, multipart::MultipartRejection};
use tracing::debug;

use crate::{
  pipeline::{Upload, backend::IMAGE_FIELD},
  service::error::ServiceError,
};

/// 取出名为 `image` 的字段；请求体不是 multipart、字段缺失或为空都视为未提供图像
pub async fn read_image_field(
  multipart: Result<Multipart, MultipartRejection>,
) -> Result<Upload, ServiceError> {
  let mut multipart = multipart.map_err(|e| {
    debug!("请求体不是 multipart: {}", e);
    ServiceError::MissingImage
  })?;

  while let Some(field) = multipart
    .next_field()
    .await
    .map_err(|e| ServiceError::MalformedBody(e.to_string()))?
  {
    if field.name() != Some(IMAGE_FIELD) {
      continue;
    }
    let filename = field.file_name().map(str::to_string);
    let bytes = field
      .bytes()
      .await
      .map_err(|e| ServiceError::MalformedBody(e.to_string()))?;
    if bytes.is_empty() {
      return Err(ServiceError::MissingImage);
    }

    debug!("收到图像字段 {:?}, {} 字节", filename, bytes.len());
    return Ok(Upload {
      filename,
      bytes: bytes.to_vec(),
    });
  }

  Err(ServiceError::MissingImage)
}
