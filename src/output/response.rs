// 该文件是 Shanan Detect （山南西风·识图） 项目的一部分。
// src/output/response.rs - 检测响应的组装与解析
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

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
  codec::{CodecError, EncodeFormat, ImageCodec},
  frame::{CoordinateSpace, Frame, Original},
  model::{ClassNames, Detection, DetectionSet},
};

#[derive(Error, Debug)]
pub enum ResponseError {
  #[error("base64 解码错误: {0}")]
  Base64(#[from] base64::DecodeError),
  #[error("标注图像错误: {0}")]
  Codec(#[from] CodecError),
}

/// 序列化用的检测记录，坐标保留两位小数，置信度保留三位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
  pub class_id: u32,
  pub label: String,
  pub confidence: f64,
  pub bbox: [f64; 4],
}

impl From<&Detection> for DetectionRecord {
  fn from(detection: &Detection) -> Self {
    Self {
      class_id: detection.class_id,
      label: detection.label.clone(),
      confidence: round_to(detection.confidence as f64, 3),
      bbox: detection.bbox.map(|v| round_to(v as f64, 2)),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload {
  pub detections: Vec<DetectionRecord>,
  /// base64 编码的 JPEG
  pub annotated_image: String,
}

impl ResponsePayload {
  pub fn decode_annotated_image(&self) -> Result<Frame<Original>, ResponseError> {
    let bytes = STANDARD.decode(self.annotated_image.as_bytes())?;
    Ok(ImageCodec::default().decode(&bytes)?)
  }

  /// 还原为指定坐标空间中的检测集合，精度为序列化后的精度；
  /// 类别名称取自应答本身
  pub fn to_detection_set<S: CoordinateSpace>(&self, dimensions: (u32, u32)) -> DetectionSet<S> {
    let class_names =
      ClassNames::from_pairs(self.detections.iter().map(|r| (r.class_id, r.label.clone())));
    let items = self
      .detections
      .iter()
      .map(|r| Detection {
        class_id: r.class_id,
        label: r.label.clone(),
        confidence: r.confidence as f32,
        bbox: r.bbox.map(|v| v as f32),
      })
      .collect();
    DetectionSet::new(items, Arc::new(class_names), dimensions)
  }
}

#[derive(Debug, Clone, Copy)]
pub struct ResponseAssembler {
  codec: ImageCodec,
  format: EncodeFormat,
}

impl Default for ResponseAssembler {
  fn default() -> Self {
    Self {
      codec: ImageCodec::default(),
      format: EncodeFormat::default(),
    }
  }
}

impl ResponseAssembler {
  pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
    self.format = EncodeFormat::jpeg(quality);
    self
  }

  pub fn build<S: CoordinateSpace>(
    &self,
    detections: &DetectionSet<S>,
    annotated: &Frame<S>,
  ) -> Result<ResponsePayload, CodecError> {
    let encoded = self.codec.encode(annotated, self.format)?;
    Ok(ResponsePayload {
      detections: detections.iter().map(DetectionRecord::from).collect(),
      annotated_image: STANDARD.encode(encoded),
    })
  }
}

fn round_to(value: f64, decimals: i32) -> f64 {
  let factor = 10f64.powi(decimals);
  (value * factor).round() / factor
}
