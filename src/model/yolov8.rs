// 该文件是 Shanan Detect （山南西风·识图） 项目的一部分。
// src/model/yolov8.rs - YOLOv8 输入 letterbox 与输出解码
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

use image::{Rgb, RgbImage, imageops::FilterType};
use ndarray::{Array4, ArrayD};
use tracing::{debug, warn};

use crate::model::InferenceError;

/// letterbox 填充灰度值
pub const LETTERBOX_FILL: u8 = 114;
/// 进入 NMS 的候选框上限
pub const MAX_NMS_CANDIDATES: usize = 30_000;
const BOX_FEATURES: usize = 4;

/// 等比缩放并居中填充到正方形输入
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub size: u32,
  pub scale: f32,
  pub resized: (u32, u32),
  pub pad: (u32, u32),
  pub source: (u32, u32),
}

impl Letterbox {
  pub fn fit(source: (u32, u32), size: u32) -> Self {
    let (w, h) = (source.0.max(1) as f32, source.1.max(1) as f32);
    let scale = (size as f32 / w).min(size as f32 / h);
    let new_w = ((w * scale).round() as u32).clamp(1, size);
    let new_h = ((h * scale).round() as u32).clamp(1, size);
    // 与常见导出工具一致，左上填充向下取整
    let pad_x = (((size - new_w) as f32 / 2.0) - 0.1).round().max(0.0) as u32;
    let pad_y = (((size - new_h) as f32 / 2.0) - 0.1).round().max(0.0) as u32;
    Self {
      size,
      scale,
      resized: (new_w, new_h),
      pad: (pad_x, pad_y),
      source,
    }
  }

  /// 生成 NCHW、取值 [0, 1] 的输入张量
  pub fn tensor(&self, image: &RgbImage) -> Array4<f32> {
    let resized = image::imageops::resize(image, self.resized.0, self.resized.1, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(self.size, self.size, Rgb([LETTERBOX_FILL; 3]));
    image::imageops::replace(&mut canvas, &resized, self.pad.0 as i64, self.pad.1 as i64);

    let size = self.size as usize;
    Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
      canvas.get_pixel(x as u32, y as u32).0[c] as f32 / 255.0
    })
  }

  /// 把 letterbox 坐标映射回源图像坐标，并裁剪到源图像范围内
  pub fn unmap(&self, bbox: [f32; 4]) -> [f32; 4] {
    let (w, h) = (self.source.0 as f32, self.source.1 as f32);
    let (px, py) = (self.pad.0 as f32, self.pad.1 as f32);
    let x1 = ((bbox[0] - px) / self.scale).clamp(0.0, w);
    let y1 = ((bbox[1] - py) / self.scale).clamp(0.0, h);
    let x2 = ((bbox[2] - px) / self.scale).clamp(x1, w);
    let y2 = ((bbox[3] - py) / self.scale).clamp(y1, h);
    [x1, y1, x2, y2]
  }
}

/// 阈值过滤后、NMS 之前的候选框（letterbox 坐标）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
  pub class_id: u32,
  pub confidence: f32,
  pub bbox: [f32; 4],
}

/// 解码 `[1, 4 + nc, N]` 或 `[1, N, 4 + nc]` 输出
///
/// `num_classes` 已知时按特征维匹配方向，否则假定特征维不大于候选数。
pub fn decode_output(
  output: &ArrayD<f32>,
  num_classes: Option<usize>,
  threshold: f32,
) -> Result<Vec<Candidate>, InferenceError> {
  let shape = output.shape();
  if shape.len() != 3 || shape[0] != 1 {
    return Err(InferenceError::ShapeMismatch(format!(
      "期望 [1, 4 + nc, N] 或 [1, N, 4 + nc], 实际为 {:?}",
      shape
    )));
  }

  let features_first = match num_classes.map(|nc| nc + BOX_FEATURES) {
    Some(expected) if shape[1] == expected => true,
    Some(expected) if shape[2] == expected => false,
    _ => shape[1] <= shape[2],
  };
  let (features, anchors) = if features_first {
    (shape[1], shape[2])
  } else {
    (shape[2], shape[1])
  };
  if features <= BOX_FEATURES {
    return Err(InferenceError::ShapeMismatch(format!(
      "特征维 {} 不足以包含类别分数",
      features
    )));
  }
  debug!(
    "模型输出形状 {:?}, 特征维 {}, 候选数 {}, 特征在前: {}",
    shape, features, anchors, features_first
  );

  let data = output.as_standard_layout();
  let data = data
    .as_slice()
    .ok_or_else(|| InferenceError::ShapeMismatch("输出张量内存不连续".to_string()))?;
  let at = |anchor: usize, feature: usize| -> f32 {
    if features_first {
      data[feature * anchors + anchor]
    } else {
      data[anchor * features + feature]
    }
  };

  let mut candidates = Vec::new();
  for anchor in 0..anchors {
    let (class_id, confidence) = (BOX_FEATURES..features)
      .map(|f| (f - BOX_FEATURES, at(anchor, f)))
      .fold((0usize, f32::NEG_INFINITY), |best, (idx, score)| {
        if score > best.1 { (idx, score) } else { best }
      });

    if !confidence.is_finite() || confidence < threshold {
      continue;
    }

    let (cx, cy, w, h) = (at(anchor, 0), at(anchor, 1), at(anchor, 2), at(anchor, 3));
    if ![cx, cy, w, h].iter().all(|v| v.is_finite()) || w <= 0.0 || h <= 0.0 {
      continue;
    }

    candidates.push(Candidate {
      class_id: class_id as u32,
      confidence,
      bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
    });
  }

  Ok(candidates)
}

pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let iw = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
  let ih = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
  let inter = iw * ih;
  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);
  let union = area_a + area_b - inter;
  if union <= 0.0 { 0.0 } else { inter / union }
}

/// 按类别的非极大值抑制，结果按置信度降序
pub fn non_max_suppression(
  mut candidates: Vec<Candidate>,
  iou_threshold: f32,
  max_detections: usize,
) -> Vec<Candidate> {
  candidates.sort_unstable_by(|a, b| b.confidence.total_cmp(&a.confidence));
  if candidates.len() > MAX_NMS_CANDIDATES {
    warn!(
      "候选框数量 {} 超过上限 {}, 已截断",
      candidates.len(),
      MAX_NMS_CANDIDATES
    );
    candidates.truncate(MAX_NMS_CANDIDATES);
  }

  let mut suppressed = vec![false; candidates.len()];
  let mut kept = Vec::new();
  for i in 0..candidates.len() {
    if suppressed[i] {
      continue;
    }
    kept.push(candidates[i]);
    if kept.len() >= max_detections {
      break;
    }
    for j in (i + 1)..candidates.len() {
      if !suppressed[j]
        && candidates[j].class_id == candidates[i].class_id
        && iou(&candidates[i].bbox, &candidates[j].bbox) > iou_threshold
      {
        suppressed[j] = true;
      }
    }
  }
  kept
}
