// 该文件是 Shanan Detect （山南西风·识图） 项目的一部分。
// src/model.rs - 模型与检测引擎
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

use std::{marker::PhantomData, sync::Arc};

use ndarray::{Array4, ArrayD};
use thiserror::Error;
use tracing::{debug, info};

use crate::frame::{CoordinateSpace, Frame, Projection};

pub mod labels;
pub mod yolov8;

#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "onnx")]
pub use self::onnx::{OnnxScorer, OnnxScorerBuilder};

pub use self::labels::{ClassNames, LabelError};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;
pub const DEFAULT_INPUT_SIZE: u32 = 640;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.7;
pub const DEFAULT_MAX_DETECTIONS: usize = 300;

pub trait Model<Input> {
  type Output;
  type Error;

  fn infer(&self, input: &Input) -> Result<Self::Output, Self::Error>;
}

/// 已训练好的打分函数：NCHW 张量进，原始输出张量出
pub trait Scorer: Send + Sync {
  fn score(&self, input: Array4<f32>) -> Result<ArrayD<f32>, InferenceError>;
}

#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("模型加载错误: {0}")]
  ModelLoad(String),
  #[error("模型路径错误: {0}")]
  ModelPath(String),
  #[error("推理运行错误: {0}")]
  Runtime(String),
  #[error("模型输出形状不匹配: {0}")]
  ShapeMismatch(String),
  #[error("输入尺寸无效: {0}")]
  InvalidInputSize(u32),
  #[error("置信度阈值无效: {0}")]
  InvalidThreshold(f32),
  #[error("模型会话锁已中毒")]
  SessionPoisoned,
}

/// 单个检测结果，坐标为所属帧的像素坐标 `[x1, y1, x2, y2]`
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub class_id: u32,
  pub label: String,
  pub confidence: f32,
  pub bbox: [f32; 4],
}

/// 一次推理得到的有序检测集合，与帧一样带坐标空间标记
#[derive(Debug, Clone)]
pub struct DetectionSet<S> {
  items: Vec<Detection>,
  class_names: Arc<ClassNames>,
  dimensions: (u32, u32),
  _space: PhantomData<S>,
}

impl<S: CoordinateSpace> DetectionSet<S> {
  pub fn new(items: Vec<Detection>, class_names: Arc<ClassNames>, dimensions: (u32, u32)) -> Self {
    Self {
      items,
      class_names,
      dimensions,
      _space: PhantomData,
    }
  }

  pub fn items(&self) -> &[Detection] {
    &self.items
  }

  pub fn class_names(&self) -> &Arc<ClassNames> {
    &self.class_names
  }

  /// 检测所在帧的尺寸
  pub fn dimensions(&self) -> (u32, u32) {
    self.dimensions
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
    self.items.iter()
  }

  /// 把整个集合投影到另一个坐标空间
  pub fn project<T: CoordinateSpace>(&self, projection: &Projection<S, T>) -> DetectionSet<T> {
    let items = self
      .items
      .iter()
      .map(|d| Detection {
        bbox: projection.apply(d.bbox),
        ..d.clone()
      })
      .collect::<Vec<_>>();
    debug!("检测框投影 {} -> {}: {} 个", S::NAME, T::NAME, items.len());
    DetectionSet {
      items,
      class_names: self.class_names.clone(),
      dimensions: projection.bounds(),
      _space: PhantomData,
    }
  }
}

impl<'a, S> IntoIterator for &'a DetectionSet<S> {
  type Item = &'a Detection;
  type IntoIter = std::slice::Iter<'a, Detection>;

  fn into_iter(self) -> Self::IntoIter {
    self.items.iter()
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
  pub confidence_threshold: f32,
  pub input_size: u32,
  pub iou_threshold: f32,
  pub max_detections: usize,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      input_size: DEFAULT_INPUT_SIZE,
      iou_threshold: DEFAULT_IOU_THRESHOLD,
      max_detections: DEFAULT_MAX_DETECTIONS,
    }
  }
}

/// 单次推理可覆盖的参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferOptions {
  pub confidence_threshold: f32,
  pub input_size: u32,
}

impl From<&EngineConfig> for InferOptions {
  fn from(config: &EngineConfig) -> Self {
    Self {
      confidence_threshold: config.confidence_threshold,
      input_size: config.input_size,
    }
  }
}

/// 检测引擎：启动时构造一次，之后只读共享
pub struct DetectionEngine {
  scorer: Box<dyn Scorer>,
  class_names: Arc<ClassNames>,
  config: EngineConfig,
}

impl DetectionEngine {
  pub fn new(scorer: Box<dyn Scorer>, class_names: ClassNames, config: EngineConfig) -> Self {
    info!(
      "检测引擎就绪: {} 个类别, 输入尺寸 {}, 置信度阈值 {}",
      class_names.len(),
      config.input_size,
      config.confidence_threshold
    );
    Self {
      scorer,
      class_names: Arc::new(class_names),
      config,
    }
  }

  pub fn detect<S: CoordinateSpace>(
    &self,
    frame: &Frame<S>,
  ) -> Result<DetectionSet<S>, InferenceError> {
    self.detect_with(frame, InferOptions::from(&self.config))
  }

  /// 返回的检测框与输入帧处于同一坐标空间
  pub fn detect_with<S: CoordinateSpace>(
    &self,
    frame: &Frame<S>,
    options: InferOptions,
  ) -> Result<DetectionSet<S>, InferenceError> {
    if options.input_size == 0 {
      return Err(InferenceError::InvalidInputSize(options.input_size));
    }
    if !(0.0..=1.0).contains(&options.confidence_threshold) {
      return Err(InferenceError::InvalidThreshold(options.confidence_threshold));
    }

    let letterbox = yolov8::Letterbox::fit(frame.dimensions(), options.input_size);
    let input = letterbox.tensor(&frame.to_rgb_image());

    debug!("执行模型推理, 输入 {:?}", input.shape());
    let output = self.scorer.score(input)?;

    let candidates = yolov8::decode_output(
      &output,
      Some(self.class_names.class_count()),
      options.confidence_threshold,
    )?;
    let found = candidates.len();
    let kept = yolov8::non_max_suppression(
      candidates,
      self.config.iou_threshold,
      self.config.max_detections,
    );

    let items: Vec<Detection> = kept
      .into_iter()
      .map(|c| Detection {
        class_id: c.class_id,
        label: self.class_names.label(c.class_id),
        confidence: c.confidence.clamp(0.0, 1.0),
        bbox: letterbox.unmap(c.bbox),
      })
      .collect();
    debug!("候选框 {} 个, 保留 {} 个", found, items.len());

    Ok(DetectionSet::new(
      items,
      self.class_names.clone(),
      frame.dimensions(),
    ))
  }
}

impl<S: CoordinateSpace> Model<Frame<S>> for DetectionEngine {
  type Output = DetectionSet<S>;
  type Error = InferenceError;

  fn infer(&self, input: &Frame<S>) -> Result<Self::Output, Self::Error> {
    self.detect(input)
  }
}
