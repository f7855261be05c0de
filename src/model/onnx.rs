// 该文件是 Shanan Detect （山南西风·识图） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 打分器
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

use std::{path::PathBuf, sync::Mutex};

use ndarray::{Array4, ArrayD, IxDyn};
use ort::{
  session::{Session, builder::GraphOptimizationLevel},
  value::Tensor,
};
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{InferenceError, Scorer},
};

/// 单个模型会话，推理时串行访问
pub struct OnnxScorer {
  session: Mutex<Session>,
  output_name: String,
}

pub struct OnnxScorerBuilder {
  model_path: PathBuf,
  intra_threads: Option<usize>,
}

impl FromUrlWithScheme for OnnxScorerBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxScorerBuilder {
  type Error = InferenceError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(InferenceError::ModelPath(format!(
        "模型路径必须使用 {} 方案, 实际为 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }
    Ok(Self::from_path(url.path()))
  }
}

impl OnnxScorerBuilder {
  pub fn from_path(path: impl Into<PathBuf>) -> Self {
    Self {
      model_path: path.into(),
      intra_threads: None,
    }
  }

  pub fn intra_threads(mut self, threads: usize) -> Self {
    self.intra_threads = Some(threads);
    self
  }

  pub fn build(self) -> Result<OnnxScorer, InferenceError> {
    info!("加载模型文件: {}", self.model_path.display());
    if !self.model_path.is_file() {
      return Err(InferenceError::ModelLoad(format!(
        "模型文件不存在: {}",
        self.model_path.display()
      )));
    }

    let mut builder = Session::builder()
      .map_err(load_err)?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(load_err)?;
    if let Some(threads) = self.intra_threads {
      builder = builder
        .with_intra_threads(threads)
        .map_err(load_err)?;
    }
    let session = builder
      .commit_from_file(&self.model_path)
      .map_err(load_err)?;

    let output_name = session
      .outputs()
      .first()
      .map(|output| output.name().to_string())
      .ok_or_else(|| InferenceError::ModelLoad("模型没有输出节点".to_string()))?;
    debug!(
      "模型输入数量: {}, 输出节点: {}",
      session.inputs().len(),
      output_name
    );
    info!("模型加载完成");

    Ok(OnnxScorer {
      session: Mutex::new(session),
      output_name,
    })
  }
}

fn load_err(e: impl std::fmt::Display) -> InferenceError {
  error!("ONNX Runtime 加载失败: {}", e);
  InferenceError::ModelLoad(e.to_string())
}

impl Scorer for OnnxScorer {
  fn score(&self, input: Array4<f32>) -> Result<ArrayD<f32>, InferenceError> {
    let tensor = Tensor::from_array(input).map_err(|e| InferenceError::Runtime(e.to_string()))?;

    let mut session = self
      .session
      .lock()
      .map_err(|_| InferenceError::SessionPoisoned)?;
    let outputs = session
      .run(ort::inputs![tensor])
      .map_err(|e| InferenceError::Runtime(e.to_string()))?;

    let output = outputs
      .get(self.output_name.as_str())
      .ok_or_else(|| InferenceError::Runtime(format!("缺少输出节点 {}", self.output_name)))?;
    let (shape, data) = output
      .try_extract_tensor::<f32>()
      .map_err(|e| InferenceError::Runtime(e.to_string()))?;

    let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
    ArrayD::from_shape_vec(IxDyn(&dims), data.to_vec())
      .map_err(|e| InferenceError::ShapeMismatch(e.to_string()))
  }
}
