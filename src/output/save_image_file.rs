// 该文件是 Shanan Detect （山南西风·识图） 项目的一部分。
// src/output/save_image_file.rs - 保存标注图像文件
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{CoordinateSpace, Frame},
  model::DetectionSet,
  output::{
    Render,
    draw::{AnnotateError, Annotator},
    response::DetectionRecord,
  },
};

pub struct SaveImageFileOutput {
  path: PathBuf,
  annotator: Annotator,
  record: bool,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("标注器错误: {0}")]
  AnnotateError(#[from] AnnotateError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    // `?record=true` 时在图像旁写出 JSON 检测记录
    let record = uri
      .query_pairs()
      .any(|(k, v)| k == "record" && (v == "true" || v == "1"));

    Ok(Self::new(uri.path(), Annotator::new()?).record(record))
  }
}

impl SaveImageFileOutput {
  pub fn new(path: impl Into<PathBuf>, annotator: Annotator) -> Self {
    Self {
      path: path.into(),
      annotator,
      record: false,
    }
  }

  pub fn record(mut self, record: bool) -> Self {
    self.record = record;
    self
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn save_image(&self, image: image::RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(&self.path)?;
    info!("保存图像到文件: {}", self.path.display());

    Ok(())
  }

  fn save_record<S: CoordinateSpace>(
    &self,
    result: &DetectionSet<S>,
  ) -> Result<(), SaveImageFileError> {
    let records: Vec<DetectionRecord> = result.iter().map(DetectionRecord::from).collect();
    let path = self.path.with_extension("json");
    std::fs::write(&path, serde_json::to_vec_pretty(&records)?)?;
    info!("保存检测记录到文件: {}", path.display());
    Ok(())
  }
}

impl<S: CoordinateSpace> Render<Frame<S>, DetectionSet<S>> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &Frame<S>, result: &DetectionSet<S>) -> Result<(), Self::Error> {
    let annotated = self.annotator.render(frame, result);
    self.save_image(annotated.to_rgb_image())?;
    if self.record {
      self.save_record(result)?;
    }
    Ok(())
  }
}
