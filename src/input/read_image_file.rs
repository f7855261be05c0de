// 该文件是 Shanan Detect （山南西风·识图） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use std::path::Path;

use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  codec::{CodecError, ImageCodec},
  frame::{Frame, Original},
};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("输入方案不匹配: 期望 'image', 实际为 '{0}'")]
  SchemeMismatch(String),
  #[error("无法读取图像文件: {0}")]
  Read(#[from] std::io::Error),
  #[error("图像解码失败: {0}")]
  Decode(#[from] CodecError),
}

/// 单张图像文件，迭代一次后耗尽
pub struct ImageFileInput {
  frame: Option<Frame<Original>>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let scheme = url.scheme();
    if scheme != Self::SCHEME {
      error!("不支持的输入方案: {}", scheme);
      return Err(ImageFileInputError::SchemeMismatch(scheme.to_string()));
    }
    Self::open(url.path())
  }
}

impl ImageFileInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageFileInputError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let frame = ImageCodec::default().decode(&bytes)?;
    debug!("读取图像文件 {}: {:?}", path.display(), frame.dimensions());

    Ok(ImageFileInput { frame: Some(frame) })
  }
}

impl Iterator for ImageFileInput {
  type Item = Frame<Original>;

  fn next(&mut self) -> Option<Self::Item> {
    self.frame.take()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::RgbImage;

  #[test]
  fn yields_exactly_one_frame() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("input.png");
    RgbImage::new(12, 7).save(&path).unwrap();

    let url = Url::parse(&format!("image://{}", path.display())).unwrap();
    let mut input = ImageFileInput::from_url(&url).unwrap();
    assert_eq!(input.next().map(|f| f.dimensions()), Some((12, 7)));
    assert!(input.next().is_none());
  }

  #[test]
  fn other_scheme_is_rejected() {
    let url = Url::parse("file:///tmp/a.jpg").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemeMismatch(s)) if s == "file"
    ));
  }

  #[test]
  fn missing_file_is_read_error() {
    let url = Url::parse("image:///definitely/not/here.jpg").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::Read(_))
    ));
  }
}
