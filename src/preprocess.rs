// 该文件是 Shanan Detect （山南西风·识图） 项目的一部分。
// src/preprocess.rs - 图像预处理（缩放、灰度、强度归一化）
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

use fast_image_resize::{FilterType, ResizeAlg, ResizeOptions, Resizer, images::Image};
use image::{DynamicImage, GrayImage, ImageBuffer, Luma, RgbImage};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  codec::{CodecError, EncodeFormat, ImageCodec},
  frame::{Frame, Original, Pixels, Projection, Working},
};

/// 前端服务默认的工作尺寸
pub const DEFAULT_TARGET_SIZE: (u32, u32) = (640, 480);

// ITU-R BT.601
const LUMA_R: f32 = 0.299;
const LUMA_G: f32 = 0.587;
const LUMA_B: f32 = 0.114;

#[derive(Error, Debug)]
pub enum PreprocessError {
  #[error("目标尺寸无效: {0}x{1}")]
  InvalidTargetSize(u32, u32),
  #[error("缩放失败: {0}")]
  Resize(String),
  #[error("无法读取输入文件 {path}: {source}")]
  Unreadable {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("无法写入输出文件 {path}: {source}")]
  Unwritable {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("编解码错误: {0}")]
  Codec(#[from] CodecError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PreprocessOptions {
  pub target_size: Option<(u32, u32)>,
  pub grayscale: bool,
  pub normalize_intensity: bool,
}

impl PreprocessOptions {
  pub fn target_size(mut self, width: u32, height: u32) -> Self {
    self.target_size = Some((width, height));
    self
  }

  pub fn grayscale(mut self, grayscale: bool) -> Self {
    self.grayscale = grayscale;
    self
  }

  pub fn normalize_intensity(mut self, normalize: bool) -> Self {
    self.normalize_intensity = normalize;
    self
  }
}

/// 预处理器
///
/// 依次执行：面积平均缩放到固定尺寸（不保持宽高比）、BT.601 灰度化、
/// 强度归一化。每一步都产生新的帧，输入帧不会被修改。
#[derive(Debug, Clone)]
pub struct Preprocessor {
  options: PreprocessOptions,
  codec: ImageCodec,
}

impl Preprocessor {
  pub fn new(options: PreprocessOptions) -> Result<Self, PreprocessError> {
    if let Some((w, h)) = options.target_size
      && (w == 0 || h == 0)
    {
      return Err(PreprocessError::InvalidTargetSize(w, h));
    }
    Ok(Self {
      options,
      codec: ImageCodec::default(),
    })
  }

  /// 给定原图尺寸时工作图像的尺寸
  pub fn output_dimensions(&self, original: (u32, u32)) -> (u32, u32) {
    self.options.target_size.unwrap_or(original)
  }

  /// 原图到工作图像的投影
  pub fn projection(&self, original: (u32, u32)) -> Projection<Original, Working> {
    Projection::between(original, self.output_dimensions(original))
  }

  pub fn normalize(&self, frame: &Frame<Original>) -> Result<Frame<Working>, PreprocessError> {
    let mut working: Frame<Working> = match self.options.target_size {
      Some((w, h)) if (w, h) != frame.dimensions() => resize_area(frame, w, h)?,
      _ => frame.clone().into_space(),
    };

    if self.options.grayscale {
      working = to_grayscale(&working);
    }

    if self.options.normalize_intensity {
      working = normalize_intensity(&working);
    }

    debug!(
      "预处理完成: {:?} -> {:?}, 通道数 {}",
      frame.dimensions(),
      working.dimensions(),
      working.channels()
    );
    Ok(working)
  }

  /// 文件到文件的预处理，输出格式由扩展名决定；输出目录不存在时会创建
  pub fn normalize_file(
    &self,
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
  ) -> Result<PathBuf, PreprocessError> {
    self.file_to_file(input.as_ref(), output.as_ref(), true)
  }

  /// 与 [`Preprocessor::normalize_file`] 相同，但输出目录必须已存在
  pub fn normalize_into(
    &self,
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
  ) -> Result<PathBuf, PreprocessError> {
    self.file_to_file(input.as_ref(), output.as_ref(), false)
  }

  fn file_to_file(
    &self,
    input: &Path,
    output: &Path,
    create_parent: bool,
  ) -> Result<PathBuf, PreprocessError> {
    let bytes = std::fs::read(input).map_err(|source| PreprocessError::Unreadable {
      path: input.to_path_buf(),
      source,
    })?;
    let frame = self.codec.decode(&bytes)?;
    let working = self.normalize(&frame)?;

    let format = EncodeFormat::from_extension(output.extension().and_then(|e| e.to_str()));
    let encoded = self.codec.encode(&working, format)?;

    if create_parent
      && let Some(parent) = output.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent).map_err(|source| PreprocessError::Unwritable {
        path: parent.to_path_buf(),
        source,
      })?;
    }
    std::fs::write(output, encoded).map_err(|source| PreprocessError::Unwritable {
      path: output.to_path_buf(),
      source,
    })?;

    info!("预处理图像已保存: {}", output.display());
    Ok(output.to_path_buf())
  }
}

fn resize_area(
  frame: &Frame<Original>,
  width: u32,
  height: u32,
) -> Result<Frame<Working>, PreprocessError> {
  let src = DynamicImage::ImageRgb8(frame.to_rgb_image());
  let mut dst = Image::new(width, height, fast_image_resize::PixelType::U8x3);

  let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Box));
  Resizer::new()
    .resize(&src, &mut dst, &options)
    .map_err(|e| PreprocessError::Resize(e.to_string()))?;

  let image: RgbImage = ImageBuffer::from_raw(width, height, dst.buffer().to_vec())
    .ok_or_else(|| PreprocessError::Resize("缩放结果缓冲区大小不匹配".to_string()))?;
  Ok(Frame::from_rgb(image))
}

fn to_grayscale(frame: &Frame<Working>) -> Frame<Working> {
  match frame.pixels() {
    Pixels::Luma(_) => frame.clone(),
    Pixels::Rgb(image) => {
      let gray = GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        let v = LUMA_R * r as f32 + LUMA_G * g as f32 + LUMA_B * b as f32;
        Luma([v.round().clamp(0.0, 255.0) as u8])
      });
      Frame::from_luma(gray)
    }
  }
}

// 先缩放到 [0, 1] 再乘回 255 并截断，浮点误差可能让个别像素减 1
fn normalize_intensity(frame: &Frame<Working>) -> Frame<Working> {
  let quantize = |v: u8| ((v as f32 / 255.0) * 255.0).clamp(0.0, 255.0) as u8;
  match frame.pixels() {
    Pixels::Rgb(image) => {
      let mut out = image.clone();
      out.pixels_mut().for_each(|p| p.0 = p.0.map(quantize));
      Frame::from_rgb(out)
    }
    Pixels::Luma(image) => {
      let mut out = image.clone();
      out.pixels_mut().for_each(|p| p.0 = p.0.map(quantize));
      Frame::from_luma(out)
    }
  }
}
