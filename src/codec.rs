// 该文件是 Shanan Detect （山南西风·识图） 项目的一部分。
// src/codec.rs - 图像编解码
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

use std::io::Cursor;

use image::{
  ImageFormat, ImageReader,
  codecs::{jpeg::JpegEncoder, png::PngEncoder},
};
use thiserror::Error;
use tracing::debug;

use crate::frame::{CoordinateSpace, Frame, Original};

/// 解码前允许的最大像素数（防止解压炸弹）
pub const MAX_PIXELS: u64 = 100_000_000;
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

const ALLOWED_FORMATS: [ImageFormat; 5] = [
  ImageFormat::Jpeg,
  ImageFormat::Png,
  ImageFormat::Gif,
  ImageFormat::Bmp,
  ImageFormat::WebP,
];

#[derive(Error, Debug)]
pub enum CodecError {
  #[error("无法识别的图像格式")]
  Unrecognized,
  #[error("不支持的图像格式: {0:?}")]
  Unsupported(ImageFormat),
  #[error("图像尺寸无效: {width}x{height}")]
  InvalidDimensions { width: u32, height: u32 },
  #[error("图像过大: {width}x{height} 像素 (上限: {max})")]
  TooLarge { width: u32, height: u32, max: u64 },
  #[error("JPEG 质量必须在 1 到 100 之间, 实际为 {0}")]
  InvalidQuality(u8),
  #[error("图像解码错误: {0}")]
  Decode(image::ImageError),
  #[error("图像编码错误: {0}")]
  Encode(image::ImageError),
}

/// 编码格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeFormat {
  Jpeg { quality: u8 },
  Png,
}

impl Default for EncodeFormat {
  fn default() -> Self {
    EncodeFormat::Jpeg {
      quality: DEFAULT_JPEG_QUALITY,
    }
  }
}

impl EncodeFormat {
  pub fn jpeg(quality: u8) -> Self {
    EncodeFormat::Jpeg { quality }
  }

  /// 按文件扩展名推断，未知扩展名回退为默认 JPEG
  pub fn from_extension(ext: Option<&str>) -> Self {
    match ext.map(|e| e.to_ascii_lowercase()).as_deref() {
      Some("png") => EncodeFormat::Png,
      _ => EncodeFormat::default(),
    }
  }

  pub fn mime_type(&self) -> &'static str {
    match self {
      EncodeFormat::Jpeg { .. } => "image/jpeg",
      EncodeFormat::Png => "image/png",
    }
  }
}

/// 图像编解码器，本身无状态，只携带像素上限
#[derive(Debug, Clone, Copy)]
pub struct ImageCodec {
  max_pixels: u64,
}

impl Default for ImageCodec {
  fn default() -> Self {
    Self {
      max_pixels: MAX_PIXELS,
    }
  }
}

impl ImageCodec {
  pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
    self.max_pixels = max_pixels;
    self
  }

  /// 把上传的字节流解码为三通道 RGB 帧
  ///
  /// 调色板、灰度、带透明通道的图像都会被转换，透明通道直接丢弃。
  pub fn decode(&self, bytes: &[u8]) -> Result<Frame<Original>, CodecError> {
    let format = image::guess_format(bytes).map_err(|_| CodecError::Unrecognized)?;
    if !ALLOWED_FORMATS.contains(&format) {
      return Err(CodecError::Unsupported(format));
    }

    // 先只读头部拿到尺寸
    let (width, height) = ImageReader::with_format(Cursor::new(bytes), format)
      .into_dimensions()
      .map_err(CodecError::Decode)?;
    if width == 0 || height == 0 {
      return Err(CodecError::InvalidDimensions { width, height });
    }
    if (width as u64).saturating_mul(height as u64) > self.max_pixels {
      return Err(CodecError::TooLarge {
        width,
        height,
        max: self.max_pixels,
      });
    }

    let image =
      image::load_from_memory_with_format(bytes, format).map_err(CodecError::Decode)?;
    debug!("解码图像: {:?} {}x{}", format, width, height);

    Ok(Frame::from_rgb(image.to_rgb8()))
  }

  /// 编码为压缩字节流，灰度帧编码为单通道图像
  pub fn encode<S: CoordinateSpace>(
    &self,
    frame: &Frame<S>,
    format: EncodeFormat,
  ) -> Result<Vec<u8>, CodecError> {
    let image = frame.to_dynamic();
    let mut buffer = Vec::new();
    match format {
      EncodeFormat::Jpeg { quality } => {
        if !(1..=100).contains(&quality) {
          return Err(CodecError::InvalidQuality(quality));
        }
        let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
        image.write_with_encoder(encoder).map_err(CodecError::Encode)?;
      }
      EncodeFormat::Png => {
        let encoder = PngEncoder::new(&mut buffer);
        image.write_with_encoder(encoder).map_err(CodecError::Encode)?;
      }
    }
    Ok(buffer)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};

  fn png_bytes(image: DynamicImage) -> Vec<u8> {
    let mut buffer = Vec::new();
    image
      .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
      .unwrap();
    buffer
  }

  #[test]
  fn decode_encode_keeps_dimensions() {
    let codec = ImageCodec::default();
    let source = RgbImage::from_fn(37, 21, |x, y| Rgb([x as u8 * 5, y as u8 * 9, 128]));
    let frame = codec.decode(&png_bytes(DynamicImage::ImageRgb8(source))).unwrap();
    assert_eq!(frame.dimensions(), (37, 21));

    let jpeg = codec.encode(&frame, EncodeFormat::default()).unwrap();
    let again = codec.decode(&jpeg).unwrap();
    assert_eq!(again.dimensions(), (37, 21));
    assert_eq!(again.channels(), 3);
  }

  #[test]
  fn gray_and_rgba_become_rgb() {
    let codec = ImageCodec::default();
    let gray = png_bytes(DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 6, Luma([40]))));
    let rgba = png_bytes(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
      5,
      5,
      Rgba([10, 20, 30, 0]),
    )));

    let frame = codec.decode(&gray).unwrap();
    assert_eq!(frame.channels(), 3);
    assert_eq!(*frame.to_rgb_image().get_pixel(0, 0), Rgb([40, 40, 40]));

    let frame = codec.decode(&rgba).unwrap();
    assert_eq!(frame.channels(), 3);
    assert_eq!(*frame.to_rgb_image().get_pixel(4, 4), Rgb([10, 20, 30]));
  }

  #[test]
  fn gray_frame_encodes_single_channel() {
    let codec = ImageCodec::default();
    let frame = Frame::<Original>::from_luma(GrayImage::from_pixel(9, 4, Luma([200])));
    let png = codec.encode(&frame, EncodeFormat::Png).unwrap();
    let decoded = image::load_from_memory(&png).unwrap();
    assert_eq!(decoded.color(), image::ColorType::L8);
  }

  #[test]
  fn garbage_is_unrecognized() {
    let err = ImageCodec::default().decode(b"definitely not an image").unwrap_err();
    assert!(matches!(err, CodecError::Unrecognized));
  }

  #[test]
  fn truncated_png_fails_to_decode() {
    let bytes = png_bytes(DynamicImage::ImageRgb8(RgbImage::from_fn(64, 64, |x, y| {
      Rgb([(x * 3) as u8, (y * 3) as u8, (x ^ y) as u8])
    })));
    let truncated = &bytes[..bytes.len() / 2];
    let err = ImageCodec::default().decode(truncated).unwrap_err();
    assert!(matches!(err, CodecError::Decode(_)));
  }

  #[test]
  fn pixel_limit_rejects_large_images() {
    let bytes = png_bytes(DynamicImage::ImageRgb8(RgbImage::new(100, 100)));
    let err = ImageCodec::default()
      .with_max_pixels(9_999)
      .decode(&bytes)
      .unwrap_err();
    assert!(matches!(err, CodecError::TooLarge { width: 100, height: 100, .. }));
  }

  #[test]
  fn jpeg_quality_is_validated() {
    let frame = Frame::<Original>::from_rgb(RgbImage::new(2, 2));
    let err = ImageCodec::default()
      .encode(&frame, EncodeFormat::jpeg(0))
      .unwrap_err();
    assert!(matches!(err, CodecError::InvalidQuality(0)));
  }
}
