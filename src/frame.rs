// 该文件是 Shanan Detect （山南西风·识图） 项目的一部分。
// src/frame.rs - 带坐标空间标记的图像帧
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

use std::marker::PhantomData;

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};

const RGB_CHANNELS: usize = 3;
const LUMA_CHANNELS: usize = 1;

/// 坐标空间标记
///
/// 每一帧以及在该帧上得到的检测框都带有坐标空间标记，
/// 跨空间使用必须经过显式的 [`Projection`]。
pub trait CoordinateSpace: Send + Sync + 'static {
  const NAME: &'static str;
}

/// 用户上传的原始图像坐标空间
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Original;

/// 预处理（缩放）之后的工作图像坐标空间
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Working;

impl CoordinateSpace for Original {
  const NAME: &'static str = "original";
}

impl CoordinateSpace for Working {
  const NAME: &'static str = "working";
}

/// 像素数据，三通道 RGB 或显式转换后的单通道灰度
#[derive(Debug, Clone, PartialEq)]
pub enum Pixels {
  Rgb(RgbImage),
  Luma(GrayImage),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame<S> {
  pixels: Pixels,
  _space: PhantomData<S>,
}

impl<S: CoordinateSpace> Frame<S> {
  pub fn from_rgb(image: RgbImage) -> Self {
    Self {
      pixels: Pixels::Rgb(image),
      _space: PhantomData,
    }
  }

  pub fn from_luma(image: GrayImage) -> Self {
    Self {
      pixels: Pixels::Luma(image),
      _space: PhantomData,
    }
  }

  pub fn width(&self) -> u32 {
    match &self.pixels {
      Pixels::Rgb(image) => image.width(),
      Pixels::Luma(image) => image.width(),
    }
  }

  pub fn height(&self) -> u32 {
    match &self.pixels {
      Pixels::Rgb(image) => image.height(),
      Pixels::Luma(image) => image.height(),
    }
  }

  pub fn dimensions(&self) -> (u32, u32) {
    (self.width(), self.height())
  }

  pub fn channels(&self) -> usize {
    match &self.pixels {
      Pixels::Rgb(_) => RGB_CHANNELS,
      Pixels::Luma(_) => LUMA_CHANNELS,
    }
  }

  pub fn pixels(&self) -> &Pixels {
    &self.pixels
  }

  /// 拷贝出 RGB 图像，灰度帧会被扩展为三通道
  pub fn to_rgb_image(&self) -> RgbImage {
    match &self.pixels {
      Pixels::Rgb(image) => image.clone(),
      Pixels::Luma(image) => RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let Luma([v]) = *image.get_pixel(x, y);
        Rgb([v, v, v])
      }),
    }
  }

  pub fn to_dynamic(&self) -> DynamicImage {
    match &self.pixels {
      Pixels::Rgb(image) => DynamicImage::ImageRgb8(image.clone()),
      Pixels::Luma(image) => DynamicImage::ImageLuma8(image.clone()),
    }
  }

  /// 只在产生新几何/新色彩空间的阶段内部使用
  pub(crate) fn into_space<T: CoordinateSpace>(self) -> Frame<T> {
    Frame {
      pixels: self.pixels,
      _space: PhantomData,
    }
  }
}

/// 从 `Src` 空间到 `Dst` 空间的坐标投影（按轴独立缩放）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection<Src, Dst> {
  scale_x: f32,
  scale_y: f32,
  bounds: (u32, u32),
  _spaces: PhantomData<(Src, Dst)>,
}

impl<Src: CoordinateSpace, Dst: CoordinateSpace> Projection<Src, Dst> {
  /// 由两个空间的图像尺寸构造投影
  pub fn between(from: (u32, u32), to: (u32, u32)) -> Self {
    let (fw, fh) = (from.0.max(1) as f32, from.1.max(1) as f32);
    Self {
      scale_x: to.0 as f32 / fw,
      scale_y: to.1 as f32 / fh,
      bounds: to,
      _spaces: PhantomData,
    }
  }

  pub fn scale(&self) -> (f32, f32) {
    (self.scale_x, self.scale_y)
  }

  /// 目标空间的图像尺寸
  pub fn bounds(&self) -> (u32, u32) {
    self.bounds
  }

  /// 投影一个 `[x1, y1, x2, y2]` 框，并裁剪到目标空间的图像范围内
  pub fn apply(&self, bbox: [f32; 4]) -> [f32; 4] {
    let (w, h) = (self.bounds.0 as f32, self.bounds.1 as f32);
    let x1 = (bbox[0] * self.scale_x).clamp(0.0, w);
    let y1 = (bbox[1] * self.scale_y).clamp(0.0, h);
    let x2 = (bbox[2] * self.scale_x).clamp(x1, w);
    let y2 = (bbox[3] * self.scale_y).clamp(y1, h);
    [x1, y1, x2, y2]
  }

  pub fn inverse(&self, from: (u32, u32)) -> Projection<Dst, Src> {
    Projection::between(self.bounds, from)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn gray_frame_expands_to_rgb() {
    let frame = Frame::<Original>::from_luma(GrayImage::from_pixel(4, 3, Luma([77])));
    assert_eq!(frame.channels(), 1);
    let rgb = frame.to_rgb_image();
    assert_eq!(rgb.dimensions(), (4, 3));
    assert_eq!(*rgb.get_pixel(2, 2), Rgb([77, 77, 77]));
  }

  #[test]
  fn projection_scales_and_clips() {
    let projection = Projection::<Working, Original>::between((640, 480), (1024, 768));
    assert_eq!(projection.scale(), (1.6, 1.6));

    let bbox = projection.apply([220.0, 165.0, 420.0, 315.0]);
    for (a, b) in bbox.iter().zip([352.0f32, 264.0, 672.0, 504.0]) {
      assert!((a - b).abs() < 1e-3);
    }

    let clipped = projection.apply([-10.0, 400.0, 700.0, 500.0]);
    assert_eq!(clipped[0], 0.0);
    assert!((clipped[1] - 640.0).abs() < 1e-3);
    assert_eq!(clipped[2], 1024.0);
    assert_eq!(clipped[3], 768.0);
  }

  #[test]
  fn inverse_round_trips_sizes() {
    let forward = Projection::<Original, Working>::between((1024, 768), (640, 480));
    let back = forward.inverse((1024, 768));
    let bbox = back.apply(forward.apply([100.0, 100.0, 500.0, 400.0]));
    for (a, b) in bbox.iter().zip([100.0f32, 100.0, 500.0, 400.0]) {
      assert!((a - b).abs() < 1e-3);
    }
  }
}
