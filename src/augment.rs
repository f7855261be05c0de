// 该文件是 Shanan Detect （山南西风·识图） 项目的一部分。
// src/augment.rs - 离线数据增强
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

//! 训练数据的随机增强，不参与在线检测流程。
//!
//! 每个步骤以各自的概率独立触发，按固定顺序执行：
//! 水平翻转、垂直翻转、亮度对比度、平移缩放旋转、模糊（三选一）、随机裁剪缩放。

use image::{
  Rgb, RgbImage,
  imageops::{self, FilterType},
};
use imageproc::{
  filter::{gaussian_blur_f32, horizontal_filter, median_filter, vertical_filter},
  geometric_transformations::{Interpolation, Projection, warp},
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::debug;

pub const DEFAULT_PROBABILITY: f64 = 0.5;

// 3x3 高斯核对应的 sigma
const GAUSSIAN_3_SIGMA: f32 = 0.8;
const MOTION_KERNEL_SIZES: [usize; 3] = [3, 5, 7];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
  HorizontalFlip,
  VerticalFlip,
  /// `v * (1 + c) + b * 255`，`b`、`c` 分别在 ±limit 内均匀采样
  BrightnessContrast {
    brightness_limit: f32,
    contrast_limit: f32,
  },
  /// 平移比例、缩放比例、旋转角度（度）的上限；绕图像中心变换，空白处填黑
  ShiftScaleRotate {
    shift_limit: f32,
    scale_limit: f32,
    rotate_limit: f32,
  },
  /// 运动模糊、3x3 中值、3x3 高斯，按 2:1:1 选一
  Blur,
  /// 随机高度、正方形裁剪后缩放到 `output`
  RandomSizedCrop {
    min_height: u32,
    max_height: u32,
    output: (u32, u32),
  },
}

impl Transform {
  pub fn apply<R: Rng>(&self, image: RgbImage, rng: &mut R) -> RgbImage {
    match *self {
      Transform::HorizontalFlip => imageops::flip_horizontal(&image),
      Transform::VerticalFlip => imageops::flip_vertical(&image),
      Transform::BrightnessContrast {
        brightness_limit,
        contrast_limit,
      } => {
        let beta = rng.gen_range(-brightness_limit..=brightness_limit) * 255.0;
        let alpha = 1.0 + rng.gen_range(-contrast_limit..=contrast_limit);
        brightness_contrast(image, alpha, beta)
      }
      Transform::ShiftScaleRotate {
        shift_limit,
        scale_limit,
        rotate_limit,
      } => {
        let dx = rng.gen_range(-shift_limit..=shift_limit);
        let dy = rng.gen_range(-shift_limit..=shift_limit);
        let scale = 1.0 + rng.gen_range(-scale_limit..=scale_limit);
        let angle = rng.gen_range(-rotate_limit..=rotate_limit);
        shift_scale_rotate(&image, dx, dy, scale, angle)
      }
      Transform::Blur => match rng.gen_range(0..4) {
        0 | 1 => {
          let size = MOTION_KERNEL_SIZES[rng.gen_range(0..MOTION_KERNEL_SIZES.len())];
          motion_blur(&image, size, rng.gen_bool(0.5))
        }
        2 => median_filter(&image, 1, 1),
        _ => gaussian_blur_f32(&image, GAUSSIAN_3_SIGMA),
      },
      Transform::RandomSizedCrop {
        min_height,
        max_height,
        output,
      } => {
        let (width, height) = image.dimensions();
        let max_side = max_height.min(height).min(width).max(1);
        let min_side = min_height.min(max_side).max(1);
        let side = rng.gen_range(min_side..=max_side);
        let x = rng.gen_range(0..=width - side);
        let y = rng.gen_range(0..=height - side);
        let cropped = imageops::crop_imm(&image, x, y, side, side).to_image();
        imageops::resize(&cropped, output.0, output.1, FilterType::Triangle)
      }
    }
  }
}

fn brightness_contrast(mut image: RgbImage, alpha: f32, beta: f32) -> RgbImage {
  for pixel in image.pixels_mut() {
    for c in pixel.0.iter_mut() {
      *c = (*c as f32 * alpha + beta).round().clamp(0.0, 255.0) as u8;
    }
  }
  image
}

fn shift_scale_rotate(image: &RgbImage, dx: f32, dy: f32, scale: f32, degrees: f32) -> RgbImage {
  let (width, height) = image.dimensions();
  let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
  let projection = Projection::translate(cx + dx * width as f32, cy + dy * height as f32)
    * Projection::rotate(degrees.to_radians())
    * Projection::scale(scale, scale)
    * Projection::translate(-cx, -cy);
  warp(image, &projection, Interpolation::Bilinear, Rgb([0, 0, 0]))
}

fn motion_blur(image: &RgbImage, size: usize, horizontal: bool) -> RgbImage {
  let kernel = vec![1.0f32 / size as f32; size];
  if horizontal {
    horizontal_filter(image, &kernel)
  } else {
    vertical_filter(image, &kernel)
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
  pub transform: Transform,
  pub probability: f64,
}

impl Step {
  pub fn new(transform: Transform, probability: f64) -> Self {
    Self {
      transform,
      probability: probability.clamp(0.0, 1.0),
    }
  }
}

pub struct AugmentPipeline {
  steps: Vec<Step>,
  rng: StdRng,
}

impl AugmentPipeline {
  /// 给定种子时结果可复现
  pub fn new(steps: Vec<Step>, seed: Option<u64>) -> Self {
    let rng = match seed {
      Some(seed) => StdRng::seed_from_u64(seed),
      None => StdRng::from_entropy(),
    };
    Self { steps, rng }
  }

  /// 默认的六步增强流程
  pub fn standard(seed: Option<u64>) -> Self {
    let p = DEFAULT_PROBABILITY;
    Self::new(
      vec![
        Step::new(Transform::HorizontalFlip, p),
        Step::new(Transform::VerticalFlip, p),
        Step::new(
          Transform::BrightnessContrast {
            brightness_limit: 0.2,
            contrast_limit: 0.2,
          },
          p,
        ),
        Step::new(
          Transform::ShiftScaleRotate {
            shift_limit: 0.0625,
            scale_limit: 0.1,
            rotate_limit: 45.0,
          },
          p,
        ),
        Step::new(Transform::Blur, p),
        Step::new(
          Transform::RandomSizedCrop {
            min_height: 480,
            max_height: 640,
            output: (640, 640),
          },
          p,
        ),
      ],
      seed,
    )
  }

  pub fn apply(&mut self, image: &RgbImage) -> RgbImage {
    let mut current = image.clone();
    for step in &self.steps {
      if self.rng.gen_bool(step.probability) {
        debug!("增强步骤: {:?}", step.transform);
        current = step.transform.apply(current, &mut self.rng);
      }
    }
    current
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
      Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
  }

  fn always(transform: Transform) -> AugmentPipeline {
    AugmentPipeline::new(vec![Step::new(transform, 1.0)], Some(7))
  }

  #[test]
  fn same_seed_same_output() {
    let image = gradient(96, 72);
    let a = AugmentPipeline::standard(Some(42)).apply(&image);
    let b = AugmentPipeline::standard(Some(42)).apply(&image);
    assert_eq!(a, b);
  }

  #[test]
  fn double_flip_is_identity() {
    let image = gradient(33, 17);
    let mut pipeline = AugmentPipeline::new(
      vec![
        Step::new(Transform::HorizontalFlip, 1.0),
        Step::new(Transform::VerticalFlip, 1.0),
        Step::new(Transform::HorizontalFlip, 1.0),
        Step::new(Transform::VerticalFlip, 1.0),
      ],
      Some(1),
    );
    assert_eq!(pipeline.apply(&image), image);
  }

  #[test]
  fn horizontal_flip_mirrors_columns() {
    let image = gradient(10, 4);
    let flipped = always(Transform::HorizontalFlip).apply(&image);
    assert_eq!(flipped.get_pixel(0, 2), image.get_pixel(9, 2));
  }

  #[test]
  fn crop_resizes_to_output() {
    let mut pipeline = always(Transform::RandomSizedCrop {
      min_height: 480,
      max_height: 640,
      output: (640, 640),
    });
    assert_eq!(pipeline.apply(&gradient(800, 600)).dimensions(), (640, 640));
    // 小于裁剪范围的图像按自身尺寸裁剪
    assert_eq!(pipeline.apply(&gradient(100, 80)).dimensions(), (640, 640));
  }

  #[test]
  fn zero_limits_keep_pixels() {
    let image = gradient(20, 20);
    let out = always(Transform::BrightnessContrast {
      brightness_limit: 0.0,
      contrast_limit: 0.0,
    })
    .apply(&image);
    assert_eq!(out, image);
  }

  #[test]
  fn brightness_saturates() {
    let image = RgbImage::from_pixel(4, 4, Rgb([250, 5, 128]));
    let bright = brightness_contrast(image.clone(), 1.0, 51.0);
    assert_eq!(*bright.get_pixel(0, 0), Rgb([255, 56, 179]));
    let dark = brightness_contrast(image, 1.0, -51.0);
    assert_eq!(*dark.get_pixel(0, 0), Rgb([199, 0, 77]));
  }

  #[test]
  fn geometric_and_blur_keep_dimensions() {
    let image = gradient(64, 48);
    for transform in [
      Transform::ShiftScaleRotate {
        shift_limit: 0.0625,
        scale_limit: 0.1,
        rotate_limit: 45.0,
      },
      Transform::Blur,
    ] {
      let mut pipeline = always(transform);
      for _ in 0..8 {
        assert_eq!(pipeline.apply(&image).dimensions(), (64, 48));
      }
    }
  }

  #[test]
  fn identity_warp_keeps_centre() {
    let image = gradient(40, 30);
    let out = shift_scale_rotate(&image, 0.0, 0.0, 1.0, 0.0);
    assert_eq!(out.get_pixel(20, 15), image.get_pixel(20, 15));
  }

  #[test]
  fn zero_probability_never_fires() {
    let image = gradient(16, 16);
    let mut pipeline = AugmentPipeline::new(vec![Step::new(Transform::VerticalFlip, 0.0)], None);
    for _ in 0..10 {
      assert_eq!(pipeline.apply(&image), image);
    }
  }
}
