// 该文件是 Shanan Detect （山南西风·识图） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};
use thiserror::Error;
use tracing::debug;

use crate::{
  frame::{CoordinateSpace, Frame},
  model::{Detection, DetectionSet},
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_BASELINE_OFFSET: i32 = 5;
const BOX_THICKNESS: u32 = 2;
const BOX_COLOR: [u8; 3] = [0, 255, 0]; // 绿色

static EMBEDDED_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

#[derive(Error, Debug)]
pub enum AnnotateError {
  #[error("无法加载字体: {0}")]
  InvalidFont(ab_glyph::InvalidFont),
}

/// 在帧的拷贝上绘制检测框与标签
#[derive(Clone)]
pub struct Annotator {
  font: FontArc,
  font_size: f32,
  color: Rgb<u8>,
  thickness: u32,
}

impl Default for Annotator {
  fn default() -> Self {
    Self::new().expect("无法加载嵌入的字体文件")
  }
}

impl Annotator {
  pub fn new() -> Result<Self, AnnotateError> {
    let font = FontArc::try_from_slice(EMBEDDED_FONT).map_err(AnnotateError::InvalidFont)?;
    Ok(Self {
      font,
      font_size: LABEL_FONT_SIZE,
      color: Rgb(BOX_COLOR),
      thickness: BOX_THICKNESS,
    })
  }

  pub fn with_color(mut self, color: [u8; 3]) -> Self {
    self.color = Rgb(color);
    self
  }

  pub fn with_thickness(mut self, thickness: u32) -> Self {
    self.thickness = thickness.max(1);
    self
  }

  /// 按集合顺序逐个绘制，不修改 `base`
  pub fn render<S: CoordinateSpace>(
    &self,
    base: &Frame<S>,
    detections: &DetectionSet<S>,
  ) -> Frame<S> {
    let mut canvas = base.to_rgb_image();
    for detection in detections {
      self.draw_detection(&mut canvas, detection);
    }
    debug!("绘制 {} 个检测框", detections.len());
    Frame::from_rgb(canvas)
  }

  fn draw_detection(&self, image: &mut RgbImage, detection: &Detection) {
    let [x1, y1, x2, y2] = detection.bbox.map(|v| v as i32);

    // 加粗边框，逐层向内收缩；越界像素由 imageproc 裁剪
    for t in 0..self.thickness as i32 {
      let width = x2 - x1 + 1 - 2 * t;
      let height = y2 - y1 + 1 - 2 * t;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x1 + t, y1 + t).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, self.color);
    }

    let label = format!("{} {:.2}", detection.label, detection.confidence);
    let scale = PxScale::from(self.font_size);
    let ascent = self.font.as_scaled(scale).ascent().ceil() as i32;

    // 基线位于框左上角上方 5 像素，文字顶部不越过第 0 行
    let text_x = x1.max(0);
    let text_y = (y1 - LABEL_BASELINE_OFFSET - ascent).max(0);
    draw_text_mut(image, self.color, text_x, text_y, scale, &self.font, &label);
  }
}
