// 该文件是 Shanan Detect （山南西风·识图） 项目的一部分。
// src/bin/simple.rs - 单张图片推理
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use url::Url;

use shanan_detect::{
  FromUrl,
  args::parse_model_location,
  input::ImageFileInput,
  model::{ClassNames, DetectionEngine, EngineConfig, Model, OnnxScorerBuilder},
  output::{Render, SaveImageFileOutput},
};
use tracing::info;

/// 单张图片推理并保存标注结果
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型位置，onnx:///path/to/model.onnx 或文件路径
  #[arg(long, value_name = "MODEL", value_parser = parse_model_location)]
  pub model: Url,
  /// 输入图片，image:///path/to/input.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，image:///path/to/output.jpg[?record=true]
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 类别名称文件
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,
  /// 置信度阈值
  #[arg(long, default_value_t = 0.25)]
  pub confidence: f32,
}

fn main() -> Result<()> {
  shanan_detect::init_tracing();

  let args = Args::parse();

  info!("模型位置: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let class_names = match &args.labels {
    Some(path) => ClassNames::from_file(path)?,
    None => ClassNames::coco(),
  };
  let config = EngineConfig {
    confidence_threshold: args.confidence,
    ..EngineConfig::default()
  };

  let input_image = ImageFileInput::from_url(&args.input)?;
  let scorer = OnnxScorerBuilder::from_url(&args.model)?.build()?;
  let model = DetectionEngine::new(Box::new(scorer), class_names, config);
  let output = SaveImageFileOutput::from_url(&args.output)?;

  info!("开始推理...");
  let now = std::time::Instant::now();
  for frame in input_image {
    let result = model.infer(&frame)?;
    info!("推理完成，{} 个目标，耗时: {:.2?}", result.len(), now.elapsed());
    output.render_result(&frame, &result)?;
  }

  Ok(())
}
