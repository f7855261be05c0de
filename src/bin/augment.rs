// 该文件是 Shanan Detect （山南西风·识图） 项目的一部分。
// src/bin/augment.rs - 离线数据增强工具
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

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use shanan_detect::{
  augment::AugmentPipeline,
  codec::{EncodeFormat, ImageCodec},
  frame::{Frame, Original},
};

/// 为一张图片生成若干增强副本
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入图片
  #[arg(long, value_name = "FILE")]
  pub input: PathBuf,
  /// 输出目录
  #[arg(long, value_name = "DIR")]
  pub output_dir: PathBuf,
  /// 副本数量
  #[arg(long, default_value_t = 8)]
  pub count: usize,
  /// 随机种子，给定时结果可复现
  #[arg(long)]
  pub seed: Option<u64>,
}

fn main() -> Result<()> {
  shanan_detect::init_tracing();

  let args = Args::parse();
  let codec = ImageCodec::default();

  let bytes = std::fs::read(&args.input)
    .with_context(|| format!("无法读取 {}", args.input.display()))?;
  let source = codec.decode(&bytes)?.to_rgb_image();
  std::fs::create_dir_all(&args.output_dir)?;

  let stem = args
    .input
    .file_stem()
    .and_then(|s| s.to_str())
    .unwrap_or("image");
  let extension = args.input.extension().and_then(|e| e.to_str());
  let format = EncodeFormat::from_extension(extension);
  let suffix = match format {
    EncodeFormat::Png => "png",
    EncodeFormat::Jpeg { .. } => "jpg",
  };

  let mut pipeline = AugmentPipeline::standard(args.seed);
  for i in 0..args.count {
    let augmented = Frame::<Original>::from_rgb(pipeline.apply(&source));
    let path = args.output_dir.join(format!("{}_aug{:03}.{}", stem, i, suffix));
    std::fs::write(&path, codec.encode(&augmented, format)?)
      .with_context(|| format!("无法写入 {}", path.display()))?;
    info!("写出 {} ({}x{})", path.display(), augmented.width(), augmented.height());
  }

  info!("共生成 {} 张增强图像", args.count);
  Ok(())
}
