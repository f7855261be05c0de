// 该文件是 Shanan Detect （山南西风·识图） 项目的一部分。
// src/bin/detect_service.rs - 检测服务入口
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

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use shanan_detect::{
  FromUrl,
  args::DetectServiceArgs,
  model::{ClassNames, DetectionEngine, OnnxScorerBuilder},
  output::{Annotator, ResponseAssembler},
  service::{self, DetectionState},
};

#[tokio::main]
async fn main() -> Result<()> {
  shanan_detect::init_tracing();

  let args = DetectServiceArgs::parse();
  info!("模型位置: {}", args.model);

  let class_names = match &args.labels {
    Some(path) => ClassNames::from_file(path)
      .with_context(|| format!("读取类别文件失败: {}", path.display()))?,
    None => ClassNames::coco(),
  };

  let mut builder = OnnxScorerBuilder::from_url(&args.model)?;
  if let Some(threads) = args.intra_threads {
    builder = builder.intra_threads(threads);
  }
  let scorer = builder.build().context("模型加载失败")?;
  let engine = DetectionEngine::new(Box::new(scorer), class_names, args.engine_config());

  let annotator = Annotator::new()?;
  let assembler = ResponseAssembler::default().with_jpeg_quality(args.jpeg_quality);
  let state = Arc::new(DetectionState::new(engine, annotator, assembler));
  let router = service::detection::router(state, args.max_upload_bytes());

  let listener = TcpListener::bind(args.bind)
    .await
    .with_context(|| format!("无法监听 {}", args.bind))?;
  service::serve(listener, router).await?;

  info!("检测服务已退出");
  Ok(())
}
