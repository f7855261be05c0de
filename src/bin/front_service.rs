// 该文件是 Shanan Detect （山南西风·识图） 项目的一部分。
// src/bin/front_service.rs - 前端服务入口
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
  args::FrontServiceArgs,
  output::Annotator,
  pipeline::{HttpDetectionBackend, Orchestrator},
  service::{self, FrontState},
};

#[tokio::main]
async fn main() -> Result<()> {
  shanan_detect::init_tracing();

  let args = FrontServiceArgs::parse();
  let config = args.pipeline_config();
  info!("检测服务地址: {}", args.backend_url);
  info!("预处理参数: {:?}", config.preprocess);
  info!("转发方式: {:?}, 超时 {:?}", config.relay_mode, config.deadline);

  let backend = HttpDetectionBackend::new(&args.backend_url)?;
  info!("检测接口: {}", backend.endpoint());
  let orchestrator = Orchestrator::new(Arc::new(backend), Annotator::new()?, config)?;

  let state = Arc::new(FrontState::new(orchestrator, &args.image_folder));
  let router = service::front::router(state, args.max_upload_bytes());

  let listener = TcpListener::bind(args.bind)
    .await
    .with_context(|| format!("无法监听 {}", args.bind))?;
  service::serve(listener, router).await?;

  info!("前端服务已退出");
  Ok(())
}
