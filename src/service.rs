// 该文件是 Shanan Detect （山南西风·识图） 项目的一部分。
// src/service.rs - HTTP 服务
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

pub mod detection;
pub mod error;
pub mod front;
pub mod multipart;

use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub use detection::DetectionState;
pub use error::{ErrorBody, ServiceError};
pub use front::FrontState;

/// 1 MiB
pub const MIB: usize = 1024 * 1024;

/// 等待 Ctrl-C 或 SIGTERM
pub async fn shutdown_signal() {
  let ctrl_c = async {
    if let Err(e) = tokio::signal::ctrl_c().await {
      warn!("无法监听 Ctrl-C: {}", e);
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
      Ok(mut signal) => {
        signal.recv().await;
      }
      Err(e) => {
        warn!("无法监听 SIGTERM: {}", e);
        std::future::pending::<()>().await;
      }
    }
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => {},
    _ = terminate => {},
  }
  info!("收到退出信号，停止接受新请求");
}

/// 在给定监听器上运行路由，直到收到退出信号
pub async fn serve(listener: TcpListener, router: Router) -> std::io::Result<()> {
  if let Ok(addr) = listener.local_addr() {
    info!("服务监听于 {}", addr);
  }
  axum::serve(listener, router)
    .with_graceful_shutdown(shutdown_signal())
    .await
}
