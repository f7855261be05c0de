// 该文件是 Shanan Detect （山南西风·识图） 项目的一部分。
// src/pipeline/spool.rs - 单次请求的临时文件目录
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

use tempfile::TempDir;
use tracing::debug;

const DEFAULT_FILENAME: &str = "uploaded.jpg";

/// 请求结束（无论成功失败）时随 drop 一起删除
#[derive(Debug)]
pub struct Spool {
  dir: TempDir,
}

impl Spool {
  pub fn create(root: impl AsRef<Path>) -> std::io::Result<Self> {
    let root = root.as_ref();
    std::fs::create_dir_all(root)?;
    let dir = tempfile::Builder::new().prefix("upload-").tempdir_in(root)?;
    debug!("创建临时目录: {}", dir.path().display());
    Ok(Self { dir })
  }

  pub fn path(&self) -> &Path {
    self.dir.path()
  }

  pub fn file(&self, name: &str) -> PathBuf {
    self.dir.path().join(name)
  }
}

/// 只保留文件名本身，去掉路径成分与不安全字符
pub fn sanitize_filename(name: Option<&str>) -> String {
  let base = name
    .unwrap_or_default()
    .rsplit(['/', '\\'])
    .next()
    .unwrap_or_default();
  let cleaned: String = base
    .chars()
    .map(|c| {
      if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
        c
      } else {
        '_'
      }
    })
    .collect();
  let cleaned = cleaned.trim_start_matches('.');
  if cleaned.is_empty() || cleaned.chars().all(|c| c == '_') {
    DEFAULT_FILENAME.to_string()
  } else {
    cleaned.to_string()
  }
}
