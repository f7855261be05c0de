// 该文件是 Shanan Detect （山南西风·识图） 项目的一部分。
// src/args.rs - 服务参数配置
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

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::Parser;
use url::Url;

use crate::{
  codec::DEFAULT_JPEG_QUALITY,
  model::{
    DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_INPUT_SIZE, DEFAULT_IOU_THRESHOLD,
    DEFAULT_MAX_DETECTIONS, EngineConfig,
  },
  pipeline::{PipelineConfig, RelayMode},
  preprocess::PreprocessOptions,
  service::MIB,
};

const MODEL_SCHEME: &str = "onnx";

/// 检测服务参数
#[derive(Parser, Debug, Clone)]
#[command(name = "detect-service", author, version, about, long_about = None)]
pub struct DetectServiceArgs {
  /// 监听地址
  #[arg(long, env = "DETECT_SERVICE_BIND", default_value = "0.0.0.0:5001")]
  pub bind: SocketAddr,

  /// 模型位置，onnx:///path/to/model.onnx 或直接给出文件路径
  #[arg(long, env = "MODEL_PATH", value_name = "MODEL", value_parser = parse_model_location)]
  pub model: Url,

  /// 类别名称文件，每行一个；缺省为 COCO 80 类
  #[arg(long, env = "LABELS_PATH", value_name = "FILE")]
  pub labels: Option<PathBuf>,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_CONFIDENCE_THRESHOLD, value_parser = parse_unit_interval)]
  pub confidence: f32,

  /// 模型输入边长
  #[arg(long, default_value_t = DEFAULT_INPUT_SIZE, value_parser = clap::value_parser!(u32).range(1..))]
  pub input_size: u32,

  /// NMS IoU 阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_IOU_THRESHOLD, value_parser = parse_unit_interval)]
  pub iou: f32,

  /// 每张图最多保留的检测数
  #[arg(long, default_value_t = DEFAULT_MAX_DETECTIONS)]
  pub max_detections: usize,

  /// 标注图 JPEG 质量 (1 - 100)
  #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, value_parser = clap::value_parser!(u8).range(1..=100))]
  pub jpeg_quality: u8,

  /// 上传大小上限（MiB）
  #[arg(long, default_value_t = 16)]
  pub max_upload_mb: usize,

  /// ONNX Runtime 线程数
  #[arg(long, value_name = "COUNT")]
  pub intra_threads: Option<usize>,
}

impl DetectServiceArgs {
  pub fn engine_config(&self) -> EngineConfig {
    EngineConfig {
      confidence_threshold: self.confidence,
      input_size: self.input_size,
      iou_threshold: self.iou,
      max_detections: self.max_detections,
    }
  }

  pub fn max_upload_bytes(&self) -> usize {
    self.max_upload_mb.saturating_mul(MIB)
  }
}

/// 前端服务参数
#[derive(Parser, Debug, Clone)]
#[command(name = "front-service", author, version, about, long_about = None)]
pub struct FrontServiceArgs {
  /// 监听地址
  #[arg(long, env = "FRONT_SERVICE_BIND", default_value = "0.0.0.0:5002")]
  pub bind: SocketAddr,

  /// 检测服务地址
  #[arg(long, env = "AI_BACKEND_URL", default_value = "http://ai_backend:5001")]
  pub backend_url: Url,

  /// 预处理目标宽度
  #[arg(long, default_value_t = 640, value_parser = clap::value_parser!(u32).range(1..))]
  pub target_width: u32,

  /// 预处理目标高度
  #[arg(long, default_value_t = 480, value_parser = clap::value_parser!(u32).range(1..))]
  pub target_height: u32,

  /// 保持原始尺寸，不缩放
  #[arg(long)]
  pub no_resize: bool,

  /// 转为灰度
  #[arg(long)]
  pub grayscale: bool,

  /// 强度归一化
  #[arg(long)]
  pub normalize: bool,

  /// 等待检测服务的秒数
  #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
  pub deadline_secs: u64,

  /// 请求临时目录的父目录
  #[arg(long, env = "SPOOL_DIR", default_value = "temp")]
  pub spool_dir: PathBuf,

  /// `GET /uploads/{name}` 读取的目录
  #[arg(long, env = "IMAGE_FOLDER", default_value = "uploads")]
  pub image_folder: PathBuf,

  /// 检测结果的转发方式
  #[arg(long, value_enum, default_value_t = RelayMode::Reproject)]
  pub relay_mode: RelayMode,

  /// 标注图 JPEG 质量 (1 - 100)
  #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, value_parser = clap::value_parser!(u8).range(1..=100))]
  pub jpeg_quality: u8,

  /// 上传大小上限（MiB）
  #[arg(long, default_value_t = 16)]
  pub max_upload_mb: usize,
}

impl FrontServiceArgs {
  pub fn pipeline_config(&self) -> PipelineConfig {
    let mut preprocess = PreprocessOptions::default()
      .grayscale(self.grayscale)
      .normalize_intensity(self.normalize);
    if !self.no_resize {
      preprocess = preprocess.target_size(self.target_width, self.target_height);
    }
    PipelineConfig {
      preprocess,
      deadline: Duration::from_secs(self.deadline_secs),
      spool_root: self.spool_dir.clone(),
      relay_mode: self.relay_mode,
      jpeg_quality: self.jpeg_quality,
    }
  }

  pub fn max_upload_bytes(&self) -> usize {
    self.max_upload_mb.saturating_mul(MIB)
  }
}

/// 接受 `onnx://` URL；普通路径与 `file://` URL 转换为 `onnx://`
pub fn parse_model_location(value: &str) -> Result<Url, String> {
  if let Ok(url) = Url::parse(value)
    && url.scheme() != "file"
    && url.scheme().len() > 1
  {
    return Ok(url);
  }

  let path = match Url::parse(value) {
    Ok(url) if url.scheme() == "file" => url
      .to_file_path()
      .map_err(|_| format!("无法解析文件 URL: {}", value))?,
    _ => PathBuf::from(value),
  };
  let path = if path.is_absolute() {
    path
  } else {
    std::env::current_dir()
      .map_err(|e| format!("无法获取当前目录: {}", e))?
      .join(path)
  };
  Url::parse(&format!("{}://{}", MODEL_SCHEME, path.display()))
    .map_err(|e| format!("无效的模型路径 '{}': {}", value, e))
}

fn parse_unit_interval(value: &str) -> Result<f32, String> {
  let v: f32 = value.parse().map_err(|e| format!("{}", e))?;
  if (0.0..=1.0).contains(&v) {
    Ok(v)
  } else {
    Err(format!("取值必须在 0.0 到 1.0 之间, 实际为 {}", v))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn detect_defaults() {
    let args = DetectServiceArgs::try_parse_from(["detect-service", "--model", "onnx:///m/yolov8n.onnx"])
      .unwrap();
    assert_eq!(args.bind.port(), 5001);
    assert_eq!(args.model.path(), "/m/yolov8n.onnx");
    assert_eq!(args.engine_config(), EngineConfig::default());
    assert_eq!(args.jpeg_quality, 95);
    assert_eq!(args.max_upload_bytes(), 16 * MIB);
  }

  #[test]
  fn plain_path_becomes_onnx_url() {
    let url = parse_model_location("/opt/models/yolov8n.onnx").unwrap();
    assert_eq!(url.scheme(), "onnx");
    assert_eq!(url.path(), "/opt/models/yolov8n.onnx");

    let url = parse_model_location("file:///opt/models/yolov8n.onnx").unwrap();
    assert_eq!(url.scheme(), "onnx");
    assert_eq!(url.path(), "/opt/models/yolov8n.onnx");
  }

  #[test]
  fn thresholds_are_range_checked() {
    let result = DetectServiceArgs::try_parse_from([
      "detect-service",
      "--model",
      "onnx:///m.onnx",
      "--confidence",
      "1.5",
    ]);
    assert!(result.is_err());
  }

  #[test]
  fn front_defaults() {
    let args = FrontServiceArgs::try_parse_from(["front-service"]).unwrap();
    assert_eq!(args.bind.port(), 5002);
    let config = args.pipeline_config();
    assert_eq!(config.preprocess.target_size, Some((640, 480)));
    assert!(!config.preprocess.grayscale);
    assert_eq!(config.deadline, Duration::from_secs(30));
    assert_eq!(config.relay_mode, RelayMode::Reproject);
  }

  #[test]
  fn front_flags() {
    let args = FrontServiceArgs::try_parse_from([
      "front-service",
      "--backend-url",
      "http://127.0.0.1:9000",
      "--no-resize",
      "--grayscale",
      "--relay-mode",
      "verbatim",
      "--deadline-secs",
      "5",
    ])
    .unwrap();
    let config = args.pipeline_config();
    assert_eq!(args.backend_url.as_str(), "http://127.0.0.1:9000/");
    assert_eq!(config.preprocess.target_size, None);
    assert!(config.preprocess.grayscale);
    assert_eq!(config.relay_mode, RelayMode::Verbatim);
    assert_eq!(config.deadline, Duration::from_secs(5));
  }
}
