// 该文件是 Shanan Detect （山南西风·识图） 项目的一部分。
// src/pipeline.rs - 前端请求编排：解码、预处理、远端检测、回投影与标注
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

use std::{
  path::PathBuf,
  sync::Arc,
  time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  codec::{CodecError, EncodeFormat, ImageCodec},
  frame::{Frame, Original, Working},
  output::{Annotator, ResponseAssembler, ResponsePayload},
  preprocess::{PreprocessError, PreprocessOptions, Preprocessor},
};

pub mod backend;
pub mod spool;

pub use self::backend::{
  BackendError, BackendReply, DetectRequest, DetectionBackend, HttpDetectionBackend,
};
pub use self::spool::{Spool, sanitize_filename};

pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);
pub const DEFAULT_SPOOL_DIR: &str = "temp";

/// 请求在编排器中经过的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  Received,
  Decoded,
  Preprocessed,
  Dispatched,
  DetectionsReceived,
  Annotated,
  Encoded,
  Responded,
}

/// 失败终止状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
  RejectedInput,
  PreprocessFailed,
  DetectionServiceUnavailable,
  DetectionServiceError,
  /// 前端自身在标注、编码或调度阶段失败
  InternalError,
}

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("No image file provided")]
  MissingImage,
  #[error("Invalid image: {0}")]
  InvalidImage(#[source] CodecError),
  #[error("Preprocessing failed: {0}")]
  PreprocessFailed(#[source] PreprocessError),
  #[error("AI backend unavailable: {0}")]
  DetectionServiceUnavailable(String),
  #[error("AI backend error ({status}): {detail}")]
  DetectionServiceError { status: u16, detail: String },
  #[error("AI backend returned an unreadable reply: {0}")]
  InvalidReply(String),
  #[error("Failed to encode annotated image: {0}")]
  EncodeFailed(#[source] CodecError),
  #[error("Temporary storage error: {0}")]
  Spool(#[from] std::io::Error),
  #[error("Worker task failed: {0}")]
  Worker(String),
}

impl PipelineError {
  pub fn terminal_state(&self) -> TerminalState {
    match self {
      PipelineError::MissingImage | PipelineError::InvalidImage(_) => TerminalState::RejectedInput,
      PipelineError::PreprocessFailed(_) | PipelineError::Spool(_) => {
        TerminalState::PreprocessFailed
      }
      PipelineError::DetectionServiceUnavailable(_) => TerminalState::DetectionServiceUnavailable,
      PipelineError::DetectionServiceError { .. } | PipelineError::InvalidReply(_) => {
        TerminalState::DetectionServiceError
      }
      PipelineError::EncodeFailed(_) | PipelineError::Worker(_) => TerminalState::InternalError,
    }
  }
}

/// 远端检测结果的转发方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum RelayMode {
  /// 解析远端结果，回投影到原图坐标并在原图上重新标注
  #[default]
  Reproject,
  /// 原样返回远端应答体
  Verbatim,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
  pub preprocess: PreprocessOptions,
  pub deadline: Duration,
  pub spool_root: PathBuf,
  pub relay_mode: RelayMode,
  pub jpeg_quality: u8,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    let (w, h) = crate::preprocess::DEFAULT_TARGET_SIZE;
    Self {
      preprocess: PreprocessOptions::default().target_size(w, h),
      deadline: DEFAULT_DEADLINE,
      spool_root: PathBuf::from(DEFAULT_SPOOL_DIR),
      relay_mode: RelayMode::default(),
      jpeg_quality: crate::codec::DEFAULT_JPEG_QUALITY,
    }
  }
}

/// 用户上传的文件
#[derive(Debug, Clone, Default)]
pub struct Upload {
  pub filename: Option<String>,
  pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutput {
  Payload(ResponsePayload),
  Verbatim(String),
}

pub struct Orchestrator {
  backend: Arc<dyn DetectionBackend>,
  preprocessor: Preprocessor,
  codec: ImageCodec,
  annotator: Annotator,
  assembler: ResponseAssembler,
  config: PipelineConfig,
}

struct Prepared {
  original: Frame<Original>,
  filename: String,
  format: EncodeFormat,
  bytes: Vec<u8>,
}

impl Orchestrator {
  pub fn new(
    backend: Arc<dyn DetectionBackend>,
    annotator: Annotator,
    config: PipelineConfig,
  ) -> Result<Self, PipelineError> {
    let preprocessor =
      Preprocessor::new(config.preprocess).map_err(PipelineError::PreprocessFailed)?;
    Ok(Self {
      backend,
      preprocessor,
      codec: ImageCodec::default(),
      annotator,
      assembler: ResponseAssembler::default().with_jpeg_quality(config.jpeg_quality),
      config,
    })
  }

  pub async fn process(&self, upload: Upload) -> Result<PipelineOutput, PipelineError> {
    let started = Instant::now();
    debug!("阶段 {:?}: {} 字节", Stage::Received, upload.bytes.len());
    if upload.bytes.is_empty() {
      return Err(PipelineError::MissingImage);
    }

    // 临时目录在函数返回或请求被取消时删除
    let spool = Spool::create(&self.config.spool_root)?;
    let (spool, prepared) = self.prepare(spool, upload).await?;

    debug!("阶段 {:?}: {}", Stage::Dispatched, prepared.filename);
    let request = DetectRequest {
      filename: prepared.filename.clone(),
      mime: prepared.format.mime_type(),
      bytes: prepared.bytes,
    };
    let reply = match tokio::time::timeout(self.config.deadline, self.backend.detect(request)).await
    {
      Ok(Ok(reply)) => reply,
      Ok(Err(e)) => {
        warn!("检测服务不可达: {}", e);
        return Err(PipelineError::DetectionServiceUnavailable(e.to_string()));
      }
      Err(_) => {
        warn!("检测服务超时: {:?}", self.config.deadline);
        return Err(PipelineError::DetectionServiceUnavailable(format!(
          "no reply within {} s",
          self.config.deadline.as_secs_f32()
        )));
      }
    };

    if !reply.is_success() {
      warn!("检测服务返回错误状态 {}", reply.status);
      return Err(PipelineError::DetectionServiceError {
        status: reply.status,
        detail: reply.body,
      });
    }
    debug!("阶段 {:?}", Stage::DetectionsReceived);

    let output = match self.config.relay_mode {
      RelayMode::Verbatim => PipelineOutput::Verbatim(reply.body),
      RelayMode::Reproject => {
        let remote: ResponsePayload = serde_json::from_str(&reply.body)
          .map_err(|e| PipelineError::InvalidReply(e.to_string()))?;
        PipelineOutput::Payload(self.reproject(prepared.original, remote).await?)
      }
    };

    drop(spool);
    info!(
      "请求处理完成 ({:?}), 耗时 {:.2?}",
      Stage::Responded,
      started.elapsed()
    );
    Ok(output)
  }

  // 写入上传文件、校验解码、按文件流程预处理
  //
  // 临时目录随阻塞任务一起移动：请求被取消时，目录在文件操作结束后才删除
  async fn prepare(&self, spool: Spool, upload: Upload) -> Result<(Spool, Prepared), PipelineError> {
    let filename = sanitize_filename(upload.filename.as_deref());
    let input_path = spool.file(&filename);
    let output_path = spool.file(&format!("preprocessed_{}", filename));
    let format = EncodeFormat::from_extension(output_path.extension().and_then(|e| e.to_str()));

    let codec = self.codec;
    let preprocessor = self.preprocessor.clone();
    let bytes = upload.bytes;
    let (spool, original, bytes) = tokio::task::spawn_blocking(move || {
      std::fs::write(&input_path, &bytes)?;

      let original = codec.decode(&bytes).map_err(PipelineError::InvalidImage)?;
      debug!("阶段 {:?}: {:?}", Stage::Decoded, original.dimensions());

      preprocessor
        .normalize_into(&input_path, &output_path)
        .map_err(PipelineError::PreprocessFailed)?;
      let bytes = std::fs::read(&output_path)?;
      debug!("阶段 {:?}: {} 字节", Stage::Preprocessed, bytes.len());

      Ok::<_, PipelineError>((spool, original, bytes))
    })
    .await
    .map_err(|e| PipelineError::Worker(e.to_string()))??;

    Ok((
      spool,
      Prepared {
        original,
        filename,
        format,
        bytes,
      },
    ))
  }

  async fn reproject(
    &self,
    original: Frame<Original>,
    remote: ResponsePayload,
  ) -> Result<ResponsePayload, PipelineError> {
    let forward = self.preprocessor.projection(original.dimensions());
    let working = remote.to_detection_set::<Working>(forward.bounds());
    let detections = working.project(&forward.inverse(original.dimensions()));

    let annotator = self.annotator.clone();
    let assembler = self.assembler;
    tokio::task::spawn_blocking(move || {
      let annotated = annotator.render(&original, &detections);
      debug!("阶段 {:?}: {} 个检测", Stage::Annotated, detections.len());
      let payload = assembler
        .build(&detections, &annotated)
        .map_err(PipelineError::EncodeFailed)?;
      debug!("阶段 {:?}", Stage::Encoded);
      Ok::<_, PipelineError>(payload)
    })
    .await
    .map_err(|e| PipelineError::Worker(e.to_string()))?
  }
}
