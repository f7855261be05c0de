// 该文件是 Shanan Detect （山南西风·识图） 项目的一部分。
// tests/common/mod.rs - 集成测试公共工具
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

#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc};

use axum::Router;
use image::{Rgb, RgbImage};
use ndarray::{Array4, ArrayD, IxDyn};
use reqwest::multipart::{Form, Part};
use tokio::net::TcpListener;

use shanan_detect::{
  codec::{EncodeFormat, ImageCodec},
  frame::{Frame, Original},
  model::{ClassNames, DetectionEngine, EngineConfig, InferenceError, Scorer},
  output::{Annotator, ResponseAssembler},
  service::{self, DetectionState},
};

pub const NUM_CLASSES: usize = 80;

/// 在 640x640 输入中心放一个人：另有一个低分框和一个被 NMS 抑制的重叠框
pub struct CenteredObjectScorer;

impl Scorer for CenteredObjectScorer {
  fn score(&self, input: Array4<f32>) -> Result<ArrayD<f32>, InferenceError> {
    assert_eq!(input.shape(), &[1, 3, 640, 640]);
    let rows = [
      (320.0, 320.0, 200.0, 150.0, 0usize, 0.9f32),
      (100.0, 100.0, 40.0, 40.0, 2, 0.1),
      (330.0, 325.0, 200.0, 150.0, 0, 0.6),
    ];
    let features = 4 + NUM_CLASSES;
    let anchors = rows.len();
    let mut data = vec![0.0f32; features * anchors];
    for (a, &(cx, cy, w, h, class_id, score)) in rows.iter().enumerate() {
      for (f, v) in [(0, cx), (1, cy), (2, w), (3, h), (4 + class_id, score)] {
        data[f * anchors + a] = v;
      }
    }
    ArrayD::from_shape_vec(IxDyn(&[1, features, anchors]), data)
      .map_err(|e| InferenceError::ShapeMismatch(e.to_string()))
  }
}

/// 每次调用都报运行时错误
pub struct FailingScorer;

impl Scorer for FailingScorer {
  fn score(&self, _input: Array4<f32>) -> Result<ArrayD<f32>, InferenceError> {
    Err(InferenceError::Runtime("scorer exploded".to_string()))
  }
}

pub fn detection_router() -> Router {
  detection_router_with(Box::new(CenteredObjectScorer))
}

pub fn detection_router_with(scorer: Box<dyn Scorer>) -> Router {
  let engine = DetectionEngine::new(scorer, ClassNames::coco(), EngineConfig::default());
  let state = DetectionState::new(engine, Annotator::default(), ResponseAssembler::default());
  service::detection::router(Arc::new(state), 16 * service::MIB)
}

pub async fn spawn(router: Router) -> SocketAddr {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn(async move {
    axum::serve(listener, router).await.unwrap();
  });
  addr
}

/// 一个本地端口，绑定后立即释放，用于模拟不可达的服务
pub async fn closed_port() -> SocketAddr {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  listener.local_addr().unwrap()
}

pub fn scene_jpeg(width: u32, height: u32) -> Vec<u8> {
  let image = RgbImage::from_fn(width, height, |x, y| {
    Rgb([(x / 4 % 256) as u8, (y / 3 % 256) as u8, 128])
  });
  ImageCodec::default()
    .encode(&Frame::<Original>::from_rgb(image), EncodeFormat::jpeg(90))
    .unwrap()
}

pub fn image_form(field: &str, filename: &str, bytes: Vec<u8>) -> Form {
  let part = Part::bytes(bytes)
    .file_name(filename.to_string())
    .mime_str("image/jpeg")
    .unwrap();
  Form::new().part(field.to_string(), part)
}

pub async fn post_form(url: String, form: Form) -> (u16, String) {
  let response = reqwest::Client::new()
    .post(url)
    .multipart(form)
    .send()
    .await
    .unwrap();
  let status = response.status().as_u16();
  (status, response.text().await.unwrap())
}
