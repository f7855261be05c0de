// 该文件是 Shanan Detect （山南西风·识图） 项目的一部分。
// src/model/labels.rs - 类别名称表
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

use std::{collections::BTreeMap, path::Path};

use thiserror::Error;
use tracing::{debug, info};

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("无法读取类别文件 {path}: {source}")]
  Io {
    path: String,
    source: std::io::Error,
  },
  #[error("类别文件为空: {0}")]
  Empty(String),
}

/// 类别编号到名称的映射
///
/// 未登记的编号显示为 `class_<id>`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassNames {
  names: BTreeMap<u32, String>,
}

impl Default for ClassNames {
  fn default() -> Self {
    Self::coco()
  }
}

impl ClassNames {
  pub fn coco() -> Self {
    Self::from_pairs(
      COCO_CLASSES
        .iter()
        .enumerate()
        .map(|(id, name)| (id as u32, name.to_string())),
    )
  }

  pub fn from_pairs(pairs: impl IntoIterator<Item = (u32, String)>) -> Self {
    Self {
      names: pairs.into_iter().collect(),
    }
  }

  /// 从类别文件加载，每行一个名称，行号（从 0 开始）即类别编号；空行跳过但占位
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LabelError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| LabelError::Io {
      path: path.display().to_string(),
      source,
    })?;

    let names = Self::from_pairs(
      content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(id, line)| (id as u32, line.trim().to_string())),
    );
    if names.is_empty() {
      return Err(LabelError::Empty(path.display().to_string()));
    }

    info!("加载类别文件: {}, 共 {} 个类别", path.display(), names.len());
    Ok(names)
  }

  pub fn label(&self, class_id: u32) -> String {
    match self.names.get(&class_id) {
      Some(name) => name.clone(),
      None => {
        debug!("未知类别编号: {}", class_id);
        format!("class_{}", class_id)
      }
    }
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  /// 模型输出的类别维度：最大类别编号加一，空行占位的编号也计入
  pub fn class_count(&self) -> usize {
    self
      .names
      .last_key_value()
      .map_or(0, |(&id, _)| id as usize + 1)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn coco_table_resolves_known_and_unknown_ids() {
    let names = ClassNames::coco();
    assert_eq!(names.len(), 80);
    assert_eq!(names.label(0), "person");
    assert_eq!(names.label(79), "toothbrush");
    assert_eq!(names.label(80), "class_80");
    assert_eq!(names.class_count(), 80);
    assert_eq!(ClassNames::from_pairs(std::iter::empty()).class_count(), 0);
  }

  #[test]
  fn labels_file_is_zero_based() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("labels.txt");
    std::fs::write(&path, "cat\n\ndog\n").unwrap();

    let names = ClassNames::from_file(&path).unwrap();
    assert_eq!(names.label(0), "cat");
    assert_eq!(names.label(1), "class_1");
    assert_eq!(names.label(2), "dog");
    assert_eq!(names.len(), 2);
    assert_eq!(names.class_count(), 3);
  }

  #[test]
  fn empty_labels_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("labels.txt");
    std::fs::write(&path, "\n  \n").unwrap();
    assert!(matches!(ClassNames::from_file(&path), Err(LabelError::Empty(_))));
  }
}
