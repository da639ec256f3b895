// 该文件是 Luoshuan （螺栓） 项目的一部分。
// src/model.rs - 模型
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

use image::RgbImage;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{FromUrlWithScheme, config::ModelEntry, url_to_path};

/// 预训练 Faster R-CNN 标记
pub const FASTER_RCNN_PRETRAINED: &str = "pretrained:fasterrcnn_resnet50_fpn";
const FASTER_RCNN_PRETRAINED_FILE: &str = "fasterrcnn_resnet50_fpn.onnx";

pub trait Model {
  type Error: std::error::Error + Send + Sync + 'static;

  /// 对预处理后的图像推理，`threshold` 供模型内部提前过滤
  fn infer(&self, input: &RgbImage, threshold: f32) -> Result<DetectResult, Self::Error>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub class_name: String,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，归一化坐标
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
  /// 模型自身统计的推理耗时，不提供时为 None
  pub elapsed_ms: Option<f64>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}

pub fn label_name(labels: &[String], class_id: usize) -> String {
  labels
    .get(class_id)
    .cloned()
    .unwrap_or_else(|| format!("class_{}", class_id))
}

mod faster_rcnn;
pub mod labels;
mod yolo;
pub use self::faster_rcnn::{FasterRcnn, FasterRcnnBuilder, FasterRcnnError};
pub use self::yolo::{Candidate, Yolo, YoloBuilder, YoloError, decode_output, nms, postprocess};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
  Yolo,
  FasterRcnn,
}

impl std::fmt::Display for ModelFamily {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ModelFamily::Yolo => write!(f, "YOLO"),
      ModelFamily::FasterRcnn => write!(f, "Faster R-CNN"),
    }
  }
}

/// 解析后的模型来源，族类在加载时确定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
  Yolo(PathBuf),
  FasterRcnn(PathBuf),
}

impl ModelSource {
  /// 解析来源字符串，相对路径以 `base_dir` 为基准
  pub fn parse(source: &str, base_dir: &Path, pretrained_dir: &Path) -> Result<Self, ModelError> {
    if source == FASTER_RCNN_PRETRAINED {
      return Ok(ModelSource::FasterRcnn(
        pretrained_dir.join(FASTER_RCNN_PRETRAINED_FILE),
      ));
    }

    let rebase = |path: PathBuf| {
      if path.is_relative() {
        base_dir.join(path)
      } else {
        path
      }
    };

    match Url::parse(source) {
      Ok(url) if url.scheme() == YoloBuilder::SCHEME => Ok(ModelSource::Yolo(rebase(url_to_path(&url)))),
      Ok(url) if url.scheme() == FasterRcnnBuilder::SCHEME => {
        Ok(ModelSource::FasterRcnn(rebase(url_to_path(&url))))
      }
      // 单字母方案视为盘符，如 `C:\models\best.onnx`
      Ok(url) if url.scheme().len() == 1 => Ok(ModelSource::Yolo(rebase(PathBuf::from(source)))),
      Ok(url) => Err(ModelError::InvalidSource(format!(
        "不支持的模型来源方案 '{}': {}",
        url.scheme(),
        source
      ))),
      Err(_) if source.trim().is_empty() => {
        Err(ModelError::InvalidSource("模型来源为空".to_string()))
      }
      // 普通路径默认按 YOLO 权重处理
      Err(_) => Ok(ModelSource::Yolo(rebase(PathBuf::from(source)))),
    }
  }

  pub fn family(&self) -> ModelFamily {
    match self {
      ModelSource::Yolo(_) => ModelFamily::Yolo,
      ModelSource::FasterRcnn(_) => ModelFamily::FasterRcnn,
    }
  }

  pub fn path(&self) -> &Path {
    match self {
      ModelSource::Yolo(path) | ModelSource::FasterRcnn(path) => path,
    }
  }
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("模型来源无效: {0}")]
  InvalidSource(String),
  #[error("YOLO 模型错误: {0}")]
  Yolo(#[from] YoloError),
  #[error("Faster R-CNN 模型错误: {0}")]
  FasterRcnn(#[from] FasterRcnnError),
}

/// 已加载的模型，按族类标记
pub enum LoadedModel {
  Yolo(Yolo),
  FasterRcnn(FasterRcnn),
}

impl LoadedModel {
  pub fn load(
    entry: &ModelEntry,
    base_dir: &Path,
    pretrained_dir: &Path,
  ) -> Result<Self, ModelError> {
    let source = ModelSource::parse(&entry.source, base_dir, pretrained_dir)?;
    info!(
      "加载模型 {} ({}): {}",
      entry.name,
      source.family(),
      source.path().display()
    );

    let model = match source {
      ModelSource::Yolo(path) => LoadedModel::Yolo(YoloBuilder::new(path).with_entry(entry).build()?),
      ModelSource::FasterRcnn(path) => {
        LoadedModel::FasterRcnn(FasterRcnnBuilder::new(path).with_entry(entry).build()?)
      }
    };
    Ok(model)
  }

  pub fn family(&self) -> ModelFamily {
    match self {
      LoadedModel::Yolo(_) => ModelFamily::Yolo,
      LoadedModel::FasterRcnn(_) => ModelFamily::FasterRcnn,
    }
  }
}

impl Model for LoadedModel {
  type Error = ModelError;

  fn infer(&self, input: &RgbImage, threshold: f32) -> Result<DetectResult, Self::Error> {
    match self {
      LoadedModel::Yolo(model) => model.infer(input, threshold).map_err(ModelError::from),
      LoadedModel::FasterRcnn(model) => model.infer(input, threshold).map_err(ModelError::from),
    }
  }
}
