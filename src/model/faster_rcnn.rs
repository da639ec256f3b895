// 该文件是 Luoshuan （螺栓） 项目的一部分。
// src/model/faster_rcnn.rs - Faster R-CNN 检测模型
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

use image::RgbImage;
use ndarray::{ArrayView1, ArrayView2, Ix1, Ix2};
use ort::{
  inputs,
  session::{Session, builder::GraphOptimizationLevel},
  value::Tensor,
};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  config::ModelEntry,
  frame::chw_tensor,
  model::{DetectItem, DetectResult, Model, label_name, labels::coco_categories},
  url_to_path,
};

const FASTER_RCNN_NUM_OUTPUTS: usize = 3;

#[derive(Error, Debug)]
pub enum FasterRcnnError {
  #[error("模型文件不存在: {0}")]
  ModelNotFound(PathBuf),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("ONNX Runtime 错误: {0}")]
  OrtError(#[from] ort::Error),
  #[error("模型输出格式错误: {0}")]
  OutputFormat(String),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

/// 输出张量名称
#[derive(Debug, Clone)]
struct OutputNames {
  boxes: String,
  labels: String,
  scores: String,
}

impl OutputNames {
  /// 优先按名称匹配，否则按 torchvision 导出顺序 boxes/labels/scores
  fn resolve(names: &[String]) -> Option<Self> {
    if names.len() < FASTER_RCNN_NUM_OUTPUTS {
      return None;
    }
    let find = |key: &str, fallback: usize| {
      names
        .iter()
        .find(|n| n.to_lowercase().contains(key))
        .unwrap_or(&names[fallback])
        .clone()
    };
    Some(OutputNames {
      boxes: find("box", 0),
      labels: find("label", 1),
      scores: find("score", 2),
    })
  }
}

pub struct FasterRcnn {
  session: Mutex<Session>,
  input_name: String,
  outputs: OutputNames,
  labels: Vec<String>,
}

pub struct FasterRcnnBuilder {
  model_path: PathBuf,
  labels: Vec<String>,
  intra_threads: Option<usize>,
}

impl FromUrlWithScheme for FasterRcnnBuilder {
  const SCHEME: &'static str = "fasterrcnn";
}

impl FromUrl for FasterRcnnBuilder {
  type Error = FasterRcnnError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(FasterRcnnError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Ok(FasterRcnnBuilder::new(url_to_path(url)))
  }
}

impl FasterRcnnBuilder {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    FasterRcnnBuilder {
      model_path: model_path.into(),
      labels: coco_categories(),
      intra_threads: None,
    }
  }

  pub fn labels(mut self, labels: Vec<String>) -> Self {
    self.labels = labels;
    self
  }

  pub fn intra_threads(mut self, threads: usize) -> Self {
    self.intra_threads = Some(threads);
    self
  }

  /// 应用配置项中的可选设置
  pub fn with_entry(mut self, entry: &ModelEntry) -> Self {
    if let Some(labels) = &entry.labels {
      self = self.labels(labels.clone());
    }
    if let Some(threads) = entry.threads {
      self = self.intra_threads(threads);
    }
    self
  }

  pub fn build(self) -> Result<FasterRcnn, FasterRcnnError> {
    if !self.model_path.exists() {
      error!("模型文件不存在: {}", self.model_path.display());
      return Err(FasterRcnnError::ModelNotFound(self.model_path));
    }

    info!("加载模型文件: {}", self.model_path.display());
    let mut builder = Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;
    if let Some(threads) = self.intra_threads {
      builder = builder.with_intra_threads(threads)?;
    }
    let session = builder.commit_from_file(&self.model_path)?;

    let input_name = match session.inputs.first() {
      Some(input) => input.name.clone(),
      None => return Err(FasterRcnnError::ModelInvalid("模型没有输入".to_string())),
    };
    let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
    let outputs = OutputNames::resolve(&output_names).ok_or_else(|| {
      FasterRcnnError::ModelInvalid(format!(
        "预期模型输出数量至少为 {}, 实际为 {}",
        FASTER_RCNN_NUM_OUTPUTS,
        output_names.len()
      ))
    })?;
    debug!("模型输入: '{}', 输出: {:?}", input_name, outputs);
    info!("模型加载完成");

    Ok(FasterRcnn {
      session: Mutex::new(session),
      input_name,
      outputs,
      labels: self.labels,
    })
  }
}

/// 将 torchvision 风格的输出转为检测项，`boxes` 为输入图像像素坐标
pub(crate) fn decode_detections(
  boxes: ArrayView2<f32>,
  classes: ArrayView1<i64>,
  scores: ArrayView1<f32>,
  image_size: (u32, u32),
  threshold: f32,
  labels: &[String],
) -> Result<Vec<DetectItem>, FasterRcnnError> {
  let count = scores.len();
  if boxes.nrows() != count || classes.len() != count || boxes.ncols() != 4 {
    return Err(FasterRcnnError::OutputFormat(format!(
      "输出长度不一致: boxes {:?}, labels {}, scores {}",
      boxes.shape(),
      classes.len(),
      count
    )));
  }

  let (w, h) = (image_size.0.max(1) as f32, image_size.1.max(1) as f32);
  let items = (0..count)
    .filter(|&i| scores[i] >= threshold)
    .map(|i| {
      let class_id = classes[i].max(0) as usize;
      DetectItem {
        class_id: class_id as u32,
        class_name: label_name(labels, class_id),
        score: scores[i],
        bbox: [
          (boxes[[i, 0]] / w).clamp(0.0, 1.0),
          (boxes[[i, 1]] / h).clamp(0.0, 1.0),
          (boxes[[i, 2]] / w).clamp(0.0, 1.0),
          (boxes[[i, 3]] / h).clamp(0.0, 1.0),
        ],
      }
    })
    .collect();
  Ok(items)
}

impl Model for FasterRcnn {
  type Error = FasterRcnnError;

  fn infer(&self, input: &RgbImage, threshold: f32) -> Result<DetectResult, Self::Error> {
    debug!("设置模型输入");
    let tensor = Tensor::from_array(chw_tensor(input))?;

    debug!("执行模型推理");
    let (boxes, classes, scores) = {
      let mut session = self.session.lock();
      let outputs = session.run(inputs![self.input_name.as_str() => tensor])?;
      let fetch = |name: &str| {
        outputs.get(name).ok_or_else(|| {
          let available: Vec<String> = outputs.keys().map(|k| k.to_string()).collect();
          FasterRcnnError::OutputFormat(format!(
            "未找到输出 '{}', 可用输出: {:?}",
            name, available
          ))
        })
      };
      let boxes = fetch(&self.outputs.boxes)?
        .try_extract_array::<f32>()?
        .into_owned();
      let classes = fetch(&self.outputs.labels)?
        .try_extract_array::<i64>()?
        .into_owned();
      let scores = fetch(&self.outputs.scores)?
        .try_extract_array::<f32>()?
        .into_owned();
      (boxes, classes, scores)
    };

    let shape_error = |e: ndarray::ShapeError| FasterRcnnError::OutputFormat(e.to_string());
    let boxes = boxes.into_dimensionality::<Ix2>().map_err(shape_error)?;
    let classes = classes.into_dimensionality::<Ix1>().map_err(shape_error)?;
    let scores = scores.into_dimensionality::<Ix1>().map_err(shape_error)?;

    let items = decode_detections(
      boxes.view(),
      classes.view(),
      scores.view(),
      input.dimensions(),
      threshold,
      &self.labels,
    )?;
    debug!("检测到 {} 个物体", items.len());

    // 该族类不提供推理耗时
    Ok(DetectResult {
      items: items.into_boxed_slice(),
      elapsed_ms: None,
    })
  }
}
