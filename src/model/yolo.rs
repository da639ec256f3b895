// 该文件是 Luoshuan （螺栓） 项目的一部分。
// src/model/yolo.rs - YOLO 检测模型
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

use std::{path::PathBuf, time::Instant};

use image::RgbImage;
use ndarray::{ArrayView2, Axis, Ix2};
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
  frame::nchw_tensor,
  model::{DetectItem, DetectResult, Model, label_name, labels::coco_classes},
  url_to_path,
};

const YOLO_INPUT_W: u32 = 640;
const YOLO_INPUT_H: u32 = 640;
const YOLO_BOX_VALUES: usize = 4;
const YOLO_NMS_THRESH: f32 = 0.45;
const YOLO_MAX_DETECTIONS: usize = 300;

#[derive(Error, Debug)]
pub enum YoloError {
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

pub struct Yolo {
  session: Mutex<Session>,
  input_name: String,
  input_w: u32,
  input_h: u32,
  labels: Vec<String>,
  nms_threshold: f32,
  max_detections: usize,
}

pub struct YoloBuilder {
  model_path: PathBuf,
  input_w: u32,
  input_h: u32,
  labels: Vec<String>,
  nms_threshold: f32,
  max_detections: usize,
  intra_threads: Option<usize>,
}

impl FromUrlWithScheme for YoloBuilder {
  const SCHEME: &'static str = "yolo";
}

impl FromUrl for YoloBuilder {
  type Error = YoloError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(YoloError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Ok(YoloBuilder::new(url_to_path(url)))
  }
}

impl YoloBuilder {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    YoloBuilder {
      model_path: model_path.into(),
      input_w: YOLO_INPUT_W,
      input_h: YOLO_INPUT_H,
      labels: coco_classes(),
      nms_threshold: YOLO_NMS_THRESH,
      max_detections: YOLO_MAX_DETECTIONS,
      intra_threads: None,
    }
  }

  pub fn labels(mut self, labels: Vec<String>) -> Self {
    self.labels = labels;
    self
  }

  pub fn input_size(mut self, width: u32, height: u32) -> Self {
    self.input_w = width;
    self.input_h = height;
    self
  }

  pub fn nms_threshold(mut self, threshold: f32) -> Self {
    self.nms_threshold = threshold;
    self
  }

  pub fn max_detections(mut self, max: usize) -> Self {
    self.max_detections = max;
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
    if let Some(size) = entry.input_size {
      self = self.input_size(size, size);
    }
    if let Some(iou) = entry.nms_iou {
      self = self.nms_threshold(iou);
    }
    if let Some(max) = entry.max_detections {
      self = self.max_detections(max);
    }
    if let Some(threads) = entry.threads {
      self = self.intra_threads(threads);
    }
    self
  }

  pub fn build(self) -> Result<Yolo, YoloError> {
    if !self.model_path.exists() {
      error!("模型文件不存在: {}", self.model_path.display());
      return Err(YoloError::ModelNotFound(self.model_path));
    }
    if self.input_w == 0 || self.input_h == 0 {
      return Err(YoloError::ModelInvalid(format!(
        "输入尺寸无效: {}x{}",
        self.input_w, self.input_h
      )));
    }

    info!("加载模型文件: {}", self.model_path.display());
    let mut builder = Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;
    if let Some(threads) = self.intra_threads {
      builder = builder.with_intra_threads(threads)?;
    }
    let session = builder.commit_from_file(&self.model_path)?;

    let input_name = match session.inputs.first() {
      Some(input) => input.name.clone(),
      None => return Err(YoloError::ModelInvalid("模型没有输入".to_string())),
    };
    if session.outputs.is_empty() {
      return Err(YoloError::ModelInvalid("模型没有输出".to_string()));
    }
    debug!("模型输入: '{}'", input_name);
    for (i, output) in session.outputs.iter().enumerate() {
      debug!("模型输出[{}]: '{}'", i, output.name);
    }
    info!("模型加载完成");

    Ok(Yolo {
      session: Mutex::new(session),
      input_name,
      input_w: self.input_w,
      input_h: self.input_h,
      labels: self.labels,
      nms_threshold: self.nms_threshold,
      max_detections: self.max_detections,
    })
  }
}

/// 解码后、NMS 前的候选框，坐标为模型输入像素
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
  pub class_id: usize,
  pub score: f32,
  pub bbox: [f32; 4],
}

/// 解码 YOLOv8 风格的输出 `[4 + 类别数, 锚点数]`（也接受转置布局）
pub fn decode_output(output: ArrayView2<f32>, num_classes: usize, threshold: f32) -> Vec<Candidate> {
  let channels = YOLO_BOX_VALUES + num_classes;
  let output = if output.nrows() == channels {
    output
  } else if output.ncols() == channels {
    output.reversed_axes()
  } else if output.nrows() > output.ncols() {
    // 类别数与标签不符时，锚点数总是多于通道数
    output.reversed_axes()
  } else {
    output
  };
  if output.nrows() <= YOLO_BOX_VALUES {
    error!("输出通道数不足: {}", output.nrows());
    return Vec::new();
  }

  let mut candidates = Vec::new();
  for anchor in output.axis_iter(Axis(1)) {
    let (class_id, score) = anchor
      .iter()
      .skip(YOLO_BOX_VALUES)
      .enumerate()
      .fold((0usize, f32::MIN), |best, (c, &s)| {
        if s > best.1 { (c, s) } else { best }
      });

    if score < threshold {
      continue;
    }

    let (cx, cy, w, h) = (anchor[0], anchor[1], anchor[2], anchor[3]);
    candidates.push(Candidate {
      class_id,
      score,
      bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
    });
  }
  candidates
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);
  let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
  let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
  let union = area_a + area_b - inter;
  if union <= 0.0 { 0.0 } else { inter / union }
}

/// 按类别的非极大值抑制，结果按置信度降序
pub fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
  candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
  let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
  for candidate in candidates {
    let suppressed = kept
      .iter()
      .any(|k| k.class_id == candidate.class_id && iou(&k.bbox, &candidate.bbox) > iou_threshold);
    if !suppressed {
      kept.push(candidate);
    }
  }
  kept
}

/// 解码、NMS 并截断到 `max_detections`，坐标按输入尺寸归一化
pub fn postprocess(
  output: ArrayView2<f32>,
  labels: &[String],
  input_size: (u32, u32),
  nms_iou: f32,
  max_detections: usize,
  threshold: f32,
) -> Box<[DetectItem]> {
  debug!("后处理模型输出: {:?}", output.shape());
  let candidates = decode_output(output, labels.len(), threshold);
  debug!("阈值过滤后候选框: {}", candidates.len());

  let (w, h) = (input_size.0.max(1) as f32, input_size.1.max(1) as f32);
  nms(candidates, nms_iou)
    .into_iter()
    .take(max_detections)
    .map(|c| DetectItem {
      class_id: c.class_id as u32,
      class_name: label_name(labels, c.class_id),
      score: c.score,
      bbox: [
        (c.bbox[0] / w).clamp(0.0, 1.0),
        (c.bbox[1] / h).clamp(0.0, 1.0),
        (c.bbox[2] / w).clamp(0.0, 1.0),
        (c.bbox[3] / h).clamp(0.0, 1.0),
      ],
    })
    .collect()
}

impl Model for Yolo {
  type Error = YoloError;

  fn infer(&self, input: &RgbImage, threshold: f32) -> Result<DetectResult, Self::Error> {
    debug!("设置模型输入");
    let tensor = Tensor::from_array(nchw_tensor(input, self.input_w, self.input_h))?;

    debug!("执行模型推理");
    let now = Instant::now();
    let output = {
      let mut session = self.session.lock();
      let outputs = session.run(inputs![self.input_name.as_str() => tensor])?;
      let first = outputs
        .values()
        .next()
        .ok_or_else(|| YoloError::OutputFormat("模型没有返回输出".to_string()))?;
      first.try_extract_array::<f32>()?.into_owned()
    };
    let elapsed = now.elapsed();
    debug!("推理完成，耗时: {:.2?}", elapsed);

    // 去掉 batch 维度
    let output = match output.ndim() {
      3 => output.index_axis_move(Axis(0), 0),
      2 => output,
      n => {
        return Err(YoloError::OutputFormat(format!("期望 2 或 3 维输出, 实际为 {} 维", n)));
      }
    };
    let output = output
      .into_dimensionality::<Ix2>()
      .map_err(|e| YoloError::OutputFormat(e.to_string()))?;

    let items = postprocess(
      output.view(),
      &self.labels,
      (self.input_w, self.input_h),
      self.nms_threshold,
      self.max_detections,
      threshold,
    );
    debug!("检测到 {} 个物体", items.len());

    Ok(DetectResult {
      items,
      elapsed_ms: Some(elapsed.as_secs_f64() * 1000.0),
    })
  }
}
