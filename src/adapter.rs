// 该文件是 Luoshuan （螺栓） 项目的一部分。
// src/adapter.rs - 推理适配：预处理、阈值过滤与检测框绘制
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

use image::RgbImage;
use serde::Serialize;
use tracing::debug;

use crate::{
  frame::desaturate,
  model::{DetectItem, Model},
  output::draw::Draw,
};

/// 统一的检测记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRecord {
  pub class_name: String,
  pub confidence: f32,
  /// [x_min, y_min, x_max, y_max]，归一化坐标
  pub bbox: [f32; 4],
}

impl From<&DetectItem> for DetectionRecord {
  fn from(item: &DetectItem) -> Self {
    DetectionRecord {
      class_name: item.class_name.clone(),
      confidence: item.score,
      bbox: item.bbox,
    }
  }
}

/// 单个模型的推理结果
#[derive(Debug, Clone)]
pub struct Prediction {
  /// 在原始彩色图像上绘制检测框后的图像
  pub annotated: RgbImage,
  pub detections: Vec<DetectionRecord>,
  pub elapsed_ms: f64,
}

impl Prediction {
  pub fn object_count(&self) -> usize {
    self.detections.len()
  }
}

pub struct InferenceAdapter {
  draw: Draw,
}

impl InferenceAdapter {
  pub fn new(draw: Draw) -> Self {
    Self { draw }
  }

  /// 模型错误原样返回，由调用方决定如何处理
  pub fn predict<M: Model>(
    &self,
    model: &M,
    image: &RgbImage,
    threshold: f32,
  ) -> Result<Prediction, M::Error> {
    let input = desaturate(image);
    let result = model.infer(&input, threshold)?;

    let detections: Vec<DetectionRecord> = result
      .items
      .iter()
      .filter(|item| item.score >= threshold)
      .map(DetectionRecord::from)
      .collect();
    debug!(
      "模型输出 {} 个目标, 阈值 {} 过滤后剩余 {} 个",
      result.len(),
      threshold,
      detections.len()
    );

    let mut annotated = image.clone();
    self.draw.draw_detections(&mut annotated, &detections);

    Ok(Prediction {
      annotated,
      detections,
      elapsed_ms: result.elapsed_ms.unwrap_or(0.0),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    model::DetectResult,
    output::draw::load_font,
  };
  use image::Rgb;
  use std::cell::RefCell;

  /// 记录收到的输入并返回固定结果
  struct Recording {
    items: Vec<DetectItem>,
    elapsed_ms: Option<f64>,
    seen: RefCell<Option<RgbImage>>,
  }

  impl Model for Recording {
    type Error = std::io::Error;

    fn infer(&self, input: &RgbImage, _threshold: f32) -> Result<DetectResult, Self::Error> {
      *self.seen.borrow_mut() = Some(input.clone());
      Ok(DetectResult {
        items: self.items.clone().into_boxed_slice(),
        elapsed_ms: self.elapsed_ms,
      })
    }
  }

  struct Broken;

  impl Model for Broken {
    type Error = std::io::Error;

    fn infer(&self, _input: &RgbImage, _threshold: f32) -> Result<DetectResult, Self::Error> {
      Err(std::io::Error::other("session crashed"))
    }
  }

  fn item(name: &str, score: f32) -> DetectItem {
    DetectItem {
      class_id: 0,
      class_name: name.to_string(),
      score,
      bbox: [0.25, 0.25, 0.75, 0.75],
    }
  }

  fn adapter() -> InferenceAdapter {
    InferenceAdapter::new(Draw::new(load_font(None).unwrap()))
  }

  fn red(width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([200, 10, 10]))
  }

  #[test]
  fn model_sees_desaturated_input() {
    let model = Recording {
      items: vec![],
      elapsed_ms: None,
      seen: RefCell::new(None),
    };
    adapter().predict(&model, &red(8, 8), 0.5).unwrap();
    let seen = model.seen.borrow().clone().unwrap();
    assert!(seen.pixels().all(|p| p[0] == p[1] && p[1] == p[2]));
  }

  #[test]
  fn threshold_is_inclusive() {
    let model = Recording {
      items: vec![item("bolt", 0.5), item("nut", 0.4999), item("bolt", 0.9)],
      elapsed_ms: Some(12.5),
      seen: RefCell::new(None),
    };
    let prediction = adapter().predict(&model, &red(32, 32), 0.5).unwrap();
    let scores: Vec<f32> = prediction.detections.iter().map(|d| d.confidence).collect();
    assert_eq!(scores, [0.5, 0.9]);
    assert_eq!(prediction.elapsed_ms, 12.5);
  }

  #[test]
  fn missing_timing_reports_zero() {
    let model = Recording {
      items: vec![],
      elapsed_ms: None,
      seen: RefCell::new(None),
    };
    let prediction = adapter().predict(&model, &red(4, 4), 0.1).unwrap();
    assert_eq!(prediction.elapsed_ms, 0.0);
    assert_eq!(prediction.object_count(), 0);
  }

  #[test]
  fn boxes_drawn_on_original_colors() {
    let model = Recording {
      items: vec![item("bolt", 0.9)],
      elapsed_ms: None,
      seen: RefCell::new(None),
    };
    let image = red(64, 64);
    let prediction = adapter().predict(&model, &image, 0.5).unwrap();
    assert_eq!(prediction.annotated.dimensions(), image.dimensions());
    // 框外区域保持原始颜色
    assert_eq!(*prediction.annotated.get_pixel(63, 63), Rgb([200, 10, 10]));
    assert_ne!(prediction.annotated, image);
  }

  #[test]
  fn errors_pass_through() {
    let err = adapter().predict(&Broken, &red(4, 4), 0.5).unwrap_err();
    assert_eq!(err.to_string(), "session crashed");
  }
}
