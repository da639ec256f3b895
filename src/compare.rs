// 该文件是 Luoshuan （螺栓） 项目的一部分。
// src/compare.rs - 多模型对比
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

use std::path::Path;

use image::RgbImage;
use tracing::{debug, info, warn};

use crate::{
  adapter::{DetectionRecord, InferenceAdapter, Prediction},
  input::{ImageFileInput, InputError},
  model::Model,
  output::composite::CompositeRenderer,
  registry::ModelRegistry,
};

/// 单个模型在一次对比中的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
  Pending,
  Running,
  Succeeded,
  Failed,
}

#[derive(Debug, Clone)]
pub enum ModelOutcome {
  Succeeded(Prediction),
  Failed(String),
}

#[derive(Debug, Clone)]
pub struct ModelResult {
  pub model_name: String,
  pub outcome: ModelOutcome,
  /// 明细区标题
  pub header: String,
  /// 标注图像与明细拼接后的结果
  pub composite: RgbImage,
}

impl ModelResult {
  pub fn state(&self) -> ModelState {
    match self.outcome {
      ModelOutcome::Succeeded(_) => ModelState::Succeeded,
      ModelOutcome::Failed(_) => ModelState::Failed,
    }
  }

  pub fn detections(&self) -> &[DetectionRecord] {
    match &self.outcome {
      ModelOutcome::Succeeded(prediction) => &prediction.detections,
      ModelOutcome::Failed(_) => &[],
    }
  }

  pub fn elapsed_ms(&self) -> f64 {
    match &self.outcome {
      ModelOutcome::Succeeded(prediction) => prediction.elapsed_ms,
      ModelOutcome::Failed(_) => 0.0,
    }
  }

  pub fn annotated_image(&self) -> Option<&RgbImage> {
    match &self.outcome {
      ModelOutcome::Succeeded(prediction) => Some(&prediction.annotated),
      ModelOutcome::Failed(_) => None,
    }
  }

  pub fn error(&self) -> Option<&str> {
    match &self.outcome {
      ModelOutcome::Succeeded(_) => None,
      ModelOutcome::Failed(message) => Some(message),
    }
  }
}

/// 一次对比的全部结果，顺序与注册顺序一致
#[derive(Debug, Clone)]
pub struct ComparisonRun {
  pub input: RgbImage,
  pub threshold: f32,
  pub results: Vec<ModelResult>,
}

impl ComparisonRun {
  pub fn composites(&self) -> impl Iterator<Item = &RgbImage> {
    self.results.iter().map(|r| &r.composite)
  }

  pub fn failed(&self) -> usize {
    self
      .results
      .iter()
      .filter(|r| r.state() == ModelState::Failed)
      .count()
  }
}

pub fn success_header(model_name: &str, prediction: &Prediction) -> String {
  format!(
    "{} | {} object(s) | {:.1} ms",
    model_name,
    prediction.object_count(),
    prediction.elapsed_ms
  )
}

pub fn error_header(model_name: &str) -> String {
  format!("Error with {}", model_name)
}

pub struct ComparisonOrchestrator<M> {
  registry: ModelRegistry<M>,
  adapter: InferenceAdapter,
  renderer: CompositeRenderer,
}

impl<M: Model> ComparisonOrchestrator<M> {
  pub fn new(registry: ModelRegistry<M>, adapter: InferenceAdapter, renderer: CompositeRenderer) -> Self {
    Self {
      registry,
      adapter,
      renderer,
    }
  }

  /// 依次运行所有模型，单个模型失败不影响其余模型
  pub fn run(&self, image: RgbImage, threshold: f32) -> ComparisonRun {
    info!(
      "开始对比: {} 个模型, 图像 {}x{}, 阈值 {}",
      self.registry.len(),
      image.width(),
      image.height(),
      threshold
    );

    let mut results = Vec::with_capacity(self.registry.len());
    for (name, model) in self.registry.iter() {
      debug!("模型 {} 状态: {:?} -> {:?}", name, ModelState::Pending, ModelState::Running);

      let result = match self.adapter.predict(model, &image, threshold) {
        Ok(prediction) => {
          info!(
            "模型 {} 完成: {} 个目标, 耗时 {:.2} ms",
            name,
            prediction.object_count(),
            prediction.elapsed_ms
          );
          let header = success_header(name, &prediction);
          let composite = self.renderer.render(
            Some(&prediction.annotated),
            &header,
            &prediction.detections,
          );
          ModelResult {
            model_name: name.to_string(),
            outcome: ModelOutcome::Succeeded(prediction),
            header,
            composite,
          }
        }
        Err(e) => {
          warn!("模型 {} 推理失败: {}", name, e);
          let header = error_header(name);
          let composite = self.renderer.render(None, &header, &[]);
          ModelResult {
            model_name: name.to_string(),
            outcome: ModelOutcome::Failed(e.to_string()),
            header,
            composite,
          }
        }
      };
      debug!("模型 {} 状态: {:?} -> {:?}", name, ModelState::Running, result.state());
      results.push(result);
    }

    let run = ComparisonRun {
      input: image,
      threshold,
      results,
    };
    info!("对比完成, 失败 {} 个", run.failed());
    run
  }

  /// 先解码输入，无法读取时不运行任何模型
  pub fn run_path(&self, path: impl AsRef<Path>, threshold: f32) -> Result<ComparisonRun, InputError> {
    let image = ImageFileInput::open(path)?.into_image();
    Ok(self.run(image, threshold))
  }
}
