// 该文件是 Luoshuan （螺栓） 项目的一部分。
// src/task.rs - 任务流程
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
use tracing::{info, warn};

use crate::{
  adapter::{InferenceAdapter, Prediction},
  compare::{ComparisonOrchestrator, ComparisonRun},
  model::Model,
  output::Render,
};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

/// 单模型检测，返回检测到的目标数
pub struct SingleShotTask<'a> {
  adapter: &'a InferenceAdapter,
  threshold: f32,
}

impl<'a> SingleShotTask<'a> {
  pub fn new(adapter: &'a InferenceAdapter, threshold: f32) -> Self {
    Self { adapter, threshold }
  }
}

impl<
  'm,
  RE: std::error::Error + Sync + Send + 'static,
  M: Model,
  O: Render<Prediction, Error = RE>,
> Task<RgbImage, &'m M, O> for SingleShotTask<'_>
{
  type Output = usize;
  type Error = anyhow::Error;

  fn run_task(self, input: RgbImage, model: &'m M, output: O) -> Result<usize, Self::Error> {
    info!("开始推理...");
    let now = std::time::Instant::now();
    let prediction = self.adapter.predict(model, &input, self.threshold)?;
    info!(
      "推理完成，检测到 {} 个目标，耗时: {:.2?}",
      prediction.object_count(),
      now.elapsed()
    );
    output.render_result(&prediction)?;
    info!("渲染完成");

    Ok(prediction.object_count())
  }
}

/// 多模型对比，单个模型失败只记录在结果中
pub struct CompareTask {
  threshold: f32,
}

impl CompareTask {
  pub fn new(threshold: f32) -> Self {
    Self { threshold }
  }
}

impl<
  'o,
  RE: std::error::Error + Sync + Send + 'static,
  M: Model,
  O: Render<ComparisonRun, Error = RE>,
> Task<RgbImage, &'o ComparisonOrchestrator<M>, O> for CompareTask
{
  type Output = ComparisonRun;
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: RgbImage,
    orchestrator: &'o ComparisonOrchestrator<M>,
    output: O,
  ) -> Result<ComparisonRun, Self::Error> {
    info!("开始任务...");
    let now = std::time::Instant::now();
    let run = orchestrator.run(input, self.threshold);
    info!("对比完成，耗时: {:.2?}", now.elapsed());
    if !run.results.is_empty() && run.failed() == run.results.len() {
      warn!("所有模型均推理失败");
    }
    output.render_result(&run)?;
    info!("渲染完成");

    Ok(run)
  }
}
