// 该文件是 Luoshuan （螺栓） 项目的一部分。
// src/main.rs - 多模型对比主程序
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

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use luoshuan::{
  adapter::InferenceAdapter,
  compare::ComparisonOrchestrator,
  config::AppConfig,
  input::read_image,
  output::{DirectoryRecordOutput, composite::CompositeRenderer, draw::{Draw, load_font}},
  registry::ModelRegistry,
  task::{CompareTask, Task},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = args::Args::parse();

  info!("配置文件: {}", args.config.display());
  info!("输入来源: {}", args.input);
  info!("输出目录: {}", args.output);

  let config = AppConfig::from_file(&args.config)?.with_threshold(args.confidence)?;
  info!("置信度阈值: {}", config.confidence_threshold);

  let font = load_font(config.font.as_deref())?;
  let registry = ModelRegistry::load(&config.models, &config.base_dir, &config.pretrained_dir)?;
  info!("模型加载完成: {}", registry.names().collect::<Vec<_>>().join(", "));

  let orchestrator = ComparisonOrchestrator::new(
    registry,
    InferenceAdapter::new(Draw::new(font.clone())),
    CompositeRenderer::new(font),
  );
  let output = DirectoryRecordOutput::parse(&args.output)?;

  // 输入无法读取时不运行任何模型
  let image = read_image(&args.input)?;
  let run = CompareTask::new(config.confidence_threshold).run_task(image, &orchestrator, output)?;

  for result in &run.results {
    info!(
      "{}: {:?}, {} 个目标, {:.1} ms",
      result.model_name,
      result.state(),
      result.detections().len(),
      result.elapsed_ms()
    );
  }

  Ok(())
}
