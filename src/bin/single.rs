// 该文件是 Luoshuan （螺栓） 项目的一部分。
// src/bin/single.rs - 单模型检测程序
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

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use luoshuan::{
  adapter::InferenceAdapter,
  config::{DEFAULT_CONFIDENCE_THRESHOLD, ModelEntry, validate_threshold},
  input::read_image,
  model::LoadedModel,
  output::{
    SaveImageFileOutput,
    draw::{Draw, load_font},
  },
  task::{SingleShotTask, Task},
};

/// Luoshuan 单模型检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型来源：ONNX 路径、yolo:// 或 fasterrcnn:// URL、pretrained:fasterrcnn_resnet50_fpn
  #[arg(long, value_name = "MODEL")]
  pub model: String,
  /// 输入图像
  #[arg(long, value_name = "IMAGE")]
  pub input: String,
  /// 输出图像路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: String,
  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_CONFIDENCE_THRESHOLD, value_name = "THRESHOLD")]
  pub confidence: f32,
  /// 类别名称，逗号分隔
  #[arg(long, value_delimiter = ',', value_name = "LABELS")]
  pub labels: Option<Vec<String>>,
  /// ONNX Runtime 线程数
  #[arg(long, value_name = "COUNT")]
  pub threads: Option<usize>,
  /// 预训练模型目录
  #[arg(long, default_value = "models", value_name = "DIR")]
  pub pretrained_dir: PathBuf,
  /// 自定义 TTF 字体
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();
  validate_threshold(args.confidence)?;

  info!("模型来源: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);
  info!("置信度阈值: {}", args.confidence);

  let mut entry = ModelEntry::new("model", args.model.as_str());
  entry.labels = args.labels;
  entry.threads = args.threads;
  let model = LoadedModel::load(&entry, Path::new(""), &args.pretrained_dir)?;
  info!("模型加载完成: {}", model.family());

  let adapter = InferenceAdapter::new(Draw::new(load_font(args.font.as_deref())?));
  let output = SaveImageFileOutput::parse(&args.output)?;

  let image = read_image(&args.input)?;
  let count = SingleShotTask::new(&adapter, args.confidence).run_task(image, &model, output)?;
  println!("Detected {} object(s).", count);

  Ok(())
}
