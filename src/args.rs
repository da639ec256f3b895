// 该文件是 Luoshuan （螺栓） 项目的一部分。
// src/args.rs - 对比程序参数配置
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

use clap::Parser;

/// Luoshuan 多模型对比
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// JSON 配置文件路径
  #[arg(long, value_name = "FILE")]
  pub config: PathBuf,

  /// 输入图像（普通路径或 image:// URL）
  #[arg(long, value_name = "IMAGE")]
  pub input: String,

  /// 输出目录（普通路径或 folder:// URL）
  #[arg(long, value_name = "DIR")]
  pub output: String,

  /// 置信度阈值 (0.0 - 1.0)，覆盖配置文件
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,
}
