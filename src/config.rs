// 该文件是 Luoshuan （螺栓） 项目的一部分。
// src/config.rs - 配置文件
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

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// 默认置信度阈值
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.3;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("无法读取配置文件 {0}: {1}")]
  Io(PathBuf, #[source] std::io::Error),
  #[error("配置文件格式错误: {0}")]
  Parse(#[from] serde_json::Error),
  #[error("置信度阈值必须位于 [0, 1] 区间, 实际为 {0}")]
  InvalidThreshold(f32),
  #[error("模型 {0} 的 NMS IoU 阈值必须位于 [0, 1] 区间, 实际为 {1}")]
  InvalidNmsIou(String, f32),
  #[error("至少需要配置一个模型")]
  NoModels,
  #[error("模型名称不能为空")]
  EmptyName,
  #[error("模型名称重复: {0}")]
  DuplicateName(String),
}

/// 单个模型配置项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
  /// 显示名称
  pub name: String,
  /// 模型来源：文件路径、`yolo://`/`fasterrcnn://` URL 或预训练标记
  pub source: String,
  /// 类别名称，缺省时使用 COCO 类别
  #[serde(default)]
  pub labels: Option<Vec<String>>,
  /// 模型输入边长（仅 YOLO）
  #[serde(default)]
  pub input_size: Option<u32>,
  /// NMS IoU 阈值（仅 YOLO）
  #[serde(default)]
  pub nms_iou: Option<f32>,
  /// 最大检测数（仅 YOLO）
  #[serde(default)]
  pub max_detections: Option<usize>,
  /// ONNX Runtime 线程数
  #[serde(default)]
  pub threads: Option<usize>,
}

impl ModelEntry {
  pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      source: source.into(),
      labels: None,
      input_size: None,
      nms_iou: None,
      max_detections: None,
      threads: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
  #[serde(default = "default_threshold")]
  pub confidence_threshold: f32,
  /// 预训练模型所在目录
  #[serde(default = "default_pretrained_dir")]
  pub pretrained_dir: PathBuf,
  /// 自定义 TTF 字体
  #[serde(default)]
  pub font: Option<PathBuf>,
  /// 模型列表，顺序即注册顺序
  pub models: Vec<ModelEntry>,
  /// 模型相对路径的基准目录
  #[serde(skip)]
  pub base_dir: PathBuf,
}

fn default_threshold() -> f32 {
  DEFAULT_CONFIDENCE_THRESHOLD
}

fn default_pretrained_dir() -> PathBuf {
  PathBuf::from("models")
}

impl AppConfig {
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    info!("加载配置文件: {}", path.display());
    let text =
      std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
    let config = Self::from_json(&text)?;

    // 相对路径以配置文件所在目录为基准
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    Ok(config.rebase(base))
  }

  pub fn from_json(text: &str) -> Result<Self, ConfigError> {
    let config: AppConfig = serde_json::from_str(text)?;
    config.validate()?;
    debug!("配置内容: {:?}", config);
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    validate_threshold(self.confidence_threshold)?;
    if self.models.is_empty() {
      return Err(ConfigError::NoModels);
    }

    let mut seen = std::collections::HashSet::new();
    for entry in &self.models {
      if entry.name.trim().is_empty() {
        return Err(ConfigError::EmptyName);
      }
      if !seen.insert(entry.name.as_str()) {
        return Err(ConfigError::DuplicateName(entry.name.clone()));
      }
      if let Some(iou) = entry.nms_iou
        && !(0.0..=1.0).contains(&iou)
      {
        return Err(ConfigError::InvalidNmsIou(entry.name.clone(), iou));
      }
    }
    Ok(())
  }

  /// 命令行覆盖阈值
  pub fn with_threshold(mut self, threshold: Option<f32>) -> Result<Self, ConfigError> {
    if let Some(threshold) = threshold {
      validate_threshold(threshold)?;
      self.confidence_threshold = threshold;
    }
    Ok(self)
  }

  fn rebase(mut self, base: &Path) -> Self {
    self.base_dir = base.to_path_buf();
    if self.pretrained_dir.is_relative() {
      self.pretrained_dir = base.join(&self.pretrained_dir);
    }
    if let Some(font) = self.font.as_mut()
      && font.is_relative()
    {
      *font = base.join(&*font);
    }
    self
  }
}

pub fn validate_threshold(threshold: f32) -> Result<(), ConfigError> {
  if (0.0..=1.0).contains(&threshold) {
    Ok(())
  } else {
    Err(ConfigError::InvalidThreshold(threshold))
  }
}
