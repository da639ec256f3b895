// 该文件是 Luoshuan （螺栓） 项目的一部分。
// src/output/directory_record.rs - 对比结果目录输出
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

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  adapter::DetectionRecord,
  compare::{ComparisonRun, ModelState},
  output::Render,
  url_to_path,
};

pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

#[derive(Debug, Serialize)]
pub struct ModelSummary<'a> {
  pub name: &'a str,
  pub status: &'static str,
  pub elapsed_ms: f64,
  pub header: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<&'a str>,
  pub composite: String,
  pub detections: &'a [DetectionRecord],
}

#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
  pub generated_at: DateTime<Utc>,
  pub threshold: f32,
  pub image_width: u32,
  pub image_height: u32,
  pub models: Vec<ModelSummary<'a>>,
}

impl<'a> RunSummary<'a> {
  pub fn new(run: &'a ComparisonRun) -> Self {
    let models = run
      .results
      .iter()
      .enumerate()
      .map(|(index, result)| ModelSummary {
        name: &result.model_name,
        status: match result.state() {
          ModelState::Succeeded => "succeeded",
          _ => "failed",
        },
        elapsed_ms: result.elapsed_ms(),
        header: &result.header,
        error: result.error(),
        composite: composite_file_name(index, &result.model_name),
        detections: result.detections(),
      })
      .collect();

    RunSummary {
      generated_at: Utc::now(),
      threshold: run.threshold,
      image_width: run.input.width(),
      image_height: run.input.height(),
      models,
    }
  }
}

/// 文件名保留注册顺序，名称中的特殊字符替换为下划线
pub fn composite_file_name(index: usize, model_name: &str) -> String {
  let name: String = model_name
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
    .collect();
  format!("{:02}_{}.png", index + 1, name)
}

pub struct DirectoryRecordOutput {
  directory: PathBuf,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    Ok(DirectoryRecordOutput {
      directory: url_to_path(uri),
    })
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
    }
  }

  /// 接受 `folder://` URL 或普通目录
  pub fn parse(target: &str) -> Result<Self, DirectoryRecordOutputError> {
    match Url::parse(target) {
      Ok(url) if url.scheme() == Self::SCHEME => Self::from_url(&url),
      _ => Ok(Self::new(target)),
    }
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }
}

impl Render<ComparisonRun> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, run: &ComparisonRun) -> Result<(), Self::Error> {
    std::fs::create_dir_all(&self.directory)?;

    let summary = RunSummary::new(run);
    for (result, model) in run.results.iter().zip(&summary.models) {
      let path = self.directory.join(&model.composite);
      result.composite.save(&path)?;
      info!("保存 {} 的结果到: {}", result.model_name, path.display());
    }

    let path = self.directory.join(SUMMARY_FILE);
    std::fs::write(&path, serde_json::to_string_pretty(&summary)?)?;
    info!("保存对比摘要到: {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn file_names_keep_order_and_are_safe() {
    assert_eq!(composite_file_name(0, "YOLOv8"), "01_YOLOv8.png");
    assert_eq!(composite_file_name(1, "Faster R-CNN"), "02_Faster_R-CNN.png");
    assert_eq!(composite_file_name(11, "a/b"), "12_a_b.png");
  }

  #[test]
  fn folder_url() {
    let output = DirectoryRecordOutput::parse("folder:///var/results").unwrap();
    assert_eq!(output.directory(), Path::new("/var/results"));
    let output = DirectoryRecordOutput::parse("results").unwrap();
    assert_eq!(output.directory(), Path::new("results"));
  }
}
