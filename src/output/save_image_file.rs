// 该文件是 Luoshuan （螺栓） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use image::RgbImage;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, adapter::Prediction, output::Render, url_to_path};

pub struct SaveImageFileOutput {
  path: PathBuf,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(SaveImageFileOutput {
      path: url_to_path(uri),
    })
  }
}

impl SaveImageFileOutput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  /// 接受 `image://` URL 或普通路径
  pub fn parse(target: &str) -> Result<Self, SaveImageFileError> {
    match Url::parse(target) {
      Ok(url) if url.scheme() == Self::SCHEME => Self::from_url(&url),
      _ => Ok(Self::new(target)),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn save_image(&self, image: &RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(&self.path)?;
    info!("保存图像到文件: {}", self.path.display());

    Ok(())
  }
}

impl Render<Prediction> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, result: &Prediction) -> Result<(), Self::Error> {
    self.save_image(&result.annotated)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn saves_annotated_image_creating_parents() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/out.png");
    let output = SaveImageFileOutput::parse(path.to_str().unwrap()).unwrap();
    let prediction = Prediction {
      annotated: RgbImage::from_pixel(5, 4, Rgb([9, 8, 7])),
      detections: vec![],
      elapsed_ms: 0.0,
    };
    output.render_result(&prediction).unwrap();

    let saved = image::open(&path).unwrap().into_rgb8();
    assert_eq!(saved, prediction.annotated);
  }

  #[test]
  fn url_target() {
    let output = SaveImageFileOutput::parse("image:///tmp/result.png").unwrap();
    assert_eq!(output.path(), Path::new("/tmp/result.png"));
    let url = Url::parse("folder:///tmp").unwrap();
    assert!(matches!(
      SaveImageFileOutput::from_url(&url),
      Err(SaveImageFileError::SchemeMismatch(_))
    ));
  }
}
