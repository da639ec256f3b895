// 该文件是 Luoshuan （螺栓） 项目的一部分。
// src/input.rs - 图像文件输入
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

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, url_to_path};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("无法读取图像 {0}: {1}")]
  Unreadable(String, #[source] image::ImageError),
}

pub struct ImageFileInput {
  image: RgbImage,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(InputError::SchemaMismatch);
    }

    Self::open(url_to_path(url))
  }
}

impl ImageFileInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, InputError> {
    let path = path.as_ref();
    let unreadable = |e: image::ImageError| InputError::Unreadable(path.display().to_string(), e);

    let image = ImageReader::open(path)
      .map_err(|e| unreadable(image::ImageError::IoError(e)))?
      .with_guessed_format()
      .map_err(|e| unreadable(image::ImageError::IoError(e)))?
      .decode()
      .map_err(unreadable)?;
    debug!("读取图像 {}: {}x{}", path.display(), image.width(), image.height());

    Ok(ImageFileInput {
      image: image.into_rgb8(),
    })
  }

  pub fn into_image(self) -> RgbImage {
    self.image
  }
}

/// 读取输入图像，支持 `image://` URL 与普通路径
pub fn read_image(source: &str) -> Result<RgbImage, InputError> {
  let input = match Url::parse(source) {
    Ok(url) if url.scheme() == ImageFileInput::SCHEME => ImageFileInput::from_url(&url)?,
    _ => ImageFileInput::open(source)?,
  };
  Ok(input.into_image())
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn missing_file_is_unreadable() {
    let err = ImageFileInput::open("/nonexistent/picture.png").err().unwrap();
    assert!(matches!(err, InputError::Unreadable(..)));
  }

  #[test]
  fn garbage_bytes_are_unreadable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.png");
    std::fs::write(&path, b"definitely not an image").unwrap();
    let err = ImageFileInput::open(&path).err().unwrap();
    assert!(matches!(err, InputError::Unreadable(..)));
  }

  #[test]
  fn scheme_mismatch() {
    let url = Url::parse("video:///tmp/a.mp4").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(InputError::SchemaMismatch)
    ));
  }

  #[test]
  fn reads_png_by_path_and_url() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dot.png");
    let mut image = RgbImage::new(3, 2);
    image.put_pixel(1, 1, Rgb([10, 20, 30]));
    image.save(&path).unwrap();

    let by_path = read_image(path.to_str().unwrap()).unwrap();
    assert_eq!(by_path, image);

    let url = format!("image://{}", path.display());
    let by_url = read_image(&url).unwrap();
    assert_eq!(by_url, image);
  }
}
