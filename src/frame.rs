// 该文件是 Luoshuan （螺栓） 项目的一部分。
// src/frame.rs - 帧预处理与张量转换
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

use image::{Rgb, RgbImage, imageops};
use ndarray::{Array3, Array4};

const RGB_CHANNELS: usize = 3;

/// 去色：先转为单通道亮度，再复制回三通道，颜色信息不参与检测
pub fn desaturate(image: &RgbImage) -> RgbImage {
  let gray = imageops::grayscale(image);
  RgbImage::from_fn(gray.width(), gray.height(), |x, y| {
    let v = gray.get_pixel(x, y)[0];
    Rgb([v, v, v])
  })
}

/// 缩放到模型输入尺寸并转为归一化的 NCHW 张量
pub fn nchw_tensor(image: &RgbImage, width: u32, height: u32) -> Array4<f32> {
  let resized;
  let image = if image.dimensions() == (width, height) {
    image
  } else {
    resized = imageops::resize(image, width, height, imageops::FilterType::Triangle);
    &resized
  };

  let mut tensor = Array4::<f32>::zeros((1, RGB_CHANNELS, height as usize, width as usize));
  for (x, y, pixel) in image.enumerate_pixels() {
    for c in 0..RGB_CHANNELS {
      tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
    }
  }
  tensor
}

/// 原始尺寸的归一化 CHW 张量
pub fn chw_tensor(image: &RgbImage) -> Array3<f32> {
  let (width, height) = image.dimensions();
  let mut tensor = Array3::<f32>::zeros((RGB_CHANNELS, height as usize, width as usize));
  for (x, y, pixel) in image.enumerate_pixels() {
    for c in 0..RGB_CHANNELS {
      tensor[[c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
    }
  }
  tensor
}
