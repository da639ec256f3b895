// 该文件是 Luoshuan （螺栓） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::debug;

use crate::adapter::DetectionRecord;

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const LABEL_TEXT_COLOR: [u8; 3] = [255, 255, 255];
const PALETTE_SIZE: usize = 80;
const BOX_THICKNESS: i32 = 2;

static DEFAULT_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

#[derive(Error, Debug)]
pub enum FontError {
  #[error("无法读取字体文件: {0}")]
  Io(#[from] std::io::Error),
  #[error("字体数据无效: {0}")]
  Invalid(#[from] ab_glyph::InvalidFont),
}

/// 加载字体，未指定时使用内置字体
pub fn load_font(path: Option<&Path>) -> Result<FontArc, FontError> {
  match path {
    Some(path) => {
      debug!("加载字体文件: {}", path.display());
      Ok(FontArc::try_from_vec(std::fs::read(path)?)?)
    }
    None => Ok(FontArc::try_from_slice(DEFAULT_FONT)?),
  }
}

#[derive(Clone)]
pub struct Draw {
  font: FontArc,
  font_size: f32,
  label_text_vertical_padding: i32,
  colors: Vec<Rgb<u8>>,
}

impl Draw {
  pub fn new(font: FontArc) -> Self {
    // 生成 80 种不同的颜色
    let colors = (0..PALETTE_SIZE)
      .map(|i| hsv_to_rgb((i as f32 / PALETTE_SIZE as f32) * 360.0, 0.8, 0.9))
      .collect();

    Self {
      font,
      font_size: LABEL_FONT_SIZE,
      label_text_vertical_padding: LABEL_TEXT_VERTICAL_PADDING,
      colors,
    }
  }

  /// 同名类别总是使用同一颜色
  pub fn color_for(&self, class_name: &str) -> Rgb<u8> {
    let hash = class_name
      .bytes()
      .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
    self.colors[hash % self.colors.len()]
  }

  /// 在图像上绘制检测框和标签，bbox 为归一化坐标
  pub fn draw_detections(&self, image: &mut RgbImage, detections: &[DetectionRecord]) {
    for detection in detections {
      self.draw_bbox_with_label(image, detection);
    }
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, detection: &DetectionRecord) {
    let (w, h) = (image.width() as f32, image.height() as f32);
    if w < 1.0 || h < 1.0 {
      return;
    }
    let bbox = &detection.bbox;

    let x_min = ((bbox[0] * w).floor() as i32).clamp(0, w as i32 - 1);
    let y_min = ((bbox[1] * h).floor() as i32).clamp(0, h as i32 - 1);
    let x_max = ((bbox[2] * w).ceil() as i32).clamp(0, w as i32 - 1);
    let y_max = ((bbox[3] * h).ceil() as i32).clamp(0, h as i32 - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    let color = self.color_for(&detection.class_name);

    // 绘制边框（加粗）
    for t in 0..BOX_THICKNESS {
      let width = (x_max - x_min - 2 * t + 1).max(1) as u32;
      let height = (y_max - y_min - 2 * t + 1).max(1) as u32;
      draw_hollow_rect_mut(image, Rect::at(x_min + t, y_min + t).of_size(width, height), color);
    }

    // 标签放在边框上方，空间不足时放在框内
    let label = format!("{} {:.2}", detection.class_name, detection.confidence);
    let scale = PxScale::from(self.font_size);
    let (text_w, text_h) = text_size(scale, &self.font, &label);
    let label_h = text_h as i32 + 2 * self.label_text_vertical_padding;
    let label_x = x_min;
    let label_y = if y_min >= label_h { y_min - label_h } else { y_min };
    let label_w = (text_w as i32 + 4).min(w as i32 - label_x).max(0) as u32;

    if label_w > 0 {
      let rect = Rect::at(label_x, label_y).of_size(label_w, label_h as u32);
      draw_filled_rect_mut(image, rect, color);
      draw_text_mut(
        image,
        Rgb(LABEL_TEXT_COLOR),
        label_x + 2,
        label_y + self.label_text_vertical_padding,
        scale,
        &self.font,
        &label,
      );
    }
  }
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record(name: &str, bbox: [f32; 4]) -> DetectionRecord {
    DetectionRecord {
      class_name: name.to_string(),
      confidence: 0.87,
      bbox,
    }
  }

  #[test]
  fn builtin_font_loads() {
    assert!(load_font(None).is_ok());
    assert!(load_font(Some(Path::new("/nonexistent/font.ttf"))).is_err());
  }

  #[test]
  fn colors_are_stable_per_class() {
    let draw = Draw::new(load_font(None).unwrap());
    assert_eq!(draw.color_for("bolt"), draw.color_for("bolt"));
  }

  #[test]
  fn draws_box_edges() {
    let draw = Draw::new(load_font(None).unwrap());
    let mut image = RgbImage::new(64, 64);
    draw.draw_detections(&mut image, &[record("nut", [0.25, 0.5, 0.75, 0.875])]);
    let color = draw.color_for("nut");
    assert_eq!(*image.get_pixel(32, 56), color);
    assert_eq!(*image.get_pixel(16, 44), color);
    // 框内部不被填充
    assert_eq!(*image.get_pixel(32, 44), Rgb([0, 0, 0]));
  }

  #[test]
  fn degenerate_box_is_skipped() {
    let draw = Draw::new(load_font(None).unwrap());
    let mut image = RgbImage::new(10, 10);
    draw.draw_detections(&mut image, &[record("bolt", [0.5, 0.5, 0.5, 0.5])]);
    assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
  }
}
