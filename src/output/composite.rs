// 该文件是 Luoshuan （螺栓） 项目的一部分。
// src/output/composite.rs - 结果拼图：标注图像与下方的检测明细
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage, imageops};
use imageproc::{drawing::draw_text_mut, drawing::draw_filled_rect_mut, rect::Rect};

use crate::adapter::DetectionRecord;

/// 无基础图像时的画布尺寸
pub const DEFAULT_CANVAS_WIDTH: u32 = 600;
pub const DEFAULT_CANVAS_HEIGHT: u32 = 400;
/// 明细区标题高度
pub const HEADER_HEIGHT: u32 = 40;
/// 明细区每行高度
pub const ROW_HEIGHT: u32 = 25;

pub const NO_OBJECTS_TEXT: &str = "No objects detected.";

const TEXT_MARGIN_X: i32 = 10;
const HEADER_OFFSET_Y: i32 = 10;
const HEADER_FONT_SIZE: f32 = 20.0;
const ROW_FONT_SIZE: f32 = 18.0;
const BLANK_COLOR: Rgb<u8> = Rgb([0x2c, 0x3e, 0x50]);
const FOOTER_COLOR: Rgb<u8> = Rgb([0x34, 0x49, 0x5e]);
const TEXT_COLOR: Rgb<u8> = Rgb([0xec, 0xf0, 0xf1]);

/// 明细区中的一行文本及其位置
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
  pub text: String,
  pub x: i32,
  pub y: i32,
  pub header: bool,
}

/// 明细区高度，无检测结果时保留一行提示
pub fn footer_height(detections: usize) -> u32 {
  HEADER_HEIGHT + ROW_HEIGHT * detections.max(1) as u32
}

pub fn detection_line(rank: usize, detection: &DetectionRecord) -> String {
  format!(
    "ID {}: {} ({:.2}%)",
    rank,
    detection.class_name,
    detection.confidence * 100.0
  )
}

/// 计算明细区的文本布局，排名从 1 开始并保持输入顺序
pub fn layout(base_height: u32, header: &str, detections: &[DetectionRecord]) -> Vec<TextLine> {
  let top = base_height as i32;
  let mut lines = Vec::with_capacity(detections.len() + 1);
  lines.push(TextLine {
    text: header.to_string(),
    x: TEXT_MARGIN_X,
    y: top + HEADER_OFFSET_Y,
    header: true,
  });

  let row_y = |i: usize| top + HEADER_HEIGHT as i32 + (ROW_HEIGHT as i32) * i as i32;
  if detections.is_empty() {
    lines.push(TextLine {
      text: NO_OBJECTS_TEXT.to_string(),
      x: TEXT_MARGIN_X,
      y: row_y(0),
      header: false,
    });
  } else {
    lines.extend(detections.iter().enumerate().map(|(i, d)| TextLine {
      text: detection_line(i + 1, d),
      x: TEXT_MARGIN_X,
      y: row_y(i),
      header: false,
    }));
  }
  lines
}

pub struct CompositeRenderer {
  font: FontArc,
  header_scale: PxScale,
  row_scale: PxScale,
}

impl CompositeRenderer {
  pub fn new(font: FontArc) -> Self {
    Self {
      font,
      header_scale: PxScale::from(HEADER_FONT_SIZE),
      row_scale: PxScale::from(ROW_FONT_SIZE),
    }
  }

  pub fn render(
    &self,
    base: Option<&RgbImage>,
    header: &str,
    detections: &[DetectionRecord],
  ) -> RgbImage {
    let (width, base_height) = base
      .map(|b| b.dimensions())
      .unwrap_or((DEFAULT_CANVAS_WIDTH, DEFAULT_CANVAS_HEIGHT));
    let height = base_height + footer_height(detections.len());

    let mut canvas = RgbImage::from_pixel(width, height, BLANK_COLOR);
    if let Some(base) = base {
      imageops::replace(&mut canvas, base, 0, 0);
    }
    if width > 0 {
      let footer = Rect::at(0, base_height as i32).of_size(width, height - base_height);
      draw_filled_rect_mut(&mut canvas, footer, FOOTER_COLOR);
    }

    for line in layout(base_height, header, detections) {
      let scale = if line.header {
        self.header_scale
      } else {
        self.row_scale
      };
      draw_text_mut(
        &mut canvas,
        TEXT_COLOR,
        line.x,
        line.y,
        scale,
        &self.font,
        &line.text,
      );
    }
    canvas
  }
}
