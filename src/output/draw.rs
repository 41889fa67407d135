// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/draw.rs - 推理结果可视化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

#[cfg(feature = "save_image_file")]
use ab_glyph::{FontVec, PxScale};
#[cfg(feature = "save_image_file")]
use image::{Rgb, RgbImage};
#[cfg(feature = "save_image_file")]
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use serde::Serialize;

#[cfg(feature = "save_image_file")]
use crate::model::{DetectItem, InferenceResult};

/// 显示表面上的像素矩形 `(x_min, y_min)-(x_max, y_max)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PixelRect {
  pub x_min: u32,
  pub y_min: u32,
  pub x_max: u32,
  pub y_max: u32,
}

impl PixelRect {
  pub fn width(&self) -> u32 {
    self.x_max.saturating_sub(self.x_min)
  }

  pub fn height(&self) -> u32 {
    self.y_max.saturating_sub(self.y_min)
  }

  pub fn is_empty(&self) -> bool {
    self.width() == 0 || self.height() == 0
  }
}

impl std::fmt::Display for PixelRect {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "({}, {})-({}, {})",
      self.x_min, self.y_min, self.x_max, self.y_max
    )
  }
}

/// 将归一化坐标 [x_min, y_min, x_max, y_max] 线性映射到 `width x height` 的表面，四舍五入并截断到表面范围内
pub fn scale_bbox(bbox: &[f32; 4], width: u32, height: u32) -> PixelRect {
  let scale = |v: f32, extent: u32| (v * extent as f32).round().clamp(0.0, extent as f32) as u32;
  PixelRect {
    x_min: scale(bbox[0], width),
    y_min: scale(bbox[1], height),
    x_max: scale(bbox[2], width),
    y_max: scale(bbox[3], height),
  }
}

// 文本渲染常量
#[cfg(feature = "save_image_file")]
const LABEL_FONT_SIZE: f32 = 20.0;
#[cfg(feature = "save_image_file")]
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
#[cfg(feature = "save_image_file")]
const BOX_THICKNESS: u32 = 2;
#[cfg(feature = "save_image_file")]
const PALETTE_SIZE: usize = 80;

#[cfg(feature = "save_image_file")]
pub struct Draw {
  font: Option<FontVec>,
  font_size: f32,
  thickness: u32,
  colors: Vec<Rgb<u8>>,
}

#[cfg(feature = "save_image_file")]
impl Default for Draw {
  fn default() -> Self {
    let colors = (0..PALETTE_SIZE)
      .map(|i| hsv_to_rgb((i as f32 / PALETTE_SIZE as f32) * 360.0, 0.8, 0.9))
      .collect();

    Self {
      font: None,
      font_size: LABEL_FONT_SIZE,
      thickness: BOX_THICKNESS,
      colors,
    }
  }
}

/// HSV 转 RGB
#[cfg(feature = "save_image_file")]
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

#[cfg(feature = "save_image_file")]
impl Draw {
  /// 从字体文件加载标签字体；没有字体时只绘制边框
  pub fn with_font_file(mut self, path: impl AsRef<std::path::Path>) -> Result<Self, std::io::Error> {
    let data = std::fs::read(path)?;
    let font = FontVec::try_from_vec(data)
      .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    self.font = Some(font);
    Ok(self)
  }

  pub fn color_of(&self, class_id: usize) -> Rgb<u8> {
    self.colors[class_id % self.colors.len()]
  }

  pub fn draw_result(&self, image: &mut RgbImage, result: &InferenceResult) {
    match result {
      InferenceResult::Detection(detections) => {
        for item in detections.items.iter() {
          self.draw_detection(image, item);
        }
      }
      InferenceResult::Classification { items, .. } => {
        let mut y = 0;
        for item in items {
          let label = format!("{}: {}%", item.display_name(), (item.score * 100.0).round());
          y += self.draw_label(image, 0, y, &label, self.color_of(item.class_id));
        }
      }
    }
  }

  fn draw_detection(&self, image: &mut RgbImage, item: &DetectItem) {
    let rect = scale_bbox(&item.bbox, image.width(), image.height());
    if rect.is_empty() {
      return;
    }

    let color = self.color_of(item.class_id);
    for t in 0..self.thickness {
      let width = rect.width().saturating_sub(2 * t);
      let height = rect.height().saturating_sub(2 * t);
      if width == 0 || height == 0 {
        break;
      }
      let r = Rect::at((rect.x_min + t) as i32, (rect.y_min + t) as i32).of_size(width, height);
      draw_hollow_rect_mut(image, r, color);
    }

    let label = format!("{} {:.2}", item.display_name(), item.score);
    let label_height = self.font_size as i32 + 2 * LABEL_TEXT_VERTICAL_PADDING;
    let label_y = (rect.y_min as i32 - label_height).max(0);
    self.draw_label(image, rect.x_min as i32, label_y, &label, color);
  }

  /// 在 (x, y) 绘制带背景的标签，返回占用的高度
  fn draw_label(&self, image: &mut RgbImage, x: i32, y: i32, label: &str, color: Rgb<u8>) -> i32 {
    let Some(font) = &self.font else {
      return 0;
    };

    let scale = PxScale::from(self.font_size);
    let (text_width, text_height) = text_size(scale, font, label);
    let label_height = text_height as i32 + 2 * LABEL_TEXT_VERTICAL_PADDING;

    // 确保标签不超出图像边界
    let max_width = (image.width() as i32 - x).max(0) as u32;
    let label_width = text_width.min(max_width);
    if label_width == 0 || label_height <= 0 {
      return 0;
    }

    let rect = Rect::at(x, y).of_size(label_width, label_height as u32);
    draw_filled_rect_mut(image, rect, color);
    draw_text_mut(
      image,
      Rgb([255u8, 255u8, 255u8]),
      x,
      y + LABEL_TEXT_VERTICAL_PADDING,
      scale,
      font,
      label,
    );
    label_height
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn scales_normalized_box_to_surface() {
    let rect = scale_bbox(&[0.1, 0.1, 0.5, 0.5], 1000, 1000);
    assert_eq!(
      rect,
      PixelRect {
        x_min: 100,
        y_min: 100,
        x_max: 500,
        y_max: 500,
      }
    );
    assert_eq!(rect.to_string(), "(100, 100)-(500, 500)");
  }

  #[test]
  fn scales_each_axis_independently_and_clamps() {
    let rect = scale_bbox(&[0.0, 0.25, 1.0, 1.2], 640, 480);
    assert_eq!((rect.x_min, rect.y_min, rect.x_max, rect.y_max), (0, 120, 640, 480));
    let rect = scale_bbox(&[-0.5, 0.5, 0.5, 0.5], 100, 100);
    assert_eq!(rect.x_min, 0);
    assert!(rect.is_empty());
  }

  #[cfg(feature = "save_image_file")]
  #[test]
  fn draws_box_edges() {
    use crate::model::DetectResult;

    let mut image = RgbImage::new(100, 100);
    let result = InferenceResult::Detection(DetectResult {
      items: vec![DetectItem {
        class_id: 0,
        label: None,
        score: 0.9,
        bbox: [0.1, 0.1, 0.5, 0.5],
      }]
      .into_boxed_slice(),
    });
    let draw = Draw::default();
    draw.draw_result(&mut image, &result);
    let color = draw.color_of(0);
    assert_eq!(image.get_pixel(10, 10), &color);
    assert_eq!(image.get_pixel(30, 10), &color);
    assert_eq!(image.get_pixel(30, 30), &Rgb([0, 0, 0]));
  }
}
