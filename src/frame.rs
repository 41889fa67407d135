// 该文件是 Kanjian （看见） 项目的一部分。
// src/frame.rs - RGB 帧定义
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

use image::{ImageReader, RgbImage, imageops::FilterType};
use tracing::debug;

use crate::tensor::PreprocessError;

pub const RGB_CHANNELS: usize = 3;

/// 按文件内容识别格式并解码为 RGB 图像
pub fn load_rgb_image(path: impl AsRef<Path>) -> Result<RgbImage, PreprocessError> {
  let path = path.as_ref();
  let image = ImageReader::open(path)?
    .with_guessed_format()?
    .decode()?
    .to_rgb8();
  debug!(
    "读取图像 {}: 原始尺寸 {}x{}",
    path.display(),
    image.width(),
    image.height()
  );
  Ok(image)
}

pub trait AsNhwcFrame {
  fn as_nhwc(&self) -> &[u8];
}

/// 交织存储的 RGB 帧 (H, W, C)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbFrame {
  width: u32,
  height: u32,
  data: Box<[u8]>,
}

impl RgbFrame {
  pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, PreprocessError> {
    if width == 0 || height == 0 {
      return Err(PreprocessError::InvalidDimensions(width, height));
    }

    let expected = RGB_CHANNELS * width as usize * height as usize;
    if data.len() != expected {
      return Err(PreprocessError::ShapeMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      width,
      height,
      data: data.into_boxed_slice(),
    })
  }

  /// 读取图像文件，并缩放到指定尺寸
  pub fn open(path: impl AsRef<Path>, width: u32, height: u32) -> Result<Self, PreprocessError> {
    Self::from_image_resized(load_rgb_image(path)?, width, height)
  }

  pub fn from_image_resized(image: RgbImage, width: u32, height: u32) -> Result<Self, PreprocessError> {
    if width == 0 || height == 0 {
      return Err(PreprocessError::InvalidDimensions(width, height));
    }

    let image = if image.dimensions() == (width, height) {
      image
    } else {
      image::imageops::resize(&image, width, height, FilterType::Triangle)
    };
    Ok(Self::from(image))
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn to_rgb_image(&self) -> RgbImage {
    RgbImage::from_fn(self.width, self.height, |x, y| {
      let idx = (y as usize * self.width as usize + x as usize) * RGB_CHANNELS;
      image::Rgb([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    })
  }
}

impl From<RgbImage> for RgbFrame {
  fn from(image: RgbImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      width,
      height,
      data: image.into_raw().into_boxed_slice(),
    }
  }
}

impl AsNhwcFrame for RgbFrame {
  fn as_nhwc(&self) -> &[u8] {
    &self.data
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_mismatched_buffer() {
    let err = RgbFrame::new(224, 224, vec![0u8; 100]).unwrap_err();
    assert!(err.is_shape_mismatch());
  }

  #[test]
  fn resizes_to_requested_size() {
    let image = RgbImage::from_pixel(10, 20, image::Rgb([10, 20, 30]));
    let frame = RgbFrame::from_image_resized(image, 4, 4).unwrap();
    assert_eq!((frame.width(), frame.height()), (4, 4));
    assert_eq!(frame.as_nhwc().len(), 4 * 4 * 3);
    assert_eq!(&frame.as_nhwc()[..3], &[10, 20, 30]);
  }

  #[test]
  fn decodes_by_content_not_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("car.jpeg");
    RgbImage::from_pixel(6, 4, image::Rgb([1, 2, 3]))
      .save_with_format(&path, image::ImageFormat::Png)
      .unwrap();
    let image = load_rgb_image(&path).unwrap();
    assert_eq!(image.dimensions(), (6, 4));
    let frame = RgbFrame::open(&path, 3, 2).unwrap();
    assert_eq!((frame.width(), frame.height()), (3, 2));
  }

  #[test]
  fn round_trips_through_rgb_image() {
    let data: Vec<u8> = (0..2 * 2 * 3).map(|v| v as u8).collect();
    let frame = RgbFrame::new(2, 2, data.clone()).unwrap();
    let image = frame.to_rgb_image();
    assert_eq!(image.get_pixel(1, 0), &image::Rgb([3, 4, 5]));
    assert_eq!(RgbFrame::from(image).as_nhwc(), data.as_slice());
  }
}
