// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/save_image_file.rs - 保存叠加结果的图像文件
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
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbFrame,
  model::InferenceResult,
  output::{Render, draw::Draw},
};

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("字体加载失败 {path}: {source}")]
  FontError {
    path: String,
    source: std::io::Error,
  },
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 在帧上叠加结果并保存为图像文件，格式由扩展名决定
pub struct SaveImageFileOutput {
  path: PathBuf,
  draw: Draw,
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  // image:///tmp/result.png?font=/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!("输出方案不匹配: {}", url.scheme());
      return Err(SaveImageFileError::SchemeMismatch(url.scheme().to_string()));
    }

    let font = url
      .query_pairs()
      .find(|(key, _)| key == "font")
      .map(|(_, value)| value.into_owned());

    let output = Self::new(url.path());
    match font {
      Some(font) => output.with_font(&font),
      None => Ok(output),
    }
  }
}

impl SaveImageFileOutput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      draw: Draw::default(),
    }
  }

  /// 加载标签字体；未加载字体时只绘制检测框
  pub fn with_font(mut self, font: &str) -> Result<Self, SaveImageFileError> {
    self.draw = self
      .draw
      .with_font_file(font)
      .map_err(|source| SaveImageFileError::FontError {
        path: font.to_string(),
        source,
      })?;
    Ok(self)
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn write(&self, image: &RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    image.save(&self.path)?;
    info!("叠加结果已保存: {}", self.path.display());
    Ok(())
  }
}

impl Render<RgbFrame, InferenceResult> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &RgbFrame, result: &InferenceResult) -> Result<(), Self::Error> {
    let mut canvas = frame.to_rgb_image();
    self.draw.draw_result(&mut canvas, result);
    self.write(&canvas)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{DetectItem, DetectResult};

  #[test]
  fn writes_overlay_into_new_directory() {
    let dir = tempfile::tempdir().unwrap();
    let output = SaveImageFileOutput::new(dir.path().join("nested/result.png"));
    let frame = RgbFrame::new(40, 20, vec![0u8; 40 * 20 * 3]).unwrap();
    let result = InferenceResult::Detection(DetectResult {
      items: vec![DetectItem {
        class_id: 1,
        label: Some("car".to_string()),
        score: 0.9,
        bbox: [0.0, 0.0, 0.5, 0.5],
      }]
      .into_boxed_slice(),
    });

    output.render_result(&frame, &result).unwrap();
    let saved = image::open(output.path()).unwrap().to_rgb8();
    assert_eq!(saved.dimensions(), (40, 20));
    assert_ne!(saved.get_pixel(0, 0), &image::Rgb([0, 0, 0]));
    // 框右边缘位于 x = 19
    assert_ne!(saved.get_pixel(19, 5), &image::Rgb([0, 0, 0]));
    assert_eq!(saved.get_pixel(30, 5), &image::Rgb([0, 0, 0]));
  }

  #[test]
  fn missing_font_is_reported() {
    let url = Url::parse("image:///tmp/out.png?font=/nonexistent/font.ttf").unwrap();
    assert!(matches!(
      SaveImageFileOutput::from_url(&url),
      Err(SaveImageFileError::FontError { .. })
    ));
  }
}
