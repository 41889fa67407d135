// 该文件是 Kanjian （看见） 项目的一部分。
// src/camera/still_image.rs - 静态图像相机
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use image::ImageReader;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  camera::{Camera, CameraError, Facing, capture_path},
};

/// 每次拍摄都返回同一张图像；前置摄像头输出水平镜像
pub struct StillImageCamera {
  source: PathBuf,
  facing: Facing,
  previewing: bool,
  counter: u16,
}

impl StillImageCamera {
  pub fn new(source: impl Into<PathBuf>) -> Self {
    Self {
      source: source.into(),
      facing: Facing::Back,
      previewing: false,
      counter: 0,
    }
  }

  pub fn source(&self) -> &Path {
    &self.source
  }
}

impl FromUrlWithScheme for StillImageCamera {
  const SCHEME: &'static str = "still";
}

impl FromUrl for StillImageCamera {
  type Error = CameraError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(CameraError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(Self::new(url.path()))
  }
}

impl Camera for StillImageCamera {
  fn start_preview(&mut self) -> Result<(), CameraError> {
    if !self.source.is_file() {
      error!("静态图像不存在: {}", self.source.display());
      return Err(CameraError::IoError(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("{} not found", self.source.display()),
      )));
    }
    self.previewing = true;
    info!("开始预览: {}", self.source.display());
    Ok(())
  }

  fn stop_preview(&mut self) {
    self.previewing = false;
  }

  fn is_previewing(&self) -> bool {
    self.previewing
  }

  fn facing(&self) -> Facing {
    self.facing
  }

  fn switch_facing(&mut self) -> Result<Facing, CameraError> {
    self.facing = self.facing.flipped();
    debug!("切换摄像头: {:?}", self.facing);
    Ok(self.facing)
  }

  fn capture(&mut self, directory: &Path) -> Result<PathBuf, CameraError> {
    if !self.previewing {
      return Err(CameraError::PreviewInactive);
    }

    let mut image = ImageReader::open(&self.source)?
      .with_guessed_format()?
      .decode()?
      .to_rgb8();
    if self.facing == Facing::Front {
      image::imageops::flip_horizontal_in_place(&mut image);
    }

    self.counter = self.counter.wrapping_add(1);
    let path = capture_path(directory, self.counter)?;
    image.save(&path)?;
    info!("拍摄完成: {}", path.display());
    Ok(path)
  }
}
