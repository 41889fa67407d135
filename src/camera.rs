// 该文件是 Kanjian （看见） 项目的一部分。
// src/camera.rs - 相机能力
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

use chrono::Utc;
use thiserror::Error;
use url::Url;

use crate::FromUrl;
#[cfg(feature = "v4l_camera")]
use crate::FromUrlWithScheme;

mod still_image;
pub use self::still_image::StillImageCamera;

#[cfg(feature = "v4l_camera")]
mod v4l_camera;
#[cfg(feature = "v4l_camera")]
pub use self::v4l_camera::V4lCamera;

#[derive(Error, Debug)]
pub enum CameraError {
  #[error("相机预览未启动")]
  PreviewInactive,
  #[error("没有可切换的{0:?}摄像头")]
  FacingUnavailable(Facing),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("V4L 错误: {0}")]
  V4lError(String),
  #[error("采集数据长度不匹配: 期望 {expected}, 实际 {actual}")]
  BufferSizeMismatch { expected: usize, actual: usize },
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Facing {
  #[default]
  Back,
  Front,
}

impl Facing {
  pub fn flipped(self) -> Self {
    match self {
      Facing::Back => Facing::Front,
      Facing::Front => Facing::Back,
    }
  }
}

pub trait Camera {
  fn start_preview(&mut self) -> Result<(), CameraError>;
  fn stop_preview(&mut self);
  fn is_previewing(&self) -> bool;
  fn facing(&self) -> Facing;
  fn switch_facing(&mut self) -> Result<Facing, CameraError>;
  /// 拍摄一张静态图像并保存到 `directory`，返回文件路径
  fn capture(&mut self, directory: &Path) -> Result<PathBuf, CameraError>;
}

/// 拍摄文件名：`capture-YYYYMMDD-HHMMSS-XXXX.png`
pub fn capture_path(directory: &Path, counter: u16) -> Result<PathBuf, CameraError> {
  if !directory.exists() {
    std::fs::create_dir_all(directory)?;
  }
  let now = Utc::now();
  Ok(directory.join(format!(
    "capture-{}-{:04X}.png",
    now.format("%Y%m%d-%H%M%S"),
    counter
  )))
}

/// 从地址创建相机
pub fn create_camera(url: &Url) -> Result<Box<dyn Camera + Send>, CameraError> {
  #[cfg(feature = "v4l_camera")]
  {
    if url.scheme() == V4lCamera::SCHEME {
      return Ok(Box::new(V4lCamera::from_url(url)?));
    }
  }
  Ok(Box::new(StillImageCamera::from_url(url)?))
}
