// 该文件是 Kanjian （看见） 项目的一部分。
// src/camera/v4l_camera.rs - V4L 摄像头
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use image::RgbImage;
use tracing::{debug, error, info, warn};
use url::Url;
use v4l::{
  Device, FourCC,
  buffer::Type,
  io::{mmap::Stream, traits::CaptureStream},
  video::Capture,
};

use crate::{
  FromUrl, FromUrlWithScheme,
  camera::{Camera, CameraError, Facing, capture_path},
};

const V4L_DEFAULT_DEVICE: &str = "/dev/video0";
const V4L_DEFAULT_WIDTH: u32 = 640;
const V4L_DEFAULT_HEIGHT: u32 = 480;
const V4L_BUFFER_COUNT: u32 = 4;

fn v4l_error(err: std::io::Error) -> CameraError {
  CameraError::V4lError(err.to_string())
}

/// 后置摄像头必需，前置摄像头可选（`?front=/dev/video1`）
pub struct V4lCamera {
  back: String,
  front: Option<String>,
  facing: Facing,
  width: u32,
  height: u32,
  device: Option<Device>,
  counter: u16,
}

impl FromUrlWithScheme for V4lCamera {
  const SCHEME: &'static str = "v4l";
}

impl FromUrl for V4lCamera {
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

    // v4l:///dev/video0?front=/dev/video1&width=640&height=480
    let back = if url.path().is_empty() || url.path() == "/" {
      V4L_DEFAULT_DEVICE.to_string()
    } else {
      url.path().to_string()
    };

    let mut camera = V4lCamera {
      back,
      front: None,
      facing: Facing::Back,
      width: V4L_DEFAULT_WIDTH,
      height: V4L_DEFAULT_HEIGHT,
      device: None,
      counter: 0,
    };

    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "front" => camera.front = Some(value.to_string()),
        "width" => camera.width = value.parse().unwrap_or(V4L_DEFAULT_WIDTH),
        "height" => camera.height = value.parse().unwrap_or(V4L_DEFAULT_HEIGHT),
        _ => {}
      }
    }
    Ok(camera)
  }
}

impl V4lCamera {
  fn device_path(&self) -> Option<&str> {
    match self.facing {
      Facing::Back => Some(&self.back),
      Facing::Front => self.front.as_deref(),
    }
  }

  fn open_device(&mut self) -> Result<(), CameraError> {
    let path = self
      .device_path()
      .ok_or(CameraError::FacingUnavailable(self.facing))?
      .to_string();

    let device = Device::with_path(&path).map_err(v4l_error)?;
    let mut format = device.format().map_err(v4l_error)?;
    format.width = self.width;
    format.height = self.height;
    format.fourcc = FourCC::new(b"RGB3");
    let format = device.set_format(&format).map_err(v4l_error)?;

    if format.fourcc != FourCC::new(b"RGB3") {
      error!("设备 {} 不支持 RGB24 格式: {}", path, format.fourcc);
      return Err(CameraError::V4lError(format!(
        "unsupported pixel format {}",
        format.fourcc
      )));
    }
    if (format.width, format.height) != (self.width, self.height) {
      warn!(
        "设备 {} 分辨率调整为 {}x{}",
        path, format.width, format.height
      );
    }

    self.width = format.width;
    self.height = format.height;
    self.device = Some(device);
    info!("打开摄像头 {} ({}x{})", path, self.width, self.height);
    Ok(())
  }
}

impl Camera for V4lCamera {
  fn start_preview(&mut self) -> Result<(), CameraError> {
    if self.device.is_none() {
      self.open_device()?;
    }
    Ok(())
  }

  fn stop_preview(&mut self) {
    if self.device.take().is_some() {
      debug!("关闭摄像头");
    }
  }

  fn is_previewing(&self) -> bool {
    self.device.is_some()
  }

  fn facing(&self) -> Facing {
    self.facing
  }

  fn switch_facing(&mut self) -> Result<Facing, CameraError> {
    let target = self.facing.flipped();
    if target == Facing::Front && self.front.is_none() {
      return Err(CameraError::FacingUnavailable(target));
    }

    let was_previewing = self.is_previewing();
    self.stop_preview();
    self.facing = target;
    if was_previewing {
      self.open_device()?;
    }
    Ok(self.facing)
  }

  fn capture(&mut self, directory: &Path) -> Result<PathBuf, CameraError> {
    let (width, height) = (self.width, self.height);
    let device = self.device.as_mut().ok_or(CameraError::PreviewInactive)?;

    let data = {
      let mut stream =
        Stream::with_buffers(device, Type::VideoCapture, V4L_BUFFER_COUNT).map_err(v4l_error)?;
      let (buf, meta) = stream.next().map_err(v4l_error)?;
      let used = (meta.bytesused as usize).min(buf.len());
      let used = if used == 0 { buf.len() } else { used };
      buf[..used].to_vec()
    };

    let expected = width as usize * height as usize * 3;
    if data.len() < expected {
      error!("采集数据长度不匹配: 期望 {}, 实际 {}", expected, data.len());
      return Err(CameraError::BufferSizeMismatch {
        expected,
        actual: data.len(),
      });
    }

    let image = RgbImage::from_raw(width, height, data[..expected].to_vec()).ok_or(
      CameraError::BufferSizeMismatch {
        expected,
        actual: data.len(),
      },
    )?;

    self.counter = self.counter.wrapping_add(1);
    let path = capture_path(directory, self.counter)?;
    image.save(&path)?;
    info!("拍摄完成: {}", path.display());
    Ok(path)
  }
}
