// 该文件是 Kanjian （看见） 项目的一部分。
// src/tensor.rs - 张量定义与预处理
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use crate::frame::{AsNhwcFrame, RgbFrame};

#[derive(Error, Debug)]
pub enum PreprocessError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  ShapeMismatch { expected: usize, actual: usize },
  #[error("张量形状不匹配: 期望 {expected:?}, 实际 {actual:?}")]
  TensorShapeMismatch {
    expected: Vec<usize>,
    actual: Vec<usize>,
  },
  #[error("无效的图像尺寸: {0}x{1}")]
  InvalidDimensions(u32, u32),
  #[error("无效的归一化参数: std = {0}")]
  InvalidStd(f32),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像加载错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

impl PreprocessError {
  /// 是否为形状类错误（数据长度或张量形状不符）
  pub fn is_shape_mismatch(&self) -> bool {
    matches!(
      self,
      PreprocessError::ShapeMismatch { .. } | PreprocessError::TensorShapeMismatch { .. }
    )
  }
}

/// 张量内存布局
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
  /// 通道优先（平面）布局: [N, C, H, W]
  #[default]
  Nchw,
  /// 像素交织布局: [N, H, W, C]
  Nhwc,
}

impl std::str::FromStr for TensorLayout {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "nchw" | "chw" => Ok(TensorLayout::Nchw),
      "nhwc" | "hwc" => Ok(TensorLayout::Nhwc),
      other => Err(format!("未知的张量布局: {}", other)),
    }
  }
}

/// 字节到浮点的归一化参数，计算方式为 `(v - mean) / std`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
  pub mean: f32,
  pub std: f32,
}

impl Default for Normalization {
  fn default() -> Self {
    // 映射到 [0, 1]
    Self {
      mean: 0.0,
      std: 255.0,
    }
  }
}

impl Normalization {
  #[inline]
  pub fn apply(&self, value: u8) -> f32 {
    (value as f32 - self.mean) / self.std
  }

  pub fn validate(&self) -> Result<(), PreprocessError> {
    if !self.std.is_finite() || self.std <= 0.0 || !self.mean.is_finite() {
      return Err(PreprocessError::InvalidStd(self.std));
    }
    Ok(())
  }
}

/// 形状 + 扁平数据
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tensor {
  shape: Box<[usize]>,
  data: Box<[f32]>,
}

pub fn element_count(shape: &[usize]) -> usize {
  shape.iter().product()
}

impl Tensor {
  pub fn new(shape: impl Into<Box<[usize]>>, data: Vec<f32>) -> Result<Self, PreprocessError> {
    let shape = shape.into();
    let expected = element_count(&shape);
    if data.len() != expected {
      error!(
        "张量数据长度不匹配: 形状 {:?}, 期望长度 {}, 实际长度 {}",
        shape,
        expected,
        data.len()
      );
      return Err(PreprocessError::ShapeMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      shape,
      data: data.into_boxed_slice(),
    })
  }

  pub fn shape(&self) -> &[usize] {
    &self.shape
  }

  pub fn data(&self) -> &[f32] {
    &self.data
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn into_data(self) -> Box<[f32]> {
    self.data
  }

  /// 推理前的形状断言
  pub fn ensure_shape(&self, expected: &[usize]) -> Result<(), PreprocessError> {
    if self.shape.as_ref() != expected || self.data.len() != element_count(expected) {
      error!(
        "输入张量形状不匹配: 期望 {:?} ({} 个元素), 实际 {:?} ({} 个元素)",
        expected,
        element_count(expected),
        self.shape,
        self.data.len()
      );
      return Err(PreprocessError::TensorShapeMismatch {
        expected: expected.to_vec(),
        actual: self.shape.to_vec(),
      });
    }
    Ok(())
  }
}

fn check_len(bytes: &[u8], channels: usize, height: usize, width: usize) -> Result<(), PreprocessError> {
  let expected = channels * height * width;
  if bytes.len() != expected {
    error!(
      "输入数据长度不匹配: {}x{}x{} 期望长度 {}, 实际长度 {}",
      channels,
      height,
      width,
      expected,
      bytes.len()
    );
    return Err(PreprocessError::ShapeMismatch {
      expected,
      actual: bytes.len(),
    });
  }
  Ok(())
}

/// 交织 (HWC) 字节转为平面 (CHW) 浮点数据
pub fn to_planar(
  bytes: &[u8],
  channels: usize,
  height: usize,
  width: usize,
  norm: Normalization,
) -> Result<Vec<f32>, PreprocessError> {
  check_len(bytes, channels, height, width)?;
  norm.validate()?;

  let plane = height * width;
  let mut out = vec![0f32; bytes.len()];
  for (pixel, chunk) in bytes.chunks_exact(channels).enumerate() {
    for (c, &value) in chunk.iter().enumerate() {
      out[c * plane + pixel] = norm.apply(value);
    }
  }
  Ok(out)
}

/// 保持交织 (HWC) 顺序，仅做归一化
pub fn to_interleaved(
  bytes: &[u8],
  channels: usize,
  height: usize,
  width: usize,
  norm: Normalization,
) -> Result<Vec<f32>, PreprocessError> {
  check_len(bytes, channels, height, width)?;
  norm.validate()?;

  Ok(bytes.iter().map(|&v| norm.apply(v)).collect())
}

/// 将一帧 RGB 图像转为批大小为 1 的输入张量
pub fn preprocess(
  frame: &RgbFrame,
  layout: TensorLayout,
  norm: Normalization,
) -> Result<Tensor, PreprocessError> {
  let channels = frame.channels();
  let height = frame.height() as usize;
  let width = frame.width() as usize;

  debug!(
    "预处理帧: {}x{}, 布局 {:?}, mean {}, std {}",
    width, height, layout, norm.mean, norm.std
  );

  match layout {
    TensorLayout::Nchw => {
      let data = to_planar(frame.as_nhwc(), channels, height, width, norm)?;
      Tensor::new(vec![1, channels, height, width], data)
    }
    TensorLayout::Nhwc => {
      let data = to_interleaved(frame.as_nhwc(), channels, height, width, norm)?;
      Tensor::new(vec![1, height, width, channels], data)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn planar_reorders_channels() {
    // 2x1 图像: 像素0 = (1,2,3), 像素1 = (4,5,6)
    let bytes = [1u8, 2, 3, 4, 5, 6];
    let norm = Normalization { mean: 0.0, std: 1.0 };
    let out = to_planar(&bytes, 3, 1, 2, norm).unwrap();
    assert_eq!(out, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
  }

  #[test]
  fn planar_output_in_unit_range() {
    let bytes: Vec<u8> = (0..3 * 16 * 16).map(|i| (i % 256) as u8).collect();
    let out = to_planar(&bytes, 3, 16, 16, Normalization::default()).unwrap();
    assert_eq!(out.len(), bytes.len());
    assert!(out.iter().all(|v| (0.0..=1.0).contains(v)));
    assert_eq!(out[0], 0.0);
  }

  #[test]
  fn short_buffer_is_shape_mismatch() {
    let bytes = vec![0u8; 100];
    let err = to_planar(&bytes, 3, 224, 224, Normalization::default()).unwrap_err();
    match err {
      PreprocessError::ShapeMismatch { expected, actual } => {
        assert_eq!(expected, 150528);
        assert_eq!(actual, 100);
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn zero_std_is_rejected() {
    let bytes = [0u8; 3];
    let norm = Normalization { mean: 0.0, std: 0.0 };
    assert!(matches!(
      to_interleaved(&bytes, 3, 1, 1, norm),
      Err(PreprocessError::InvalidStd(_))
    ));
  }

  #[test]
  fn tensor_rejects_wrong_length() {
    assert!(Tensor::new(vec![1, 3, 2, 2], vec![0.0; 11]).is_err());
    let t = Tensor::new(vec![1, 3, 2, 2], vec![0.0; 12]).unwrap();
    assert!(t.ensure_shape(&[1, 3, 2, 2]).is_ok());
    let err = t.ensure_shape(&[1, 3, 224, 224]).unwrap_err();
    assert!(err.is_shape_mismatch());
  }
}
