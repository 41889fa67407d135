// 该文件是 Kanjian （看见） 项目的一部分。
// src/config.rs - 界面模型参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{
  model::decode::{BoxLayout, OutputOrder},
  tensor::{Normalization, TensorLayout},
};

pub const DEFAULT_THRESHOLD: f32 = 0.5;
pub const DEFAULT_NUM_RESULTS: usize = 5;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("无效的参数 {key}: {value}")]
  InvalidValue { key: String, value: String },
  #[error("阈值必须位于 [0, 1]: {0}")]
  ThresholdOutOfRange(f32),
  #[error("无效的输入尺寸: {0}x{1}")]
  InvalidInputSize(u32, u32),
  #[error("无效的归一化参数: mean = {0}, std = {1}")]
  InvalidNormalization(f32, f32),
}

/// 内置界面
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ScreenPreset {
  /// 相机主页，模拟 TFLite 分类
  TfliteMock,
  /// MobileNetV2 分类，输出原始分数
  Mobilenet,
  /// COCO-SSD 目标检测
  CocoSsd,
}

impl ScreenPreset {
  /// 未指定 `--model` 时使用的推理后端
  pub fn default_model(self) -> &'static str {
    match self {
      ScreenPreset::TfliteMock => "mock://",
      ScreenPreset::Mobilenet | ScreenPreset::CocoSsd => "onnx:///",
    }
  }
}

/// 模型输出的解释方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputHead {
  Classification { raw_scores: bool },
  Detection { layout: BoxLayout, order: OutputOrder },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScreenConfig {
  pub name: String,
  pub model_asset: String,
  pub labels_asset: Option<String>,
  pub image_asset: Option<String>,
  pub input_name: String,
  pub output_name: Option<String>,
  pub input_width: u32,
  pub input_height: u32,
  pub layout: TensorLayout,
  pub normalization: Normalization,
  pub threshold: f32,
  pub num_results: usize,
  pub head: OutputHead,
  pub uses_camera: bool,
}

impl ScreenConfig {
  pub fn preset(preset: ScreenPreset) -> Self {
    match preset {
      ScreenPreset::TfliteMock => Self {
        name: "tflite-mock".to_string(),
        model_asset: "model.tflite".to_string(),
        labels_asset: Some("labels.txt".to_string()),
        image_asset: Some("car.jpeg".to_string()),
        input_name: "input".to_string(),
        output_name: None,
        input_width: 224,
        input_height: 224,
        layout: TensorLayout::Nchw,
        normalization: Normalization::default(),
        threshold: DEFAULT_THRESHOLD,
        num_results: DEFAULT_NUM_RESULTS,
        head: OutputHead::Classification { raw_scores: false },
        uses_camera: true,
      },
      ScreenPreset::Mobilenet => Self {
        name: "mobilenet".to_string(),
        model_asset: "mobilenetv2-7.onnx".to_string(),
        labels_asset: None,
        image_asset: Some("car.jpeg".to_string()),
        input_name: "input".to_string(),
        output_name: None,
        input_width: 224,
        input_height: 224,
        layout: TensorLayout::Nchw,
        normalization: Normalization::default(),
        threshold: DEFAULT_THRESHOLD,
        num_results: DEFAULT_NUM_RESULTS,
        head: OutputHead::Classification { raw_scores: true },
        uses_camera: false,
      },
      ScreenPreset::CocoSsd => Self {
        name: "coco-ssd".to_string(),
        model_asset: "coco_ssd.onnx".to_string(),
        labels_asset: Some("coco_labels.txt".to_string()),
        image_asset: Some("car.jpeg".to_string()),
        input_name: "images".to_string(),
        output_name: None,
        input_width: 640,
        input_height: 640,
        layout: TensorLayout::Nchw,
        normalization: Normalization::default(),
        threshold: DEFAULT_THRESHOLD,
        num_results: DEFAULT_NUM_RESULTS,
        head: OutputHead::Detection {
          layout: BoxLayout::BoxScoreClass,
          order: OutputOrder::BoxMajor,
        },
        uses_camera: false,
      },
    }
  }

  /// 期望的输入张量形状（批大小为 1）
  pub fn input_shape(&self) -> Vec<usize> {
    let (h, w) = (self.input_height as usize, self.input_width as usize);
    match self.layout {
      TensorLayout::Nchw => vec![1, 3, h, w],
      TensorLayout::Nhwc => vec![1, h, w, 3],
    }
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.input_width == 0 || self.input_height == 0 {
      return Err(ConfigError::InvalidInputSize(
        self.input_width,
        self.input_height,
      ));
    }
    if !(0.0..=1.0).contains(&self.threshold) {
      return Err(ConfigError::ThresholdOutOfRange(self.threshold));
    }
    if self.normalization.validate().is_err() {
      return Err(ConfigError::InvalidNormalization(
        self.normalization.mean,
        self.normalization.std,
      ));
    }
    Ok(())
  }

  /// 使用 URL 查询参数覆盖配置，例如 `onnx:///net.onnx?threshold=0.6&size=640`
  pub fn apply_query(&mut self, url: &Url) -> Result<(), ConfigError> {
    for (key, value) in url.query_pairs() {
      let invalid = || ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
      };
      match key.as_ref() {
        "threshold" => self.threshold = value.parse().map_err(|_| invalid())?,
        "num_results" => self.num_results = value.parse().map_err(|_| invalid())?,
        "input" => self.input_name = value.to_string(),
        "output" => self.output_name = Some(value.to_string()),
        "labels" => self.labels_asset = Some(value.to_string()),
        "mean" => self.normalization.mean = value.parse().map_err(|_| invalid())?,
        "std" => self.normalization.std = value.parse().map_err(|_| invalid())?,
        "layout" => self.layout = value.parse().map_err(|_| invalid())?,
        "size" => {
          let (w, h) = parse_size(&value).ok_or_else(invalid)?;
          self.input_width = w;
          self.input_height = h;
        }
        "boxes" => {
          if let OutputHead::Detection { layout, .. } = &mut self.head {
            *layout = value.parse().map_err(|_| invalid())?;
          }
        }
        "order" => {
          if let OutputHead::Detection { order, .. } = &mut self.head {
            *order = value.parse().map_err(|_| invalid())?;
          }
        }
        _ => debug!("忽略未知参数: {}={}", key, value),
      }
    }
    self.validate()
  }
}

/// 解析 `640` 或 `640x480`（宽 x 高）
fn parse_size(value: &str) -> Option<(u32, u32)> {
  match value.split_once(['x', 'X']) {
    Some((w, h)) => Some((w.trim().parse().ok()?, h.trim().parse().ok()?)),
    None => {
      let side = value.trim().parse().ok()?;
      Some((side, side))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn presets_are_valid() {
    for preset in [
      ScreenPreset::TfliteMock,
      ScreenPreset::Mobilenet,
      ScreenPreset::CocoSsd,
    ] {
      ScreenConfig::preset(preset).validate().unwrap();
    }
    let config = ScreenConfig::preset(ScreenPreset::Mobilenet);
    assert_eq!(config.input_shape(), vec![1, 3, 224, 224]);
  }

  #[test]
  fn detection_preset_defaults_to_onnx() {
    let url = Url::parse(ScreenPreset::CocoSsd.default_model()).unwrap();
    assert_eq!(url.scheme(), "onnx");
    // 空路径保留预设的模型资源
    assert_eq!(url.path().trim_start_matches('/'), "");
    let url = Url::parse(ScreenPreset::TfliteMock.default_model()).unwrap();
    assert_eq!(url.scheme(), "mock");
  }

  #[test]
  fn query_overrides_parameters() {
    let mut config = ScreenConfig::preset(ScreenPreset::CocoSsd);
    let url = Url::parse("onnx:///ssd.onnx?threshold=0.7&size=320x240&layout=nhwc&boxes=box-score").unwrap();
    config.apply_query(&url).unwrap();
    assert_eq!(config.threshold, 0.7);
    assert_eq!((config.input_width, config.input_height), (320, 240));
    assert_eq!(config.input_shape(), vec![1, 240, 320, 3]);
    assert_eq!(
      config.head,
      OutputHead::Detection {
        layout: BoxLayout::BoxScore,
        order: OutputOrder::BoxMajor,
      }
    );
  }

  #[test]
  fn rejects_out_of_range_threshold() {
    let mut config = ScreenConfig::preset(ScreenPreset::TfliteMock);
    let url = Url::parse("mock://?threshold=1.5").unwrap();
    assert!(matches!(
      config.apply_query(&url),
      Err(ConfigError::ThresholdOutOfRange(_))
    ));
  }
}
