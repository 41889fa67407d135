// 该文件是 Kanjian （看见） 项目的一部分。
// src/model.rs - 推理引擎与结果定义
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, tensor::Tensor};

pub mod decode;

mod mock;
pub use self::mock::{MockEngine, MockEngineBuilder};

#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "onnx")]
pub use self::onnx::{OnnxEngine, OnnxEngineBuilder};

#[derive(Error, Debug)]
pub enum EngineError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("输入名称不匹配: 期望 {expected}, 实际 {actual}")]
  InputNameMismatch { expected: String, actual: String },
  #[error("输入形状不匹配: 期望 {expected:?}, 实际 {actual:?}")]
  InputShapeMismatch {
    expected: Vec<usize>,
    actual: Vec<usize>,
  },
  #[error("推理运行时错误: {0}")]
  RuntimeError(String),
  #[error("模型输出无效: {0}")]
  InvalidOutput(String),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("无效的引擎参数: {0}")]
  InvalidParameter(String),
}

/// 按名称排列的输出张量，保持模型声明顺序
#[derive(Debug, Clone, Default)]
pub struct NamedOutputs {
  items: Vec<(String, Tensor)>,
}

impl NamedOutputs {
  pub fn push(&mut self, name: impl Into<String>, tensor: Tensor) {
    self.items.push((name.into(), tensor));
  }

  pub fn get(&self, name: &str) -> Option<&Tensor> {
    self.items.iter().find(|(n, _)| n == name).map(|(_, t)| t)
  }

  pub fn first(&self) -> Option<&Tensor> {
    self.items.first().map(|(_, t)| t)
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.items.iter().map(|(n, _)| n.as_str())
  }
}

impl FromIterator<(String, Tensor)> for NamedOutputs {
  fn from_iter<I: IntoIterator<Item = (String, Tensor)>>(iter: I) -> Self {
    Self {
      items: iter.into_iter().collect(),
    }
  }
}

/// 推理引擎能力：由文件加载模型，按名称输入一个张量，返回全部输出
pub trait InferenceEngine {
  fn backend(&self) -> &'static str;
  fn run(&mut self, input_name: &str, input: &Tensor) -> Result<NamedOutputs, EngineError>;
}

pub trait EngineBuilder {
  type Engine: InferenceEngine;
  fn build(self, model_path: &Path) -> Result<Self::Engine, EngineError>;
}

/// 类别标签，每行一个
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels {
  names: Vec<String>,
}

impl Labels {
  pub fn parse(text: &str) -> Self {
    let names = text
      .lines()
      .map(str::trim)
      .filter(|line| !line.is_empty())
      .map(str::to_string)
      .collect();
    Self { names }
  }

  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
    Ok(Self::parse(&std::fs::read_to_string(path)?))
  }

  pub fn get(&self, class_id: usize) -> Option<&str> {
    self.names.get(class_id).map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectItem {
  pub class_id: usize,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub label: Option<String>,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifyItem {
  pub class_id: usize,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub label: Option<String>,
  pub score: f32,
}

impl ClassifyItem {
  pub fn display_name(&self) -> String {
    self
      .label
      .clone()
      .unwrap_or_else(|| format!("class {}", self.class_id))
  }
}

impl DetectItem {
  pub fn display_name(&self) -> String {
    self
      .label
      .clone()
      .unwrap_or_else(|| format!("class {}", self.class_id))
  }
}

/// 单次推理的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InferenceResult {
  Classification {
    items: Vec<ClassifyItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw_scores: Option<Box<[f32]>>,
  },
  Detection(DetectResult),
}

impl InferenceResult {
  pub fn is_empty(&self) -> bool {
    match self {
      InferenceResult::Classification { items, raw_scores } => {
        items.is_empty() && raw_scores.as_ref().is_none_or(|s| s.is_empty())
      }
      InferenceResult::Detection(result) => result.is_empty(),
    }
  }
}

pub enum EngineWrapper {
  Mock(MockEngine),
  #[cfg(feature = "onnx")]
  Onnx(OnnxEngine),
}

impl InferenceEngine for EngineWrapper {
  fn backend(&self) -> &'static str {
    match self {
      EngineWrapper::Mock(engine) => engine.backend(),
      #[cfg(feature = "onnx")]
      EngineWrapper::Onnx(engine) => engine.backend(),
    }
  }

  fn run(&mut self, input_name: &str, input: &Tensor) -> Result<NamedOutputs, EngineError> {
    match self {
      EngineWrapper::Mock(engine) => engine.run(input_name, input),
      #[cfg(feature = "onnx")]
      EngineWrapper::Onnx(engine) => engine.run(input_name, input),
    }
  }
}

/// 由地址方案选择推理后端
pub enum EngineWrapperBuilder {
  Mock(MockEngineBuilder),
  #[cfg(feature = "onnx")]
  Onnx(OnnxEngineBuilder),
}

impl FromUrl for EngineWrapperBuilder {
  type Error = EngineError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      MockEngineBuilder::SCHEME => Ok(EngineWrapperBuilder::Mock(MockEngineBuilder::from_url(url)?)),
      #[cfg(feature = "onnx")]
      OnnxEngineBuilder::SCHEME => Ok(EngineWrapperBuilder::Onnx(OnnxEngineBuilder::from_url(url)?)),
      other => Err(EngineError::SchemeMismatch(format!(
        "不支持的推理后端: {}",
        other
      ))),
    }
  }
}

impl EngineBuilder for EngineWrapperBuilder {
  type Engine = EngineWrapper;

  fn build(self, model_path: &Path) -> Result<Self::Engine, EngineError> {
    match self {
      EngineWrapperBuilder::Mock(builder) => builder.build(model_path).map(EngineWrapper::Mock),
      #[cfg(feature = "onnx")]
      EngineWrapperBuilder::Onnx(builder) => builder.build(model_path).map(EngineWrapper::Onnx),
    }
  }
}
