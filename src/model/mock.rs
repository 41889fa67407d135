// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/mock.rs - 模拟推理引擎
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{
  path::Path,
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{EngineBuilder, EngineError, InferenceEngine, NamedOutputs},
  tensor::Tensor,
};

const MOCK_OUTPUT_NAME: &str = "output";
// Car 0.85, Bike 0.76
const MOCK_DEFAULT_SCORES: [f32; 2] = [0.85, 0.76];

/// 不执行真实计算的引擎，对任意合法输入返回固定输出
pub struct MockEngine {
  outputs: NamedOutputs,
  input_name: Option<String>,
  input_shape: Option<Vec<usize>>,
  latency: Option<Duration>,
  runs: Arc<AtomicUsize>,
}

impl InferenceEngine for MockEngine {
  fn backend(&self) -> &'static str {
    "mock"
  }

  fn run(&mut self, input_name: &str, input: &Tensor) -> Result<NamedOutputs, EngineError> {
    if let Some(expected) = &self.input_name
      && expected != input_name
    {
      error!("模拟引擎输入名称不匹配: 期望 {}, 实际 {}", expected, input_name);
      return Err(EngineError::InputNameMismatch {
        expected: expected.clone(),
        actual: input_name.to_string(),
      });
    }

    if let Some(expected) = &self.input_shape
      && expected.as_slice() != input.shape()
    {
      return Err(EngineError::InputShapeMismatch {
        expected: expected.clone(),
        actual: input.shape().to_vec(),
      });
    }

    if let Some(latency) = self.latency {
      std::thread::sleep(latency);
    }

    let count = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
    debug!("模拟推理第 {} 次, 输入形状 {:?}", count, input.shape());
    Ok(self.outputs.clone())
  }
}

pub struct MockEngineBuilder {
  outputs: NamedOutputs,
  input_name: Option<String>,
  input_shape: Option<Vec<usize>>,
  latency: Option<Duration>,
  runs: Arc<AtomicUsize>,
}

impl Default for MockEngineBuilder {
  fn default() -> Self {
    let mut builder = Self {
      outputs: NamedOutputs::default(),
      input_name: None,
      input_shape: None,
      latency: None,
      runs: Arc::new(AtomicUsize::new(0)),
    };
    builder.set_scores(&MOCK_DEFAULT_SCORES);
    builder
  }
}

impl FromUrlWithScheme for MockEngineBuilder {
  const SCHEME: &'static str = "mock";
}

impl FromUrl for MockEngineBuilder {
  type Error = EngineError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(EngineError::SchemeMismatch(format!(
        "期望推理后端 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let mut builder = Self::default();
    for (key, value) in url.query_pairs() {
      if key == "latency_ms" {
        let millis = value
          .parse::<u64>()
          .map_err(|e| EngineError::InvalidParameter(format!("latency_ms={}: {}", value, e)))?;
        builder.latency = Some(Duration::from_millis(millis));
      } else if key == "scores" {
        let scores = value
          .split(',')
          .map(|s| s.trim().parse::<f32>())
          .collect::<Result<Vec<_>, _>>()
          .map_err(|e| EngineError::InvalidParameter(format!("scores={}: {}", value, e)))?;
        builder.set_scores(&scores);
      }
    }
    Ok(builder)
  }
}

impl MockEngineBuilder {
  fn set_scores(&mut self, scores: &[f32]) {
    let mut outputs = NamedOutputs::default();
    // 长度与形状一致，不会失败
    if let Ok(tensor) = Tensor::new(vec![1, scores.len()], scores.to_vec()) {
      outputs.push(MOCK_OUTPUT_NAME, tensor);
    }
    self.outputs = outputs;
  }

  /// 以单个 `[1, N]` 分数向量作为输出
  pub fn scores(mut self, scores: &[f32]) -> Self {
    self.set_scores(scores);
    self
  }

  /// 替换全部输出
  pub fn outputs(mut self, outputs: NamedOutputs) -> Self {
    self.outputs = outputs;
    self
  }

  pub fn expect_input_name(mut self, name: impl Into<String>) -> Self {
    self.input_name = Some(name.into());
    self
  }

  pub fn expect_input_shape(mut self, shape: &[usize]) -> Self {
    self.input_shape = Some(shape.to_vec());
    self
  }

  /// 每次推理前等待的时间，模拟较慢的后端
  pub fn latency(mut self, latency: Duration) -> Self {
    self.latency = Some(latency);
    self
  }

  /// 推理次数计数器，构建后的引擎共享同一计数
  pub fn run_counter(&self) -> Arc<AtomicUsize> {
    self.runs.clone()
  }
}

impl EngineBuilder for MockEngineBuilder {
  type Engine = MockEngine;

  fn build(self, model_path: &Path) -> Result<Self::Engine, EngineError> {
    info!("加载模拟模型: {}", model_path.display());
    let metadata = std::fs::metadata(model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      metadata.len() as f64 / (1024.0 * 1024.0)
    );

    Ok(MockEngine {
      outputs: self.outputs,
      input_name: self.input_name,
      input_shape: self.input_shape,
      latency: self.latency,
      runs: self.runs,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_scores_from_url() {
    let url = Url::parse("mock://?scores=0.1,0.9").unwrap();
    let builder = MockEngineBuilder::from_url(&url).unwrap();
    let scores = builder.outputs.first().unwrap();
    assert_eq!(scores.shape(), &[1, 2]);
    assert_eq!(scores.data(), &[0.1, 0.9]);
  }

  #[test]
  fn parses_latency_from_url() {
    let url = Url::parse("mock://?latency_ms=25").unwrap();
    let builder = MockEngineBuilder::from_url(&url).unwrap();
    assert_eq!(builder.latency, Some(Duration::from_millis(25)));
  }

  #[test]
  fn rejects_bad_scores() {
    let url = Url::parse("mock://?scores=a,b").unwrap();
    assert!(matches!(
      MockEngineBuilder::from_url(&url),
      Err(EngineError::InvalidParameter(_))
    ));
  }

  #[test]
  fn missing_model_file_fails_to_load() {
    let builder = MockEngineBuilder::default();
    assert!(matches!(
      builder.build(Path::new("/nonexistent/model.tflite")),
      Err(EngineError::ModelLoadError(_))
    ));
  }
}
