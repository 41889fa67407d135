// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 推理引擎
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use ort::{session::Session, value::Tensor as OrtTensor};
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{EngineBuilder, EngineError, InferenceEngine, NamedOutputs},
  tensor::Tensor,
};

fn runtime_error(err: impl std::fmt::Display) -> EngineError {
  EngineError::RuntimeError(err.to_string())
}

pub struct OnnxEngine {
  session: Session,
}

impl InferenceEngine for OnnxEngine {
  fn backend(&self) -> &'static str {
    "onnx"
  }

  fn run(&mut self, input_name: &str, input: &Tensor) -> Result<NamedOutputs, EngineError> {
    let shape: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
    let value = OrtTensor::from_array((shape, input.data().to_vec().into_boxed_slice()))
      .map_err(runtime_error)?;

    debug!("执行 ONNX 推理, 输入 {} 形状 {:?}", input_name, input.shape());
    let outputs = self
      .session
      .run(ort::inputs![input_name => value])
      .map_err(runtime_error)?;

    let mut named = NamedOutputs::default();
    for (name, value) in outputs.iter() {
      let (shape, data) = value.try_extract_tensor::<f32>().map_err(runtime_error)?;
      let shape: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
      debug!("输出 {}: 形状 {:?}", name, shape);
      let tensor =
        Tensor::new(shape, data.to_vec()).map_err(|e| EngineError::InvalidOutput(e.to_string()))?;
      named.push(name, tensor);
    }
    Ok(named)
  }
}

pub struct OnnxEngineBuilder {
  intra_threads: Option<usize>,
}

impl FromUrlWithScheme for OnnxEngineBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxEngineBuilder {
  type Error = EngineError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(EngineError::SchemeMismatch(format!(
        "期望推理后端 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let mut intra_threads = None;
    for (key, value) in url.query_pairs() {
      if key == "threads" {
        intra_threads = Some(
          value
            .parse()
            .map_err(|_| EngineError::InvalidParameter(format!("threads={}", value)))?,
        );
      }
    }
    Ok(OnnxEngineBuilder { intra_threads })
  }
}

impl EngineBuilder for OnnxEngineBuilder {
  type Engine = OnnxEngine;

  fn build(self, model_path: &Path) -> Result<Self::Engine, EngineError> {
    info!("加载 ONNX 模型: {}", model_path.display());
    let metadata = std::fs::metadata(model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      metadata.len() as f64 / (1024.0 * 1024.0)
    );

    let mut builder = Session::builder().map_err(runtime_error)?;
    if let Some(threads) = self.intra_threads {
      builder = builder.with_intra_threads(threads).map_err(runtime_error)?;
    }
    let session = builder.commit_from_file(model_path).map_err(runtime_error)?;
    info!("ONNX 模型加载完成");

    Ok(OnnxEngine { session })
  }
}
