// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/json_output.rs - JSON 结果输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbFrame,
  model::InferenceResult,
  output::{
    Render,
    draw::{PixelRect, scale_bbox},
  },
};

#[derive(Error, Debug)]
pub enum JsonOutputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  SerializeError(#[from] serde_json::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

#[derive(Serialize)]
struct JsonReport<'a> {
  width: u32,
  height: u32,
  result: &'a InferenceResult,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  boxes: Vec<PixelRect>,
}

pub fn to_json_string(frame: &RgbFrame, result: &InferenceResult) -> Result<String, serde_json::Error> {
  let boxes = match result {
    InferenceResult::Detection(detections) => detections
      .items
      .iter()
      .map(|item| scale_bbox(&item.bbox, frame.width(), frame.height()))
      .collect(),
    InferenceResult::Classification { .. } => Vec::new(),
  };

  serde_json::to_string_pretty(&JsonReport {
    width: frame.width(),
    height: frame.height(),
    result,
    boxes,
  })
}

/// 写入 JSON 文件，每次覆盖
pub struct JsonOutput {
  path: PathBuf,
}

impl FromUrlWithScheme for JsonOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonOutput {
  type Error = JsonOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(JsonOutputError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }
    Ok(JsonOutput {
      path: PathBuf::from(url.path()),
    })
  }
}

impl JsonOutput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl Render<RgbFrame, InferenceResult> for JsonOutput {
  type Error = JsonOutputError;

  fn render_result(&self, frame: &RgbFrame, result: &InferenceResult) -> Result<(), Self::Error> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    std::fs::write(&self.path, to_json_string(frame, result)?)?;
    info!("保存推理结果到文件: {}", self.path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::ClassifyItem;

  #[test]
  fn serializes_classification() {
    let frame = RgbFrame::new(1, 1, vec![0, 0, 0]).unwrap();
    let result = InferenceResult::Classification {
      items: vec![ClassifyItem {
        class_id: 0,
        label: Some("Car".to_string()),
        score: 0.5,
      }],
      raw_scores: None,
    };
    let value: serde_json::Value =
      serde_json::from_str(&to_json_string(&frame, &result).unwrap()).unwrap();
    assert_eq!(value["result"]["kind"], "classification");
    assert_eq!(value["result"]["items"][0]["label"], "Car");
    assert!(value.get("boxes").is_none());
  }
}
