// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/text_output.rs - 文本结果输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::convert::Infallible;

use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbFrame,
  model::{InferenceResult, decode::format_raw_scores},
  output::{OutputError, Render, draw::scale_bbox},
};

pub const EMPTY_RESULT_TEXT: &str = "No objects detected yet.";

/// 将结果格式化为逐行文本；检测框换算到 `width x height` 像素
pub fn format_result_lines(result: &InferenceResult, width: u32, height: u32) -> Vec<String> {
  let lines: Vec<String> = match result {
    InferenceResult::Classification {
      raw_scores: Some(scores),
      ..
    } => format_raw_scores(scores),
    InferenceResult::Classification { items, .. } => items
      .iter()
      .map(|item| format!("{}: {}%", item.display_name(), (item.score * 100.0).round()))
      .collect(),
    InferenceResult::Detection(result) => result
      .items
      .iter()
      .map(|item| {
        format!(
          "{}: {}% at {}",
          item.display_name(),
          (item.score * 100.0).round(),
          scale_bbox(&item.bbox, width, height)
        )
      })
      .collect(),
  };

  if lines.is_empty() {
    vec![EMPTY_RESULT_TEXT.to_string()]
  } else {
    lines
  }
}

/// 打印到标准输出
pub struct TextOutput;

impl FromUrlWithScheme for TextOutput {
  const SCHEME: &'static str = "text";
}

impl FromUrl for TextOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch);
    }
    Ok(TextOutput)
  }
}

impl Render<RgbFrame, InferenceResult> for TextOutput {
  type Error = Infallible;

  fn render_result(&self, frame: &RgbFrame, result: &InferenceResult) -> Result<(), Self::Error> {
    let lines = format_result_lines(result, frame.width(), frame.height());
    info!("推理结果 {} 行", lines.len());
    for line in lines {
      println!("{}", line);
    }
    Ok(())
  }
}
