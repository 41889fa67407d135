// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/decode.rs - 模型输出后处理
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::{
  model::{ClassifyItem, DetectItem, DetectResult, Labels},
  tensor::Tensor,
};

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("输出张量维度错误: 期望 3 维 (batch, a, b), 实际形状 {0:?}")]
  UnexpectedRank(Vec<usize>),
  #[error("每个检测框的数值个数 {actual} 与布局 {layout:?} 不符")]
  StrideMismatch { layout: BoxLayout, actual: usize },
  #[error("输出批大小为 0")]
  EmptyBatch,
  #[error("模型没有输出")]
  MissingOutput,
  #[error("找不到名为 {0} 的输出")]
  UnknownOutput(String),
}

/// 单个检测框的数值布局，坐标均为归一化的 [x_min, y_min, x_max, y_max]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxLayout {
  /// 4 个坐标 + 置信度，类别固定为 0
  BoxScore,
  /// 4 个坐标 + 置信度 + 类别索引
  BoxScoreClass,
  /// 4 个坐标 + 每个类别的分数，取最大值
  BoxClassScores,
}

impl BoxLayout {
  fn accepts(&self, values_per_box: usize) -> bool {
    match self {
      BoxLayout::BoxScore => values_per_box == 5,
      BoxLayout::BoxScoreClass => values_per_box == 6,
      BoxLayout::BoxClassScores => values_per_box > 4,
    }
  }
}

impl std::str::FromStr for BoxLayout {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "box-score" => Ok(BoxLayout::BoxScore),
      "box-score-class" => Ok(BoxLayout::BoxScoreClass),
      "box-class-scores" => Ok(BoxLayout::BoxClassScores),
      other => Err(format!("未知的检测框布局: {}", other)),
    }
  }
}

/// 输出张量的轴顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputOrder {
  /// (batch, values_per_box, box_count)
  ValueMajor,
  /// (batch, box_count, values_per_box)
  BoxMajor,
}

impl std::str::FromStr for OutputOrder {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "value-major" => Ok(OutputOrder::ValueMajor),
      "box-major" => Ok(OutputOrder::BoxMajor),
      other => Err(format!("未知的输出顺序: {}", other)),
    }
  }
}

#[derive(Debug, Clone, Copy)]
pub struct DetectionDecoder {
  pub layout: BoxLayout,
  pub order: OutputOrder,
  pub threshold: f32,
}

impl DetectionDecoder {
  pub fn new(layout: BoxLayout, order: OutputOrder, threshold: f32) -> Self {
    Self {
      layout,
      order,
      threshold,
    }
  }

  /// 解码第 0 个批次，保留置信度严格大于阈值的检测框，顺序与输入一致
  pub fn decode(&self, output: &Tensor, labels: Option<&Labels>) -> Result<DetectResult, DecodeError> {
    let shape = output.shape();
    if shape.len() != 3 {
      error!("检测输出形状无效: {:?}", shape);
      return Err(DecodeError::UnexpectedRank(shape.to_vec()));
    }
    if shape[0] == 0 {
      return Err(DecodeError::EmptyBatch);
    }

    let (values_per_box, box_count) = match self.order {
      OutputOrder::ValueMajor => (shape[1], shape[2]),
      OutputOrder::BoxMajor => (shape[2], shape[1]),
    };
    if !self.layout.accepts(values_per_box) {
      error!(
        "检测框数值个数 {} 与布局 {:?} 不符",
        values_per_box, self.layout
      );
      return Err(DecodeError::StrideMismatch {
        layout: self.layout,
        actual: values_per_box,
      });
    }

    debug!(
      "解码检测输出: 形状 {:?}, 每框 {} 个数值, 共 {} 个框",
      shape, values_per_box, box_count
    );

    // 只处理第 0 个批次
    let data = &output.data()[..values_per_box * box_count];
    let value = |b: usize, v: usize| match self.order {
      OutputOrder::ValueMajor => data[v * box_count + b],
      OutputOrder::BoxMajor => data[b * values_per_box + v],
    };

    let mut items = Vec::new();
    for b in 0..box_count {
      let (score, class_id) = match self.layout {
        BoxLayout::BoxScore => (value(b, 4), 0usize),
        BoxLayout::BoxScoreClass => {
          let raw = value(b, 5);
          if !raw.is_finite() || raw < 0.0 {
            warn!("第 {} 个框的类别索引无效: {}", b, raw);
            continue;
          }
          (value(b, 4), raw.round() as usize)
        }
        BoxLayout::BoxClassScores => {
          let mut best = (f32::NEG_INFINITY, 0usize);
          for c in 0..values_per_box - 4 {
            let s = value(b, 4 + c);
            if s > best.0 {
              best = (s, c);
            }
          }
          best
        }
      };

      if score.is_nan() || score <= self.threshold {
        continue;
      }

      items.push(DetectItem {
        class_id,
        label: labels.and_then(|l| l.get(class_id)).map(str::to_string),
        score,
        bbox: [value(b, 0), value(b, 1), value(b, 2), value(b, 3)],
      });
    }

    debug!("解码得到 {} 个检测结果", items.len());
    Ok(DetectResult {
      items: items.into_boxed_slice(),
    })
  }
}

/// 取分数严格大于阈值的类别，按分数降序（同分保持原顺序），最多 `k` 个
pub fn top_k(scores: &[f32], labels: Option<&Labels>, k: usize, threshold: f32) -> Vec<ClassifyItem> {
  let mut items: Vec<ClassifyItem> = scores
    .iter()
    .enumerate()
    .filter(|(_, score)| **score > threshold)
    .map(|(class_id, &score)| ClassifyItem {
      class_id,
      label: labels.and_then(|l| l.get(class_id)).map(str::to_string),
      score,
    })
    .collect();

  items.sort_by(|a, b| b.score.total_cmp(&a.score));
  items.truncate(k);
  items
}

/// 原始分数以两位小数展示
pub fn format_raw_scores(scores: &[f32]) -> Vec<String> {
  scores.iter().map(|v| format!("{:.2}", v)).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn box_major(rows: &[[f32; 6]]) -> Tensor {
    let data = rows.iter().flatten().copied().collect();
    Tensor::new(vec![1, rows.len(), 6], data).unwrap()
  }

  #[test]
  fn keeps_only_scores_above_threshold_in_order() {
    let output = box_major(&[
      [0.1, 0.1, 0.2, 0.2, 0.9, 2.0],
      [0.2, 0.2, 0.3, 0.3, 0.5, 1.0],
      [0.3, 0.3, 0.4, 0.4, 0.51, 0.0],
      [0.4, 0.4, 0.5, 0.5, 0.2, 3.0],
    ]);
    let decoder = DetectionDecoder::new(BoxLayout::BoxScoreClass, OutputOrder::BoxMajor, 0.5);
    let result = decoder.decode(&output, None).unwrap();
    let scores: Vec<f32> = result.items.iter().map(|i| i.score).collect();
    assert_eq!(scores, vec![0.9, 0.51]);
    assert_eq!(result.items[0].class_id, 2);
    assert_eq!(result.items[1].bbox, [0.3, 0.3, 0.4, 0.4]);
  }

  #[test]
  fn value_major_uses_the_same_stride_for_every_box() {
    // 2 个框, 每框 5 个数值, 按数值优先存储
    let data = vec![
      0.1, 0.6, // x_min
      0.1, 0.6, // y_min
      0.5, 0.9, // x_max
      0.5, 0.9, // y_max
      0.8, 0.7, // score
    ];
    let output = Tensor::new(vec![1, 5, 2], data).unwrap();
    let decoder = DetectionDecoder::new(BoxLayout::BoxScore, OutputOrder::ValueMajor, 0.5);
    let result = decoder.decode(&output, None).unwrap();
    assert_eq!(result.items.len(), 2);
    assert_eq!(result.items[0].bbox, [0.1, 0.1, 0.5, 0.5]);
    assert_eq!(result.items[1].bbox, [0.6, 0.6, 0.9, 0.9]);
    assert_eq!(result.items[1].score, 0.7);
  }

  #[test]
  fn class_scores_take_argmax() {
    let labels = Labels::parse("person\ncar\ndog\n");
    let output = Tensor::new(vec![1, 1, 7], vec![0.0, 0.0, 1.0, 1.0, 0.1, 0.8, 0.3]).unwrap();
    let decoder = DetectionDecoder::new(BoxLayout::BoxClassScores, OutputOrder::BoxMajor, 0.5);
    let result = decoder.decode(&output, Some(&labels)).unwrap();
    assert_eq!(result.items[0].class_id, 1);
    assert_eq!(result.items[0].label.as_deref(), Some("car"));
  }

  #[test]
  fn rejects_inconsistent_stride() {
    let output = Tensor::new(vec![1, 3, 5], vec![0.0; 15]).unwrap();
    let decoder = DetectionDecoder::new(BoxLayout::BoxScoreClass, OutputOrder::BoxMajor, 0.5);
    assert!(matches!(
      decoder.decode(&output, None),
      Err(DecodeError::StrideMismatch { actual: 5, .. })
    ));
    let flat = Tensor::new(vec![30], vec![0.0; 30]).unwrap();
    assert!(matches!(
      decoder.decode(&flat, None),
      Err(DecodeError::UnexpectedRank(_))
    ));
  }

  #[test]
  fn top_k_sorts_and_truncates() {
    let labels = Labels::parse("Car\nBike\nBus\n");
    let items = top_k(&[0.85, 0.76, 0.3, 0.95], Some(&labels), 2, 0.5);
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].class_id, 3);
    assert_eq!(items[0].label, None);
    assert_eq!(items[1].label.as_deref(), Some("Car"));
  }

  #[test]
  fn raw_scores_use_two_decimals() {
    assert_eq!(format_raw_scores(&[0.123, 1.0]), vec!["0.12", "1.00"]);
  }
}
