// 该文件是 Kanjian （看见） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use kanjian::config::ScreenPreset;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TaskKind {
  /// 单次推理
  Oneshot,
  /// 重复推理并统计耗时
  Repeat,
  /// 连续推理，Ctrl-C 退出
  Continuous,
}

/// Kanjian 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 界面预设
  #[arg(long, value_enum, default_value = "tflite-mock")]
  pub screen: ScreenPreset,

  /// 推理后端与模型资源（为空时 tflite-mock 使用 mock://，mobilenet 与 coco-ssd 使用 onnx:///）
  /// 支持格式:
  /// - mock://?scores=0.85,0.76&latency_ms=50
  /// - onnx:///mobilenetv2-7.onnx?threshold=0.5&size=224（需要 onnx 特性）
  /// 路径非空时覆盖预设的模型资源名，查询参数覆盖预设参数；
  /// mock 只输出分类分数，coco-ssd 的检测解码需要 onnx 后端
  #[arg(long, value_name = "MODEL")]
  pub model: Option<Url>,

  /// 输入来源（为空时使用预设的图像资源）
  /// 支持格式:
  /// - asset:///car.jpeg
  /// - still:///path/to/image.jpg（以静态图像作为相机，任何界面都改为相机输入）
  /// - v4l:///dev/video0?front=/dev/video1（需要 v4l_camera 特性）
  #[arg(long, value_name = "SOURCE")]
  pub input: Option<Url>,

  /// 输出路径
  /// 支持格式:
  /// - text://
  /// - json:///path/to/result.json
  /// - image:///path/to/result.png?font=/path/to/font.ttf
  #[arg(long, value_name = "OUTPUT", default_value = "text://")]
  pub output: Url,

  /// 资源包目录
  #[arg(long, value_name = "DIR", default_value = "assets")]
  pub bundle: PathBuf,

  /// 可写存储目录
  #[arg(long, value_name = "DIR", default_value = "storage")]
  pub storage: PathBuf,

  /// 任务类型
  #[arg(long, value_enum, default_value = "oneshot")]
  pub task: TaskKind,

  /// 重复或连续任务的帧数（连续任务 0 表示无限制）
  #[arg(long, default_value = "0", value_name = "COUNT")]
  pub frames: usize,

  /// 连续任务两帧之间的间隔（毫秒）
  #[arg(long, value_name = "MILLIS")]
  pub interval: Option<u64>,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub threshold: Option<f32>,

  /// 最多返回的分类结果数
  #[arg(long, value_name = "COUNT")]
  pub num_results: Option<usize>,

  /// 拒绝相机权限请求
  #[arg(long)]
  pub deny_camera: bool,
}
