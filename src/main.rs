// 该文件是 Kanjian （看见） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;
use tracing::info;
use url::Url;

use kanjian::{
  FromUrl,
  asset::{ASSET_SCHEME, AssetStore, asset_name},
  camera::create_camera,
  config::ScreenConfig,
  model::EngineWrapperBuilder,
  output::OutputWrapper,
  permission::{PermissionState, StaticPermission},
  screen::Screen,
  task::{ContinuousTask, OneShotTask, RepeatShotTask, Task},
};

use args::{Args, TaskKind};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  let model = match args.model {
    Some(model) => model,
    None => Url::parse(args.screen.default_model())?,
  };

  info!("界面预设: {:?}", args.screen);
  info!("推理后端: {}", model);
  info!("输出路径: {}", args.output);

  let mut config = ScreenConfig::preset(args.screen);
  let model_name = model.path().trim_start_matches('/');
  if !model_name.is_empty() {
    config.model_asset = model_name.to_string();
  }
  config.apply_query(&model)?;
  if let Some(threshold) = args.threshold {
    config.threshold = threshold;
  }
  if let Some(num_results) = args.num_results {
    config.num_results = num_results;
  }

  let mut camera = None;
  if let Some(input) = &args.input {
    info!("输入来源: {}", input);
    if input.scheme() == ASSET_SCHEME {
      config.image_asset = Some(asset_name(input)?);
    } else {
      camera = Some(create_camera(input)?);
    }
  }

  let assets = AssetStore::new(&args.bundle, &args.storage);
  let builder = EngineWrapperBuilder::from_url(&model)?;
  let mut screen = Screen::new(config, assets, builder)
    .with_permission(Box::new(StaticPermission::new(!args.deny_camera)));
  // 挂接相机的界面一律按相机界面处理，需要权限
  if let Some(camera) = camera {
    screen = screen.with_camera(camera);
  }

  if screen.config().uses_camera && screen.request_permission() != PermissionState::Granted {
    bail!("需要相机权限才能继续");
  }

  info!("正在加载模型...");
  screen.mount()?;
  info!("模型加载完成");

  let output = OutputWrapper::from_url(&args.output)?;
  let frames = (args.frames > 0).then_some(args.frames);

  // 连续任务自行管理预览
  if screen.config().uses_camera && args.task != TaskKind::Continuous {
    screen.start_preview()?;
  }

  match args.task {
    TaskKind::Oneshot => OneShotTask.run_task(&screen, output)?,
    TaskKind::Repeat => RepeatShotTask::default()
      .with_repeat_times(frames.unwrap_or(100))
      .run_task(&screen, output)?,
    TaskKind::Continuous => ContinuousTask::default()
      .with_frame_number(frames)
      .with_interval(args.interval.map(Duration::from_millis))
      .run_task(&screen, output)?,
  }

  Ok(())
}
