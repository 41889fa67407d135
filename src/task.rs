// 该文件是 Kanjian （看见） 项目的一部分。
// src/task.rs - 推理任务
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{
  sync::mpsc::{Receiver, TryRecvError},
  thread,
  time::Duration,
};
use tracing::{error, info, warn};

use crate::{
  frame::RgbFrame,
  model::{EngineBuilder, InferenceResult},
  output::Render,
  screen::{Screen, ScreenError},
};

pub trait Task<B: EngineBuilder, O>: Sized {
  type Error;
  fn run_task(self, screen: &Screen<B>, output: O) -> Result<(), Self::Error>;
}

pub struct OneShotTask;

impl<B, RE, O> Task<B, O> for OneShotTask
where
  B: EngineBuilder,
  RE: std::error::Error + Sync + Send + 'static,
  O: Render<RgbFrame, InferenceResult, Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, screen: &Screen<B>, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let now = std::time::Instant::now();
    let shot = screen.run()?;
    let elapsed = now.elapsed();
    info!("推理完成，耗时: {:.2?}", elapsed);
    output.render_result(&shot.frame, &shot.result)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

pub struct RepeatShotTask {
  repeat_times: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self { repeat_times: 100 }
  }
}

impl RepeatShotTask {
  pub fn with_repeat_times(mut self, repeat_times: usize) -> Self {
    self.repeat_times = repeat_times.max(1);
    self
  }
}

impl<B, RE, O> Task<B, O> for RepeatShotTask
where
  B: EngineBuilder,
  RE: std::error::Error + Sync + Send + 'static,
  O: Render<RgbFrame, InferenceResult, Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, screen: &Screen<B>, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let mut times = Vec::with_capacity(self.repeat_times);
    let mut last = None;
    for i in 0..self.repeat_times {
      let now = std::time::Instant::now();
      let shot = screen.run()?;
      let elapsed = now.elapsed();
      info!("({})推理完成，耗时: {:.2?}", i, elapsed);
      times.push(elapsed);
      last = Some(shot);
    }

    if let Some(shot) = last {
      output.render_result(&shot.frame, &shot.result)?;
    }

    // 跳过前两次预热
    let measured = if times.len() > 2 { &times[2..] } else { &times[..] };
    warn!(
      "平均推理时间: {:.2?}",
      measured.iter().sum::<Duration>() / measured.len() as u32
    );

    Ok(())
  }
}

#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  interval: Option<Duration>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_interval(mut self, interval: Option<Duration>) -> Self {
    self.interval = interval;
    self
  }

  fn interrupt_channel() -> Result<Receiver<()>, anyhow::Error> {
    let (tx, rx) = std::sync::mpsc::channel();

    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;

    Ok(rx)
  }
}

impl<B, RE, O> Task<B, O> for ContinuousTask
where
  B: EngineBuilder,
  RE: std::error::Error + Sync + Send + 'static,
  O: Render<RgbFrame, InferenceResult, Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, screen: &Screen<B>, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let rx = Self::interrupt_channel()?;

    if screen.config().uses_camera {
      screen.start_preview()?;
    }

    let mut frame_index = 0usize;
    loop {
      frame_index = frame_index.wrapping_add(1);
      info!("处理第 {} 帧图像", frame_index);
      let now = std::time::Instant::now();
      match screen.run() {
        Ok(shot) => {
          let elapsed_a = now.elapsed();
          output.render_result(&shot.frame, &shot.result)?;
          info!("推理完成，耗时: {:.2?} / {:.2?}", elapsed_a, now.elapsed());
        }
        // 形状错误只影响本次推理，保留之前的结果
        Err(ScreenError::ShapeMismatch(e)) => error!("第 {} 帧输入形状错误: {}", frame_index, e),
        Err(e) => return Err(e.into()),
      }

      if self.frame_number.is_some_and(|n| frame_index >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
      match rx.try_recv() {
        Ok(()) | Err(TryRecvError::Disconnected) => {
          warn!("中断信号接收，退出任务循环");
          break;
        }
        Err(TryRecvError::Empty) => {}
      }
      if let Some(interval) = self.interval {
        thread::sleep(interval);
      }
    }

    if screen.config().uses_camera {
      screen.stop_preview()?;
    }
    info!("任务完成，退出");
    Ok(())
  }
}
