// 该文件是 Kanjian （看见） 项目的一部分。
// src/screen.rs - 推理界面：资源落盘、权限、相机、推理与结果
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{
  path::PathBuf,
  sync::{
    Mutex, MutexGuard,
    atomic::{AtomicBool, Ordering},
  },
};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  asset::{AssetError, AssetStore},
  camera::{Camera, CameraError, Facing, StillImageCamera},
  config::{ConfigError, OutputHead, ScreenConfig},
  frame::{RgbFrame, load_rgb_image},
  model::{
    EngineBuilder, EngineError, InferenceEngine, InferenceResult, Labels, NamedOutputs,
    decode::{DecodeError, DetectionDecoder, top_k},
  },
  permission::{PermissionProvider, PermissionState, StaticPermission},
  tensor::{PreprocessError, Tensor, preprocess},
};

#[derive(Error, Debug)]
pub enum ScreenError {
  #[error("资源不存在: {0}")]
  AssetNotFound(String),
  #[error("资源错误: {0}")]
  Asset(AssetError),
  #[error("输入形状不匹配: {0}")]
  ShapeMismatch(PreprocessError),
  #[error("预处理错误: {0}")]
  Preprocess(PreprocessError),
  #[error("相机权限被拒绝")]
  PermissionDenied,
  #[error("推理正在进行中")]
  Busy,
  #[error("界面未就绪")]
  NotReady,
  #[error("没有可用的相机")]
  NoCamera,
  #[error("推理引擎错误: {0}")]
  Engine(#[from] EngineError),
  #[error("相机错误: {0}")]
  Camera(#[from] CameraError),
  #[error("输出解析错误: {0}")]
  Decode(#[from] DecodeError),
  #[error("配置错误: {0}")]
  Config(#[from] ConfigError),
  #[error("标签文件错误: {0}")]
  Labels(std::io::Error),
}

impl From<AssetError> for ScreenError {
  fn from(err: AssetError) -> Self {
    match err {
      AssetError::NotFound(name) => ScreenError::AssetNotFound(name),
      other => ScreenError::Asset(other),
    }
  }
}

impl From<PreprocessError> for ScreenError {
  fn from(err: PreprocessError) -> Self {
    if err.is_shape_mismatch() {
      ScreenError::ShapeMismatch(err)
    } else {
      ScreenError::Preprocess(err)
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenState {
  Unmounted,
  Ready,
  Failed,
}

/// 推理忙碌标记，离开作用域时自动清除
struct BusyGuard<'a> {
  flag: &'a AtomicBool,
}

impl<'a> BusyGuard<'a> {
  fn acquire(flag: &'a AtomicBool) -> Result<Self, ScreenError> {
    flag
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .map_err(|_| ScreenError::Busy)?;
    Ok(Self { flag })
  }
}

impl Drop for BusyGuard<'_> {
  fn drop(&mut self) {
    self.flag.store(false, Ordering::Release);
  }
}

/// 一次拍摄：原始尺寸的显示帧、缩放后送入模型的帧及其结果
#[derive(Debug, Clone)]
pub struct Shot {
  pub frame: RgbFrame,
  pub input: RgbFrame,
  pub result: InferenceResult,
}

pub struct Screen<B: EngineBuilder> {
  config: ScreenConfig,
  assets: AssetStore,
  builder: Option<B>,
  engine: Option<Mutex<B::Engine>>,
  labels: Option<Labels>,
  image_path: Option<PathBuf>,
  camera: Option<Mutex<Box<dyn Camera + Send>>>,
  permission: Box<dyn PermissionProvider + Send + Sync>,
  capture_dir: PathBuf,
  state: ScreenState,
  busy: AtomicBool,
  last_result: Mutex<Option<InferenceResult>>,
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<B: EngineBuilder> Screen<B> {
  pub fn new(config: ScreenConfig, assets: AssetStore, builder: B) -> Self {
    let capture_dir = assets.storage_dir().join("captures");
    Self {
      config,
      assets,
      builder: Some(builder),
      engine: None,
      labels: None,
      image_path: None,
      camera: None,
      permission: Box::new(StaticPermission::granted()),
      capture_dir,
      state: ScreenState::Unmounted,
      busy: AtomicBool::new(false),
      last_result: Mutex::new(None),
    }
  }

  /// 挂接相机后界面即为相机界面，推理从相机拍摄
  pub fn with_camera(mut self, camera: Box<dyn Camera + Send>) -> Self {
    if !self.config.uses_camera {
      info!("界面 {} 挂接相机, 改为相机输入", self.config.name);
      self.config.uses_camera = true;
    }
    self.camera = Some(Mutex::new(camera));
    self
  }

  pub fn with_permission(mut self, permission: Box<dyn PermissionProvider + Send + Sync>) -> Self {
    self.permission = permission;
    self
  }

  pub fn with_capture_dir(mut self, directory: impl Into<PathBuf>) -> Self {
    self.capture_dir = directory.into();
    self
  }

  pub fn config(&self) -> &ScreenConfig {
    &self.config
  }

  pub fn state(&self) -> ScreenState {
    self.state
  }

  pub fn labels(&self) -> Option<&Labels> {
    self.labels.as_ref()
  }

  pub fn is_busy(&self) -> bool {
    self.busy.load(Ordering::Acquire)
  }

  /// 操作按钮是否可用
  pub fn can_run(&self) -> bool {
    self.state == ScreenState::Ready && !self.is_busy() && self.ensure_permission().is_ok()
  }

  /// 落盘模型、标签与图像资源并加载模型；失败后界面保持不可用
  pub fn mount(&mut self) -> Result<(), ScreenError> {
    match self.state {
      ScreenState::Ready => return Ok(()),
      ScreenState::Failed => return Err(ScreenError::NotReady),
      ScreenState::Unmounted => {}
    }

    info!("挂载界面: {}", self.config.name);
    match self.try_mount() {
      Ok(()) => {
        self.state = ScreenState::Ready;
        info!("界面 {} 已就绪", self.config.name);
        Ok(())
      }
      Err(e) => {
        error!("界面 {} 挂载失败: {}", self.config.name, e);
        self.state = ScreenState::Failed;
        Err(e)
      }
    }
  }

  fn try_mount(&mut self) -> Result<(), ScreenError> {
    self.config.validate()?;

    let model_path = self.assets.materialize(&self.config.model_asset)?;

    if let Some(name) = &self.config.labels_asset {
      let path = self.assets.materialize(name)?;
      let labels = Labels::from_file(&path).map_err(ScreenError::Labels)?;
      debug!("加载 {} 个标签", labels.len());
      self.labels = Some(labels);
    }

    if let Some(name) = &self.config.image_asset {
      self.image_path = Some(self.assets.materialize(name)?);
    }

    // 相机界面未挂接相机时，以资源包图像作为静态相机，权限要求不变
    if self.config.uses_camera
      && self.camera.is_none()
      && let Some(path) = &self.image_path
    {
      warn!("界面 {} 未指定相机, 使用资源包图像 {}", self.config.name, path.display());
      let camera: Box<dyn Camera + Send> = Box::new(StillImageCamera::new(path));
      self.camera = Some(Mutex::new(camera));
    }

    let builder = self.builder.take().ok_or(ScreenError::NotReady)?;
    let engine = builder.build(&model_path)?;
    info!("推理后端: {}", engine.backend());
    self.engine = Some(Mutex::new(engine));
    Ok(())
  }

  pub fn permission(&self) -> PermissionState {
    self.permission.status()
  }

  pub fn request_permission(&mut self) -> PermissionState {
    self.permission.request()
  }

  fn ensure_permission(&self) -> Result<(), ScreenError> {
    if self.config.uses_camera && !self.permission.status().is_granted() {
      return Err(ScreenError::PermissionDenied);
    }
    Ok(())
  }

  fn camera(&self) -> Result<MutexGuard<'_, Box<dyn Camera + Send>>, ScreenError> {
    self.ensure_permission()?;
    self.camera.as_ref().map(lock).ok_or(ScreenError::NoCamera)
  }

  pub fn start_preview(&self) -> Result<(), ScreenError> {
    self.camera()?.start_preview()?;
    Ok(())
  }

  pub fn stop_preview(&self) -> Result<(), ScreenError> {
    self.camera()?.stop_preview();
    Ok(())
  }

  pub fn flip_camera(&self) -> Result<Facing, ScreenError> {
    let facing = self.camera()?.switch_facing()?;
    info!("切换到 {:?} 摄像头", facing);
    Ok(facing)
  }

  /// 相机界面拍摄一帧，否则使用资源包中的图像；返回原始尺寸的帧
  fn acquire_frame(&self) -> Result<RgbFrame, ScreenError> {
    if !self.config.uses_camera {
      let path = self.image_path.as_ref().ok_or(ScreenError::NotReady)?;
      debug!("读取输入图像: {}", path.display());
      return Ok(RgbFrame::from(load_rgb_image(path)?));
    }

    let camera = self.camera.as_ref().ok_or(ScreenError::NoCamera)?;
    let path = lock(camera).capture(&self.capture_dir)?;
    debug!("读取拍摄图像: {}", path.display());
    let image = load_rgb_image(&path);
    // 拍摄文件读入内存后即删除
    if let Err(e) = std::fs::remove_file(&path) {
      warn!("删除拍摄文件 {} 失败: {}", path.display(), e);
    }
    Ok(RgbFrame::from(image?))
  }

  fn ensure_runnable(&self) -> Result<BusyGuard<'_>, ScreenError> {
    self.ensure_permission()?;
    if self.state != ScreenState::Ready {
      warn!("界面 {} 未就绪, 忽略推理请求", self.config.name);
      return Err(ScreenError::NotReady);
    }
    BusyGuard::acquire(&self.busy).inspect_err(|_| warn!("上一次推理尚未完成"))
  }

  /// 拍摄或读取图像并执行一次推理
  pub fn run(&self) -> Result<Shot, ScreenError> {
    let _guard = self.ensure_runnable()?;
    let frame = self.acquire_frame()?;
    let input = RgbFrame::from_image_resized(
      frame.to_rgb_image(),
      self.config.input_width,
      self.config.input_height,
    )?;
    let result = self.infer(&input)?;
    Ok(Shot {
      frame,
      input,
      result,
    })
  }

  /// 对给定帧执行一次推理
  pub fn run_frame(&self, frame: &RgbFrame) -> Result<InferenceResult, ScreenError> {
    let _guard = self.ensure_runnable()?;
    self.infer(frame)
  }

  /// 对交织 RGB 字节执行一次推理，长度与尺寸不符时在推理前失败
  pub fn run_bytes(&self, width: u32, height: u32, bytes: Vec<u8>) -> Result<InferenceResult, ScreenError> {
    let _guard = self.ensure_runnable()?;
    let frame = RgbFrame::new(width, height, bytes)?;
    self.infer(&frame)
  }

  fn infer(&self, frame: &RgbFrame) -> Result<InferenceResult, ScreenError> {
    let tensor = preprocess(frame, self.config.layout, self.config.normalization)?;
    tensor.ensure_shape(&self.config.input_shape())?;

    let outputs = {
      let engine = self.engine.as_ref().ok_or(ScreenError::NotReady)?;
      let now = std::time::Instant::now();
      let outputs = lock(engine).run(&self.config.input_name, &tensor)?;
      debug!("推理完成，耗时: {:.2?}", now.elapsed());
      outputs
    };

    let result = self.postprocess(&outputs)?;
    *lock(&self.last_result) = Some(result.clone());
    Ok(result)
  }

  fn select_output<'a>(&self, outputs: &'a NamedOutputs) -> Result<&'a Tensor, DecodeError> {
    match &self.config.output_name {
      Some(name) => outputs
        .get(name)
        .ok_or_else(|| DecodeError::UnknownOutput(name.clone())),
      None => outputs.first().ok_or(DecodeError::MissingOutput),
    }
  }

  fn postprocess(&self, outputs: &NamedOutputs) -> Result<InferenceResult, ScreenError> {
    let output = self.select_output(outputs)?;
    let labels = self.labels.as_ref();

    let result = match self.config.head {
      OutputHead::Classification { raw_scores } => {
        let scores = output.data();
        let items = top_k(
          scores,
          labels,
          self.config.num_results,
          self.config.threshold,
        );
        InferenceResult::Classification {
          items,
          raw_scores: raw_scores.then(|| scores.to_vec().into_boxed_slice()),
        }
      }
      OutputHead::Detection { layout, order } => {
        let decoder = DetectionDecoder::new(layout, order, self.config.threshold);
        InferenceResult::Detection(decoder.decode(output, labels)?)
      }
    };
    Ok(result)
  }

  /// 最近一次成功推理的结果
  pub fn results(&self) -> Option<InferenceResult> {
    lock(&self.last_result).clone()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn busy_guard_blocks_overlap_and_releases() {
    let flag = AtomicBool::new(false);
    let guard = BusyGuard::acquire(&flag).unwrap();
    assert!(matches!(BusyGuard::acquire(&flag), Err(ScreenError::Busy)));
    drop(guard);
    assert!(BusyGuard::acquire(&flag).is_ok());
  }

  #[test]
  fn asset_not_found_is_distinguished() {
    let err: ScreenError = AssetError::NotFound("model.onnx".to_string()).into();
    assert!(matches!(err, ScreenError::AssetNotFound(name) if name == "model.onnx"));
  }

  #[test]
  fn shape_errors_are_distinguished() {
    let err: ScreenError = PreprocessError::ShapeMismatch {
      expected: 150528,
      actual: 100,
    }
    .into();
    assert!(matches!(err, ScreenError::ShapeMismatch(_)));
    let err: ScreenError = PreprocessError::InvalidDimensions(0, 0).into();
    assert!(matches!(err, ScreenError::Preprocess(_)));
  }
}
