// 该文件是 Kanjian （看见） 项目的一部分。
// src/asset.rs - 资源包解析与落盘
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{
  collections::HashMap,
  path::{Component, Path, PathBuf},
  sync::Mutex,
};

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

pub const ASSET_SCHEME: &str = "asset";

#[derive(Error, Debug)]
pub enum AssetError {
  #[error("资源不存在: {0}")]
  NotFound(String),
  #[error("无效的资源名称: {0}")]
  InvalidName(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 资源包（只读）到可写目录的映射，每个资源只复制一次
pub struct AssetStore {
  bundle_dir: PathBuf,
  storage_dir: PathBuf,
  materialized: Mutex<HashMap<String, PathBuf>>,
}

impl AssetStore {
  pub fn new(bundle_dir: impl Into<PathBuf>, storage_dir: impl Into<PathBuf>) -> Self {
    Self {
      bundle_dir: bundle_dir.into(),
      storage_dir: storage_dir.into(),
      materialized: Mutex::new(HashMap::new()),
    }
  }

  pub fn bundle_dir(&self) -> &Path {
    &self.bundle_dir
  }

  pub fn storage_dir(&self) -> &Path {
    &self.storage_dir
  }

  fn validate_name(name: &str) -> Result<(), AssetError> {
    let path = Path::new(name);
    let valid = !name.is_empty()
      && path
        .components()
        .all(|component| matches!(component, Component::Normal(_)));
    if !valid {
      error!("无效的资源名称: {}", name);
      return Err(AssetError::InvalidName(name.to_string()));
    }
    Ok(())
  }

  pub fn is_materialized(&self, name: &str) -> bool {
    self
      .materialized
      .lock()
      .map(|map| map.contains_key(name))
      .unwrap_or(false)
  }

  /// 返回资源在可写目录中的路径，首次访问时从资源包复制
  pub fn materialize(&self, name: &str) -> Result<PathBuf, AssetError> {
    Self::validate_name(name)?;

    let mut materialized = self
      .materialized
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(path) = materialized.get(name) {
      debug!("资源已落盘: {} -> {}", name, path.display());
      return Ok(path.clone());
    }

    let source = self.bundle_dir.join(name);
    if !source.is_file() {
      error!("资源包中不存在: {}", source.display());
      return Err(AssetError::NotFound(name.to_string()));
    }

    let target = self.storage_dir.join(name);
    if let Some(parent) = target.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    let size = std::fs::copy(&source, &target)?;
    info!(
      "复制资源 {} -> {} ({:.2} KB)",
      source.display(),
      target.display(),
      size as f64 / 1024.0
    );

    materialized.insert(name.to_string(), target.clone());
    Ok(target)
  }

  /// 解析 `asset:///<name>` 形式的地址
  pub fn resolve_url(&self, url: &Url) -> Result<PathBuf, AssetError> {
    let name = asset_name(url)?;
    self.materialize(&name)
  }
}

pub fn asset_name(url: &Url) -> Result<String, AssetError> {
  if url.scheme() != ASSET_SCHEME {
    return Err(AssetError::SchemeMismatch(format!(
      "期望资源方案 '{}', 实际方案 '{}'",
      ASSET_SCHEME,
      url.scheme()
    )));
  }

  let path = url.path().trim_start_matches('/');
  let name = match url.host_str() {
    Some(host) if !host.is_empty() && !path.is_empty() => format!("{}/{}", host, path),
    Some(host) if !host.is_empty() => host.to_string(),
    _ => path.to_string(),
  };
  Ok(name)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_asset_urls() {
    let url = Url::parse("asset:///models/net.onnx").unwrap();
    assert_eq!(asset_name(&url).unwrap(), "models/net.onnx");
    let url = Url::parse("asset://car.jpeg").unwrap();
    assert_eq!(asset_name(&url).unwrap(), "car.jpeg");
    let url = Url::parse("image:///car.jpeg").unwrap();
    assert!(matches!(asset_name(&url), Err(AssetError::SchemeMismatch(_))));
  }

  #[test]
  fn rejects_escaping_names() {
    assert!(AssetStore::validate_name("../secret").is_err());
    assert!(AssetStore::validate_name("/etc/passwd").is_err());
    assert!(AssetStore::validate_name("").is_err());
    assert!(AssetStore::validate_name("labels.txt").is_ok());
  }
}
