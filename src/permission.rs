// 该文件是 Kanjian （看见） 项目的一部分。
// src/permission.rs - 相机权限
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionState {
  #[default]
  Undetermined,
  Granted,
  Denied,
}

impl PermissionState {
  pub fn is_granted(self) -> bool {
    self == PermissionState::Granted
  }
}

pub trait PermissionProvider {
  fn status(&self) -> PermissionState;
  fn request(&mut self) -> PermissionState;
}

/// 固定应答的权限提供者；未请求前状态为 `Undetermined`
#[derive(Debug, Clone)]
pub struct StaticPermission {
  answer: PermissionState,
  state: PermissionState,
}

impl StaticPermission {
  pub fn new(grant: bool) -> Self {
    Self {
      answer: if grant {
        PermissionState::Granted
      } else {
        PermissionState::Denied
      },
      state: PermissionState::Undetermined,
    }
  }

  pub fn granted() -> Self {
    let mut permission = Self::new(true);
    permission.state = PermissionState::Granted;
    permission
  }
}

impl PermissionProvider for StaticPermission {
  fn status(&self) -> PermissionState {
    self.state
  }

  fn request(&mut self) -> PermissionState {
    self.state = self.answer;
    match self.state {
      PermissionState::Granted => info!("相机权限已授予"),
      _ => warn!("相机权限被拒绝"),
    }
    self.state
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn undetermined_until_requested() {
    let mut permission = StaticPermission::new(false);
    assert_eq!(permission.status(), PermissionState::Undetermined);
    assert_eq!(permission.request(), PermissionState::Denied);
    assert_eq!(permission.status(), PermissionState::Denied);
  }
}
