// 该文件是 Luoshuan （螺栓） 项目的一部分。
// src/registry.rs - 模型注册表
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

use std::path::Path;

use thiserror::Error;
use tracing::{error, info};

use crate::{config::ModelEntry, model::LoadedModel};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum LoadError {
  #[error("模型名称不能为空")]
  EmptyName,
  #[error("模型名称重复: {0}")]
  DuplicateName(String),
  #[error("无法加载模型 {name}: {reason}")]
  Model {
    name: String,
    #[source]
    reason: BoxError,
  },
}

/// 按注册顺序保存的模型
pub struct ModelRegistry<M> {
  models: Vec<(String, M)>,
}

impl<M> ModelRegistry<M> {
  /// 逐个加载，任意一个失败即整体失败
  pub fn try_from_entries<'a, I, F, E>(entries: I, mut loader: F) -> Result<Self, LoadError>
  where
    I: IntoIterator<Item = &'a ModelEntry>,
    F: FnMut(&ModelEntry) -> Result<M, E>,
    E: Into<BoxError>,
  {
    let mut models: Vec<(String, M)> = Vec::new();
    for entry in entries {
      if entry.name.trim().is_empty() {
        return Err(LoadError::EmptyName);
      }
      if models.iter().any(|(name, _)| *name == entry.name) {
        return Err(LoadError::DuplicateName(entry.name.clone()));
      }

      let model = loader(entry).map_err(|e| {
        let reason: BoxError = e.into();
        error!("模型 {} 加载失败: {}", entry.name, reason);
        LoadError::Model {
          name: entry.name.clone(),
          reason,
        }
      })?;
      info!("模型 {} 已注册", entry.name);
      models.push((entry.name.clone(), model));
    }
    Ok(ModelRegistry { models })
  }

  pub fn len(&self) -> usize {
    self.models.len()
  }

  pub fn is_empty(&self) -> bool {
    self.models.is_empty()
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.models.iter().map(|(name, _)| name.as_str())
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &M)> {
    self.models.iter().map(|(name, model)| (name.as_str(), model))
  }

  pub fn get(&self, name: &str) -> Option<&M> {
    self
      .models
      .iter()
      .find(|(n, _)| n == name)
      .map(|(_, model)| model)
  }
}

impl ModelRegistry<LoadedModel> {
  pub fn load(
    entries: &[ModelEntry],
    base_dir: &Path,
    pretrained_dir: &Path,
  ) -> Result<Self, LoadError> {
    info!("加载 {} 个模型", entries.len());
    Self::try_from_entries(entries, |entry| {
      LoadedModel::load(entry, base_dir, pretrained_dir)
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn entries(names: &[&str]) -> Vec<ModelEntry> {
    names
      .iter()
      .map(|n| ModelEntry::new(*n, format!("{}.onnx", n)))
      .collect()
  }

  #[test]
  fn keeps_registration_order() {
    let registry = ModelRegistry::try_from_entries(&entries(&["c", "a", "b"]), |e| {
      Ok::<_, std::io::Error>(e.name.len())
    })
    .unwrap();
    assert_eq!(registry.names().collect::<Vec<_>>(), ["c", "a", "b"]);
    assert_eq!(registry.len(), 3);
    assert_eq!(registry.get("a"), Some(&1));
    assert!(registry.get("z").is_none());
  }

  #[test]
  fn fails_fast_on_first_error() {
    let mut attempted = Vec::new();
    let result = ModelRegistry::try_from_entries(&entries(&["a", "broken", "c"]), |e| {
      attempted.push(e.name.clone());
      if e.name == "broken" {
        Err(std::io::Error::other("bad weights"))
      } else {
        Ok(())
      }
    });
    match result {
      Err(LoadError::Model { name, reason }) => {
        assert_eq!(name, "broken");
        assert_eq!(reason.to_string(), "bad weights");
      }
      _ => panic!("expected load error"),
    }
    assert_eq!(attempted, ["a", "broken"]);
  }

  #[test]
  fn rejects_duplicates() {
    let result = ModelRegistry::try_from_entries(&entries(&["a", "a"]), |_| {
      Ok::<_, std::io::Error>(())
    });
    assert!(matches!(result, Err(LoadError::DuplicateName(n)) if n == "a"));
  }

  #[test]
  fn load_reports_missing_weights() {
    let result = ModelRegistry::load(
      &[ModelEntry::new("YOLOv8", "/nonexistent/best.onnx")],
      Path::new(""),
      Path::new(""),
    );
    assert!(matches!(result, Err(LoadError::Model { name, .. }) if name == "YOLOv8"));
  }
}
