//! Bundle list persistence: one pretty-printed JSON array in the app directory.

use crate::model::LaunchBundle;
use crate::settings::Settings;
use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};

pub const BUNDLES_FILE_NAME: &str = "launchers_config.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Keep existing bundles; add imported ones whose names are not taken.
    Merge,
    /// Discard existing bundles.
    Replace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub added: usize,
    pub ignored: usize,
    pub total: usize,
}

/// Store rooted at an app directory. Step fields missing on disk take the settings defaults.
#[derive(Debug, Clone)]
pub struct BundleStore {
    dir: PathBuf,
    defaults: Settings,
}

impl BundleStore {
    pub fn new(dir: impl Into<PathBuf>, defaults: Settings) -> Self {
        Self {
            dir: dir.into(),
            defaults,
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(BUNDLES_FILE_NAME)
    }

    /// Create the directory and an empty bundle list if none exists yet.
    pub fn ensure_initialized(&self) -> Result<()> {
        let path = self.path();
        if !path.exists() {
            self.save(&[])?;
            tracing::info!(path = %path.display(), "created empty bundle list");
        }
        Ok(())
    }

    /// Lenient read for display: missing or unreadable files load as an empty list.
    pub fn load(&self) -> Vec<LaunchBundle> {
        self.try_load().unwrap_or_else(|e| {
            tracing::warn!(path = %self.path().display(), error = %format!("{e:#}"), "ignoring unreadable bundle list");
            Vec::new()
        })
    }

    /// Strict read for anything that writes back. A missing file is an empty list; a file
    /// that exists but does not parse is an error, so it is never overwritten.
    pub fn try_load(&self) -> Result<Vec<LaunchBundle>> {
        let path = self.path();
        if !path.is_file() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&path)
            .with_context(|| format!("read {}", path.display()))?;
        self.parse(&data)
            .with_context(|| format!("bundle list {} is malformed; fix or remove it", path.display()))
    }

    pub fn save(&self, bundles: &[LaunchBundle]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("create {}", self.dir.display()))?;
        let path = self.path();
        let data = serde_json::to_string_pretty(bundles)?;
        std::fs::write(&path, data).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<LaunchBundle> {
        self.load().into_iter().find(|b| b.name == name)
    }

    /// Replace the first bundle with the same name, or append.
    pub fn upsert(&self, bundle: LaunchBundle) -> Result<()> {
        let mut bundles = self.try_load()?;
        match bundles.iter_mut().find(|b| b.name == bundle.name) {
            Some(slot) => *slot = bundle,
            None => bundles.push(bundle),
        }
        self.save(&bundles)
    }

    pub fn delete(&self, name: &str) -> Result<bool> {
        let mut bundles = self.try_load()?;
        let before = bundles.len();
        bundles.retain(|b| b.name != name);
        if bundles.len() == before {
            return Ok(false);
        }
        self.save(&bundles)?;
        Ok(true)
    }

    /// Import bundles from `file`. Every imported bundle must be valid, otherwise nothing
    /// is written.
    pub fn import(&self, file: &Path, mode: ImportMode) -> Result<ImportReport> {
        let data = std::fs::read_to_string(file)
            .with_context(|| format!("read {}", file.display()))?;
        let imported = self
            .parse(&data)
            .with_context(|| format!("parse {}", file.display()))?;
        for b in &imported {
            if let Err(reason) = b.validate() {
                bail!("malformed launcher in {}: {reason}", file.display());
            }
        }

        let incoming = imported.len();
        let (bundles, added) = match mode {
            ImportMode::Replace => (imported, incoming),
            ImportMode::Merge => {
                let mut bundles = self.try_load()?;
                let existing: std::collections::HashSet<String> =
                    bundles.iter().map(|b| b.name.clone()).collect();
                let fresh: Vec<_> = imported
                    .into_iter()
                    .filter(|b| !existing.contains(&b.name))
                    .collect();
                let added = fresh.len();
                bundles.extend(fresh);
                (bundles, added)
            }
        };
        self.save(&bundles)?;
        tracing::info!(file = %file.display(), ?mode, added, "imported bundles");
        Ok(ImportReport {
            added,
            ignored: incoming - added,
            total: bundles.len(),
        })
    }

    pub fn export(&self, file: &Path) -> Result<usize> {
        let bundles = self.try_load()?;
        if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        std::fs::write(file, serde_json::to_string_pretty(&bundles)?)
            .with_context(|| format!("write {}", file.display()))?;
        Ok(bundles.len())
    }

    fn parse(&self, data: &str) -> Result<Vec<LaunchBundle>> {
        let mut root: Value = serde_json::from_str(data)?;
        let Some(items) = root.as_array_mut() else {
            bail!("root must be a list of launchers");
        };
        for item in items.iter_mut() {
            self.fill_step_defaults(item);
        }
        Ok(serde_json::from_value(root)?)
    }

    fn fill_step_defaults(&self, bundle: &mut Value) {
        let key = if bundle.get("paths").is_some() {
            "paths"
        } else {
            "steps"
        };
        let steps = bundle.get_mut(key).and_then(Value::as_array_mut);
        for step in steps.into_iter().flatten() {
            let Some(obj) = step.as_object_mut() else {
                continue;
            };
            obj.entry("delay")
                .or_insert_with(|| Value::from(self.defaults.default_delay));
            obj.entry("start_option")
                .or_insert_with(|| Value::from(self.defaults.default_window_state.as_str()));
        }
    }
}
