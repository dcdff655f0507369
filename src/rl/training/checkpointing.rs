//! Model Checkpointing
//!
//! Save and load policy weights and optimizer state side by side:
//! `<base>.mpk` holds the network and `<base>_optim.mpk` the optimizer.

use std::fs;
use std::path::{Path, PathBuf};

use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Record, Recorder};
use tracing::info;

use crate::error::Result;

const EXTENSION: &str = "mpk";

type MpkRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// Checkpoint location for one agent
#[derive(Debug, Clone)]
pub struct Checkpointer {
    base: PathBuf,
}

impl Checkpointer {
    /// `base` may be given with or without the `.mpk` extension
    pub fn new<P: AsRef<Path>>(base: P) -> Self {
        let mut base = base.as_ref().to_path_buf();
        if base.extension().is_some_and(|ext| ext == EXTENSION) {
            base.set_extension("");
        }
        Self { base }
    }

    /// Network weights file
    pub fn model_path(&self) -> PathBuf {
        self.base.with_extension(EXTENSION)
    }

    /// Optimizer state file
    pub fn optimizer_path(&self) -> PathBuf {
        let mut name = self
            .base
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!("_optim.{}", EXTENSION));
        self.base.with_file_name(name)
    }

    /// Check if saved weights exist
    pub fn exists(&self) -> bool {
        self.model_path().exists()
    }

    pub fn has_optimizer_state(&self) -> bool {
        self.optimizer_path().exists()
    }

    /// Save a module
    pub fn save_module<B, M>(&self, model: &M) -> Result<PathBuf>
    where
        B: Backend,
        M: Module<B>,
    {
        self.ensure_parent()?;
        let path = self.model_path();
        model.clone().save_file(path.clone(), &MpkRecorder::new())?;
        info!("Saved checkpoint to {:?}", path);
        Ok(path)
    }

    /// Load weights into `model`
    pub fn load_module<B, M>(&self, model: M, device: &B::Device) -> Result<M>
    where
        B: Backend,
        M: Module<B>,
    {
        let loaded = model.load_file(self.model_path(), &MpkRecorder::new(), device)?;
        info!("Loaded checkpoint from {:?}", self.model_path());
        Ok(loaded)
    }

    /// Save an optimizer record
    pub fn save_optimizer<B, R>(&self, record: R) -> Result<PathBuf>
    where
        B: Backend,
        R: Record<B>,
    {
        self.ensure_parent()?;
        let path = self.optimizer_path();
        Recorder::<B>::record(&MpkRecorder::new(), record, path.clone())?;
        Ok(path)
    }

    /// Load an optimizer record
    pub fn load_optimizer<B, R>(&self, device: &B::Device) -> Result<R>
    where
        B: Backend,
        R: Record<B>,
    {
        let record = Recorder::<B>::load(&MpkRecorder::new(), self.optimizer_path(), device)?;
        Ok(record)
    }

    fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.base.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}
