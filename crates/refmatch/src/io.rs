//! JSON configuration and report helpers for the recognition engine.

use std::{
    fs,
    path::{Path, PathBuf},
};

use nalgebra::Point3;
use refmatch_core::PinholeCamera;
use serde::{Deserialize, Serialize};

use crate::engine::{EngineParams, ScanStats};
use crate::library::TargetLibrary;
use crate::pose::RecognizedTarget;

#[derive(thiserror::Error, Debug)]
pub enum ConfigIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// One reference image on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferenceConfig {
    pub name: String,
    /// Image file; relative paths are resolved against the config directory.
    pub path: PathBuf,
    pub physical_width_m: f64,
}

/// Engine configuration: reference set, tuning and an optional camera.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub references: Vec<ReferenceConfig>,
    #[serde(default)]
    pub params: EngineParams,
    /// Camera used for depth; frames are scanned without depth when absent.
    #[serde(default)]
    pub camera: Option<PinholeCamera>,
    /// Default destination of the scan report; relative to the config
    /// directory when relative.
    #[serde(default)]
    pub output_path: Option<PathBuf>,
}

impl EngineConfig {
    /// Load a JSON config from disk and resolve reference paths against the
    /// directory that contains it.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigIoError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let mut cfg: Self = serde_json::from_str(&raw)?;
        if let Some(dir) = path.parent() {
            cfg.resolve_relative_to(dir);
        }
        Ok(cfg)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Prefix every relative reference path and the report path with `dir`.
    pub fn resolve_relative_to(&mut self, dir: &Path) {
        for r in &mut self.references {
            if r.path.is_relative() {
                r.path = dir.join(&r.path);
            }
        }
        if let Some(out) = self.output_path.as_mut() {
            if out.is_relative() {
                *out = dir.join(&*out);
            }
        }
    }
}

/// One enrolled variant in a catalog summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogEntry {
    pub name: String,
    pub image_id: usize,
    pub scale_power: i32,
    pub rotation_degrees: i32,
    pub raster_width: usize,
    pub raster_height: usize,
    pub keypoints: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogReport {
    pub targets: Vec<CatalogEntry>,
}

impl CatalogReport {
    pub fn from_library(library: &TargetLibrary) -> Self {
        let targets = library
            .targets()
            .iter()
            .map(|t| CatalogEntry {
                name: t.name.clone(),
                image_id: t.key.image_id,
                scale_power: t.key.scale_power,
                rotation_degrees: t.key.rotation_degrees,
                raster_width: t.raster_width,
                raster_height: t.raster_height,
                keypoints: t.total_count(),
            })
            .collect();
        Self { targets }
    }
}

/// Serializable copy of a [`RecognizedTarget`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecognitionReport {
    pub name: String,
    pub image_id: usize,
    pub scale_power: i32,
    pub rotation_degrees: i32,
    pub scale: f64,
    /// Top-left corner in working-resolution pixels.
    pub origin: [i32; 2],
    pub pixel_width: f64,
    pub pixel_height: f64,
    pub match_count: usize,
    pub target_total_count: usize,
    pub match_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world_position: Option<Point3<f64>>,
}

impl From<&RecognizedTarget> for RecognitionReport {
    fn from(r: &RecognizedTarget) -> Self {
        Self {
            name: r.target.name.clone(),
            image_id: r.target.key.image_id,
            scale_power: r.target.key.scale_power,
            rotation_degrees: r.target.key.rotation_degrees,
            scale: r.scale,
            origin: [r.origin.x, r.origin.y],
            pixel_width: r.pixel_width,
            pixel_height: r.pixel_height,
            match_count: r.match_count,
            target_total_count: r.target_total_count,
            match_rate: r.match_rate(),
            depth_m: r.depth_m,
            world_position: r.world_position,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrameReport {
    pub path: String,
    pub width: usize,
    pub height: usize,
    /// `None` when the scan found nothing.
    pub recognition: Option<RecognitionReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanReport {
    pub frames: Vec<FrameReport>,
    pub stats: ScanStats,
}

impl ScanReport {
    /// Write this report to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, ConfigIoError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
