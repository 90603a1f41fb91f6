use crate::OdometryError;
use klt::{GoodFeatures, LucasKanade, ShiTomasiTracker};
use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path};

/// The settings for the odometry process.
///
/// Every field has a default, so a settings file only needs to mention what it changes.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct OdometrySettings {
    /// Motions whose ground truth length is not above this are treated as noise.
    #[serde(default = "default_absolute_scale_threshold")]
    pub absolute_scale_threshold: f64,
    /// The Sampson distance in normalized coordinates under which a match is an inlier
    #[serde(default = "default_ransac_threshold")]
    pub ransac_threshold: f64,
    /// The confidence at which sample consensus stops drawing samples
    #[serde(default = "default_ransac_probability")]
    pub ransac_probability: f64,
    /// The most samples sample consensus will draw
    #[serde(default = "default_ransac_max_iterations")]
    pub ransac_max_iterations: usize,
    /// Frames with fewer correspondences than this stall without estimating a pose.
    #[serde(default = "default_min_correspondences")]
    pub min_correspondences: usize,
    /// When fewer keypoints than this survive tracking, detection runs again.
    #[serde(default = "default_target_features")]
    pub target_features: usize,
    /// The SVD epsilon used when decomposing an essential matrix
    #[serde(default = "default_essential_epsilon")]
    pub essential_epsilon: f64,
    /// The SVD iteration cap used when decomposing an essential matrix
    #[serde(default = "default_essential_iterations")]
    pub essential_iterations: usize,
    #[serde(default)]
    pub tracker: TrackerSettings,
}

impl OdometrySettings {
    /// Reads settings from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, OdometryError> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Reads settings from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, OdometryError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for OdometrySettings {
    fn default() -> Self {
        Self {
            absolute_scale_threshold: default_absolute_scale_threshold(),
            ransac_threshold: default_ransac_threshold(),
            ransac_probability: default_ransac_probability(),
            ransac_max_iterations: default_ransac_max_iterations(),
            min_correspondences: default_min_correspondences(),
            target_features: default_target_features(),
            essential_epsilon: default_essential_epsilon(),
            essential_iterations: default_essential_iterations(),
            tracker: TrackerSettings::default(),
        }
    }
}

fn default_absolute_scale_threshold() -> f64 {
    0.1
}

fn default_ransac_threshold() -> f64 {
    0.0003
}

fn default_ransac_probability() -> f64 {
    0.999
}

fn default_ransac_max_iterations() -> usize {
    1000
}

fn default_min_correspondences() -> usize {
    5
}

fn default_target_features() -> usize {
    2000
}

fn default_essential_epsilon() -> f64 {
    1e-12
}

fn default_essential_iterations() -> usize {
    1000
}

/// The settings for corner detection and optical flow.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerSettings {
    /// The most corners a detection returns
    #[serde(default = "default_num_features")]
    pub num_features: usize,
    /// The fraction of the strongest corner response a corner must exceed
    #[serde(default = "default_quality_level")]
    pub quality_level: f32,
    /// The minimum pixel distance between detected corners
    #[serde(default = "default_min_distance")]
    pub min_distance: f32,
    /// The side of the neighborhood summed for the corner response
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    /// The side of the optical flow search window
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// The coarsest pyramid level used by optical flow, at least 3
    #[serde(default = "default_pyramid_levels")]
    pub pyramid_levels: usize,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_epsilon")]
    pub epsilon: f32,
    #[serde(default = "default_min_eigen_threshold")]
    pub min_eigen_threshold: f32,
}

impl TrackerSettings {
    pub const MIN_PYRAMID_LEVELS: usize = 3;

    pub fn detector(&self) -> GoodFeatures {
        GoodFeatures {
            num_features: self.num_features,
            quality_level: self.quality_level,
            min_distance: self.min_distance,
            block_size: self.block_size,
        }
    }

    pub fn flow(&self) -> LucasKanade {
        LucasKanade {
            window_size: self.window_size,
            max_level: self.pyramid_levels.max(Self::MIN_PYRAMID_LEVELS),
            max_iterations: self.max_iterations,
            epsilon: self.epsilon,
            min_eigen_threshold: self.min_eigen_threshold,
        }
    }

    pub fn tracker(&self) -> ShiTomasiTracker {
        ShiTomasiTracker::new(self.detector(), self.flow())
    }
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            num_features: default_num_features(),
            quality_level: default_quality_level(),
            min_distance: default_min_distance(),
            block_size: default_block_size(),
            window_size: default_window_size(),
            pyramid_levels: default_pyramid_levels(),
            max_iterations: default_max_iterations(),
            epsilon: default_epsilon(),
            min_eigen_threshold: default_min_eigen_threshold(),
        }
    }
}

fn default_num_features() -> usize {
    2000
}

fn default_quality_level() -> f32 {
    0.01
}

fn default_min_distance() -> f32 {
    3.0
}

fn default_block_size() -> usize {
    5
}

fn default_window_size() -> usize {
    21
}

fn default_pyramid_levels() -> usize {
    3
}

fn default_max_iterations() -> usize {
    30
}

fn default_epsilon() -> f32 {
    0.01
}

fn default_min_eigen_threshold() -> f32 {
    1e-4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_documents_keep_defaults() {
        let settings = OdometrySettings::from_json(
            r#"{ "absolute_scale_threshold": 0.5, "tracker": { "num_features": 300 } }"#,
        )
        .unwrap();
        assert_eq!(settings.absolute_scale_threshold, 0.5);
        assert_eq!(settings.ransac_threshold, 0.0003);
        assert_eq!(settings.tracker.num_features, 300);
        assert_eq!(settings.tracker.window_size, 21);
    }

    #[test]
    fn empty_document_is_default() {
        assert_eq!(
            OdometrySettings::from_json("{}").unwrap(),
            OdometrySettings::default()
        );
    }

    #[test]
    fn shallow_pyramids_are_deepened() {
        let settings = TrackerSettings {
            pyramid_levels: 1,
            ..Default::default()
        };
        assert_eq!(settings.flow().max_level, 3);
    }

    #[test]
    fn malformed_documents_are_errors() {
        assert!(matches!(
            OdometrySettings::from_json("{ \"ransac_threshold\": \"tiny\" }"),
            Err(OdometryError::Settings(_))
        ));
    }
}
