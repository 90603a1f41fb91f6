use crate::OdometryError;
use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path};
use vo_core::nalgebra::{Point2, Vector2};
use vo_pinhole::{BrownConrady, CameraIntrinsics, PinholeCamera};

/// Camera calibration as it appears in a settings document.
///
/// Keys may be written bare (`fx`) or with the `Camera.` prefix (`Camera.fx`).
/// Distortion coefficients that are left out are zero.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSettings {
    #[serde(alias = "Camera.width")]
    pub width: u32,
    #[serde(alias = "Camera.height")]
    pub height: u32,
    #[serde(alias = "Camera.fx")]
    pub fx: f64,
    #[serde(alias = "Camera.fy")]
    pub fy: f64,
    #[serde(alias = "Camera.cx")]
    pub cx: f64,
    #[serde(alias = "Camera.cy")]
    pub cy: f64,
    #[serde(default, alias = "Camera.k1")]
    pub k1: f64,
    #[serde(default, alias = "Camera.k2")]
    pub k2: f64,
    #[serde(default, alias = "Camera.p1")]
    pub p1: f64,
    #[serde(default, alias = "Camera.p2")]
    pub p2: f64,
}

impl CameraSettings {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, OdometryError> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn from_json(json: &str) -> Result<Self, OdometryError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn intrinsics(&self) -> CameraIntrinsics {
        CameraIntrinsics::identity()
            .focals(Vector2::new(self.fx, self.fy))
            .principal_point(Point2::new(self.cx, self.cy))
    }

    pub fn distortion(&self) -> BrownConrady {
        BrownConrady::new(self.k1, self.k2, self.p1, self.p2)
    }

    /// Builds the camera model, rejecting focal lengths that are not positive.
    pub fn camera(&self) -> Result<PinholeCamera, OdometryError> {
        let focals_valid = [self.fx, self.fy]
            .iter()
            .all(|focal| focal.is_finite() && *focal > 0.0);
        if !focals_valid {
            return Err(OdometryError::InvalidCalibration(format!(
                "focal lengths must be positive, got fx = {} and fy = {}",
                self.fx, self.fy
            )));
        }
        PinholeCamera::new(self.intrinsics(), self.distortion()).ok_or_else(|| {
            OdometryError::InvalidCalibration("intrinsic matrix is singular".to_owned())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vo_core::{CameraModel, KeyPoint};

    const KITTI: &str = r#"{
        "Camera.width": 1241,
        "Camera.height": 376,
        "Camera.fx": 718.856,
        "Camera.fy": 718.856,
        "Camera.cx": 607.1928,
        "Camera.cy": 185.2157,
        "Camera.k1": 0.0,
        "Camera.k2": 0.0,
        "Camera.p1": 0.0,
        "Camera.p2": 0.0
    }"#;

    #[test]
    fn prefixed_keys() {
        let settings = CameraSettings::from_json(KITTI).unwrap();
        assert_eq!(settings.width, 1241);
        assert_eq!(settings.cx, 607.1928);
        let camera = settings.camera().unwrap();
        assert!(!camera.is_distorted());
        let principal = camera.unproject(KeyPoint::new(607.1928, 185.2157));
        assert!(principal.0.coords.norm() < 1e-12);
    }

    #[test]
    fn bare_keys_and_missing_distortion() {
        let settings = CameraSettings::from_json(
            r#"{ "width": 640, "height": 480, "fx": 500, "fy": 500, "cx": 320, "cy": 240, "k1": -0.2 }"#,
        )
        .unwrap();
        assert_eq!(settings.k2, 0.0);
        assert!(settings.camera().unwrap().is_distorted());
    }

    #[test]
    fn zero_focal_length_is_rejected() {
        let settings = CameraSettings::from_json(
            r#"{ "width": 640, "height": 480, "fx": 0, "fy": 500, "cx": 320, "cy": 240 }"#,
        )
        .unwrap();
        assert!(matches!(
            settings.camera(),
            Err(OdometryError::InvalidCalibration(_))
        ));
    }
}
