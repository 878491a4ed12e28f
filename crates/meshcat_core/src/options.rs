//! Import configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading options.
#[derive(Error, Debug)]
pub enum OptionsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid options JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{field} must be a positive number, got {value}")]
    NonPositiveFps { field: &'static str, value: f64 },
}

/// Result type for option loading.
pub type OptionsResult<T> = Result<T, OptionsError>;

/// Settings for turning a scene graph into exportable objects.
///
/// Every field has a default, so a config file only needs the fields it
/// changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    /// Overrides the frame rate found in the recording
    pub recording_fps: Option<f64>,
    pub target_fps: f64,
    pub start_frame: i64,
    /// Resample to `target_fps`; when false, keyframes keep their own
    /// times, converted to target frames
    pub downsample: bool,
    /// Paths under these prefixes are never exported
    pub excluded_prefixes: Vec<String>,
    /// Animated nodes under this prefix define the scene frame range
    pub illustration_prefix: String,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            recording_fps: None,
            target_fps: 30.0,
            start_frame: 0,
            downsample: true,
            excluded_prefixes: vec![
                "/drake/contact_forces/".to_string(),
                "/drake/proximity/".to_string(),
                "/drake/inertia/".to_string(),
            ],
            illustration_prefix: "/drake/illustration/".to_string(),
        }
    }
}

impl ImportOptions {
    pub fn from_json_str(text: &str) -> OptionsResult<Self> {
        let options: Self = serde_json::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> OptionsResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Reject frame rates that would divide by zero or reverse time.
    pub fn validate(&self) -> OptionsResult<()> {
        let positive = |f: f64| f.is_finite() && f > 0.0;
        if !positive(self.target_fps) {
            return Err(OptionsError::NonPositiveFps {
                field: "target_fps",
                value: self.target_fps,
            });
        }
        match self.recording_fps {
            Some(value) if !positive(value) => Err(OptionsError::NonPositiveFps {
                field: "recording_fps",
                value,
            }),
            _ => Ok(()),
        }
    }

    /// Target frame rate, or the default if this one is unusable.
    pub fn target_fps_or_default(&self) -> f64 {
        if self.target_fps.is_finite() && self.target_fps > 0.0 {
            self.target_fps
        } else {
            log::warn!(
                "target_fps {} is not positive; using {}",
                self.target_fps,
                Self::default().target_fps
            );
            Self::default().target_fps
        }
    }

    /// Recording frame rate to use, given the one the scene declares.
    pub fn recording_fps_or(&self, scene_fps: f64) -> f64 {
        self.recording_fps.filter(|f| *f > 0.0).unwrap_or(scene_fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let opts = ImportOptions::from_json_str(r#"{"target_fps": 24, "start_frame": 1}"#).unwrap();
        assert_eq!(opts.target_fps, 24.0);
        assert_eq!(opts.start_frame, 1);
        assert!(opts.downsample);
        assert_eq!(opts.excluded_prefixes.len(), 3);
        assert_eq!(opts.recording_fps_or(64.0), 64.0);
    }

    #[test]
    fn test_recording_fps_override() {
        let opts = ImportOptions::from_json_str(r#"{"recording_fps": 1000.0}"#).unwrap();
        assert_eq!(opts.recording_fps_or(64.0), 1000.0);
    }

    #[test]
    fn test_non_positive_fps_rejected() {
        for text in [r#"{"target_fps": 0}"#, r#"{"target_fps": -24}"#] {
            assert!(matches!(
                ImportOptions::from_json_str(text),
                Err(OptionsError::NonPositiveFps { field: "target_fps", .. })
            ));
        }
        assert!(matches!(
            ImportOptions::from_json_str(r#"{"recording_fps": 0}"#),
            Err(OptionsError::NonPositiveFps { field: "recording_fps", .. })
        ));

        let opts = ImportOptions {
            target_fps: 0.0,
            ..Default::default()
        };
        assert!(opts.validate().is_err());
        assert_eq!(opts.target_fps_or_default(), 30.0);
        assert!(ImportOptions::default().validate().is_ok());
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(
            ImportOptions::from_json_str("{target_fps: }"),
            Err(OptionsError::Json(_))
        ));
        assert!(matches!(
            ImportOptions::from_path("/nonexistent/options.json"),
            Err(OptionsError::Io(_))
        ));
    }
}
