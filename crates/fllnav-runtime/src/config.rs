//! [`NavConfig`] – the complete set of tunables for one robot session.
//!
//! Every section defaults sensibly, so an empty document is a valid
//! configuration:
//!
//! ```rust
//! use fllnav_runtime::config::NavConfig;
//!
//! let config: NavConfig = serde_json::from_str("{}").unwrap();
//! assert_eq!(config, NavConfig::default());
//! config.validate().unwrap();
//! ```

use fllnav_perception::localization::LocalizerConfig;
use fllnav_perception::planner::PlannerConfig;
use fllnav_types::{FieldBounds, Landmark, LandmarkMap, NavError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::navigator::NavigatorConfig;
use crate::runner::RunnerConfig;

/// Field geometry and the landmark map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct FieldConfig {
    /// Field size along X (mm).
    pub width: f64,
    /// Field size along Y (mm).
    pub height: f64,
    /// Explicit landmark list; the standard boundary markers and coloured
    /// zones for the field size when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landmarks: Option<Vec<Landmark>>,
}

impl Default for FieldConfig {
    fn default() -> Self {
        let bounds = FieldBounds::default();
        Self {
            width: bounds.width,
            height: bounds.height,
            landmarks: None,
        }
    }
}

impl FieldConfig {
    pub fn bounds(&self) -> FieldBounds {
        FieldBounds::new(self.width, self.height)
    }

    pub fn landmark_map(&self) -> LandmarkMap {
        match &self.landmarks {
            Some(landmarks) => LandmarkMap::new(landmarks.clone()),
            None => LandmarkMap::standard(self.width, self.height),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct NavConfig {
    pub field: FieldConfig,
    pub localization: LocalizerConfig,
    pub planner: PlannerConfig,
    pub navigator: NavigatorConfig,
    pub runner: RunnerConfig,
}

impl NavConfig {
    /// Check every section; the first problem found is returned as
    /// [`NavError::Configuration`].
    pub fn validate(&self) -> Result<(), NavError> {
        self.field.bounds().validate()?;
        if let Some(landmarks) = &self.field.landmarks
            && let Some(bad) = landmarks.iter().find(|l| !(l.x.is_finite() && l.y.is_finite()))
        {
            return Err(NavError::Configuration(format!("landmark has non-finite position: {bad:?}")));
        }
        self.localization.validate()?;
        self.planner.validate()?;
        self.navigator.validate()?;
        self.runner.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fllnav_types::LandmarkReading;

    #[test]
    fn default_config_is_valid() {
        NavConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_zero_cell_size() {
        let mut config = NavConfig::default();
        config.planner.cell_size = 0.0;
        assert!(matches!(config.validate(), Err(NavError::Configuration(_))));
    }

    #[test]
    fn rejects_particle_count_out_of_range() {
        for count in [0, 29, 101, 500] {
            let mut config = NavConfig::default();
            config.localization.particle_count = count;
            assert!(matches!(config.validate(), Err(NavError::Configuration(_))), "{count}");
        }
        let mut config = NavConfig::default();
        config.localization.particle_count = 30;
        config.validate().unwrap();
    }

    #[test]
    fn rejects_bad_field() {
        let mut config = NavConfig::default();
        config.field.width = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let config: NavConfig = serde_json::from_str(r#"{"planner":{"cell_size":25.0},"field":{"width":2400.0}}"#).unwrap();
        assert_eq!(config.planner.cell_size, 25.0);
        assert!(config.planner.smooth_paths);
        assert_eq!(config.field.bounds(), FieldBounds::new(2400.0, 1200.0));
        assert_eq!(config.localization, LocalizerConfig::default());
    }

    #[test]
    fn explicit_landmarks_replace_standard_map() {
        let mut field = FieldConfig::default();
        assert!(!field.landmark_map().is_empty());
        field.landmarks = Some(vec![Landmark::zone(100.0, 100.0, LandmarkReading::Red)]);
        assert_eq!(field.landmark_map().landmarks().len(), 1);
    }
}
