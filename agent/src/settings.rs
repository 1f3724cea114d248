use crate::error::SettingsError;
use common::scene::LayerMask;
use serde::{Deserialize, Serialize};
use std::{fs, io::prelude::*, path::Path};
use tracing::{error, warn};
use vek::*;

/// How the walker body follows the ground normal.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum BodyTilt {
    Off,
    Instant,
    /// Bounded by a maximum angular speed in radians per second.
    Smooth { max_speed: f32 },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkerSettings {
    pub active: bool,
    /// Seconds between entering a moving state and the first step.
    pub settle_delay: f32,
    pub step_duration: f32,
    /// Planar distance from its home anchor past which a leg steps.
    pub max_home_distance: f32,
    /// Fraction of the stepping distance the foot lands past its home.
    pub overshoot: f32,
    pub step_ease: bool,
    /// Step duration is divided by this while sprinting.
    pub sprint_multiplier: f32,
    /// Height above a point that ground probes start from.
    pub ground_probe_height: f32,
    pub ground_mask: LayerMask,
    /// Pin leg targets with position anchors while they are not stepping.
    pub anchor_legs: bool,
    /// Height of the body above the average foot position.
    pub body_offset: f32,
    pub body_tilt: BodyTilt,
    pub idle_axis: Vec3<f32>,
    pub idle_amplitude: f32,
    pub idle_frequency: f32,
}

impl Default for WalkerSettings {
    fn default() -> Self {
        Self {
            active: true,
            settle_delay: 0.5,
            step_duration: 0.15,
            max_home_distance: 0.6,
            overshoot: 0.5,
            step_ease: false,
            sprint_multiplier: 2.0,
            ground_probe_height: 2.0,
            ground_mask: LayerMask::ALL,
            anchor_legs: true,
            body_offset: 0.5,
            body_tilt: BodyTilt::Off,
            idle_axis: Vec3::unit_z(),
            idle_amplitude: 0.3,
            idle_frequency: 1.5,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    pub active: bool,
    /// Units per second at full input.
    pub movement_speed: f32,
    /// Radians per second at full turn input.
    pub rotation_speed: f32,
    pub sprint_multiplier: f32,
    /// Local height of the body above the root.
    pub body_offset: f32,
    pub ground_mask: LayerMask,
    pub rotate_to_plane_normal: bool,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            active: true,
            movement_speed: 2.0,
            rotation_speed: 1.2,
            sprint_multiplier: 2.0,
            body_offset: 0.5,
            ground_mask: LayerMask::ALL,
            rotate_to_plane_normal: false,
        }
    }
}

/// Which state the tracker idles in while it has no target.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackerMode {
    /// Waits still until something enters its area.
    Focus,
    /// Sweeps its neck from side to side until it sees something.
    Scan,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchStrategy {
    /// First detection layer hit along a fixed fan of rays.
    RaycastFan,
    /// Nearest visible member of the trigger volume.
    NearestInVolume,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    pub active: bool,
    pub mode: TrackerMode,
    pub search: SearchStrategy,
    pub detection_layer: String,
    pub detection_range: f32,
    /// Local axis the neck turns about.
    pub neck_axis: Vec3<f32>,
    /// Local axis the head tilts about.
    pub head_axis: Vec3<f32>,
    /// Local direction both bones look along at rest.
    pub aim: Vec3<f32>,
    /// Degrees either side of rest.
    pub neck_bound: f32,
    pub head_bound: f32,
    pub side_search_duration: f32,
    pub refresh_interval: f32,
    pub bounds_check_interval: f32,
    pub reset_duration: f32,
    /// Seconds a lost target has to come back before the bones reset.
    pub lost_grace: f32,
    pub ease: bool,
    /// Return to the rest pose when switched off.
    pub rest_when_off: bool,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            active: true,
            mode: TrackerMode::Scan,
            search: SearchStrategy::RaycastFan,
            detection_layer: "Detectable".to_owned(),
            detection_range: 10.0,
            neck_axis: Vec3::unit_z(),
            head_axis: Vec3::unit_x(),
            aim: Vec3::unit_y(),
            neck_bound: 60.0,
            head_bound: 80.0,
            side_search_duration: 5.0,
            refresh_interval: 0.3,
            bounds_check_interval: 0.2,
            reset_duration: 2.0,
            lost_grace: 3.0,
            ease: false,
            rest_when_off: true,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub walker: WalkerSettings,
    pub controller: ControllerSettings,
    pub tracker: TrackerSettings,
}

impl Settings {
    /// Loads settings from `path`, writing the defaults there if the file
    /// does not exist yet.
    pub fn load(path: &Path) -> Self {
        if let Ok(file) = fs::File::open(path) {
            match ron::de::from_reader(file) {
                Ok(x) => x,
                Err(e) => {
                    warn!(?e, ?path, "Failed to parse setting file! Fallback to default.");
                    Self::default()
                },
            }
        } else {
            let default_settings = Self::default();

            if let Err(e) = default_settings.save_to_file(path) {
                error!(?e, ?path, "Failed to create default setting file!");
            }
            default_settings
        }
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let s = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        let mut config_file = fs::File::create(path)?;
        config_file.write_all(s.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_fills_in_defaults() {
        let settings: Settings =
            ron::de::from_str("(tracker: (mode: Focus, search: NearestInVolume, neck_bound: 45.0))")
                .unwrap();
        assert_eq!(settings.tracker.mode, TrackerMode::Focus);
        assert_eq!(settings.tracker.search, SearchStrategy::NearestInVolume);
        assert_eq!(settings.tracker.neck_bound, 45.0);
        assert_eq!(settings.tracker.head_bound, 80.0);
        assert_eq!(settings.walker.max_home_distance, 0.6);
    }

    #[test]
    fn saved_settings_load_back() {
        let dir = std::env::temp_dir().join(format!("skitter-settings-{}", std::process::id()));
        let path = dir.join("settings.ron");
        let mut settings = Settings::default();
        settings.walker.body_tilt = BodyTilt::Smooth { max_speed: 2.0 };
        settings.save_to_file(&path).unwrap();

        let loaded = Settings::load(&path);
        assert_eq!(loaded.walker.body_tilt, BodyTilt::Smooth { max_speed: 2.0 });
        fs::remove_dir_all(dir).unwrap();
    }
}
