//! Settings file – reads/writes `~/.fllnav/config.toml`.

use fllnav_runtime::NavConfig;
use fllnav_types::Pose;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Where the simulated robot starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartPose {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

impl Default for StartPose {
    fn default() -> Self {
        Self {
            x: 200.0,
            y: 200.0,
            heading: 0.0,
        }
    }
}

impl From<StartPose> for Pose {
    fn from(s: StartPose) -> Self {
        Pose::new(s.x, s.y, s.heading)
    }
}

/// Which optional sensors the simulated robot carries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorSetup {
    pub heading_sensor: bool,
    pub landmark_sensor: bool,
    pub distance_sensor: bool,
}

impl Default for SensorSetup {
    fn default() -> Self {
        Self {
            heading_sensor: true,
            landmark_sensor: true,
            distance_sensor: true,
        }
    }
}

/// Persisted user configuration stored in `~/.fllnav/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub start: StartPose,

    #[serde(default)]
    pub sensors: SensorSetup,

    /// Estimator, planner, navigator and orchestrator tunables.
    #[serde(default)]
    pub nav: NavConfig,
}

/// Return the path to `~/.fllnav/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".fllnav").join("config.toml")
}

/// Load the config from disk and apply environment overrides.  Returns
/// `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    let Some(mut cfg) = load_from(&config_path())? else {
        return Ok(None);
    };
    apply_env_overrides(&mut cfg);
    cfg.nav.validate().map_err(|e| e.to_string())?;
    Ok(Some(cfg))
}

/// Load and validate the file at `path` as written.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    cfg.nav.validate().map_err(|e| e.to_string())?;
    Ok(Some(cfg))
}

/// Apply `FLLNAV_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `FLLNAV_SEED` | `nav.localization.seed` |
/// | `FLLNAV_PARTICLES` | `nav.localization.particle_count` |
/// | `FLLNAV_CELL_SIZE` | `nav.planner.cell_size` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("FLLNAV_SEED")
        && let Ok(seed) = v.parse::<u64>()
    {
        cfg.nav.localization.seed = Some(seed);
    }
    if let Ok(v) = std::env::var("FLLNAV_PARTICLES")
        && let Ok(n) = v.parse::<usize>()
    {
        cfg.nav.localization.particle_count = n;
    }
    if let Ok(v) = std::env::var("FLLNAV_CELL_SIZE")
        && let Ok(size) = v.parse::<f64>()
    {
        cfg.nav.planner.cell_size = size;
    }
}

/// Save the config to disk, creating `~/.fllnav/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fllnav_types::Obstacle;

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .expect("dir metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn roundtrip_customised_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let mut cfg = Config::default();
        cfg.start = StartPose {
            x: 150.0,
            y: 900.0,
            heading: 270.0,
        };
        cfg.sensors.landmark_sensor = false;
        cfg.sensors.distance_sensor = false;
        cfg.nav.planner.obstacles.push(Obstacle::new(500.0, 500.0, 100.0, 200.0));
        cfg.nav.planner.field_margin = 50.0;
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn sparse_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[start]\nx = 600.0\n\n[nav.runner]\nloop_period_ms = 5\n").unwrap();

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.start.x, 600.0);
        assert_eq!(loaded.start.y, 200.0);
        assert_eq!(loaded.nav.runner.loop_period_ms, 5);
        assert_eq!(loaded.nav.runner.odometry_interval_ms, 20);
        assert!(loaded.sensors.heading_sensor);
    }

    #[test]
    fn invalid_values_are_rejected_on_load() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[nav.planner]\ncell_size = 0.0\n").unwrap();
        let err = load_from(&path).unwrap_err();
        assert!(err.contains("cell_size"), "{err}");
    }

    #[test]
    fn config_path_points_to_fllnav_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".fllnav"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn apply_env_overrides_sets_and_ignores() {
        // SAFETY: no other test in this crate touches FLLNAV_* variables.
        unsafe {
            std::env::set_var("FLLNAV_SEED", "1234");
            std::env::set_var("FLLNAV_PARTICLES", "40");
            std::env::set_var("FLLNAV_CELL_SIZE", "not-a-number");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.nav.localization.seed, Some(1234));
        assert_eq!(cfg.nav.localization.particle_count, 40);
        assert_eq!(cfg.nav.planner.cell_size, 50.0);

        unsafe { std::env::set_var("FLLNAV_CELL_SIZE", "25") };
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.nav.planner.cell_size, 25.0);

        unsafe {
            std::env::remove_var("FLLNAV_SEED");
            std::env::remove_var("FLLNAV_PARTICLES");
            std::env::remove_var("FLLNAV_CELL_SIZE");
        }
    }
}
