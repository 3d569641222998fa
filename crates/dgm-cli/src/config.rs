//! Configuration file – reads/writes `~/.dynamic_graph_manager/config.toml`.
//!
//! ```toml
//! ws_port = 9090
//!
//! [robot]
//! publish_downsampling = 10
//!
//! [device]
//! name = "solo"
//!
//! [device.sensors.joint_positions]
//! size = 8
//!
//! [device.controls.ctrl_joint_torques]
//! size = 8
//!
//! [params]
//! "/dynamic_graph/log_dir" = "/data/traces"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use dgm_device::DeviceConfig;
use dgm_middleware::{DEVICE_NAME_PARAM, LOG_DIR_PARAM, StaticParamStore};
use dgm_robot::{RobotConfig, home_dir};
use serde::{Deserialize, Serialize};

/// Persisted configuration of the `dgm` binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Port of the WebSocket bridge; no bridge when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws_port: Option<u16>,

    /// Control period of the simulated loop, in milliseconds.
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,

    #[serde(default)]
    pub robot: RobotConfig,

    #[serde(default = "default_device")]
    pub device: DeviceConfig,

    /// Parameter table served to the robot.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

fn default_period_ms() -> u64 {
    1
}

fn default_device() -> DeviceConfig {
    DeviceConfig::default()
        .with_sensor("joint_positions", 2)
        .with_sensor("joint_velocities", 2)
        .with_control("ctrl_joint_torques", 2)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_port: None,
            period_ms: default_period_ms(),
            robot: RobotConfig::default(),
            device: default_device(),
            params: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Parameter store backed by the `[params]` table.
    pub fn param_store(&self) -> StaticParamStore {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
    }

    /// Device layout with the name taken from the `/dynamic_graph/device_name`
    /// parameter when present.
    pub fn device_config(&self) -> DeviceConfig {
        let mut device = self.device.clone();
        if let Some(name) = self.params.get(DEVICE_NAME_PARAM) {
            device.name = name.clone();
        }
        device
    }
}

/// Return the path to `~/.dynamic_graph_manager/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

pub(crate) fn config_path_for_home(home: &Path) -> PathBuf {
    home.join(".dynamic_graph_manager").join("config.toml")
}

/// Load the config from `path`.  Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `DGM_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `DGM_LOG_DIR` | `params["/dynamic_graph/log_dir"]` |
/// | `DGM_DEVICE_NAME` | `params["/dynamic_graph/device_name"]` |
/// | `DGM_WS_PORT` | `ws_port` |
/// | `DGM_PERIOD_MS` | `period_ms` |
/// | `DGM_TRACER_SIZE` | `robot.tracer_size` |
/// | `DGM_PUBLISH_DOWNSAMPLING` | `robot.publish_downsampling` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("DGM_LOG_DIR") {
        cfg.params.insert(LOG_DIR_PARAM.to_string(), v);
    }
    if let Ok(v) = std::env::var("DGM_DEVICE_NAME") {
        cfg.params.insert(DEVICE_NAME_PARAM.to_string(), v);
    }
    if let Ok(v) = std::env::var("DGM_WS_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.ws_port = Some(port);
    }
    if let Ok(v) = std::env::var("DGM_PERIOD_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.period_ms = ms;
    }
    if let Ok(v) = std::env::var("DGM_TRACER_SIZE")
        && let Ok(size) = v.parse::<usize>()
    {
        cfg.robot.tracer_size = size;
    }
    if let Ok(v) = std::env::var("DGM_PUBLISH_DOWNSAMPLING")
        && let Ok(n) = v.parse::<u32>()
    {
        cfg.robot.publish_downsampling = n;
    }
}

/// Save the config to `path`, creating its directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create config directory: {}", e))?;
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
    use dgm_middleware::ParamStore;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(dir.path());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.robot, RobotConfig::default());
        assert_eq!(loaded.device.sensors.len(), 2);
        assert_eq!(loaded.device.controls.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn config_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(dir.path());
        save_to(&Config::default(), &path).expect("save");

        let mode = fs::metadata(&path).expect("metadata").permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn config_path_points_to_dgm_dir() {
        let p = config_path_for_home(Path::new("/home/robot"));
        assert_eq!(p, PathBuf::from("/home/robot/.dynamic_graph_manager/config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let result = load_from(&dir.path().join("absent.toml")).expect("no error");
        assert!(result.is_none());
    }

    #[test]
    fn params_table_feeds_param_store_and_device_name() {
        let raw = r#"
            [params]
            "/dynamic_graph/log_dir" = "/data/traces"
            "/dynamic_graph/device_name" = "solo"
        "#;
        let cfg: Config = toml::from_str(raw).expect("parse");
        assert_eq!(cfg.param_store().get_param(LOG_DIR_PARAM).unwrap(), "/data/traces");
        assert_eq!(cfg.device_config().name, "solo");
        assert_eq!(cfg.device.name, "device");
    }

    #[test]
    fn apply_env_overrides_sets_log_dir_and_ignores_bad_numbers() {
        // SAFETY: no other test reads these variables.
        unsafe {
            std::env::set_var("DGM_LOG_DIR", "/tmp/dgm-traces");
            std::env::set_var("DGM_PUBLISH_DOWNSAMPLING", "not-a-number");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.params[LOG_DIR_PARAM], "/tmp/dgm-traces");
        assert_eq!(cfg.robot.publish_downsampling, 1);
        unsafe {
            std::env::remove_var("DGM_LOG_DIR");
            std::env::remove_var("DGM_PUBLISH_DOWNSAMPLING");
        }
    }

    #[test]
    fn apply_env_overrides_sets_ws_port() {
        // SAFETY: no other test reads this variable.
        unsafe { std::env::set_var("DGM_WS_PORT", "9191") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.ws_port, Some(9191));
        unsafe { std::env::remove_var("DGM_WS_PORT") };
    }
}
