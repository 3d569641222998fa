//! Trace directory resolution.
//!
//! The directory comes from the parameter service when it is set.
//! Otherwise a fresh timestamped directory under the user's home is used, so
//! successive runs never overwrite each other's traces:
//!
//! ```text
//! ~/.dynamic_graph_manager/2026_10_19_14_03_27/
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use dgm_middleware::ParamStore;
use tracing::warn;

use crate::config::RobotConfig;

/// `strftime` format of the fallback directory name.
pub const LOG_DIR_TIME_FORMAT: &str = "%Y_%m_%d_%H_%M_%S";

/// The user's home directory: `$HOME`, then `$USERPROFILE`, then `.`.
pub fn home_dir() -> PathBuf {
    PathBuf::from(
        std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// `<home>/<root>/<timestamp>`.
pub fn default_log_dir(home: &Path, root: &str, now: DateTime<Local>) -> PathBuf {
    home.join(root).join(now.format(LOG_DIR_TIME_FORMAT).to_string())
}

/// Resolve the trace directory from `params`, falling back to
/// [`default_log_dir`] under [`home_dir`].
pub fn resolve_log_dir(params: &dyn ParamStore, config: &RobotConfig) -> PathBuf {
    resolve_log_dir_in(params, config, &home_dir())
}

/// [`resolve_log_dir`] with an explicit home directory.
pub(crate) fn resolve_log_dir_in(params: &dyn ParamStore, config: &RobotConfig, home: &Path) -> PathBuf {
    match params.get_param(&config.log_dir_param) {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            let dir = default_log_dir(home, &config.log_root, Local::now());
            warn!(error = %e, dir = %dir.display(), "log directory parameter unavailable; using default");
            dir
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDateTime, TimeZone};
    use dgm_middleware::{LOG_DIR_PARAM, StaticParamStore};

    #[test]
    fn parameter_wins_when_set() {
        let params = StaticParamStore::new().with(LOG_DIR_PARAM, "/data/traces");
        let dir = resolve_log_dir_in(&params, &RobotConfig::default(), Path::new("/home/robot"));
        assert_eq!(dir, PathBuf::from("/data/traces"));
    }

    #[test]
    fn missing_parameter_falls_back_to_timestamped_home_dir() {
        let params = StaticParamStore::new();
        let dir = resolve_log_dir_in(&params, &RobotConfig::default(), Path::new("/home/robot"));

        assert_eq!(dir.parent(), Some(Path::new("/home/robot/.dynamic_graph_manager")));
        let stamp = dir.file_name().unwrap().to_string_lossy();
        assert!(
            NaiveDateTime::parse_from_str(&stamp, LOG_DIR_TIME_FORMAT).is_ok(),
            "{stamp} does not match {LOG_DIR_TIME_FORMAT}"
        );
    }

    #[test]
    fn default_log_dir_formats_timestamp() {
        let now = Local.with_ymd_and_hms(2019, 5, 22, 9, 4, 7).unwrap();
        assert_eq!(
            default_log_dir(Path::new("/home/robot"), ".dynamic_graph_manager", now),
            PathBuf::from("/home/robot/.dynamic_graph_manager/2019_05_22_09_04_07")
        );
    }

    #[test]
    fn custom_parameter_key_is_honoured() {
        let config = RobotConfig {
            log_dir_param: "/solo/log_dir".to_string(),
            ..RobotConfig::default()
        };
        let params = StaticParamStore::new().with("/solo/log_dir", "/tmp/solo");
        assert_eq!(
            resolve_log_dir_in(&params, &config, Path::new("/home/robot")),
            PathBuf::from("/tmp/solo")
        );
    }
}
