//! [`RobotConfig`] – tunables of the tracing and transport glue.
//!
//! Every field has a default, so an empty `[robot]` table is valid.

use serde::{Deserialize, Serialize};

use dgm_middleware::LOG_DIR_PARAM;
use dgm_tracer::DEFAULT_BUFFER_SIZE;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotConfig {
    /// Entity name of a tracer created by the robot.
    #[serde(default = "default_tracer_name")]
    pub tracer_name: String,

    /// Per-signal trace buffer budget, in bytes.
    #[serde(default = "default_tracer_size")]
    pub tracer_size: usize,

    /// Trace file name prefix.
    #[serde(default = "default_trace_prefix")]
    pub trace_prefix: String,

    /// Trace file name suffix.
    #[serde(default = "default_trace_suffix")]
    pub trace_suffix: String,

    /// Parameter holding the trace directory.
    #[serde(default = "default_log_dir_param")]
    pub log_dir_param: String,

    /// Directory under `$HOME` holding the timestamped fallback trace
    /// directories.
    #[serde(default = "default_log_root")]
    pub log_root: String,

    /// Publish device signals every `publish_downsampling` steps.
    #[serde(default = "default_publish_downsampling")]
    pub publish_downsampling: u32,

    /// Suffix appended to the transport entity names.
    #[serde(default)]
    pub ros_suffix: String,

    /// Topic type device signals are exported as.
    #[serde(default = "default_topic_type")]
    pub topic_type: String,
}

fn default_tracer_name() -> String {
    "trace".to_string()
}
fn default_tracer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}
fn default_trace_prefix() -> String {
    "dg_".to_string()
}
fn default_trace_suffix() -> String {
    ".dat".to_string()
}
fn default_log_dir_param() -> String {
    LOG_DIR_PARAM.to_string()
}
fn default_log_root() -> String {
    ".dynamic_graph_manager".to_string()
}
fn default_publish_downsampling() -> u32 {
    1
}
fn default_topic_type() -> String {
    "vector".to_string()
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            tracer_name: default_tracer_name(),
            tracer_size: default_tracer_size(),
            trace_prefix: default_trace_prefix(),
            trace_suffix: default_trace_suffix(),
            log_dir_param: default_log_dir_param(),
            log_root: default_log_root(),
            publish_downsampling: default_publish_downsampling(),
            ros_suffix: String::new(),
            topic_type: default_topic_type(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_table_yields_defaults() {
        let cfg: RobotConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, RobotConfig::default());
        assert_eq!(cfg.tracer_size, 1 << 20);
        assert_eq!(cfg.log_dir_param, "/dynamic_graph/log_dir");
    }

    #[test]
    fn partial_table_overrides_only_given_fields() {
        let cfg: RobotConfig = toml::from_str("publish_downsampling = 10\ntracer_name = \"rt_trace\"").unwrap();
        assert_eq!(cfg.publish_downsampling, 10);
        assert_eq!(cfg.tracer_name, "rt_trace");
        assert_eq!(cfg.trace_prefix, "dg_");
    }
}
