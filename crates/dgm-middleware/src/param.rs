//! Parameter service seam.
//!
//! The robot reads a handful of deployment parameters (e.g.
//! `/dynamic_graph/log_dir`) from a parameter server.  [`ParamStore`] is the
//! only thing the rest of the stack sees; [`StaticParamStore`] serves a fixed
//! table, typically loaded from the configuration file.

use std::collections::HashMap;

use dgm_types::DgmError;

/// Parameter key of the tracer log directory.
pub const LOG_DIR_PARAM: &str = "/dynamic_graph/log_dir";

/// Parameter key of the device name.
pub const DEVICE_NAME_PARAM: &str = "/dynamic_graph/device_name";

/// A remote or local parameter server.
pub trait ParamStore: Send + Sync {
    /// Value of `key`.
    ///
    /// # Errors
    ///
    /// [`DgmError::ParamNotFound`] when the key is unset or the server is
    /// unreachable.
    fn get_param(&self, key: &str) -> Result<String, DgmError>;
}

/// In-memory parameter table.
#[derive(Debug, Clone, Default)]
pub struct StaticParamStore {
    params: HashMap<String, String>,
}

impl StaticParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StaticParamStore {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            params: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl ParamStore for StaticParamStore {
    fn get_param(&self, key: &str) -> Result<String, DgmError> {
        self.params
            .get(key)
            .cloned()
            .ok_or_else(|| DgmError::ParamNotFound(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_not_found() {
        let params = StaticParamStore::new();
        assert_eq!(
            params.get_param(LOG_DIR_PARAM),
            Err(DgmError::ParamNotFound(LOG_DIR_PARAM.to_string()))
        );
    }

    #[test]
    fn builder_and_collect() {
        let params = StaticParamStore::new().with(LOG_DIR_PARAM, "/tmp/logs");
        assert_eq!(params.get_param(LOG_DIR_PARAM).unwrap(), "/tmp/logs");

        let collected: StaticParamStore = [(DEVICE_NAME_PARAM, "solo")].into_iter().collect();
        assert_eq!(collected.get_param(DEVICE_NAME_PARAM).unwrap(), "solo");
    }
}
