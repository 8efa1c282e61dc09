//! The [`ParameterInput`] key-value configuration store.
//!
//! Runtime parameters are grouped into named blocks (one per physics
//! module plus `<time>` for the driver), each holding string key-value
//! pairs with typed getters. Modules read their own block at construction
//! time; the scheduler itself never touches module parameters.

use indexmap::IndexMap;

use crate::error::ParameterError;

/// In-memory block/key/value parameter store.
///
/// Insertion order of blocks and keys is preserved, so diagnostics print
/// parameters in the order they were set.
#[derive(Clone, Debug, Default)]
pub struct ParameterInput {
    blocks: IndexMap<String, IndexMap<String, String>>,
}

impl ParameterInput {
    /// Create an empty parameter store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter, creating the block if needed. Overwrites any
    /// previous value for the same key.
    pub fn set(&mut self, block: &str, key: &str, value: impl Into<String>) {
        self.blocks
            .entry(block.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    /// Whether a block exists. Used by setup code to decide which physics
    /// modules are active.
    pub fn has_block(&self, block: &str) -> bool {
        self.blocks.contains_key(block)
    }

    /// Whether a key exists within a block.
    pub fn has_key(&self, block: &str, key: &str) -> bool {
        self.blocks
            .get(block)
            .is_some_and(|b| b.contains_key(key))
    }

    fn raw(&self, block: &str, key: &str) -> Result<&str, ParameterError> {
        let b = self
            .blocks
            .get(block)
            .ok_or_else(|| ParameterError::MissingBlock {
                block: block.to_string(),
            })?;
        b.get(key).map(String::as_str).ok_or_else(|| {
            ParameterError::MissingKey {
                block: block.to_string(),
                key: key.to_string(),
            }
        })
    }

    /// Get a string parameter. Errors if the block or key is absent.
    pub fn get_str(&self, block: &str, key: &str) -> Result<&str, ParameterError> {
        self.raw(block, key)
    }

    /// Get a string parameter, or `default` if the block or key is absent.
    pub fn get_str_or<'a>(&'a self, block: &str, key: &str, default: &'a str) -> &'a str {
        self.raw(block, key).unwrap_or(default)
    }

    /// Get a floating-point parameter. Errors if absent or unparsable.
    pub fn get_real(&self, block: &str, key: &str) -> Result<f64, ParameterError> {
        let raw = self.raw(block, key)?;
        raw.parse::<f64>().map_err(|_| ParameterError::ParseFailed {
            block: block.to_string(),
            key: key.to_string(),
            value: raw.to_string(),
            wanted: "real",
        })
    }

    /// Get a floating-point parameter, or `default` if the block or key
    /// is absent. A present-but-unparsable value is still an error.
    pub fn get_real_or(&self, block: &str, key: &str, default: f64) -> Result<f64, ParameterError> {
        match self.raw(block, key) {
            Ok(raw) => raw.parse::<f64>().map_err(|_| ParameterError::ParseFailed {
                block: block.to_string(),
                key: key.to_string(),
                value: raw.to_string(),
                wanted: "real",
            }),
            Err(_) => Ok(default),
        }
    }

    /// Get an integer parameter. Errors if absent or unparsable.
    pub fn get_int(&self, block: &str, key: &str) -> Result<i64, ParameterError> {
        let raw = self.raw(block, key)?;
        raw.parse::<i64>().map_err(|_| ParameterError::ParseFailed {
            block: block.to_string(),
            key: key.to_string(),
            value: raw.to_string(),
            wanted: "int",
        })
    }

    /// Get an integer parameter, or `default` if the block or key is absent.
    pub fn get_int_or(&self, block: &str, key: &str, default: i64) -> Result<i64, ParameterError> {
        match self.raw(block, key) {
            Ok(raw) => raw.parse::<i64>().map_err(|_| ParameterError::ParseFailed {
                block: block.to_string(),
                key: key.to_string(),
                value: raw.to_string(),
                wanted: "int",
            }),
            Err(_) => Ok(default),
        }
    }

    /// Get a boolean parameter (`true`/`false`). Errors if absent or
    /// unparsable.
    pub fn get_bool(&self, block: &str, key: &str) -> Result<bool, ParameterError> {
        let raw = self.raw(block, key)?;
        raw.parse::<bool>().map_err(|_| ParameterError::ParseFailed {
            block: block.to_string(),
            key: key.to_string(),
            value: raw.to_string(),
            wanted: "bool",
        })
    }

    /// Get a boolean parameter, or `default` if the block or key is absent.
    pub fn get_bool_or(&self, block: &str, key: &str, default: bool) -> Result<bool, ParameterError> {
        match self.raw(block, key) {
            Ok(raw) => raw.parse::<bool>().map_err(|_| ParameterError::ParseFailed {
                block: block.to_string(),
                key: key.to_string(),
                value: raw.to_string(),
                wanted: "bool",
            }),
            Err(_) => Ok(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_getters_round_trip() {
        let mut pin = ParameterInput::new();
        pin.set("hydro", "velocity", "1.5");
        pin.set("hydro", "nghost", "2");
        pin.set("time", "integrator", "rk2");
        pin.set("viscosity", "enabled", "true");

        assert_eq!(pin.get_real("hydro", "velocity").unwrap(), 1.5);
        assert_eq!(pin.get_int("hydro", "nghost").unwrap(), 2);
        assert_eq!(pin.get_str("time", "integrator").unwrap(), "rk2");
        assert!(pin.get_bool("viscosity", "enabled").unwrap());
    }

    #[test]
    fn defaults_apply_only_when_absent() {
        let mut pin = ParameterInput::new();
        pin.set("hydro", "velocity", "not-a-number");

        // absent key -> default
        assert_eq!(pin.get_real_or("hydro", "dfloor", 1e-8).unwrap(), 1e-8);
        // absent block -> default
        assert_eq!(pin.get_real_or("mhd", "velocity", 2.0).unwrap(), 2.0);
        // present but malformed -> error, not default
        assert!(matches!(
            pin.get_real_or("hydro", "velocity", 1.0),
            Err(ParameterError::ParseFailed { .. })
        ));
    }

    #[test]
    fn missing_block_and_key_reported() {
        let mut pin = ParameterInput::new();
        pin.set("time", "tlim", "1.0");

        assert!(matches!(
            pin.get_real("hydro", "velocity"),
            Err(ParameterError::MissingBlock { .. })
        ));
        assert!(matches!(
            pin.get_real("time", "cfl_number"),
            Err(ParameterError::MissingKey { .. })
        ));
        assert!(pin.has_block("time"));
        assert!(!pin.has_block("hydro"));
        assert!(pin.has_key("time", "tlim"));
    }
}
