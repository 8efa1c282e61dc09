//! Error types shared across the Torus workspace.

use std::error::Error;
use std::fmt;

/// Errors from the [`ParameterInput`](crate::ParameterInput) store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParameterError {
    /// The requested block does not exist in the input.
    MissingBlock {
        /// Name of the missing block.
        block: String,
    },
    /// The requested key does not exist in the block.
    MissingKey {
        /// Block that was searched.
        block: String,
        /// Name of the missing key.
        key: String,
    },
    /// The stored value could not be parsed as the requested type.
    ParseFailed {
        /// Block containing the value.
        block: String,
        /// Key of the value.
        key: String,
        /// The raw stored string.
        value: String,
        /// The requested type name (`"real"`, `"int"`, `"bool"`).
        wanted: &'static str,
    },
}

impl fmt::Display for ParameterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingBlock { block } => write!(f, "input block <{block}> not found"),
            Self::MissingKey { block, key } => {
                write!(f, "parameter '{key}' not found in block <{block}>")
            }
            Self::ParseFailed {
                block,
                key,
                value,
                wanted,
            } => write!(
                f,
                "parameter '{key}' in block <{block}> has value '{value}', \
                 which is not a valid {wanted}"
            ),
        }
    }
}

impl Error for ParameterError {}
