//! Test utilities and task fixtures for Torus development.

#![forbid(unsafe_code)]

pub mod fixtures;

pub use fixtures::{
    counting_op, failing_op, flaky_op, recording_op, rk2, CallCount, CallLog,
};
