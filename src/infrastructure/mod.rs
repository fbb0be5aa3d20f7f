//! Infrastructure Module
//!
//! Process-level concerns: logging setup and the loopback transport used
//! when no radio hardware is present.

pub mod logging;
pub mod loopback;
