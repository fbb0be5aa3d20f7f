//! Domain Module
//!
//! Pure types and logic: peripheral matching, command encoding and settings.

pub mod codec;
pub mod models;
pub mod settings;
