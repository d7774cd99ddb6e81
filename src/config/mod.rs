// src/config/mod.rs - Configuration module

//! Runtime configuration for the solver engine.

mod settings;

pub use settings::Settings;
