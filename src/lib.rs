//! awaylock - lock the session when nobody is in front of the camera
//!
//! This library crate exposes internal modules for integration testing.

pub mod capture;
pub mod clock;
pub mod config;
pub mod detector;
pub mod error;
pub mod lock;
pub mod monitor;
