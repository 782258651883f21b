//! Tauri Commands module
//!
//! This module contains all Tauri commands exposed to the frontend.

pub mod terminal;

pub use terminal::*;
