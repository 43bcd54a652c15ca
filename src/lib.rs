//! Neuralyzer light library
//! Discovers Neuralyzer smart lights over BLE and drives a session with one
//! of them: connection lifecycle, color, intensity and on/off state.

// Module declarations
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod state;
pub mod utils;

pub use config::LightConfig;
pub use error::{Capability, LightError, Result};
pub use state::LightController;
