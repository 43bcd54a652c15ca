//! Core functionality for the Neuralyzer light
//! This module contains the discovery engine and the session client

pub mod bluetooth;

// Re-export commonly used types
pub use bluetooth::{BluetoothManager, BluetoothScanner, SessionClient};
