//! Bluetooth functionality for the Neuralyzer light
//! This module handles all bluetooth operations including scanning,
//! connecting, and exchanging color, intensity and status with the light.

mod commands;
mod connection;
mod constants;
mod endpoints;
mod manager;
mod scanner;
mod session;
mod transport;
mod types;

// Re-export types that should be publicly accessible
pub use commands::LightCommand;
pub use connection::{transport_code, BluestLink};
pub use constants::*; // Re-export all constants
pub use endpoints::{
    decode_active, decode_color, decode_intensity, encode_active, encode_color, encode_intensity,
    Endpoint, SERVICE_DESCRIPTION,
};
pub use manager::BluetoothManager;
pub use scanner::{BluetoothScanner, DiscoveryStream};
pub use session::{SessionClient, SessionFault};
pub use transport::{
    AlwaysGranted, Authorization, Link, LinkEvent, LinkEvents, LinkTransport, ScanEvent,
    ScanTransport,
};
pub use types::{
    Advertisement, ConnectionState, DeviceSnapshot, DiscoveredPeripheral, Intensity,
    PeripheralAddress, Rgb, ScanStatus, Timed,
};
