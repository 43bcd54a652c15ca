//! Constants used throughout the crate
//! This module contains the fixed protocol identifiers of the Neuralyzer light
//! and the transport error codes shared by every transport implementation.

use uuid::Uuid;

/// The UUID of the Neuralyzer light service
pub const UUID_LIGHT_SERVICE: Uuid = Uuid::from_u128(0x12345678_1234_5678_1234_56789abcdef1);

/// The UUID of the LED color characteristic (3 bytes, R G B)
pub const UUID_LED_COLOR_CHAR: Uuid = Uuid::from_u128(0x12345678_1234_5678_1234_56789abcdef2);

/// The UUID of the LED intensity characteristic (1 byte, 0..=3)
pub const UUID_LED_INTENSITY_CHAR: Uuid = Uuid::from_u128(0x12345678_1234_5678_1234_56789abcdef3);

/// The UUID of the LED active status characteristic (1 byte, 0 or 1)
pub const UUID_LED_ACTIVE_CHAR: Uuid = Uuid::from_u128(0x12345678_1234_5678_1234_56789abcdef4);

/// Color payload size in bytes
pub const COLOR_PAYLOAD_SIZE: usize = 3;

/// Intensity payload size in bytes
pub const INTENSITY_PAYLOAD_SIZE: usize = 1;

/// Active status payload size in bytes
pub const ACTIVE_PAYLOAD_SIZE: usize = 1;

/// Highest intensity level the light understands
pub const MAX_INTENSITY_LEVEL: u8 = 3;

/// Transport error codes surfaced through `ScanStatus::Error` and session faults
pub const TRANSPORT_CODE_UNKNOWN: i32 = -1;
pub const TRANSPORT_CODE_NOT_FOUND: i32 = 1;
pub const TRANSPORT_CODE_NOT_AUTHORIZED: i32 = 2;
pub const TRANSPORT_CODE_NOT_CONNECTED: i32 = 3;
pub const TRANSPORT_CODE_TIMEOUT: i32 = 4;
pub const TRANSPORT_CODE_ADAPTER_UNAVAILABLE: i32 = 5;
pub const TRANSPORT_CODE_SCAN_ENDED: i32 = 6;

/// Default capacity of the session command channel
pub const DEFAULT_COMMAND_BUFFER: usize = 32;
