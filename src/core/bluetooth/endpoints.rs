//! Address book of the Neuralyzer light service
//! Maps each logical endpoint to its characteristic UUID and owns the
//! byte-level encoding rules for every value written to or read from it.

use std::fmt;

use uuid::Uuid;

use crate::core::bluetooth::constants::{
    ACTIVE_PAYLOAD_SIZE, COLOR_PAYLOAD_SIZE, INTENSITY_PAYLOAD_SIZE, UUID_LED_ACTIVE_CHAR,
    UUID_LED_COLOR_CHAR, UUID_LED_INTENSITY_CHAR, UUID_LIGHT_SERVICE,
};
use crate::core::bluetooth::types::Rgb;
use crate::error::{LightError, Result};

/// Human readable name of the light service
pub const SERVICE_DESCRIPTION: &str = "Neuralyzer BLE Service";

/// A characteristic of the light service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Color,
    Intensity,
    ActiveStatus,
}

impl Endpoint {
    pub const ALL: [Endpoint; 3] = [Endpoint::Color, Endpoint::Intensity, Endpoint::ActiveStatus];

    /// The service every endpoint lives under
    pub const fn service() -> Uuid {
        UUID_LIGHT_SERVICE
    }

    pub const fn uuid(self) -> Uuid {
        match self {
            Self::Color => UUID_LED_COLOR_CHAR,
            Self::Intensity => UUID_LED_INTENSITY_CHAR,
            Self::ActiveStatus => UUID_LED_ACTIVE_CHAR,
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Color => "Led Color",
            Self::Intensity => "Led Intensity",
            Self::ActiveStatus => "Led Active Status",
        }
    }

    /// Exact payload length carried by this endpoint
    pub const fn payload_len(self) -> usize {
        match self {
            Self::Color => COLOR_PAYLOAD_SIZE,
            Self::Intensity => INTENSITY_PAYLOAD_SIZE,
            Self::ActiveStatus => ACTIVE_PAYLOAD_SIZE,
        }
    }

    pub fn from_uuid(uuid: Uuid) -> Option<Self> {
        Self::ALL.into_iter().find(|endpoint| endpoint.uuid() == uuid)
    }

    fn check_len(self, payload: &[u8]) -> Result<()> {
        if payload.len() != self.payload_len() {
            return Err(LightError::DecodePayload {
                endpoint: self,
                expected: self.payload_len(),
                actual: payload.len(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Color payload, channel order R G B
pub fn encode_color(color: Rgb) -> [u8; COLOR_PAYLOAD_SIZE] {
    [color.r, color.g, color.b]
}

pub fn decode_color(payload: &[u8]) -> Result<Rgb> {
    Endpoint::Color.check_len(payload)?;
    Ok(Rgb::new(payload[0], payload[1], payload[2]))
}

/// Intensity payload. The level is truncated to its low byte, no clamping.
pub fn encode_intensity(level: i32) -> [u8; INTENSITY_PAYLOAD_SIZE] {
    [level as u8]
}

pub fn decode_intensity(payload: &[u8]) -> Result<u8> {
    Endpoint::Intensity.check_len(payload)?;
    Ok(payload[0])
}

pub fn encode_active(active: bool) -> [u8; ACTIVE_PAYLOAD_SIZE] {
    [u8::from(active)]
}

pub fn decode_active(payload: &[u8]) -> Result<bool> {
    Endpoint::ActiveStatus.check_len(payload)?;
    match payload[0] {
        0x00 => Ok(false),
        0x01 => Ok(true),
        value => Err(LightError::InvalidValue {
            endpoint: Endpoint::ActiveStatus,
            value,
        }),
    }
}
