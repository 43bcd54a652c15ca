//! Neuralyzer light write commands
//! This module contains every command that can be written to the light

use crate::core::bluetooth::endpoints::{self, Endpoint};
use crate::core::bluetooth::types::{DeviceSnapshot, Rgb, Timed};

/// Light commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightCommand {
    /// Set the LED color (3 bytes, R G B)
    SetColor(Rgb),
    /// Set the LED intensity level (1 byte, truncated from the caller's integer)
    SetIntensity(i32),
    /// Turn the LED on or off (1 byte, 0x00 / 0x01)
    SetActive(bool),
}

impl LightCommand {
    /// The characteristic this command is written to
    pub fn endpoint(&self) -> Endpoint {
        match self {
            Self::SetColor(_) => Endpoint::Color,
            Self::SetIntensity(_) => Endpoint::Intensity,
            Self::SetActive(_) => Endpoint::ActiveStatus,
        }
    }

    /// Convert the command to its byte representation
    pub fn to_bytes(&self) -> Vec<u8> {
        match *self {
            Self::SetColor(color) => endpoints::encode_color(color).to_vec(),
            Self::SetIntensity(level) => endpoints::encode_intensity(level).to_vec(),
            Self::SetActive(active) => endpoints::encode_active(active).to_vec(),
        }
    }

    /// Record the intended value in the snapshot before the light confirms it.
    /// A later write failure leaves this value in place.
    pub fn apply_optimistic(&self, snapshot: &mut DeviceSnapshot) {
        match *self {
            Self::SetColor(color) => snapshot.color = Timed::now(color),
            Self::SetIntensity(level) => {
                snapshot.intensity = Timed::now(endpoints::encode_intensity(level)[0])
            }
            Self::SetActive(active) => snapshot.active = Timed::now(active),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_target_their_endpoints() {
        assert_eq!(LightCommand::SetColor(Rgb::BLACK).endpoint(), Endpoint::Color);
        assert_eq!(LightCommand::SetIntensity(1).endpoint(), Endpoint::Intensity);
        assert_eq!(LightCommand::SetActive(true).endpoint(), Endpoint::ActiveStatus);
    }

    #[test]
    fn command_payloads() {
        assert_eq!(LightCommand::SetColor(Rgb::new(1, 2, 3)).to_bytes(), vec![1, 2, 3]);
        assert_eq!(LightCommand::SetIntensity(5).to_bytes(), vec![5]);
        assert_eq!(LightCommand::SetActive(false).to_bytes(), vec![0]);
    }

    #[test]
    fn optimistic_update_touches_only_its_field() {
        let mut snapshot = DeviceSnapshot::default();
        let before = snapshot;
        LightCommand::SetIntensity(2).apply_optimistic(&mut snapshot);
        assert_eq!(snapshot.intensity.value, 2);
        assert!(snapshot.intensity.timestamp >= before.intensity.timestamp);
        assert_eq!(snapshot.color, before.color);
        assert_eq!(snapshot.active, before.active);
    }
}
