use serde::{Deserialize, Serialize};

/// Discovery settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Only report peripherals advertising the light service.
    pub filter_by_service: bool,
    /// Ignore sightings weaker than this RSSI (dBm). `None` accepts everything.
    pub min_rssi: Option<i16>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            filter_by_service: true,
            min_rssi: None,
        }
    }
}
