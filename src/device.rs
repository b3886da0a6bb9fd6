//! Device identity as far as the wire is concerned.

/// Marker separating a physical device id from a logical sub-device id.
const LOGICAL_SUFFIX_MARKER: &str = ".L";

/// Registry view of a device. Supplied by the provisioning layer and
/// read-only to the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Composite id, `<physicalId>` or `<physicalId>.L<logicalId>`.
    pub id: String,
}

impl Device {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Physical id used for topic addressing. The logical suffix never
    /// appears on the wire.
    pub fn physical_id(&self) -> &str {
        strip_logical_suffix(&self.id)
    }
}

/// Removes the logical sub-device suffix from a composite device id.
///
/// The first `.L` occurrence wins, so a physical id that itself contains
/// `.L` gets cut short. Known limitation.
pub fn strip_logical_suffix(device_id: &str) -> &str {
    match device_id.find(LOGICAL_SUFFIX_MARKER) {
        Some(position) => &device_id[..position],
        None => device_id,
    }
}
