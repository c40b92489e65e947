//! Device announcements — emitted by the bridge when a device joins or power-cycles.

/// A device told the bridge it is (back) on the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAnnouncement {
    pub friendly_name: String,
}
