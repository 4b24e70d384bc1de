use std::fmt;
use std::net::IpAddr;

/// A playback device discovered on the local network
///
/// Produced by a scan and immutable afterwards; the next scan replaces the
/// whole set rather than merging into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHost {
    /// Resolved IP address (IPv4 preferred by discovery)
    pub address: IpAddr,

    /// Cast protocol port (usually 8009)
    pub port: u16,

    /// Human-readable name announced by the device (e.g. "Kitchen speaker")
    pub friendly_name: String,
}

impl DeviceHost {
    /// Create a host record
    #[must_use]
    pub fn new(address: IpAddr, port: u16, friendly_name: impl Into<String>) -> Self {
        Self {
            address,
            port,
            friendly_name: friendly_name.into(),
        }
    }
}

impl fmt::Display for DeviceHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.friendly_name, self.address, self.port)
    }
}
