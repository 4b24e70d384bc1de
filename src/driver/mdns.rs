//! mDNS implementation of the discovery boundary

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tracing::{debug, trace};

use crate::driver::{CastConnection, ChromecastConnection, Discovery};
use crate::error::CastError;
use crate::types::DeviceHost;

/// Service type cast devices announce themselves under
pub const CAST_SERVICE_TYPE: &str = "_googlecast._tcp.local.";

/// TXT record carrying the device's friendly name
const FRIENDLY_NAME_PROPERTY: &str = "fn";

/// Discovers cast devices by browsing mDNS
#[derive(Debug, Default)]
pub struct MdnsDiscovery;

impl MdnsDiscovery {
    /// Create a discovery backend
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Discovery for MdnsDiscovery {
    async fn discover(&self, timeout: Duration) -> Result<Vec<DeviceHost>, CastError> {
        let daemon = ServiceDaemon::new().map_err(|e| CastError::DiscoveryFailed {
            message: "failed to create mDNS daemon".to_string(),
            source: Some(Box::new(e)),
        })?;
        let receiver = daemon
            .browse(CAST_SERVICE_TYPE)
            .map_err(|e| CastError::DiscoveryFailed {
                message: format!("failed to browse {CAST_SERVICE_TYPE}"),
                source: Some(Box::new(e)),
            })?;

        let stream = receiver.into_stream();
        tokio::pin!(stream);
        let deadline = tokio::time::Instant::now() + timeout;
        let mut hosts: HashMap<String, DeviceHost> = HashMap::new();

        loop {
            tokio::select! {
                () = tokio::time::sleep_until(deadline) => break,
                event = stream.next() => match event {
                    Some(ServiceEvent::ServiceResolved(info)) => {
                        if let Some(host) = host_from_service(&info) {
                            debug!("Resolved device host \"{host}\"");
                            hosts.insert(info.get_fullname().to_string(), host);
                        }
                    }
                    Some(ServiceEvent::ServiceRemoved(_, fullname)) => {
                        hosts.remove(&fullname);
                    }
                    Some(other) => trace!("Ignoring mDNS event: {other:?}"),
                    None => break,
                },
            }
        }

        let _ = daemon.stop_browse(CAST_SERVICE_TYPE);
        let _ = daemon.shutdown();

        let mut hosts: Vec<DeviceHost> = hosts.into_values().collect();
        hosts.sort_by(|a, b| a.friendly_name.cmp(&b.friendly_name));
        Ok(hosts)
    }

    async fn connect(&self, host: &DeviceHost) -> Result<Arc<dyn CastConnection>, CastError> {
        let connection = ChromecastConnection::establish(host).await?;
        Ok(Arc::new(connection))
    }
}

fn host_from_service(info: &ServiceInfo) -> Option<DeviceHost> {
    let friendly_name = info
        .get_properties()
        .get(FRIENDLY_NAME_PROPERTY)
        .map(|property| property.val_str().to_string())
        .or_else(|| {
            info.get_fullname()
                .split('.')
                .next()
                .map(ToString::to_string)
        })?;

    // Prefer an IPv4 address; some devices also announce link-local IPv6.
    let addresses = info.get_addresses();
    let address = addresses
        .iter()
        .find(|address| address.is_ipv4())
        .or_else(|| addresses.iter().next())
        .copied()?;

    Some(DeviceHost::new(address, info.get_port(), friendly_name))
}
