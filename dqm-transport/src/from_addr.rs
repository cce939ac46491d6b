//! Resolves a transport address into a concrete [`Transport`] by URL
//! scheme — a small dispatch table picking one of two back-ends, with no
//! composition layer since only two back-ends exist here.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use url::Url;

use crate::binary_bus::BinaryBus;
use crate::error::Error;
use crate::transport::Transport;
use crate::websocket_bus::WebSocketBus;

/// Resolves `addr` to a transport:
/// - `bus://<name>` — an in-process [`BinaryBus`], shared process-wide by
///   `<name>` so that independently-constructed components which name the
///   same bus rendezvous on the same channels.
/// - `ws://host:port/...` or `wss://...` — a [`WebSocketBus`] connected to
///   the given peer.
pub async fn from_addr(addr: &str) -> crate::error::Result<Arc<dyn Transport>> {
    let url = Url::parse(addr)
        .map_err(|e| Error::InvalidParameter(format!("invalid transport address {addr:?}: {e}")))?;
    match url.scheme() {
        "bus" => Ok(named_binary_bus(url.host_str().unwrap_or("default"))),
        "ws" | "wss" => Ok(Arc::new(WebSocketBus::connect(addr).await?)),
        other => Err(Error::InvalidParameter(format!("unsupported transport scheme {other:?}"))),
    }
}

fn bus_registry() -> &'static RwLock<HashMap<String, Arc<BinaryBus>>> {
    static BUSES: OnceLock<RwLock<HashMap<String, Arc<BinaryBus>>>> = OnceLock::new();
    BUSES.get_or_init(|| RwLock::new(HashMap::new()))
}

fn named_binary_bus(name: &str) -> Arc<dyn Transport> {
    if let Some(bus) = bus_registry().read().unwrap().get(name) {
        return bus.clone();
    }
    let mut registry = bus_registry().write().unwrap();
    registry
        .entry(name.to_string())
        .or_insert_with(|| Arc::new(BinaryBus::new()))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bus_scheme_rendezvous_on_shared_name() {
        let a = from_addr("bus://unit-test-rendezvous").await.unwrap();
        let b = from_addr("bus://unit-test-rendezvous").await.unwrap();
        // Both resolve to the same underlying bus: a service created on one
        // handle is visible to a subscriber attached through the other.
        a.create_service("ping").await.unwrap();
        let got = std::sync::Arc::new(std::sync::Mutex::new(false));
        let got2 = got.clone();
        let _sub = b
            .subscribe("ping", std::sync::Arc::new(move |_| *got2.lock().unwrap() = true))
            .await
            .unwrap();
        a.create_service("ping").await.unwrap_err();
    }

    #[tokio::test]
    async fn unsupported_scheme_is_rejected() {
        let result = from_addr("ftp://example.com").await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn malformed_address_is_rejected() {
        let result = from_addr("not a url").await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }
}
