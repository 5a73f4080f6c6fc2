use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

use crate::broadcast;
use crate::codec::{self, PacketType, Slot};
use crate::config::ServerConfig;
use crate::controller;
use crate::dispatcher;
use crate::error::ServerError;
use crate::logger::hex;
use crate::registry::{Subscription, SubscriptionRegistry};
use crate::sensors::{SensorProvider, SensorSnapshot};

pub(crate) struct Shared {
    pub(crate) socket: UdpSocket,
    pub(crate) registry: SubscriptionRegistry,
    pub(crate) ttl: Duration,
    pub(crate) interval: Duration,
    sensors: Arc<dyn SensorProvider>,
    packet_counter: AtomicU32,
    epoch: Instant,
}

impl Shared {
    /// Reads a fresh snapshot on the blocking pool; each caller gets its own read.
    pub(crate) async fn read_sensors(&self) -> SensorSnapshot {
        let sensors = self.sensors.clone();
        match task::spawn_blocking(move || sensors.read()).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "sensor read task failed");
                SensorSnapshot::default()
            }
        }
    }

    /// Counter shared by every slot, wrapping at 2^32.
    fn next_packet_number(&self) -> u32 {
        self.packet_counter
            .fetch_add(1, Ordering::SeqCst)
            .wrapping_add(1)
    }

    fn timestamp_us(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    /// Sends one datagram. Failures are logged and reported as `false`; the
    /// subscription is left to expire on its own.
    pub(crate) async fn send(
        &self,
        packet_type: PacketType,
        payload: &[u8],
        client: SocketAddr,
    ) -> bool {
        let message = codec::encode(packet_type, payload);
        trace!(%client, packet = %hex(&message), "tx");
        match self.socket.send_to(&message, client).await {
            Ok(_) => true,
            Err(e) => {
                warn!(%client, error = %e, "send failed");
                false
            }
        }
    }

    pub(crate) async fn send_controller_data(&self, slot: Slot, client: SocketAddr) -> bool {
        let snapshot = self.read_sensors().await;
        let packet_number = self.next_packet_number();
        let payload = controller::data_payload(slot, &snapshot, packet_number, self.timestamp_us());
        self.send(PacketType::Data, &payload, client).await
    }
}

/// DSU server bound to its UDP socket.
pub struct DsuServer {
    shared: Arc<Shared>,
}

impl DsuServer {
    pub async fn bind(
        config: &ServerConfig,
        sensors: Arc<dyn SensorProvider>,
    ) -> Result<Self, ServerError> {
        config.validate()?;
        let addr = config.listen_addr();
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        info!(addr = %socket.local_addr()?, "DSU server listening");

        Ok(Self {
            shared: Arc::new(Shared {
                socket,
                registry: SubscriptionRegistry::new(),
                ttl: config.ttl(),
                interval: config.broadcast_interval(),
                sensors,
                packet_counter: AtomicU32::new(0),
                epoch: Instant::now(),
            }),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.shared.socket.local_addr()?)
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.shared.registry.snapshot_for_broadcast()
    }

    /// Runs the dispatcher and the broadcaster until `cancel` fires or the
    /// socket fails.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), ServerError> {
        let broadcaster = tokio::spawn(broadcast::run(self.shared.clone(), cancel.clone()));

        let result = dispatcher::run(&self.shared, &cancel).await;
        cancel.cancel();

        if let Err(e) = broadcaster.await {
            warn!(error = %e, "broadcaster task ended abnormally");
        }
        info!("DSU server stopped");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::FixedSensors;
    use std::net::{IpAddr, Ipv4Addr};

    async fn local_server(ttl_ms: u64) -> DsuServer {
        let config = ServerConfig {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            subscription_ttl_ms: ttl_ms,
            broadcast_interval_ms: 20,
            ..Default::default()
        };
        DsuServer::bind(&config, Arc::new(FixedSensors::default()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn unreachable_subscriber_is_left_to_expire() {
        let server = local_server(100).await;
        // An IPv4 socket cannot send to an IPv6 peer
        let unreachable: SocketAddr = "[::1]:9".parse().unwrap();

        assert!(!server.shared.send_controller_data(0, unreachable).await);

        server.shared.registry.upsert(0, unreachable, Instant::now());
        assert_eq!(server.subscriptions().len(), 1);

        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(400)).await;
            stopper.cancel();
        });

        assert!(server.run(cancel).await.is_ok());
        assert!(server.subscriptions().is_empty());
    }
}
