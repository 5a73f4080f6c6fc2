use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::codec::{self, PacketType, Request, Slot};
use crate::controller;
use crate::error::ServerError;
use crate::logger::hex;
use crate::protocol::{ACTION_SUBSCRIBE_MAX, MAX_DATAGRAM, PROTOCOL_VERSION, SLOT_DISPLAY};
use crate::server::Shared;

pub(crate) async fn run(shared: &Shared, cancel: &CancellationToken) -> Result<(), ServerError> {
    let mut buf = [0u8; MAX_DATAGRAM];

    loop {
        let (len, client) = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            received = shared.socket.recv_from(&mut buf) => match received {
                Ok(received) => received,
                // ICMP port-unreachable from a vanished client surfaces here on some platforms
                Err(e) if matches!(e.kind(), ErrorKind::ConnectionReset | ErrorKind::ConnectionRefused) => {
                    debug!(error = %e, "ignoring transient receive error");
                    continue;
                }
                Err(e) => return Err(e.into()),
            },
        };

        let message = &buf[..len];
        trace!(%client, packet = %hex(message), "rx");

        match codec::decode(message) {
            Ok(request) => handle(shared, request, client).await,
            Err(e) => warn!(%client, error = %e, "dropping malformed datagram"),
        }
    }
}

async fn handle(shared: &Shared, request: Request, client: SocketAddr) {
    match request {
        Request::Version => {
            shared
                .send(PacketType::Version, &PROTOCOL_VERSION.to_le_bytes(), client)
                .await;
        }
        Request::Ports { slots } => {
            let battery = shared.read_sensors().await.battery;
            for slot in slots {
                let payload = controller::ports_payload(slot, battery);
                shared.send(PacketType::Ports, &payload, client).await;
            }
        }
        Request::Data { action, slot, .. } => subscribe(shared, action, slot, client).await,
    }
}

async fn subscribe(shared: &Shared, action: u8, slot: Slot, client: SocketAddr) {
    if action > ACTION_SUBSCRIBE_MAX || slot > SLOT_DISPLAY {
        debug!(%client, action, slot, "data request ignored");
        return;
    }

    // Registry lock covers the map update only, never I/O
    if shared.registry.upsert(slot, client, Instant::now()) {
        info!(%client, slot, "new subscription");
    } else {
        debug!(%client, slot, "subscription refreshed");
    }

    shared.send_controller_data(slot, client).await;
}
