//! Bot network layer: the UDP chat transport
//!
//! Consoles talk to the bot with bincode-encoded [`Packet`] datagrams. The
//! server runs four cooperating pieces:
//! - a receiver task decoding datagrams into [`ServerMessage`]s
//! - a sender task draining the outbound queue
//! - a timeout checker dropping silent links
//! - the main loop, which owns link bookkeeping and hands chat events to
//!   one dispatcher task per operator
//!
//! A dispatcher handles its operator's events strictly in arrival order and
//! resolves the operator's address only when a reply is sent, so a console
//! that reconnects from a new port still receives pending replies. When a
//! link goes away its dispatcher drains what is already queued; a dispatcher
//! started after a relink waits for that drain before touching new events.

use crate::bot::Bot;
use crate::link_manager::LinkManager;
use log::{debug, error, info, warn};
use shared::{decode_packet, encode_packet, ChatEvent, Packet, MAX_DATAGRAM_BYTES, PROTOCOL_VERSION};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

const PRUNE_INTERVAL: Duration = Duration::from_secs(300);

/// Messages sent from network tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    LinkTimeout { operator_id: u64 },
    Shutdown,
}

/// Messages queued for the sender task
#[derive(Debug)]
pub enum OutboundMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
    /// Routed to the operator's current address at send time
    SendToOperator { packet: Packet, operator_id: u64 },
}

struct Dispatcher {
    tx: mpsc::UnboundedSender<ChatEvent>,
    task: JoinHandle<()>,
}

pub struct Server {
    socket: Arc<UdpSocket>,
    links: Arc<RwLock<LinkManager>>,
    bot: Arc<Bot>,
    link_timeout: Duration,
    dispatchers: HashMap<u64, Dispatcher>,
    /// Dispatchers of dropped links that may still be draining
    retired: HashMap<u64, JoinHandle<()>>,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    outbound_rx: Option<mpsc::UnboundedReceiver<OutboundMessage>>,
}

impl Server {
    pub async fn new(
        addr: &str,
        bot: Arc<Bot>,
        max_links: usize,
        link_timeout: Duration,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Bot listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            links: Arc::new(RwLock::new(LinkManager::new(max_links))),
            bot,
            link_timeout,
            dispatchers: HashMap::new(),
            retired: HashMap::new(),
            server_tx,
            server_rx,
            outbound_tx,
            outbound_rx: Some(outbound_rx),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Sender for injecting [`ServerMessage::Shutdown`] from outside the loop.
    pub fn control(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_DATAGRAM_BYTES];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match decode_packet(&buffer[..len]) {
                        Ok(packet) => {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        }
                        Err(e) => warn!("Failed to deserialize packet from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes the outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let Some(mut outbound_rx) = self.outbound_rx.take() else {
            return;
        };
        let socket = Arc::clone(&self.socket);
        let links = Arc::clone(&self.links);

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let (packet, addr) = match message {
                    OutboundMessage::SendPacket { packet, addr } => (packet, addr),
                    OutboundMessage::SendToOperator {
                        packet,
                        operator_id,
                    } => match links.read().await.addr_for(operator_id) {
                        Some(addr) => (packet, addr),
                        None => {
                            debug!("Dropping packet for unlinked operator {}", operator_id);
                            continue;
                        }
                    },
                };

                if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                    error!("Failed to send packet to {}: {}", addr, e);
                }
            }
        });
    }

    /// Spawns task that monitors link timeouts
    fn spawn_timeout_checker(&self) {
        let links = Arc::clone(&self.links);
        let server_tx = self.server_tx.clone();
        let timeout = self.link_timeout;

        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = links.write().await.check_timeouts(timeout);

                for operator_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::LinkTimeout { operator_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = encode_packet(packet)?;
        if data.len() > MAX_DATAGRAM_BYTES {
            return Err(format!("packet of {} bytes does not fit a datagram", data.len()).into());
        }
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self
            .outbound_tx
            .send(OutboundMessage::SendPacket { packet, addr })
        {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    /// Queues an event for the operator's dispatcher, starting one if needed.
    fn dispatch(&mut self, operator_id: u64, event: ChatEvent) {
        let event = match self.dispatchers.get(&operator_id) {
            Some(dispatcher) => match dispatcher.tx.send(event) {
                Ok(()) => return,
                Err(mpsc::error::SendError(event)) => event,
            },
            None => event,
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<ChatEvent>();
        let bot = Arc::clone(&self.bot);
        let outbound_tx = self.outbound_tx.clone();
        let previous = self.retired.remove(&operator_id);

        let task = tokio::spawn(async move {
            if let Some(previous) = previous {
                if previous.await.is_err() {
                    warn!("Previous dispatcher for operator {} panicked", operator_id);
                }
            }
            while let Some(event) = rx.recv().await {
                for reply in bot.handle(operator_id, event).await {
                    let packet = Packet::Reply { reply };
                    if outbound_tx
                        .send(OutboundMessage::SendToOperator {
                            packet,
                            operator_id,
                        })
                        .is_err()
                    {
                        return;
                    }
                }
            }
            debug!("Dispatcher for operator {} finished", operator_id);
        });

        if tx.send(event).is_err() {
            error!("Dispatcher for operator {} closed immediately", operator_id);
        }
        self.dispatchers.insert(operator_id, Dispatcher { tx, task });
    }

    /// Closes the operator's queue; queued events still get handled.
    fn retire_dispatcher(&mut self, operator_id: u64) {
        if let Some(Dispatcher { tx, task }) = self.dispatchers.remove(&operator_id) {
            drop(tx);
            if !task.is_finished() {
                self.retired.insert(operator_id, task);
            }
        }
    }

    /// Processes incoming packets and routes chat events
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect {
                client_version,
                operator_id,
            } => {
                info!(
                    "Console connecting from {} as operator {} (version: {})",
                    addr, operator_id, client_version
                );

                if client_version != PROTOCOL_VERSION {
                    self.send_packet(
                        Packet::Disconnected {
                            reason: format!(
                                "Protocol version {} is not supported (expected {})",
                                client_version, PROTOCOL_VERSION
                            ),
                        },
                        addr,
                    );
                    return;
                }

                if !self.bot.is_authorized(operator_id) {
                    warn!("Refused console for unknown operator {} at {}", operator_id, addr);
                    self.send_packet(
                        Packet::Disconnected {
                            reason: "Not an authorized operator".to_string(),
                        },
                        addr,
                    );
                    return;
                }

                // Another operator previously linked from this address loses it
                let mut links = self.links.write().await;
                let displaced = links
                    .find_operator_by_addr(addr)
                    .filter(|previous| *previous != operator_id);
                if let Some(previous) = displaced {
                    links.remove_link(&previous);
                }
                let accepted = links.add_link(operator_id, addr);
                drop(links);
                if let Some(previous) = displaced {
                    self.retire_dispatcher(previous);
                }

                let response = if accepted {
                    Packet::Connected { operator_id }
                } else {
                    Packet::Disconnected {
                        reason: "Server full".to_string(),
                    }
                };
                self.send_packet(response, addr);
            }

            Packet::Heartbeat => {
                let mut links = self.links.write().await;
                if let Some(operator_id) = links.find_operator_by_addr(addr) {
                    links.touch(operator_id);
                }
            }

            Packet::Event { event } => {
                let operator_id = {
                    let mut links = self.links.write().await;
                    let operator_id = links.find_operator_by_addr(addr);
                    if let Some(operator_id) = operator_id {
                        links.touch(operator_id);
                    }
                    operator_id
                };

                match operator_id {
                    Some(operator_id) => self.dispatch(operator_id, event),
                    None => {
                        warn!("Event from unlinked address {}", addr);
                        self.send_packet(
                            Packet::Disconnected {
                                reason: "Not connected".to_string(),
                            },
                            addr,
                        );
                    }
                }
            }

            Packet::Disconnect => {
                let operator_id = {
                    let mut links = self.links.write().await;
                    let operator_id = links.find_operator_by_addr(addr);
                    if let Some(operator_id) = operator_id {
                        links.remove_link(&operator_id);
                    }
                    operator_id
                };
                if let Some(operator_id) = operator_id {
                    self.retire_dispatcher(operator_id);
                }
            }

            _ => {
                warn!("Unexpected packet type from console at {}", addr);
            }
        }
    }

    /// Tells every linked console that the bot is going away.
    async fn notify_shutdown(&self) {
        let packet = Packet::Disconnected {
            reason: "Bot shutting down".to_string(),
        };
        let operators: Vec<u64> = self.dispatchers.keys().copied().collect();
        let links = self.links.read().await;
        for operator_id in operators {
            if let Some(addr) = links.addr_for(operator_id) {
                if let Err(e) = Self::send_packet_impl(&self.socket, &packet, addr).await {
                    warn!("Failed to notify {}: {}", addr, e);
                }
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut prune_interval = interval(PRUNE_INTERVAL);
        prune_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Bot started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::LinkTimeout { operator_id }) => {
                            info!("Operator {} timed out", operator_id);
                            self.retire_dispatcher(operator_id);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Bot shutting down");
                            self.notify_shutdown().await;
                            break;
                        }
                    }
                },

                _ = prune_interval.tick() => {
                    self.dispatchers.retain(|_, dispatcher| !dispatcher.task.is_finished());
                    self.retired.retain(|_, task| !task.is_finished());
                    let pruned = self.bot.prune_idle_sessions().await;
                    if pruned > 0 {
                        debug!("{} dispatchers active after pruning", self.dispatchers.len());
                    }
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blacklist::BlacklistSet;
    use crate::distribution::UploadLimits;
    use crate::fetch::{HttpFetcher, RetryPolicy};
    use crate::gateway::PterodactylGateway;
    use crate::paths::VolumeResolver;
    use crate::workflow::ProvisionContext;
    use std::net::{IpAddr, Ipv4Addr};

    fn offline_bot(operators: &[u64]) -> Arc<Bot> {
        let client = reqwest::Client::new();
        let gateway = PterodactylGateway::new(
            client.clone(),
            "http://127.0.0.1:9",
            String::new(),
            String::new(),
            RetryPolicy::none(),
        )
        .unwrap();
        let ctx = ProvisionContext {
            resolver: VolumeResolver::with_candidates(Vec::new()),
            gateway: Arc::new(gateway),
            fetcher: Arc::new(HttpFetcher::new(client, RetryPolicy::none())),
            blacklist: Arc::new(RwLock::new(BlacklistSet::empty(
                std::env::temp_dir().join("panelbot-network-test.json"),
            ))),
            limits: UploadLimits::default(),
            restart_delay: Duration::ZERO,
        };
        Arc::new(Bot::new(ctx, operators.iter().copied()))
    }

    async fn recv_packet(socket: &UdpSocket) -> Packet {
        let mut buffer = vec![0u8; MAX_DATAGRAM_BYTES];
        let (len, _) = tokio::time::timeout(Duration::from_secs(5), socket.recv_from(&mut buffer))
            .await
            .expect("timed out waiting for packet")
            .unwrap();
        decode_packet(&buffer[..len]).unwrap()
    }

    #[test]
    fn test_server_message_creation() {
        let packet = Packet::Connect {
            client_version: 1,
            operator_id: 5,
        };
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8080);

        let msg = ServerMessage::PacketReceived { packet, addr };

        match msg {
            ServerMessage::PacketReceived { packet: p, addr: a } => {
                assert_eq!(a, addr);
                match p {
                    Packet::Connect {
                        client_version,
                        operator_id,
                    } => {
                        assert_eq!(client_version, 1);
                        assert_eq!(operator_id, 5);
                    }
                    _ => panic!("Unexpected packet type"),
                }
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_outbound_message_to_operator() {
        let msg = OutboundMessage::SendToOperator {
            packet: Packet::Heartbeat,
            operator_id: 9,
        };

        match msg {
            OutboundMessage::SendToOperator { operator_id, .. } => assert_eq!(operator_id, 9),
            _ => panic!("Unexpected message type"),
        }
    }

    #[tokio::test]
    async fn test_unauthorized_connect_is_refused() {
        let mut server = Server::new("127.0.0.1:0", offline_bot(&[1]), 4, Duration::from_secs(30))
            .await
            .unwrap();
        let server_addr = server.local_addr().unwrap();
        tokio::spawn(async move { server.run().await.ok() });

        let console = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let data = encode_packet(&Packet::Connect {
            client_version: PROTOCOL_VERSION,
            operator_id: 2,
        })
        .unwrap();
        console.send_to(&data, server_addr).await.unwrap();

        match recv_packet(&console).await {
            Packet::Disconnected { reason } => assert!(reason.contains("Not an authorized")),
            other => panic!("Unexpected packet {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_help_round_trip() {
        let mut server = Server::new("127.0.0.1:0", offline_bot(&[1]), 4, Duration::from_secs(30))
            .await
            .unwrap();
        let server_addr = server.local_addr().unwrap();
        tokio::spawn(async move { server.run().await.ok() });

        let console = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let connect = encode_packet(&Packet::Connect {
            client_version: PROTOCOL_VERSION,
            operator_id: 1,
        })
        .unwrap();
        console.send_to(&connect, server_addr).await.unwrap();
        assert!(matches!(
            recv_packet(&console).await,
            Packet::Connected { operator_id: 1 }
        ));

        let event = encode_packet(&Packet::Event {
            event: ChatEvent::text("/help"),
        })
        .unwrap();
        console.send_to(&event, server_addr).await.unwrap();

        match recv_packet(&console).await {
            Packet::Reply { reply } => {
                assert!(reply.text.starts_with("Commands:"));
                assert!(!reply.buttons.is_empty());
            }
            other => panic!("Unexpected packet {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_relink_keeps_event_order() {
        let mut server = Server::new("127.0.0.1:0", offline_bot(&[1]), 4, Duration::from_secs(30))
            .await
            .unwrap();
        let mut outbound_rx = server.outbound_rx.take().unwrap();
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40_000);
        let connect = || Packet::Connect {
            client_version: PROTOCOL_VERSION,
            operator_id: 1,
        };

        server.handle_packet(connect(), addr).await;
        // Waits on a connection attempt to the unreachable panel
        server
            .handle_packet(Packet::Event { event: ChatEvent::text("/servers") }, addr)
            .await;
        server.handle_packet(Packet::Disconnect, addr).await;
        server.handle_packet(connect(), addr).await;
        server
            .handle_packet(Packet::Event { event: ChatEvent::text("/help") }, addr)
            .await;

        let mut replies = Vec::new();
        while replies.len() < 2 {
            let message = tokio::time::timeout(Duration::from_secs(10), outbound_rx.recv())
                .await
                .expect("timed out waiting for replies")
                .unwrap();
            if let OutboundMessage::SendToOperator {
                packet: Packet::Reply { reply },
                operator_id,
            } = message
            {
                assert_eq!(operator_id, 1);
                replies.push(reply.text);
            }
        }

        assert!(!replies[0].starts_with("Commands:"), "{:?}", replies);
        assert!(replies[1].starts_with("Commands:"), "{:?}", replies);
    }
}
