use crate::input::{parse_line, InputManager};
use crate::rendering::{Renderer, CONSOLE_HELP};
use log::{debug, error, info, warn};
use shared::{decode_packet, encode_packet, ChatEvent, Packet, MAX_DATAGRAM_BYTES, PROTOCOL_VERSION};
use std::io::Stdout;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tokio::time::interval;

/// Operator console connected to the bot over UDP.
pub struct Console {
    socket: UdpSocket,
    server_addr: SocketAddr,
    operator_id: u64,
    connected: bool,
    heartbeat: Duration,

    input: InputManager,
    renderer: Renderer<Stdout>,
}

impl Console {
    pub async fn new(
        server_addr: &str,
        operator_id: u64,
        heartbeat: Duration,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Console {
            socket,
            server_addr,
            operator_id,
            connected: false,
            heartbeat,
            input: InputManager::new(),
            renderer: Renderer::stdout(),
        })
    }

    async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to bot at {}...", self.server_addr);

        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
            operator_id: self.operator_id,
        };
        self.send_packet(&packet).await
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        let data = encode_packet(packet)?;
        if data.len() > MAX_DATAGRAM_BYTES {
            return Err(format!("message of {} bytes is too large to send", data.len()).into());
        }
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    /// Returns false once the bot ended the link.
    fn handle_packet(&mut self, packet: Packet) -> Result<bool, Box<dyn std::error::Error>> {
        match packet {
            Packet::Connected { operator_id } => {
                if !self.connected {
                    self.renderer
                        .render_notice(&format!("Connected as operator {}", operator_id))?;
                }
                self.connected = true;
            }

            Packet::Reply { reply } => {
                self.renderer.render_reply(&reply)?;
                self.input.set_buttons(reply.buttons);
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.renderer
                    .render_notice(&format!("Disconnected: {}", reason))?;
                self.connected = false;
                return Ok(false);
            }

            _ => {
                warn!("Unexpected packet type");
            }
        }
        Ok(true)
    }

    /// Sends one typed line. Returns false when the operator asked to quit.
    async fn handle_line(&mut self, line: &str) -> Result<bool, Box<dyn std::error::Error>> {
        let command = match parse_line(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Ok(true),
            Err(e) => {
                self.renderer.render_notice(&e.to_string())?;
                return Ok(true);
            }
        };

        let event = match self.input.to_event(command).await {
            Ok(Some(event)) => event,
            Ok(None) => return Ok(false),
            Err(e) => {
                self.renderer.render_notice(&e.to_string())?;
                return Ok(true);
            }
        };

        if !self.connected {
            self.renderer
                .render_notice("Not connected yet, message dropped")?;
            return Ok(true);
        }

        if let ChatEvent::FileUpload { file_name, .. } = &event {
            debug!("Uploading {}", file_name);
        }
        if let Err(e) = self.send_packet(&Packet::Event { event }).await {
            self.renderer.render_notice(&format!("Send failed: {}", e))?;
        }
        Ok(true)
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.renderer.render_notice(CONSOLE_HELP)?;
        self.connect().await?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut heartbeat_interval = interval(self.heartbeat);
        // The first tick completes immediately
        heartbeat_interval.tick().await;

        let mut buffer = vec![0u8; MAX_DATAGRAM_BYTES];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => match decode_packet(&buffer[..len]) {
                            Ok(packet) => {
                                if !self.handle_packet(packet)? {
                                    break;
                                }
                            }
                            Err(e) => warn!("Failed to deserialize packet: {}", e),
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                line = lines.next_line() => {
                    match line? {
                        Some(line) => {
                            if !self.handle_line(&line).await? {
                                break;
                            }
                        }
                        None => break,
                    }
                },

                _ = heartbeat_interval.tick() => {
                    // Keep the link alive, or retry the handshake if it was lost
                    let result = if self.connected {
                        self.send_packet(&Packet::Heartbeat).await
                    } else {
                        self.connect().await
                    };
                    if let Err(e) = result {
                        error!("Error sending heartbeat: {}", e);
                    }
                },
            }
        }

        if self.connected {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }

        Ok(())
    }
}
