use anyhow::{Context, Result, anyhow};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::command::{LabelCodec, LabelCommand};
use crate::config::DeviceConfig;

// Client for writing label commands to an MV16 device
pub struct Mv16Client {
    config: DeviceConfig,
    connection: Option<Framed<TcpStream, LabelCodec>>,
}

impl Mv16Client {
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            config,
            connection: None,
        }
    }

    // Connect to the device, replacing any open socket
    pub async fn connect(&mut self) -> Result<()> {
        self.disconnect().await;

        let address = self.config.address();
        log::debug!("Connecting to MV16 at {}", address);

        let stream = TcpStream::connect(&address)
            .await
            .with_context(|| format!("connect {} failed", address))?;
        stream.set_nodelay(true).ok();

        self.connection = Some(Framed::new(stream, LabelCodec));

        log::debug!("Connected to MV16 at {}", address);
        Ok(())
    }

    pub async fn disconnect(&mut self) {
        if let Some(mut conn) = self.connection.take() {
            let _ = conn.close().await;
            log::debug!("Disconnected from MV16 at {}", self.config.address());
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    // Write one command and flush it to the socket
    pub async fn send_command(&mut self, command: LabelCommand) -> Result<()> {
        let conn = self
            .connection
            .as_mut()
            .ok_or_else(|| anyhow!("socket not connected"))?;

        log::info!("Setting input {} label to: {}", command.input, command.label);
        if let Err(e) = conn.send(command).await {
            self.connection = None;
            return Err(anyhow!("Failed to send command: {}", e));
        }
        Ok(())
    }

    /// Wait until the device closes the socket.
    ///
    /// Device output is read and dropped. Returns `Ok` on an orderly close and
    /// the read error otherwise; either way the socket is released.
    pub async fn closed(&mut self) -> Result<()> {
        let conn = self
            .connection
            .as_mut()
            .ok_or_else(|| anyhow!("socket not connected"))?;

        let result = loop {
            match conn.next().await {
                Some(Ok(())) => continue,
                Some(Err(e)) => break Err(anyhow!(e)),
                None => break Ok(()),
            }
        };
        self.connection = None;
        result
    }
}
