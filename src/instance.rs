//! Host lifecycle for one MV16 connection.
//!
//! The host calls `init`, `config_updated` and `destroy`; each (re)connect
//! replaces the previous socket outright. Status follows socket events only:
//! there is no retry, a new attempt happens when the config is pushed again.

use anyhow::{Result, anyhow};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::client::Mv16Client;
use crate::command::LabelCommand;
use crate::config::DeviceConfig;
use crate::status::ConnectionStatus;
use crate::variables::VariableResolver;

const EVENT_CHANNEL_SIZE: usize = 100;
const REQUEST_CHANNEL_SIZE: usize = 16;

// Events published to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceEvent {
    StatusChanged(ConnectionStatus),
    LabelSent { source: u32, input: u32, label: String },
}

// Requests handled by the connection task
#[derive(Debug)]
enum ConnectionRequest {
    Send {
        command: LabelCommand,
        reply: oneshot::Sender<Result<()>>,
    },
}

struct Shared {
    generation: Mutex<u64>,
    status: watch::Sender<ConnectionStatus>,
    events: mpsc::Sender<InstanceEvent>,
}

// Status sink bound to one connection attempt; goes quiet once superseded
#[derive(Clone)]
struct StatusReporter {
    generation: u64,
    shared: Arc<Shared>,
}

impl StatusReporter {
    fn update(&self, status: ConnectionStatus) {
        let Ok(current) = self.shared.generation.lock() else {
            return;
        };
        if *current != self.generation {
            log::debug!("Ignoring status {} from stale connection", status);
            return;
        }
        if *self.shared.status.borrow() == status {
            return;
        }

        log::info!("Status: {}", status);
        self.shared.status.send_replace(status.clone());
        publish(&self.shared.events, InstanceEvent::StatusChanged(status));
    }
}

fn publish(events: &mpsc::Sender<InstanceEvent>, event: InstanceEvent) {
    if let Err(e) = events.try_send(event) {
        log::warn!("Dropping instance event: {}", e);
    }
}

struct ConnectionHandle {
    requests: mpsc::Sender<ConnectionRequest>,
    task: JoinHandle<()>,
}

pub struct LabelInstance {
    resolver: Arc<dyn VariableResolver>,
    shared: Arc<Shared>,
    connection: Option<ConnectionHandle>,
}

impl LabelInstance {
    pub fn new(resolver: Arc<dyn VariableResolver>) -> (Self, mpsc::Receiver<InstanceEvent>) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);

        let instance = Self {
            resolver,
            shared: Arc::new(Shared {
                generation: Mutex::new(0),
                status: status_tx,
                events: events_tx,
            }),
            connection: None,
        };
        (instance, events_rx)
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    pub async fn init(&mut self, config: DeviceConfig) {
        log::info!("Initialising MV16 instance");
        self.reporter().update(ConnectionStatus::Connecting);
        self.connect(config).await;
    }

    pub async fn config_updated(&mut self, config: DeviceConfig) {
        log::info!("Config updated: {}", config.address());
        self.connect(config).await;
    }

    pub async fn destroy(&mut self) {
        if self.teardown() {
            log::info!("MV16 instance destroyed");
        }
        self.reporter().update(ConnectionStatus::Disconnected);
    }

    /// Replace the current socket with one built from `config`.
    pub async fn connect(&mut self, config: DeviceConfig) {
        self.teardown();
        let config = config.normalized();

        let reporter = self.reporter();
        if let Err(reason) = config.validate() {
            log::warn!("Bad config: {}", reason);
            reporter.update(ConnectionStatus::BadConfig(reason));
            return;
        }

        let (requests_tx, requests_rx) = mpsc::channel(REQUEST_CHANNEL_SIZE);
        let client = Mv16Client::new(config);
        let task = tokio::spawn(run_connection(client, requests_rx, reporter));

        self.connection = Some(ConnectionHandle {
            requests: requests_tx,
            task,
        });
    }

    /// Rename a 1-based source, resolving variables in `raw_label` first.
    pub async fn rename_source(&self, source: u32, raw_label: &str) -> Result<LabelCommand> {
        let label = self.resolver.parse_variables(raw_label);
        let command = LabelCommand::from_source(source, label)?;

        // Only a fully opened socket takes writes; nothing is queued while connecting
        let Some(connection) = self.connection.as_ref().filter(|_| self.status().is_connected())
        else {
            return Err(self.not_connected());
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let request = ConnectionRequest::Send {
            command: command.clone(),
            reply: reply_tx,
        };
        if connection.requests.send(request).await.is_err() {
            return Err(self.not_connected());
        }
        match reply_rx.await {
            Ok(result) => result?,
            Err(_) => return Err(self.not_connected()),
        }

        let event = InstanceEvent::LabelSent {
            source: command.source(),
            input: command.input,
            label: command.label.clone(),
        };
        if let Err(e) = self.shared.events.send(event).await {
            log::warn!("Dropping instance event: {}", e);
        }
        Ok(command)
    }

    fn not_connected(&self) -> anyhow::Error {
        self.reporter()
            .update(ConnectionStatus::ConnectionFailure("Not connected".to_string()));
        anyhow!("socket not connected")
    }

    fn reporter(&self) -> StatusReporter {
        let generation = self.shared.generation.lock().map(|g| *g).unwrap_or_default();
        StatusReporter {
            generation,
            shared: self.shared.clone(),
        }
    }

    // Detach and drop the current socket; returns whether one existed
    fn teardown(&mut self) -> bool {
        if let Ok(mut generation) = self.shared.generation.lock() {
            *generation += 1;
        }
        match self.connection.take() {
            Some(connection) => {
                connection.task.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for LabelInstance {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.task.abort();
        }
    }
}

async fn run_connection(
    mut client: Mv16Client,
    mut requests: mpsc::Receiver<ConnectionRequest>,
    reporter: StatusReporter,
) {
    reporter.update(ConnectionStatus::Connecting);

    if let Err(e) = client.connect().await {
        log::error!("connect failed: {:#}", e);
        reporter.update(ConnectionStatus::ConnectionFailure(format!("{:#}", e)));
        reporter.update(ConnectionStatus::Disconnected);
        return;
    }
    reporter.update(ConnectionStatus::Ok);

    loop {
        tokio::select! {
            request = requests.recv() => {
                let Some(ConnectionRequest::Send { command, reply }) = request else {
                    client.disconnect().await;
                    return;
                };
                let result = client.send_command(command).await;
                if let Err(e) = &result {
                    log::error!("TCP error: {}", e);
                    reporter.update(ConnectionStatus::ConnectionFailure(e.to_string()));
                }
                let _ = reply.send(result);
                if !client.is_connected() {
                    reporter.update(ConnectionStatus::Disconnected);
                    return;
                }
            }
            result = client.closed() => {
                if let Err(e) = result {
                    log::error!("TCP error: {}", e);
                    reporter.update(ConnectionStatus::ConnectionFailure(e.to_string()));
                }
                log::info!("MV16 closed the connection");
                reporter.update(ConnectionStatus::Disconnected);
                return;
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::VariableStore;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    async fn device() -> (TcpListener, DeviceConfig) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, DeviceConfig::new("127.0.0.1", port))
    }

    async fn wait_status(instance: &LabelInstance, f: impl Fn(&ConnectionStatus) -> bool) {
        let mut rx = instance.subscribe();
        timeout(WAIT, rx.wait_for(|s| f(s)))
            .await
            .expect("status timeout")
            .unwrap();
    }

    async fn accept(listener: &TcpListener) -> TcpStream {
        timeout(WAIT, listener.accept()).await.unwrap().unwrap().0
    }

    fn status_changes(events: &mut mpsc::Receiver<InstanceEvent>) -> Vec<ConnectionStatus> {
        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let InstanceEvent::StatusChanged(status) = event {
                seen.push(status);
            }
        }
        seen
    }

    fn instance() -> (LabelInstance, mpsc::Receiver<InstanceEvent>, Arc<VariableStore>) {
        let store = Arc::new(VariableStore::new());
        let (instance, events) = LabelInstance::new(store.clone());
        (instance, events, store)
    }

    #[tokio::test]
    async fn bad_config_opens_no_socket() {
        let (mut instance, _events, _) = instance();
        instance.init(DeviceConfig::new("", 9990)).await;
        assert_eq!(
            instance.status(),
            ConnectionStatus::BadConfig("Missing host/port".to_string())
        );

        let err = instance.rename_source(1, "x").await.unwrap_err();
        assert_eq!(err.to_string(), "socket not connected");
    }

    #[tokio::test]
    async fn rename_writes_resolved_label() {
        let (listener, config) = device().await;
        let (mut instance, mut events, store) = instance();
        store.set("internal:speaker", "Anna");

        instance.init(config).await;
        let mut device = accept(&listener).await;
        wait_status(&instance, |s| s.is_connected()).await;

        let command = instance
            .rename_source(3, "Talk $(internal:speaker)")
            .await
            .unwrap();
        assert_eq!(command.input, 2);

        instance.destroy().await;
        let mut received = Vec::new();
        timeout(WAIT, device.read_to_end(&mut received))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, b"INPUT LABELS:\n2 Talk Anna\n\n");

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert_eq!(
            seen,
            vec![
                InstanceEvent::StatusChanged(ConnectionStatus::Connecting),
                InstanceEvent::StatusChanged(ConnectionStatus::Ok),
                InstanceEvent::LabelSent {
                    source: 3,
                    input: 2,
                    label: "Talk Anna".to_string()
                },
                InstanceEvent::StatusChanged(ConnectionStatus::Disconnected),
            ]
        );
    }

    #[tokio::test]
    async fn device_close_moves_to_disconnected() {
        let (listener, config) = device().await;
        let (mut instance, _events, _) = instance();

        instance.init(config).await;
        let device = accept(&listener).await;
        wait_status(&instance, |s| s.is_connected()).await;

        drop(device);
        wait_status(&instance, |s| *s == ConnectionStatus::Disconnected).await;

        let err = instance.rename_source(1, "late").await.unwrap_err();
        assert_eq!(err.to_string(), "socket not connected");
        assert_eq!(
            instance.status(),
            ConnectionStatus::ConnectionFailure("Not connected".to_string())
        );
    }

    #[tokio::test]
    async fn refused_connection_is_a_failure() {
        let (listener, config) = device().await;
        drop(listener);
        let (mut instance, mut events, _) = instance();

        instance.init(config).await;
        wait_status(&instance, |s| *s == ConnectionStatus::Disconnected).await;

        let seen = status_changes(&mut events);
        assert_eq!(seen.len(), 3, "{:?}", seen);
        assert_eq!(seen[0], ConnectionStatus::Connecting);
        assert!(matches!(seen[1], ConnectionStatus::ConnectionFailure(_)));
        assert_eq!(seen[2], ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    #[allow(deprecated)]
    async fn reset_by_device_reports_failure_then_disconnected() {
        let (listener, config) = device().await;
        let (mut instance, mut events, _) = instance();

        instance.init(config).await;
        let device = accept(&listener).await;
        wait_status(&instance, |s| s.is_connected()).await;

        // Zero linger turns the close into a reset
        device.set_linger(Some(Duration::ZERO)).unwrap();
        drop(device);
        wait_status(&instance, |s| *s == ConnectionStatus::Disconnected).await;

        let seen = status_changes(&mut events);
        assert_eq!(seen.len(), 4, "{:?}", seen);
        assert_eq!(seen[0], ConnectionStatus::Connecting);
        assert_eq!(seen[1], ConnectionStatus::Ok);
        assert!(matches!(seen[2], ConnectionStatus::ConnectionFailure(_)));
        assert_eq!(seen[3], ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn config_update_replaces_socket() {
        let (first, first_config) = device().await;
        let (second, second_config) = device().await;
        let (mut instance, _events, _) = instance();

        instance.init(first_config).await;
        let mut old_device = accept(&first).await;
        wait_status(&instance, |s| s.is_connected()).await;

        instance.config_updated(second_config).await;
        let mut new_device = accept(&second).await;
        wait_status(&instance, |s| s.is_connected()).await;

        // Old socket is gone and its close does not leak into the status
        let mut buf = Vec::new();
        timeout(WAIT, old_device.read_to_end(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert!(buf.is_empty());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(instance.status(), ConnectionStatus::Ok);

        instance.rename_source(16, "Replay").await.unwrap();
        instance.destroy().await;
        let mut received = Vec::new();
        timeout(WAIT, new_device.read_to_end(&mut received))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, b"INPUT LABELS:\n15 Replay\n\n");
    }

    #[tokio::test]
    async fn out_of_range_source_is_rejected_before_sending() {
        let (mut instance, _events, _) = instance();
        instance.init(DeviceConfig::new("", 0)).await;
        assert!(instance.rename_source(17, "x").await.is_err());
        assert!(matches!(instance.status(), ConnectionStatus::BadConfig(_)));
    }

    #[tokio::test]
    async fn destroy_is_idempotent() {
        let (mut instance, _events, _) = instance();
        instance.destroy().await;
        instance.destroy().await;
        assert_eq!(instance.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn port_zero_connects_on_default_port() {
        let (mut instance, _events, _) = instance();
        let config = DeviceConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        };
        instance.init(config).await;
        assert_eq!(instance.status(), ConnectionStatus::Connecting);
        instance.destroy().await;
    }
}
