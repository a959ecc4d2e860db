//! MV16 label service - runs the device instance and exposes it through rship

use anyhow::Result;
use rship_sdk::{ActionArgs, EmitterArgs, InstanceArgs, SdkClient, TargetArgs};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::actions::{RenameSourceAction, SetVariableAction, UpdateConfigAction};
use crate::config::{self, DeviceConfig};
use crate::emitters::{ConnectionStatusEmitter, LabelSentEmitter};
use crate::instance::{InstanceEvent, LabelInstance};
use crate::variables::VariableStore;

// Commands forwarded from rship action handlers to the instance task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCommand {
    RenameSource { source: u32, label: String },
    UpdateConfig(DeviceConfig),
}

// Main service for integrating an MV16 with rship
pub struct Mv16Service {
    sdk_client: SdkClient,
    rship_address: String,
    rship_port: String,
    device_config: DeviceConfig,
    variables: Arc<VariableStore>,
}

impl Mv16Service {
    pub fn new(device_config: DeviceConfig, rship_address: String, rship_port: String) -> Self {
        Self {
            sdk_client: SdkClient::init(),
            rship_address,
            rship_port,
            device_config,
            variables: Arc::new(VariableStore::new()),
        }
    }

    pub async fn start(&self) -> Result<()> {
        log::info!("Starting MV16 label service");
        log::debug!("Config fields: {}", config::config_fields());

        self.setup_rship_connection().await?;

        let (command_tx, command_rx) = mpsc::channel::<ServiceCommand>(100);
        let (instance, event_rx) = LabelInstance::new(self.variables.clone());

        self.setup_rship_instance(command_tx, event_rx).await?;

        run_instance(instance, self.device_config.clone(), command_rx).await;
        Ok(())
    }

    async fn setup_rship_connection(&self) -> Result<()> {
        let url = format!("ws://{}:{}/myko", self.rship_address, self.rship_port);
        log::info!("Connecting to rship at: {}", url);

        self.sdk_client.set_address(Some(url));
        self.sdk_client.await_connection().await;

        log::info!("Connected to rship successfully");
        Ok(())
    }

    async fn setup_rship_instance(
        &self,
        command_tx: mpsc::Sender<ServiceCommand>,
        mut event_rx: mpsc::Receiver<InstanceEvent>,
    ) -> Result<()> {
        let machine_id = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| format!("mv16-{}", std::process::id()));

        let instance = self
            .sdk_client
            .add_instance(InstanceArgs {
                name: "MV16 Labels".into(),
                short_id: "mv16-labels".into(),
                code: "mv16-labels".into(),
                service_id: "mv16-labels-service".into(),
                cluster_id: None,
                color: "#2E86DE".into(),
                machine_id,
                message: Some("MV16 input label control".into()),
                status: rship_sdk::InstanceStatus::Available,
            })
            .await;

        let mut target = instance
            .add_target(TargetArgs {
                name: "MV16 Device".into(),
                short_id: "mv16-device".into(),
                category: "video".into(),
                parent_targets: None,
            })
            .await;

        let tx_for_rename = command_tx.clone();
        let tx_for_config = command_tx;
        let variables = self.variables.clone();

        target
            .add_action(
                ActionArgs::<RenameSourceAction>::new(
                    "Rename source (with variables)".into(),
                    "rename-source".into(),
                ),
                move |_action, data| {
                    let tx = tx_for_rename.clone();
                    tokio::spawn(async move {
                        let command = ServiceCommand::RenameSource {
                            source: data.source,
                            label: data.label,
                        };
                        if let Err(e) = tx.send(command).await {
                            log::error!("Failed to send rename command: {}", e);
                        }
                    });
                },
            )
            .await;

        target
            .add_action(
                ActionArgs::<SetVariableAction>::new("Set Variable".into(), "set-variable".into()),
                move |_action, data| {
                    variables.set(data.name, data.value);
                },
            )
            .await;

        target
            .add_action(
                ActionArgs::<UpdateConfigAction>::new("Update Config".into(), "update-config".into()),
                move |_action, data| {
                    let tx = tx_for_config.clone();
                    tokio::spawn(async move {
                        let config = DeviceConfig::new(data.host, data.port);
                        if let Err(e) = tx.send(ServiceCommand::UpdateConfig(config)).await {
                            log::error!("Failed to send config update: {}", e);
                        }
                    });
                },
            )
            .await;

        let status_emitter = target
            .add_emitter(EmitterArgs::<ConnectionStatusEmitter>::new(
                "Connection Status".into(),
                "connection-status".into(),
            ))
            .await;

        let label_emitter = target
            .add_emitter(EmitterArgs::<LabelSentEmitter>::new(
                "Label Sent".into(),
                "label-sent".into(),
            ))
            .await;

        tokio::spawn(async move {
            log::info!("Event emission task started");

            while let Some(event) = event_rx.recv().await {
                log::debug!("Processing event: {:?}", event);

                match event {
                    InstanceEvent::StatusChanged(status) => {
                        let data = ConnectionStatusEmitter::from(&status);
                        if let Err(e) = status_emitter.pulse(data).await {
                            log::error!("Failed to emit connection status: {}", e);
                        }
                    }
                    InstanceEvent::LabelSent { source, input, label } => {
                        let data = LabelSentEmitter { source, input, label };
                        if let Err(e) = label_emitter.pulse(data).await {
                            log::error!("Failed to emit label sent: {}", e);
                        }
                    }
                }
            }
        });

        log::info!("rship instance and target setup complete");
        Ok(())
    }
}

// Own the instance for its whole life: init, serve commands, destroy on shutdown
async fn run_instance(
    mut instance: LabelInstance,
    config: DeviceConfig,
    mut command_rx: mpsc::Receiver<ServiceCommand>,
) {
    instance.init(config).await;

    loop {
        tokio::select! {
            command = command_rx.recv() => {
                let Some(command) = command else {
                    break;
                };
                handle_command(&mut instance, command).await;
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Shutdown requested");
                break;
            }
        }
    }

    instance.destroy().await;
}

async fn handle_command(instance: &mut LabelInstance, command: ServiceCommand) {
    match command {
        ServiceCommand::RenameSource { source, label } => {
            if let Err(e) = instance.rename_source(source, &label).await {
                log::error!("Failed to rename source {}: {:#}", source, e);
            }
        }
        ServiceCommand::UpdateConfig(config) => {
            instance.config_updated(config).await;
        }
    }
}
