pub mod config;

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::{
    net::{UnixListener, UnixStream},
    sync::{broadcast, oneshot},
};
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, error, info, warn};

use crate::{
    error::StageError,
    motion_controller::{MotionController, MoveReceipt, MoveRequest},
    protocol::{
        client_command::ClientCommand, parse_command, serialize_response,
        server_response::ServerResponse,
    },
    queue::{QueueStatus, TaskCallbacks, TaskOutcome},
    settings::SettingsPatch,
};
use config::SocketServerConfig;

/// One open client connection, released on drop.
struct ConnectionSlot(Arc<AtomicUsize>);

impl ConnectionSlot {
    fn acquire(active: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        let previous = active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |open| {
                (open < max).then_some(open + 1)
            })
            .ok()?;
        debug!("New client connected. Active connections: {}", previous + 1);
        Some(Self(active.clone()))
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        let previous = self.0.fetch_sub(1, Ordering::AcqRel);
        debug!("Client disconnected. Active connections: {}", previous.saturating_sub(1));
    }
}

pub struct SocketServer {
    config: SocketServerConfig,
    controller: Arc<MotionController>,
    shutdown_tx: Option<broadcast::Sender<()>>,
}

impl SocketServer {
    pub fn new(config: SocketServerConfig, controller: Arc<MotionController>) -> Self {
        Self {
            config,
            controller,
            shutdown_tx: None,
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        if Path::new(&self.config.socket_path).exists() {
            tokio::fs::remove_file(&self.config.socket_path).await?;
        }

        let listener = UnixListener::bind(&self.config.socket_path)?;
        info!("Socket server listening on: {}", self.config.socket_path);

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        self.shutdown_tx = Some(shutdown_tx);

        tokio::spawn(Self::accept_loop(
            listener,
            self.controller.clone(),
            self.config.max_connections,
            shutdown_rx,
        ));
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(());
        }

        if Path::new(&self.config.socket_path).exists() {
            tokio::fs::remove_file(&self.config.socket_path).await?;
        }

        info!("Socket server shutdown complete");
        Ok(())
    }

    /// Clients are refused while the command queue is stopped, since none of
    /// their moves could run, and once `max_connections` are open.
    async fn accept_loop(
        listener: UnixListener,
        controller: Arc<MotionController>,
        max_connections: usize,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let active = Arc::new(AtomicUsize::new(0));

        loop {
            let stream = tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Socket server shutting down");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, _addr)) => stream,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
            };

            if controller.queue_status() == QueueStatus::Stopped {
                warn!("Command queue is stopped, refusing client");
                tokio::spawn(Self::refuse(stream, "command queue is stopped", "queue_closed"));
                continue;
            }
            let Some(slot) = ConnectionSlot::acquire(&active, max_connections) else {
                warn!("Maximum connections reached ({}), refusing client", max_connections);
                tokio::spawn(Self::refuse(stream, "too many connections", "busy"));
                continue;
            };

            let controller = controller.clone();
            let client_shutdown_rx = shutdown_rx.resubscribe();
            tokio::spawn(async move {
                if let Err(e) = Self::handle_client(stream, &controller, client_shutdown_rx).await {
                    error!("Client handler error: {}", e);
                }
                drop(slot);
            });
        }
    }

    /// Sends a single error line, then hangs up.
    async fn refuse(stream: UnixStream, reason: &str, code: &str) {
        let response = ServerResponse::error_with_code(None, reason.to_string(), code.to_string());
        let mut framed = Framed::new(stream, LinesCodec::new());
        match serialize_response(&response) {
            Ok(line) => {
                if let Err(e) = framed.send(line).await {
                    debug!("Refused client went away early: {}", e);
                }
            }
            Err(e) => error!("Failed to encode refusal: {}", e),
        }
    }

    async fn handle_client(
        stream: UnixStream,
        controller: &MotionController,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        let mut framed = Framed::new(stream, LinesCodec::new());

        loop {
            let line = tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("Shutdown signal received, closing client connection");
                    break;
                }
                line = framed.next() => line,
            };
            let line = match line {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    warn!("Unreadable line from client: {}", e);
                    break;
                }
                None => break,
            };
            if line.trim().is_empty() {
                continue;
            }

            debug!("Received command: {}", line);
            let response = Self::process_command(&line, controller).await;
            framed.send(serialize_response(&response)?).await?;
        }

        Ok(())
    }

    async fn process_command(line: &str, controller: &MotionController) -> ServerResponse {
        let command = match parse_command(line) {
            Ok(cmd) => cmd,
            Err(e) => {
                return ServerResponse::error(None, format!("Failed to parse command: {}", e));
            }
        };

        let command_id = command.id().cloned();

        match Self::execute_command(command, controller).await {
            Ok(data) => ServerResponse::success(command_id, data),
            Err(e) => match e.downcast_ref::<StageError>() {
                Some(stage_error) => ServerResponse::stage_error(command_id, stage_error),
                None => ServerResponse::error(command_id, e.to_string()),
            },
        }
    }

    async fn execute_command(command: ClientCommand, controller: &MotionController) -> Result<Value> {
        match command {
            ClientCommand::IncrementalMove {
                values,
                speeds,
                wait,
                ..
            } => {
                let (callbacks, outcome) = Self::outcome_callbacks(wait);
                let request = MoveRequest::from_maps(values, speeds).with_callbacks(callbacks);
                let receipt = controller.incremental_move(request).await?;
                Self::receipt_reply(receipt, outcome).await
            }
            ClientCommand::AbsoluteMove {
                values,
                speeds,
                wait,
                ..
            } => {
                let (callbacks, outcome) = Self::outcome_callbacks(wait);
                let request = MoveRequest::from_maps(values, speeds).with_callbacks(callbacks);
                let receipt = controller.absolute_move(request).await?;
                Self::receipt_reply(receipt, outcome).await
            }
            ClientCommand::GoToZero { wait, .. } => {
                let (callbacks, outcome) = Self::outcome_callbacks(wait);
                let receipt = controller.go_to_zero(callbacks).await?;
                Self::receipt_reply(receipt, outcome).await
            }
            ClientCommand::Raw { commands, wait, .. } => {
                let (callbacks, outcome) = Self::outcome_callbacks(wait);
                let receipt = controller.raw_action(&commands, callbacks)?;
                Self::receipt_reply(receipt, outcome).await
            }
            ClientCommand::Stop { .. } => Ok(json!({ "text": controller.stop().await? })),
            ClientCommand::GoHome { .. } => Ok(json!({ "text": controller.go_home().await? })),
            ClientCommand::SetHome { .. } => Ok(json!({ "text": controller.set_home().await? })),
            ClientCommand::ZeroHere { .. } => {
                controller.zero_here().await;
                Ok(json!({ "position": controller.position().await.as_map() }))
            }
            ClientCommand::GetPosition { .. } => {
                Ok(json!({ "position": controller.position().await.as_map() }))
            }
            ClientCommand::GetSettings { .. } => Self::settings_reply(controller).await,
            ClientCommand::ApplySettings { settings, .. } => {
                let patch = SettingsPatch::from_json(settings)?;
                controller.settings().write().await.apply(patch)?;
                Self::settings_reply(controller).await
            }
            ClientCommand::SaveSettings {
                port,
                calibrations,
                controller: controller_option,
                ..
            } => {
                controller
                    .settings()
                    .write()
                    .await
                    .save(port, calibrations, controller_option)?;
                Self::settings_reply(controller).await
            }
            ClientCommand::ApplyPreset { name, .. } => {
                controller.settings().write().await.apply_preset(&name)?;
                Self::settings_reply(controller).await
            }
            ClientCommand::QueueStatus { .. } => Ok(serde_json::to_value(controller.queue_status())?),
            ClientCommand::Ping { .. } => Ok(json!({
                "message": "pong",
                "timestamp": chrono::Utc::now().to_rfc3339()
            })),
        }
    }

    fn outcome_callbacks(wait: bool) -> (TaskCallbacks, Option<oneshot::Receiver<TaskOutcome>>) {
        if wait {
            let (callbacks, outcome) = TaskCallbacks::reporting();
            (callbacks, Some(outcome))
        } else {
            (TaskCallbacks::new(), None)
        }
    }

    async fn receipt_reply(
        receipt: MoveReceipt,
        outcome: Option<oneshot::Receiver<TaskOutcome>>,
    ) -> Result<Value> {
        let mut data = json!({
            "text": receipt.text,
            "task_id": receipt.submission.task_id(),
            "accepted": receipt.is_accepted(),
        });

        if let (true, Some(outcome)) = (receipt.is_accepted(), outcome) {
            let outcome = outcome.await.map_err(|_| StageError::QueueClosed)?;
            data["result"] = serde_json::to_value(outcome)?;
        }
        Ok(data)
    }

    async fn settings_reply(controller: &MotionController) -> Result<Value> {
        let settings = controller.settings().read().await;
        let axes: serde_json::Map<String, Value> = settings
            .axes()
            .iter()
            .map(|axis| {
                (
                    axis.to_string(),
                    json!({
                        "step_scale": settings.step_scale(*axis),
                        "speed_limit": settings.speed_limit(*axis),
                        "default_speed": settings.default_speed(*axis),
                    }),
                )
            })
            .collect();

        Ok(json!({
            "connection": settings.connection(),
            "protocol": settings.selected_protocol(),
            "axes": axes,
            "description": settings.describe(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        link::SimulatedLink,
        motion_controller::ControllerConfig,
        settings::{fixture, AxisSettings},
    };
    use crate::axis::AxisName::{X, Y};

    fn controller() -> (MotionController, Arc<SimulatedLink>) {
        let settings = AxisSettings::load(fixture::memory_store(), &[X, Y]).unwrap();
        let link = Arc::new(SimulatedLink::default());
        (
            MotionController::new(ControllerConfig::default(), settings, link.clone()),
            link,
        )
    }

    async fn request(line: &str, controller: &MotionController) -> Value {
        let response = SocketServer::process_command(line, controller).await;
        serde_json::to_value(response).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_without_wait_answers_immediately() {
        let (controller, link) = controller();

        let reply = request(
            r#"{"type": "incremental_move", "values": {"X": 1}, "speeds": {"X": 10}, "id": "m1"}"#,
            &controller,
        )
        .await;

        assert_eq!(reply["status"], "success");
        assert_eq!(reply["id"], "m1");
        assert_eq!(reply["data"]["text"], "@01\n@0A 10,100");
        assert_eq!(reply["data"]["accepted"], true);
        assert!(reply["data"].get("result").is_none());
        assert!(link.sent_frames().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_with_wait_reports_outcome() {
        let (controller, link) = controller();

        let reply = request(
            r#"{"type": "absolute_move", "values": {"X": 2, "Y": -1}, "speeds": {"X": 10, "Y": 10}, "wait": true}"#,
            &controller,
        )
        .await;

        assert_eq!(reply["data"]["result"]["outcome"], "completed");
        assert_eq!(link.transmissions().await.len(), 1);

        let position = request(r#"{"type": "get_position"}"#, &controller).await;
        assert_eq!(position["data"]["position"]["X"], 2.0);
        assert_eq!(position["data"]["position"]["Y"], -1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_reports_missing_value() {
        let (controller, _link) = controller();
        request(
            r#"{"type": "apply_settings", "settings": {"port": ""}}"#,
            &controller,
        )
        .await;

        let reply = request(r#"{"type": "go_to_zero", "wait": true}"#, &controller).await;
        assert_eq!(reply["data"]["result"]["outcome"], "missing_value");
    }

    #[tokio::test(start_paused = true)]
    async fn test_type_mismatch_is_reported_and_nothing_queued() {
        let (controller, _link) = controller();

        let reply = request(
            r#"{"type": "apply_settings", "settings": {"baudrate": "fast"}, "id": "s1"}"#,
            &controller,
        )
        .await;

        assert_eq!(reply["status"], "error");
        assert_eq!(reply["code"], "type_mismatch");
        assert_eq!(reply["id"], "s1");
        assert_eq!(
            controller.settings().read().await.connection().baudrate,
            Some(9600)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_with_missing_port_returns_error_code() {
        let (controller, link) = controller();
        request(
            r#"{"type": "apply_settings", "settings": {"port": ""}}"#,
            &controller,
        )
        .await;

        let reply = request(r#"{"type": "stop"}"#, &controller).await;
        assert_eq!(reply["code"], "missing_value");
        assert!(link.sent_frames().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_settings_and_queue_status() {
        let (controller, _link) = controller();

        let settings = request(r#"{"type": "get_settings"}"#, &controller).await;
        assert_eq!(settings["data"]["axes"]["X"]["step_scale"], 10.0);
        assert_eq!(settings["data"]["protocol"], "c-series");

        let status = request(r#"{"type": "queue_status"}"#, &controller).await;
        assert_eq!(status["data"]["state"], "idle");
    }

    #[tokio::test]
    async fn test_socket_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("stage.sock");
        let (controller, _link) = controller();

        let mut server = SocketServer::new(
            SocketServerConfig {
                socket_path: socket_path.to_string_lossy().into_owned(),
                ..SocketServerConfig::default()
            },
            Arc::new(controller),
        );
        server.start().await.unwrap();

        let stream = UnixStream::connect(&socket_path).await.unwrap();
        let mut framed = Framed::new(stream, LinesCodec::new());
        framed
            .send(r#"{"type": "ping", "id": "p1"}"#.to_string())
            .await
            .unwrap();
        let line = framed.next().await.unwrap().unwrap();
        let reply: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(reply["status"], "success");
        assert_eq!(reply["data"]["message"], "pong");

        framed.send("{broken".to_string()).await.unwrap();
        let line = framed.next().await.unwrap().unwrap();
        assert!(line.contains("Failed to parse command"));

        server.shutdown().await.unwrap();
        assert!(!socket_path.exists());
    }

    fn server_at(path: &Path, controller: Arc<MotionController>, max_connections: usize) -> SocketServer {
        SocketServer::new(
            SocketServerConfig {
                socket_path: path.to_string_lossy().into_owned(),
                max_connections,
            },
            controller,
        )
    }

    async fn first_reply(path: &Path) -> (Value, Framed<UnixStream, LinesCodec>) {
        let stream = UnixStream::connect(path).await.unwrap();
        let mut framed = Framed::new(stream, LinesCodec::new());
        let line = framed.next().await.unwrap().unwrap();
        (serde_json::from_str(&line).unwrap(), framed)
    }

    #[tokio::test]
    async fn test_clients_refused_while_queue_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("stage.sock");
        let (controller, _link) = controller();
        let controller = Arc::new(controller);
        controller.shutdown().await;

        let mut server = server_at(&socket_path, controller, 4);
        server.start().await.unwrap();

        let (reply, mut framed) = first_reply(&socket_path).await;
        assert_eq!(reply["status"], "error");
        assert_eq!(reply["code"], "queue_closed");
        assert!(framed.next().await.is_none());

        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_connection_limit_refuses_extra_client() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("stage.sock");
        let (controller, _link) = controller();

        let mut server = server_at(&socket_path, Arc::new(controller), 1);
        server.start().await.unwrap();

        let stream = UnixStream::connect(&socket_path).await.unwrap();
        let mut first = Framed::new(stream, LinesCodec::new());
        first.send(r#"{"type": "ping"}"#.to_string()).await.unwrap();
        assert!(first.next().await.unwrap().unwrap().contains("pong"));

        let (reply, _) = first_reply(&socket_path).await;
        assert_eq!(reply["code"], "busy");

        drop(first);
        server.shutdown().await.unwrap();
    }
}
