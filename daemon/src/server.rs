use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use stickerpicker_core::HostChannel;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::catalog::{load_catalog, CatalogSource};
use crate::config::ServerConfig;
use crate::control::{
    ControlRequest, ControlResponse, ErrorCode, RequestBody, ResponseBody, SentResponse,
    StickersResponse,
};
use crate::picker::Picker;

pub type SharedPicker = Arc<Mutex<Picker<HostLink>>>;

/// Outbound path to whichever host connected last.
#[derive(Clone, Default)]
pub struct HostLink {
    sender: Arc<StdMutex<Option<mpsc::UnboundedSender<Value>>>>,
}

impl HostLink {
    pub fn attach(&self) -> mpsc::UnboundedReceiver<Value> {
        let (sender, receiver) = mpsc::unbounded_channel();
        if let Ok(mut slot) = self.sender.lock() {
            *slot = Some(sender);
        }
        receiver
    }
}

impl HostChannel for HostLink {
    fn post(&self, message: Value) {
        let Ok(slot) = self.sender.lock() else {
            warn!("host link lock poisoned, dropping message");
            return;
        };
        let Some(sender) = slot.as_ref() else {
            debug!("no host connected, dropping message");
            return;
        };
        if sender.send(message).is_err() {
            debug!("host disconnected, dropping message");
        }
    }
}

#[derive(Clone)]
struct CatalogReloader {
    source: Arc<dyn CatalogSource>,
    default_homeserver: String,
}

pub struct PickerServer {
    config: ServerConfig,
    picker: SharedPicker,
    host: HostLink,
    reloader: CatalogReloader,
}

impl PickerServer {
    pub fn new(
        config: ServerConfig,
        picker: Picker<HostLink>,
        host: HostLink,
        source: Arc<dyn CatalogSource>,
        default_homeserver: String,
    ) -> Self {
        Self {
            config,
            picker: Arc::new(Mutex::new(picker)),
            host,
            reloader: CatalogReloader {
                source,
                default_homeserver,
            },
        }
    }

    pub async fn run(&self) -> Result<()> {
        let host_listener = bind(&self.config.host_socket_path).await?;
        let control_listener = bind(&self.config.control_socket_path).await?;
        info!(
            host = %self.config.host_socket_path.display(),
            control = %self.config.control_socket_path.display(),
            "stickerpicker listening"
        );

        loop {
            tokio::select! {
                accepted = host_listener.accept() => {
                    let (stream, _) = accepted?;
                    let picker = self.picker.clone();
                    let host = self.host.clone();
                    tokio::spawn(async move {
                        if let Err(error) = handle_host_connection(stream, picker, host).await {
                            warn!("host connection closed with error: {error:#}");
                        }
                    });
                }
                accepted = control_listener.accept() => {
                    let (stream, _) = accepted?;
                    let picker = self.picker.clone();
                    let reloader = self.reloader.clone();
                    tokio::spawn(async move {
                        if let Err(error) = handle_control_connection(stream, picker, reloader).await {
                            warn!("control connection closed with error: {error:#}");
                        }
                    });
                }
            }
        }
    }
}

async fn bind(socket_path: &Path) -> Result<UnixListener> {
    if let Some(parent) = socket_path.parent() {
        fs::create_dir_all(parent).await.with_context(|| {
            format!("failed to create socket directory {}", parent.display())
        })?;
    }
    if socket_path.exists() {
        fs::remove_file(socket_path).await.with_context(|| {
            format!("failed to cleanup stale socket {}", socket_path.display())
        })?;
    }
    UnixListener::bind(socket_path)
        .with_context(|| format!("failed to bind unix socket at {}", socket_path.display()))
}

async fn write_line<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_string(message)?;
    writer.write_all(payload.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    Ok(())
}

async fn handle_host_connection(stream: UnixStream, picker: SharedPicker, host: HostLink) -> Result<()> {
    info!("host connected");
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut outbound = host.attach();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if let Some(reply) = process_host_line(&line, &picker).await {
                    write_line(&mut writer, &reply).await?;
                }
            }
            Some(message) = outbound.recv() => {
                write_line(&mut writer, &message).await?;
            }
        }
    }
    info!("host disconnected");
    Ok(())
}

async fn process_host_line(line: &str, picker: &SharedPicker) -> Option<Value> {
    if line.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(line) {
        Ok(message) => picker.lock().await.handle_host_message(&message),
        Err(error) => {
            debug!("ignoring non-JSON host message: {error}");
            None
        }
    }
}

async fn handle_control_connection(
    stream: UnixStream,
    picker: SharedPicker,
    reloader: CatalogReloader,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = process_control_line(&line, &picker, &reloader).await;
        write_line(&mut writer, &response).await?;
    }
    Ok(())
}

async fn process_control_line(
    line: &str,
    picker: &SharedPicker,
    reloader: &CatalogReloader,
) -> ControlResponse {
    match serde_json::from_str::<ControlRequest>(line) {
        Ok(request) => handle_request(request, picker, reloader).await,
        Err(error) => {
            error!("invalid control request JSON: {error}");
            ControlResponse {
                id: String::new(),
                body: ResponseBody::error(
                    ErrorCode::InvalidRequest,
                    format!("invalid JSON payload: {error}"),
                ),
            }
        }
    }
}

async fn handle_request(
    request: ControlRequest,
    picker: &SharedPicker,
    reloader: &CatalogReloader,
) -> ControlResponse {
    let id = request.id;
    let body = match request.body {
        RequestBody::Ping => ResponseBody::Pong,
        RequestBody::Status => ResponseBody::Status(picker.lock().await.status()),
        RequestBody::Packs => ResponseBody::Packs(picker.lock().await.packs()),
        RequestBody::FrequentlyUsed { limit } => ResponseBody::Stickers(StickersResponse {
            stickers: picker.lock().await.frequently_used(limit),
        }),
        RequestBody::Search { query } => ResponseBody::Stickers(StickersResponse {
            stickers: picker.lock().await.search(&query),
        }),
        RequestBody::SendSticker { sticker_id } => {
            let mut picker = picker.lock().await;
            match picker.sticker(&sticker_id) {
                Some(sticker) => sent(picker.send_sticker(&sticker)),
                None => ResponseBody::error(
                    ErrorCode::UnknownSticker,
                    format!("no sticker with id {sticker_id}"),
                ),
            }
        }
        RequestBody::SendImage { content } => sent(picker.lock().await.send_image(&content)),
        RequestBody::Forget { sticker_ids } => {
            picker.lock().await.forget(&sticker_ids);
            ResponseBody::Ok
        }
        RequestBody::ForgetAll => {
            picker.lock().await.forget_all();
            ResponseBody::Ok
        }
        RequestBody::ReloadPacks => {
            match load_catalog(reloader.source.as_ref(), &reloader.default_homeserver).await {
                Ok(catalog) => {
                    let mut picker = picker.lock().await;
                    picker.apply_catalog(catalog);
                    ResponseBody::Packs(picker.packs())
                }
                Err(error) => {
                    warn!("failed to reload packs: {error:#}");
                    ResponseBody::error(ErrorCode::Internal, format!("{error:#}"))
                }
            }
        }
    };
    ControlResponse { id, body }
}

fn sent(result: Result<String>) -> ResponseBody {
    match result {
        Ok(request_id) => ResponseBody::Sent(SentResponse { request_id }),
        Err(error) => ResponseBody::error(ErrorCode::Internal, format!("{error:#}")),
    }
}
