//! Mesh radio command line client.
//!
//! Connects to a radio over its stream API, downloads the device state, and
//! then shows it, listens to mesh traffic, or sends a text message.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use radio_session::{
    connect_url, format_node, Device, DeviceState, FanOutPublisher, HardwareTransport,
    QueueSubscriber, SendDataParams, StreamingTransport,
};
use radio_wire::proto::channel::Role;
use radio_wire::{ChannelKey, ToRadio, BROADCAST_ADDR};
use std::{path::PathBuf, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod listen;
mod logging;
mod node;

use config::ClientConfig;
use listen::{is_mesh_packet, print_text_messages, PacketLogger};
use logging::RadioLogFormatter;

/// Mesh radio client
#[derive(Parser, Debug)]
#[command(name = "radio", version, about = "Client for mesh radios speaking the stream API")]
struct Args {
    /// Configuration file path
    #[arg(long, default_value = "radio.yaml")]
    config: PathBuf,

    /// Device URL, e.g. tcp://192.168.1.40:4403 (overrides config)
    #[arg(long)]
    device: Option<String>,

    /// Upper bound for the configuration handshake, e.g. 30s (overrides config)
    #[arg(long)]
    handshake_timeout: Option<humantime::Duration>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the attached node, its channels and the node database
    Info,

    /// Print mesh traffic until interrupted
    Listen {
        /// Base64 channel key for packets the radio forwards encrypted
        #[arg(long)]
        channel_key: Option<String>,

        /// Text messages buffered before the oldest is dropped
        #[arg(long)]
        queue_capacity: Option<usize>,
    },

    /// Send a text message
    SendText {
        /// Destination node (!hex, 0xhex, decimal or ^all)
        #[arg(long)]
        to: Option<String>,

        /// Channel slot to send on
        #[arg(long, default_value_t = 0)]
        channel: u32,

        /// Ask the recipient for an acknowledgement
        #[arg(long)]
        want_ack: bool,

        /// Message text
        text: String,
    },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::new("warn")
        .add_directive(format!("radio={}", args.log_level).parse()?)
        .add_directive(format!("radio_session={}", args.log_level).parse()?)
        .add_directive(format!("radio_wire={}", args.log_level).parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .event_format(RadioLogFormatter::new("radio"))
        .init();

    debug!("Starting radio client v{}", env!("CARGO_PKG_VERSION"));

    let mut config = ClientConfig::load_from_file(&args.config)?;
    if let Some(device) = args.device {
        config.device = device;
    }
    if let Some(timeout) = args.handshake_timeout {
        config.handshake_timeout = timeout.into();
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, shutting down");
                cancel.cancel();
            }
        });
    }

    let transport = connect_url(&config.device)
        .await
        .with_context(|| format!("failed to connect to {}", config.device))?;
    let (device, state) = connect_device(transport.clone(), &config, &cancel).await?;

    let outcome = match args.command {
        Command::Info => {
            print_info(&device, &state);
            Ok(())
        }
        Command::Listen {
            channel_key,
            queue_capacity,
        } => {
            let key = channel_key.unwrap_or_else(|| config.channel_key.clone());
            let capacity = queue_capacity.unwrap_or(config.queue_capacity);
            run_listen(transport.clone(), &key, capacity, &cancel).await
        }
        Command::SendText {
            to,
            channel,
            want_ack,
            text,
        } => send_text(&device, to.as_deref(), channel, want_ack, text).await,
    };

    if let Err(e) = transport.send_to_radio(ToRadio::disconnect()).await {
        debug!("Could not say goodbye to the radio: {}", e);
    }

    outcome
}

async fn connect_device(
    transport: Arc<dyn HardwareTransport>,
    config: &ClientConfig,
    cancel: &CancellationToken,
) -> Result<(Device, DeviceState)> {
    info!("Connecting to {}", config.device);

    match tokio::time::timeout(config.handshake_timeout, Device::connect(transport, cancel)).await
    {
        Ok(result) => result.context("configuration handshake failed"),
        Err(_) => bail!(
            "radio did not finish the configuration handshake within {}",
            humantime::format_duration(config.handshake_timeout)
        ),
    }
}

fn print_info(device: &Device, state: &DeviceState) {
    let me = state.current_node_info().and_then(|n| n.user.as_ref());
    match me {
        Some(user) => println!(
            "Node:      {} ({} / {})",
            format_node(device.node_id()),
            user.long_name,
            user.short_name
        ),
        None => println!("Node:      {}", format_node(device.node_id())),
    }

    if let Some(metadata) = &state.metadata {
        println!("Firmware:  {}", metadata.firmware_version);
    }
    if let Some(my_info) = &state.my_info {
        println!("Reboots:   {}", my_info.reboot_count);
    }

    println!("Channels:");
    for channel in &state.channels {
        let role = match channel.channel_role() {
            Role::Disabled => continue,
            Role::Primary => "primary",
            Role::Secondary => "secondary",
        };
        let name = match channel.name() {
            "" => "(default)",
            name => name,
        };
        println!("  [{}] {:<9} {}", channel.index, role, name);
    }

    println!("Nodes ({}):", state.nodes.len());
    for node in &state.nodes {
        let name = node
            .user
            .as_ref()
            .map(|u| u.long_name.as_str())
            .unwrap_or("?");
        let heard = match node.last_heard {
            0 => "never".to_string(),
            secs => chrono::DateTime::<chrono::Utc>::from_timestamp(secs as i64, 0)
                .map(|ts| ts.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "?".to_string()),
        };
        let hops = node
            .hops_away
            .map(|h| h.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {}  {:<24} snr {:>6.2}  hops {:>2}  heard {}",
            format_node(node.num),
            name,
            node.snr,
            hops,
            heard
        );
    }
}

async fn run_listen(
    transport: Arc<dyn HardwareTransport>,
    channel_key: &str,
    queue_capacity: usize,
    cancel: &CancellationToken,
) -> Result<()> {
    let key = ChannelKey::from_base64(channel_key).context("invalid channel key")?;

    let mut publisher = FanOutPublisher::new();
    publisher.subscribe(Arc::new(PacketLogger::new(key.clone())));

    let texts = Arc::new(QueueSubscriber::new(queue_capacity).with_filter(is_mesh_packet));
    let queue = texts.queue();
    publisher.subscribe(texts);

    let printer_cancel = cancel.child_token();
    let printer = tokio::spawn(print_text_messages(queue.clone(), key, printer_cancel.clone()));

    info!("Listening for mesh traffic, press Ctrl-C to stop");
    let published = publisher.publish_all(transport.receive_stream(cancel)).await;

    if !cancel.is_cancelled() {
        warn!("Connection to the radio ended");
    }
    queue.close();
    printer.await.context("text printer task failed")?;
    printer_cancel.cancel();

    info!(published, "Listener stopped");
    Ok(())
}

async fn send_text(
    device: &Device,
    to: Option<&str>,
    channel: u32,
    want_ack: bool,
    text: String,
) -> Result<()> {
    let dest_node = match to {
        Some(to) => node::parse_node(to)?,
        None => BROADCAST_ADDR,
    };

    let params = SendDataParams {
        dest_node,
        want_ack,
        channel_index: channel,
        ..SendDataParams::text(text)
    };
    let id = device.send_data(params).await.context("failed to send text message")?;

    println!("Sent packet {:#010x} to {}", id, format_node(dest_node));
    Ok(())
}
