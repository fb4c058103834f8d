//! Daemon entrypoint: loads configuration, binds the telemetry UDP
//! socket, and drives decoded datagrams into an [`Ingestor`].
//!
//! Runs on a single-threaded tokio runtime, consistent with the
//! ingest core's no-internal-locking design: one task owns the socket
//! and feeds the ingestor directly rather than fanning datagrams out
//! across worker threads.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use sn2_ingestd::codec::bme280::BoschCompensator;
use sn2_ingestd::config::Config;
use sn2_ingestd::ingestor::Ingestor;
use sn2_ingestd::rewrite::IdentityRewriter;
use sn2_ingestd::rtcifier::RTCifier;
use sn2_ingestd::sink::{ChannelSink, ChannelStreamSink, Sink, StreamSink};
use sn2_ingestd::timeline::Timeline;

const DEVICE_PORT: u16 = 7284;
const SEQ_WRAPAROUND: u32 = 1 << 16;
const SEQ_SLACK: u32 = 1000;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config_path =
        std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("/etc/sn2d/config.json"));
    let config_bytes = std::fs::read(&config_path)?;
    let config = Config::from_json(&config_bytes)?;

    let socket = bind_telemetry_socket(config.net.local_address)?;
    log::info!("listening for telemetry on {}", socket.local_addr()?);

    let sinks = build_sinks(&config);
    let (stream_sink, _stream_receiver) = ChannelStreamSink::new(config.streams.queue_length);
    let stream_sink = Arc::new(stream_sink);

    let mut ingestor = Ingestor::new(
        RTCifier::new(Timeline::new(SEQ_WRAPAROUND, SEQ_SLACK)),
        std::path::Path::new(&config.streams.datadir),
        config.streams.batch_size,
        SEQ_SLACK,
        Box::new(IdentityRewriter),
        Box::new(IdentityRewriter),
        sinks,
        Box::new(BoschCompensator),
        move |block, handle| stream_sink.submit_block(block, handle),
    )?;

    let mut buf = [0u8; 2048];
    loop {
        let (len, _peer) = socket.recv_from(&mut buf).await?;
        if let Err(err) = ingestor.handle_datagram(&buf[..len]) {
            log::warn!("ingestor rejected datagram: {err}");
        }
    }
}

/// Binds the telemetry listen socket with `SO_REUSEADDR`, following the
/// same socket2-then-handoff pattern the RTP socket layer uses for its
/// own UDP bindings, generalized here to a tokio socket handoff.
fn bind_telemetry_socket(local_address: std::net::IpAddr) -> std::io::Result<tokio::net::UdpSocket> {
    let addr = SocketAddr::new(local_address, DEVICE_PORT);
    let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    tokio::net::UdpSocket::from_std(socket.into())
}

/// Instantiates one [`Sink`] per configured entry. `pubsub` sinks need
/// a concrete [`sn2_ingestd::sink::PubSubPublisher`] backend, which is
/// outside this crate's scope; such entries are logged and skipped
/// rather than silently dropped.
fn build_sinks(config: &Config) -> Vec<Arc<dyn Sink>> {
    let mut sinks: Vec<Arc<dyn Sink>> = Vec::new();
    for sink_config in &config.sinks {
        match sink_config {
            sn2_ingestd::config::SinkConfig::Channel { queue_length } => {
                let capacity = queue_length.unwrap_or(config.streams.queue_length);
                let (sink, _receiver) = ChannelSink::new(capacity);
                sinks.push(Arc::new(sink));
            }
            sn2_ingestd::config::SinkConfig::PubSub { via, .. } => {
                log::warn!("pub/sub sink via {via:?} requires a PubSubPublisher backend; skipping");
            }
        }
    }
    sinks
}
