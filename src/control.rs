//! UDP control protocol client: device discovery (`detect`) and
//! RTC/SNTP-destination provisioning (`configure`) over a PING/PONG/SETUP
//! datagram protocol, correlated by a 5-byte response key.
//!
//! The request/response correlation scheme mirrors `bass-ptp`'s
//! pending-request bookkeeping (`PendingSyncData`/`PendingDelayData`
//! matched by `sequence_id`), adapted from that crate's thread-plus-
//! blocking-mutex style to `tokio::sync::oneshot` awaiters registered
//! under a `parking_lot::Mutex`-guarded map, consistent with this
//! crate's single-threaded async reactor.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::RngCore;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;

use crate::error::{ControlError, TimeoutError};

const DEVICE_PORT: u16 = 7284;
const SETUP_PACKET_LEN: usize = 1 + 4 + 1 + 16 + 16;
const MSG_TYPE_SETUP: u8 = 0x02;
const CORRELATION_KEY_LEN: usize = 5;

type CorrelationKey = [u8; CORRELATION_KEY_LEN];
type PendingResponse = (SocketAddr, Vec<u8>);

pub struct ControlClient {
    socket: Arc<UdpSocket>,
    waiters: Arc<Mutex<HashMap<CorrelationKey, oneshot::Sender<PendingResponse>>>>,
}

/// Result of a successful `detect`: the peer's source address plus the
/// destination/SNTP addresses it reports back.
pub struct DetectResult {
    pub peer_addr: SocketAddr,
    pub dest_addr: String,
    pub sntp_addr: String,
    pub rtt: Duration,
}

impl ControlClient {
    /// Binds `local_addr`, optionally enabling `SO_BROADCAST`, and spawns
    /// the background task that demultiplexes responses to waiters.
    pub async fn bind(local_addr: SocketAddr, broadcast: bool) -> Result<Self, ControlError> {
        let socket = UdpSocket::bind(local_addr).await?;
        socket.set_broadcast(broadcast)?;
        let socket = Arc::new(socket);
        let waiters: Arc<Mutex<HashMap<CorrelationKey, oneshot::Sender<PendingResponse>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        tokio::spawn(receive_loop(socket.clone(), waiters.clone()));

        Ok(Self { socket, waiters })
    }

    /// Send an address-discovery SETUP with zeroed address fields and
    /// await the device's reply.
    pub async fn detect(&self, remote: SocketAddr, timeout: Duration) -> Result<DetectResult, ControlError> {
        let msg_id = rand::thread_rng().next_u32();
        let packet = encode_setup(msg_id, 0, "", "")?;

        let sent_at = tokio::time::Instant::now();
        let (addr, response) = self.request(remote, &packet, timeout).await?;
        let rtt = sent_at.elapsed();

        let (dest_addr, sntp_addr) = decode_setup_addresses(&response)?;
        Ok(DetectResult { peer_addr: addr, dest_addr, sntp_addr, rtt })
    }

    /// Provision the device with a destination address and SNTP server,
    /// awaiting its acknowledgement.
    pub async fn configure(
        &self,
        remote: SocketAddr,
        dest_addr: &str,
        sntp_addr: &str,
        timeout: Duration,
    ) -> Result<(), ControlError> {
        let msg_id = rand::thread_rng().next_u32();
        let packet = encode_setup(msg_id, 0, dest_addr, sntp_addr)?;
        self.request(remote, &packet, timeout).await?;
        Ok(())
    }

    async fn request(
        &self,
        remote: SocketAddr,
        packet: &[u8],
        timeout: Duration,
    ) -> Result<PendingResponse, ControlError> {
        let mut key = [0u8; CORRELATION_KEY_LEN];
        key.copy_from_slice(&packet[..CORRELATION_KEY_LEN]);

        let (tx, rx) = oneshot::channel();
        self.waiters.lock().insert(key, tx);

        let remote = SocketAddr::new(remote.ip(), DEVICE_PORT);
        if let Err(err) = self.socket.send_to(packet, remote).await {
            self.waiters.lock().remove(&key);
            return Err(err.into());
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => {
                // sender dropped without a response; treat as a timeout
                Err(ControlError::Timeout(TimeoutError(timeout)))
            }
            Err(_) => {
                self.waiters.lock().remove(&key);
                Err(ControlError::Timeout(TimeoutError(timeout)))
            }
        }
    }
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    waiters: Arc<Mutex<HashMap<CorrelationKey, oneshot::Sender<PendingResponse>>>>,
) {
    let mut buf = [0u8; 512];
    loop {
        let (len, addr) = match socket.recv_from(&mut buf).await {
            Ok(pair) => pair,
            Err(_) => continue,
        };
        if len < CORRELATION_KEY_LEN {
            continue;
        }

        let mut key = [0u8; CORRELATION_KEY_LEN];
        key.copy_from_slice(&buf[..CORRELATION_KEY_LEN]);

        if let Some(tx) = waiters.lock().remove(&key) {
            let _ = tx.send((addr, buf[..len].to_vec()));
        }
    }
}

fn encode_setup(msg_id: u32, version: u8, dest_addr: &str, sntp_addr: &str) -> Result<Vec<u8>, ControlError> {
    let dest_field = pad_ascii_field("dest_addr", dest_addr)?;
    let sntp_field = pad_ascii_field("sntp_addr", sntp_addr)?;

    let mut packet = Vec::with_capacity(SETUP_PACKET_LEN);
    packet.push(MSG_TYPE_SETUP);
    packet.extend_from_slice(&msg_id.to_be_bytes());
    packet.push(version);
    packet.extend_from_slice(&dest_field);
    packet.extend_from_slice(&sntp_field);
    Ok(packet)
}

fn pad_ascii_field(field: &'static str, s: &str) -> Result<[u8; 16], ControlError> {
    if !s.is_ascii() {
        return Err(ControlError::NotAscii(s.to_string()));
    }
    let bytes = s.as_bytes();
    if bytes.len() >= 16 {
        return Err(ControlError::AddressTooLong { field, len: bytes.len() });
    }
    let mut out = [0u8; 16];
    out[..bytes.len()].copy_from_slice(bytes);
    Ok(out)
}

fn un_c_str(field: &[u8]) -> Result<String, ControlError> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    std::str::from_utf8(&field[..end]).map(str::to_owned).map_err(|_| ControlError::MalformedResponse)
}

fn decode_setup_addresses(response: &[u8]) -> Result<(String, String), ControlError> {
    if response.len() != SETUP_PACKET_LEN {
        return Err(ControlError::MalformedResponse);
    }
    let dest_addr = un_c_str(&response[6..22])?;
    let sntp_addr = un_c_str(&response[22..38])?;
    Ok((dest_addr, sntp_addr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_setup_produces_38_bytes() {
        let packet = encode_setup(0x1234_5678, 0, "10.0.0.1", "pool.ntp.org").unwrap();
        assert_eq!(packet.len(), SETUP_PACKET_LEN);
        assert_eq!(packet[0], MSG_TYPE_SETUP);
        assert_eq!(&packet[1..5], &0x1234_5678u32.to_be_bytes());
    }

    #[test]
    fn correlation_key_is_first_five_bytes() {
        let packet = encode_setup(42, 0, "", "").unwrap();
        let key = &packet[..CORRELATION_KEY_LEN];
        assert_eq!(key[0], MSG_TYPE_SETUP);
        assert_eq!(&key[1..5], &42u32.to_be_bytes());
    }

    #[test]
    fn rejects_address_16_bytes_or_longer() {
        let err = encode_setup(0, 0, "0123456789012345", "").unwrap_err();
        assert!(matches!(err, ControlError::AddressTooLong { .. }));
    }

    #[test]
    fn decode_strips_nul_padding() {
        let mut response = vec![0u8; SETUP_PACKET_LEN];
        response[6..14].copy_from_slice(b"10.0.0.1");
        response[22..26].copy_from_slice(b"ntp1");

        let (dest, sntp) = decode_setup_addresses(&response).unwrap();
        assert_eq!(dest, "10.0.0.1");
        assert_eq!(sntp, "ntp1");
    }

    #[test]
    fn decode_rejects_wrong_length() {
        let err = decode_setup_addresses(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, ControlError::MalformedResponse));
    }
}
