//! Datagram transport
//!
//! The scheduler consumes the transport through a narrow interface: send
//! a buffer on a connection to an endpoint, and poll for at most one
//! tick's worth of milliseconds. Connection id 0 is the default outbound
//! socket; non-zero ids name sockets on which inbound requests arrived
//! and to which their responses must be sent.

use std::collections::VecDeque;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;

/// Maximum UDP datagram the simulator will receive
const MAX_DATAGRAM: usize = 4096;

/// An inbound or outbound datagram
#[derive(Debug, Clone)]
pub struct Datagram {
    /// Connection the datagram arrived on / should leave on
    pub conn_id: u32,
    /// Remote endpoint
    pub peer: SocketAddr,
    /// Payload
    pub buf: Bytes,
}

/// Transport consumed by the simulator core
pub trait Transport {
    /// Send `buf` on connection `conn_id` to `dst`
    fn send_msg(&mut self, conn_id: u32, dst: SocketAddr, buf: Bytes) -> io::Result<()>;

    /// Drain inbound datagrams, waiting at most `wait_ms`
    fn poll(&mut self, wait_ms: u64) -> io::Result<Vec<Datagram>>;
}

/// UDP transport bound to the local GTP-C endpoint
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind the default GTP-C socket
    pub fn bind(local: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(local)?;
        log::info!("GTP-C socket bound to {local}");
        Ok(Self { socket })
    }

    /// Local address the socket is bound to
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Transport for UdpTransport {
    fn send_msg(&mut self, _conn_id: u32, dst: SocketAddr, buf: Bytes) -> io::Result<()> {
        self.socket.send_to(&buf, dst)?;
        Ok(())
    }

    fn poll(&mut self, wait_ms: u64) -> io::Result<Vec<Datagram>> {
        let mut out = Vec::new();
        let mut buf = [0u8; MAX_DATAGRAM];

        // block up to one tick for the first datagram, then drain
        // whatever else is queued without waiting
        self.socket
            .set_read_timeout(Some(Duration::from_millis(wait_ms.max(1))))?;
        match self.socket.recv_from(&mut buf) {
            Ok((len, peer)) => out.push(Datagram {
                conn_id: 0,
                peer,
                buf: Bytes::copy_from_slice(&buf[..len]),
            }),
            Err(e) if would_block(&e) => return Ok(out),
            Err(e) => return Err(e),
        }

        self.socket.set_nonblocking(true)?;
        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((len, peer)) => out.push(Datagram {
                    conn_id: 0,
                    peer,
                    buf: Bytes::copy_from_slice(&buf[..len]),
                }),
                Err(e) if would_block(&e) => break,
                Err(e) => {
                    self.socket.set_nonblocking(false)?;
                    return Err(e);
                }
            }
        }
        self.socket.set_nonblocking(false)?;

        Ok(out)
    }
}

fn would_block(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// A frame captured by the loopback transport
#[derive(Debug, Clone)]
pub struct SentFrame {
    pub conn_id: u32,
    pub dst: SocketAddr,
    pub buf: Bytes,
}

/// In-memory transport for the scenario tests: outbound frames are
/// captured, inbound datagrams are injected through the handle
pub struct LoopTransport {
    inbound: Arc<Mutex<VecDeque<Datagram>>>,
    sent: Arc<Mutex<Vec<SentFrame>>>,
}

/// Test-side handle onto a [`LoopTransport`]
#[derive(Clone)]
pub struct LoopHandle {
    inbound: Arc<Mutex<VecDeque<Datagram>>>,
    sent: Arc<Mutex<Vec<SentFrame>>>,
}

impl LoopTransport {
    pub fn new() -> (Self, LoopHandle) {
        let inbound = Arc::new(Mutex::new(VecDeque::new()));
        let sent = Arc::new(Mutex::new(Vec::new()));
        let handle = LoopHandle {
            inbound: Arc::clone(&inbound),
            sent: Arc::clone(&sent),
        };
        (Self { inbound, sent }, handle)
    }
}

impl Transport for LoopTransport {
    fn send_msg(&mut self, conn_id: u32, dst: SocketAddr, buf: Bytes) -> io::Result<()> {
        self.sent
            .lock()
            .expect("transport lock")
            .push(SentFrame { conn_id, dst, buf });
        Ok(())
    }

    fn poll(&mut self, _wait_ms: u64) -> io::Result<Vec<Datagram>> {
        Ok(self.inbound.lock().expect("transport lock").drain(..).collect())
    }
}

impl LoopHandle {
    /// Queue a datagram for the next poll
    pub fn push_inbound(&self, dgram: Datagram) {
        self.inbound.lock().expect("transport lock").push_back(dgram);
    }

    /// Snapshot of every frame sent so far
    pub fn sent(&self) -> Vec<SentFrame> {
        self.sent.lock().expect("transport lock").clone()
    }

    /// Number of frames sent so far
    pub fn sent_count(&self) -> usize {
        self.sent.lock().expect("transport lock").len()
    }

    /// Take and clear the captured frames
    pub fn take_sent(&self) -> Vec<SentFrame> {
        std::mem::take(&mut *self.sent.lock().expect("transport lock"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn test_loop_transport_round_trip() {
        let (mut transport, handle) = LoopTransport::new();

        transport
            .send_msg(0, ep(2123), Bytes::from_static(b"out"))
            .unwrap();
        assert_eq!(handle.sent_count(), 1);
        assert_eq!(&handle.sent()[0].buf[..], b"out");

        handle.push_inbound(Datagram {
            conn_id: 0,
            peer: ep(2123),
            buf: Bytes::from_static(b"in"),
        });
        let polled = transport.poll(0).unwrap();
        assert_eq!(polled.len(), 1);
        assert_eq!(&polled[0].buf[..], b"in");
        assert!(transport.poll(0).unwrap().is_empty());
    }

    #[test]
    fn test_udp_transport_send_recv() {
        let mut a = UdpTransport::bind(ep(0)).unwrap();
        let mut b = UdpTransport::bind(ep(0)).unwrap();
        let b_addr = b.local_addr().unwrap();

        a.send_msg(0, b_addr, Bytes::from_static(b"ping")).unwrap();

        let got = b.poll(200).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(&got[0].buf[..], b"ping");
        assert_eq!(got[0].conn_id, 0);
    }
}
