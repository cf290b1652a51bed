// Datagram transport for control packets
use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tracing::info;

/// Best-effort datagram receive.
///
/// `recv` must be cancel safe: the safety loop races it against the receive
/// timeout and drops it when the timeout wins. An `Err` is a transport
/// failure and ends the loop.
pub trait DatagramSource {
    /// Receive one datagram into `buf`, returning its length
    fn recv(&mut self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>>;
}

/// UDP socket the drive controller sends to
pub struct UdpReceiver {
    socket: UdpSocket,
    controller: Option<SocketAddr>,
}

impl UdpReceiver {
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        info!("Listening for control packets on {}", socket.local_addr()?);
        Ok(Self {
            socket,
            controller: None,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Last address a datagram came from
    pub fn controller(&self) -> Option<SocketAddr> {
        self.controller
    }
}

impl DatagramSource for UdpReceiver {
    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let (len, from) = self.socket.recv_from(buf).await?;
        if self.controller != Some(from) {
            info!("Drive controller at {}", from);
            self.controller = Some(from);
        }
        Ok(len)
    }
}
