//! [`ServoLink`] – the connection to the owl's servo controller.
//!
//! A link sends one encoded command and returns the raw reply.  Both
//! implementations use explicit read/write timeouts so a silent controller
//! can never stall the control loop for longer than the configured budget.
//! Failures are reported as [`OwlError::TransportFailure`], which the loop
//! treats as recoverable.

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use owl_types::OwlError;
use tracing::{debug, info};

/// Largest reply read per command.
const MAX_REPLY: usize = 512;

/// Connection to the servo controller.
pub trait ServoLink: Send {
    /// Address of the controller, e.g. `"10.0.0.10:12345"`.
    fn endpoint(&self) -> &str;

    /// Send `command` and wait (bounded) for the controller's reply.
    ///
    /// # Errors
    ///
    /// Returns [`OwlError::TransportFailure`] if the command cannot be sent
    /// or no reply arrives in time.
    fn send(&mut self, command: &str) -> Result<Vec<u8>, OwlError>;

    /// Release the connection.  Further sends fail.
    fn close(&mut self);
}

fn resolve(endpoint: &str) -> Result<SocketAddr, OwlError> {
    endpoint
        .to_socket_addrs()
        .map_err(|e| failure(endpoint, format!("cannot resolve: {e}")))?
        .next()
        .ok_or_else(|| failure(endpoint, "no address resolved".to_string()))
}

fn failure(endpoint: &str, details: String) -> OwlError {
    OwlError::TransportFailure {
        endpoint: endpoint.to_string(),
        details,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// UDP
// ────────────────────────────────────────────────────────────────────────────

/// Datagram link: one command datagram out, one reply datagram back.
pub struct UdpServoLink {
    endpoint: String,
    socket: Option<UdpSocket>,
}

impl UdpServoLink {
    /// Bind an ephemeral local port and connect it to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`OwlError::TransportFailure`] if the address cannot be
    /// resolved or the socket cannot be set up.
    pub fn connect(endpoint: &str, timeout: Duration) -> Result<Self, OwlError> {
        let addr = resolve(endpoint)?;
        let local = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local).map_err(|e| failure(endpoint, format!("bind: {e}")))?;
        socket
            .connect(addr)
            .map_err(|e| failure(endpoint, format!("connect: {e}")))?;
        socket
            .set_read_timeout(Some(timeout))
            .and_then(|_| socket.set_write_timeout(Some(timeout)))
            .map_err(|e| failure(endpoint, format!("set timeout: {e}")))?;
        info!(endpoint, "UDP servo link ready");
        Ok(Self {
            endpoint: endpoint.to_string(),
            socket: Some(socket),
        })
    }
}

impl ServoLink for UdpServoLink {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn send(&mut self, command: &str) -> Result<Vec<u8>, OwlError> {
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| failure(&self.endpoint, "link closed".to_string()))?;
        socket
            .send(command.as_bytes())
            .map_err(|e| failure(&self.endpoint, format!("send: {e}")))?;
        let mut buf = [0u8; MAX_REPLY];
        let n = socket
            .recv(&mut buf)
            .map_err(|e| failure(&self.endpoint, format!("recv: {e}")))?;
        Ok(buf[..n].to_vec())
    }

    fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!(endpoint = %self.endpoint, "UDP servo link closed");
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TCP
// ────────────────────────────────────────────────────────────────────────────

/// Stream link.  A failed exchange drops the stream; the next send
/// reconnects.
pub struct TcpServoLink {
    endpoint: String,
    addr: SocketAddr,
    timeout: Duration,
    stream: Option<TcpStream>,
    closed: bool,
}

impl TcpServoLink {
    /// Connect to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`OwlError::TransportFailure`] if the controller cannot be
    /// reached within `timeout`.
    pub fn connect(endpoint: &str, timeout: Duration) -> Result<Self, OwlError> {
        let addr = resolve(endpoint)?;
        let mut link = Self {
            endpoint: endpoint.to_string(),
            addr,
            timeout,
            stream: None,
            closed: false,
        };
        link.stream = Some(link.open()?);
        info!(endpoint, "TCP servo link ready");
        Ok(link)
    }

    fn open(&self) -> Result<TcpStream, OwlError> {
        let stream = TcpStream::connect_timeout(&self.addr, self.timeout)
            .map_err(|e| failure(&self.endpoint, format!("connect: {e}")))?;
        stream
            .set_read_timeout(Some(self.timeout))
            .and_then(|_| stream.set_write_timeout(Some(self.timeout)))
            .and_then(|_| stream.set_nodelay(true))
            .map_err(|e| failure(&self.endpoint, format!("configure: {e}")))?;
        Ok(stream)
    }

    fn exchange(stream: &mut TcpStream, command: &str) -> std::io::Result<Vec<u8>> {
        stream.write_all(command.as_bytes())?;
        let mut buf = [0u8; MAX_REPLY];
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "controller closed the connection",
            ));
        }
        Ok(buf[..n].to_vec())
    }
}

impl ServoLink for TcpServoLink {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn send(&mut self, command: &str) -> Result<Vec<u8>, OwlError> {
        if self.closed {
            return Err(failure(&self.endpoint, "link closed".to_string()));
        }
        if self.stream.is_none() {
            debug!(endpoint = %self.endpoint, "reconnecting TCP servo link");
            self.stream = Some(self.open()?);
        }
        let result = match self.stream.as_mut() {
            Some(stream) => Self::exchange(stream, command),
            None => return Err(failure(&self.endpoint, "no stream".to_string())),
        };
        result.map_err(|e| {
            self.stream = None;
            failure(&self.endpoint, format!("exchange: {e}"))
        })
    }

    fn close(&mut self) {
        self.closed = true;
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            debug!(endpoint = %self.endpoint, "TCP servo link closed");
        }
    }
}
