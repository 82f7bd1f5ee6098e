//! Whole-frame I/O over a byte stream.
//!
//! A [`Transport`] owns one connection and moves complete CPX packets over
//! it. The protocol has no request identifiers, so a response is matched to
//! its request purely by ordering: every operation takes `&mut self`, which
//! keeps a second caller from reading the socket mid-transaction.
//!
//! # Example
//!
//! ```ignore
//! use cpx_bootloader::protocol::{Function, RoutedPacket, Target};
//! use cpx_bootloader::transport::Transport;
//!
//! let mut transport = Transport::connect("192.168.4.1:5000", None).await?;
//! let reply = transport
//!     .transact(&RoutedPacket::new(Target::Gap8, Function::Bootloader, vec![0x00]))
//!     .await?;
//! ```

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::error::{CpxError, Result};
use crate::protocol::{Header, RoutedPacket, HEADER_SIZE};

/// Default time to wait for the bytes of one read before giving up.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Frame-level transport over a single connection.
pub struct Transport<S> {
    stream: S,
    /// `None` waits forever.
    read_timeout: Option<Duration>,
    frames_sent: u64,
    frames_received: u64,
}

impl Transport<TcpStream> {
    /// Open a TCP connection to the CPX bridge.
    ///
    /// `connect_timeout` bounds the TCP handshake only.
    pub async fn connect<A: ToSocketAddrs>(
        addr: A,
        connect_timeout: Option<Duration>,
    ) -> Result<Self> {
        let stream = match connect_timeout {
            Some(limit) => tokio::time::timeout(limit, TcpStream::connect(addr))
                .await
                .map_err(|_| CpxError::Timeout(limit))??,
            None => TcpStream::connect(addr).await?,
        };
        stream.set_nodelay(true)?;

        if let Ok(peer) = stream.peer_addr() {
            tracing::debug!(%peer, "Connected to CPX bridge");
        }

        Ok(Self::new(stream))
    }
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already-connected stream with the default read timeout.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            frames_sent: 0,
            frames_received: 0,
        }
    }

    /// Set the read timeout. `None` blocks until data or EOF.
    pub fn with_read_timeout(mut self, read_timeout: Option<Duration>) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Current read timeout.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// Read exactly `n` bytes.
    ///
    /// A single socket read may return fewer bytes than requested; this
    /// keeps reading until all `n` have arrived.
    ///
    /// # Errors
    ///
    /// - `ConnectionClosed` on EOF before `n` bytes
    /// - `Timeout` if the read timeout elapses first
    /// - `Io` on any other read failure
    pub async fn read_exact(&mut self, n: usize) -> Result<Bytes> {
        let mut buf = vec![0u8; n];
        let read = AsyncReadExt::read_exact(&mut self.stream, &mut buf);
        let result = match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| CpxError::Timeout(limit))?,
            None => read.await,
        };

        match result {
            Ok(_) => Ok(Bytes::from(buf)),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(CpxError::ConnectionClosed)
            }
            Err(e) => Err(CpxError::Io(e)),
        }
    }

    /// Write all bytes and flush them to the connection.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Encode and send one packet without waiting for a reply.
    pub async fn send(&mut self, packet: &RoutedPacket) -> Result<()> {
        let wire = packet.encode()?;
        tracing::trace!(
            route = %packet.header()?,
            len = packet.payload_len(),
            "Sending packet"
        );
        self.write_all(&wire).await?;
        self.frames_sent += 1;
        Ok(())
    }

    /// Read one complete packet.
    ///
    /// Reads the 4-byte header, then exactly `length - 2` payload bytes.
    pub async fn receive(&mut self) -> Result<RoutedPacket> {
        let raw_header = self.read_exact(HEADER_SIZE).await?;
        let header = Header::decode(&raw_header)?;
        let payload_len = header.payload_len()?;

        let payload = if payload_len == 0 {
            Bytes::new()
        } else {
            self.read_exact(payload_len).await?
        };

        tracing::trace!(route = %header, len = payload_len, "Received packet");
        self.frames_received += 1;
        RoutedPacket::from_parts(header, payload)
    }

    /// Send a request and wait for the single packet that answers it.
    pub async fn transact(&mut self, packet: &RoutedPacket) -> Result<RoutedPacket> {
        self.send(packet).await?;
        self.receive().await
    }

    /// Packets sent since the transport was created.
    #[inline]
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Packets received since the transport was created.
    #[inline]
    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    /// Get a reference to the underlying stream.
    pub fn get_ref(&self) -> &S {
        &self.stream
    }
}
