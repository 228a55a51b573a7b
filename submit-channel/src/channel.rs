//! Framed packet transport over a byte stream

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{io, path::Path};

use submit_common::{incoming, outgoing};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{UnixListener, UnixSocket, UnixStream},
};
use tracing::{debug, info};

use crate::{ChannelError, Packet, Result};

/// Largest payload written in a single chunk
pub const MAX_CHUNK_LEN: usize = 64 * 1024;

/// Largest packet a receiver accepts, to bound memory use
pub const MAX_PACKET_LEN: usize = 256 * 1024 * 1024;

/// One endpoint of a conversation between a frontend and the daemon.
///
/// On the wire every packet is a series of chunks, each a 4-byte big-endian
/// length followed by that many payload bytes. A chunk of length zero ends
/// the packet.
pub struct Channel<S = UnixStream> {
    stream: S,
    chunk_size: usize,
}

impl Channel<UnixStream> {
    /// Connect to the daemon listening on `path`
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Unavailable`] if there is no socket at `path`
    /// and [`ChannelError::Refused`] if nobody accepts connections on it.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Connecting to daemon socket: {}", path.display());

        if !path.exists() {
            return Err(ChannelError::Unavailable);
        }

        match UnixStream::connect(path).await {
            Ok(stream) => Ok(Self::new(stream)),
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => Err(ChannelError::Refused),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ChannelError::Unavailable),
            Err(e) => Err(ChannelError::Io(e)),
        }
    }
}

impl<S> Channel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub const fn new(stream: S) -> Self {
        Self {
            stream,
            chunk_size: MAX_CHUNK_LEN,
        }
    }

    /// Split outgoing packets into chunks of at most `chunk_size` bytes
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, u32::MAX as usize);
        self
    }

    /// Serialize `packet` and write it as a chunk sequence
    ///
    /// # Errors
    ///
    /// Returns an error if the packet cannot be encoded or written.
    pub async fn send(&mut self, packet: &Packet) -> Result<()> {
        let bytes = bincode::serde::encode_to_vec(packet, bincode::config::standard())?;
        outgoing!("{} ({} bytes)", packet.name(), bytes.len());

        for chunk in bytes.chunks(self.chunk_size) {
            let len = u32::try_from(chunk.len())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            self.stream.write_all(&len.to_be_bytes()).await?;
            self.stream.write_all(chunk).await?;
        }

        self.stream.write_all(&0u32.to_be_bytes()).await?;
        self.stream.flush().await?;

        Ok(())
    }

    /// Read chunks up to the terminating empty chunk and decode the packet
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Eof`] if the peer disconnects before the
    /// terminator, or a protocol error if the payload cannot be decoded.
    pub async fn receive(&mut self) -> Result<Packet> {
        let mut payload = Vec::new();

        loop {
            let mut len_buf = [0u8; 4];
            self.stream.read_exact(&mut len_buf).await.map_err(eof)?;
            let len = u32::from_be_bytes(len_buf) as usize;
            if len == 0 {
                break;
            }

            let start = payload.len();
            if start + len > MAX_PACKET_LEN {
                return Err(ChannelError::TooLarge(start + len));
            }

            payload.resize(start + len, 0);
            self.stream
                .read_exact(&mut payload[start..])
                .await
                .map_err(eof)?;
        }

        let (packet, _): (Packet, _) =
            bincode::serde::decode_from_slice(&payload, bincode::config::standard())?;
        incoming!("{} ({} bytes)", packet.name(), payload.len());

        Ok(packet)
    }

    /// Send `packet` and wait for the peer's answer
    ///
    /// # Errors
    ///
    /// See [`Channel::send`] and [`Channel::receive`].
    pub async fn request(&mut self, packet: &Packet) -> Result<Packet> {
        self.send(packet).await?;
        self.receive().await
    }

    /// Shut down the write half; the peer sees end of file.
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("Error closing channel: {e}");
        }
    }
}

fn eof(error: io::Error) -> ChannelError {
    match error.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::BrokenPipe => ChannelError::Eof,
        _ => ChannelError::Io(error),
    }
}

/// Bind the daemon socket at `path`, replacing any stale socket file.
///
/// The socket is only accessible by its owner and has a backlog of one.
///
/// # Errors
///
/// Returns an error if the stale file cannot be removed or the socket cannot
/// be bound.
pub async fn listen(path: impl AsRef<Path>) -> Result<UnixListener> {
    let path = path.as_ref();

    match tokio::fs::remove_file(path).await {
        Ok(()) => info!("Removed stale socket file: {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(ChannelError::Io(e)),
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let socket = UnixSocket::new_stream()?;
    socket.bind(path)?;
    let listener = socket.listen(1)?;

    #[cfg(unix)]
    {
        let mut perms = tokio::fs::metadata(path).await?.permissions();
        perms.set_mode(0o600);
        tokio::fs::set_permissions(path, perms).await?;
    }

    info!("Listening on {}", path.display());
    Ok(listener)
}
