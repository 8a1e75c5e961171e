//! Hosted frame transports (behind the `std` feature).
//!
//! On a target the BSP drains [`crate::Qs`] from its UART or TCP stack;
//! hosted builds and the development ports use these backends instead.

use std::io::{self, Write};
use std::net::{TcpStream, ToSocketAddrs, UdpSocket};
use std::sync::Mutex;
use std::vec::Vec;

use thiserror::Error;

use crate::buffer::{Qs, FLAG};

/// Errors while moving trace bytes to the host.
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
}

/// Consumes framed trace bytes.
pub trait TraceBackend: Send + Sync {
    fn write_bytes(&self, bytes: &[u8]) -> Result<(), TraceError>;
}

/// Drains everything currently buffered into the backend, one frame at a
/// time so partial frames never reach the wire.
pub fn drain<const N: usize>(qs: &Qs<N>, backend: &dyn TraceBackend) -> Result<(), TraceError> {
    let mut frame = Vec::new();
    while let Some(b) = qs.byte_out() {
        frame.push(b);
        if b == FLAG {
            backend.write_bytes(&frame)?;
            frame.clear();
        }
    }
    if !frame.is_empty() {
        backend.write_bytes(&frame)?;
    }
    Ok(())
}

/// Writes frames to any `Write` implementation.
pub struct WriterBackend<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterBackend<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl<W: Write + Send> TraceBackend for WriterBackend<W> {
    fn write_bytes(&self, bytes: &[u8]) -> Result<(), TraceError> {
        let mut writer = self.writer.lock().expect("trace writer poisoned");
        writer.write_all(bytes)?;
        writer.flush()?;
        Ok(())
    }
}

/// Streams frames over a TCP connection.
pub struct TcpBackend {
    stream: Mutex<TcpStream>,
}

impl TcpBackend {
    pub fn connect<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true).ok();
        Ok(Self {
            stream: Mutex::new(stream),
        })
    }
}

impl TraceBackend for TcpBackend {
    fn write_bytes(&self, bytes: &[u8]) -> Result<(), TraceError> {
        let mut stream = self.stream.lock().expect("trace stream poisoned");
        stream.write_all(bytes)?;
        Ok(())
    }
}

/// Sends each frame as one UDP datagram.
pub struct UdpBackend {
    socket: UdpSocket,
}

impl UdpBackend {
    pub fn connect<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(addr)?;
        Ok(Self { socket })
    }
}

impl TraceBackend for UdpBackend {
    fn write_bytes(&self, bytes: &[u8]) -> Result<(), TraceError> {
        self.socket.send(bytes).map(|_| ()).map_err(TraceError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Group, USER};
    use std::sync::Arc;

    #[derive(Default)]
    struct Capture {
        chunks: Mutex<Vec<Vec<u8>>>,
    }

    impl TraceBackend for Capture {
        fn write_bytes(&self, bytes: &[u8]) -> Result<(), TraceError> {
            self.chunks.lock().unwrap().push(bytes.to_vec());
            Ok(())
        }
    }

    #[test]
    fn drain_delivers_whole_frames() {
        let qs: Qs<256> = Qs::new();
        qs.filter_group(Group::User, true);
        for i in 0..3u8 {
            qs.begin(USER, 0);
            qs.u8_(i);
            qs.end();
        }

        let capture = Arc::new(Capture::default());
        drain(&qs, capture.as_ref()).unwrap();

        let chunks = capture.chunks.lock().unwrap();
        assert_eq!(chunks.len(), 3);
        for chunk in chunks.iter() {
            assert_eq!(*chunk.last().unwrap(), FLAG);
            assert_eq!(chunk.iter().filter(|&&b| b == FLAG).count(), 1);
        }
    }
}
