//! TCP transport: newline-delimited text over a forwarded socket.

use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::ChannelError;

use super::Transport;

/// Transport over a TCP stream to the remote service.
///
/// Writes go through the owned stream; the receive side reads buffered
/// lines from a cloned handle, matching the one-writer/one-reader split of
/// the control channel.
pub struct TcpTransport {
    writer: Mutex<TcpStream>,
    reader: Mutex<BufReader<TcpStream>>,
    connected: AtomicBool,
}

impl TcpTransport {
    /// Connects to the remote service.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::Io` if the connection cannot be established.
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self, ChannelError> {
        let stream = TcpStream::connect(addr).map_err(|e| ChannelError::Io {
            message: format!("connect failed: {e}"),
        })?;

        stream.set_nodelay(true).map_err(|e| ChannelError::Io {
            message: format!("failed to set nodelay: {e}"),
        })?;

        let read_half = stream.try_clone().map_err(|e| ChannelError::Io {
            message: format!("failed to clone stream: {e}"),
        })?;

        Ok(Self {
            writer: Mutex::new(stream),
            reader: Mutex::new(BufReader::new(read_half)),
            connected: AtomicBool::new(true),
        })
    }

    fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
    }
}

impl Transport for TcpTransport {
    fn send_line(&self, line: &str) -> Result<(), ChannelError> {
        if !self.is_connected() {
            return Err(ChannelError::Disconnected);
        }

        let mut writer = self.writer.lock().map_err(|_| ChannelError::Io {
            message: "writer lock poisoned".to_string(),
        })?;

        writer
            .write_all(line.as_bytes())
            .and_then(|()| writer.write_all(b"\n"))
            .map_err(|e| {
                self.mark_disconnected();
                ChannelError::Io {
                    message: format!("send failed: {e}"),
                }
            })
    }

    fn recv_line(&self) -> Result<Option<String>, ChannelError> {
        let mut reader = self.reader.lock().map_err(|_| ChannelError::Io {
            message: "reader lock poisoned".to_string(),
        })?;

        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => {
                self.mark_disconnected();
                Ok(None)
            }
            Ok(_) => {
                while line.ends_with('\n') || line.ends_with('\r') {
                    line.pop();
                }
                Ok(Some(line))
            }
            Err(e) => {
                self.mark_disconnected();
                Err(ChannelError::Io {
                    message: format!("receive failed: {e}"),
                })
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn shutdown(&self) {
        self.mark_disconnected();
        if let Ok(writer) = self.writer.lock() {
            let _ = writer.shutdown(Shutdown::Both);
        }
    }
}
