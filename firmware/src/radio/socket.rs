use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, Timer};
use embedded_io_async::{Error, ErrorKind, ErrorType, Read, Write};

use super::frame::{MAX_CHUNK, TCP_ESTABLISHED};
use super::nina::{Nina, RadioError};

/// Radio shared between the MQTT transport and link management.
pub type SharedRadio = Mutex<NoopRawMutex, Nina<'static>>;

const READ_POLL: Duration = Duration::from_millis(10);

impl Error for RadioError {
    fn kind(&self) -> ErrorKind {
        match self {
            RadioError::NotReady | RadioError::ConnectTimeout => ErrorKind::TimedOut,
            RadioError::Closed => ErrorKind::ConnectionReset,
            RadioError::NoSocket => ErrorKind::OutOfMemory,
            RadioError::Association(_) => ErrorKind::NotConnected,
            RadioError::Bus
            | RadioError::Frame(_)
            | RadioError::Rejected(_)
            | RadioError::BadReply(_) => ErrorKind::Other,
        }
    }
}

/// TCP stream carried over one co-processor socket.
pub struct NinaSocket {
    radio: &'static SharedRadio,
    socket: u8,
}

impl NinaSocket {
    pub async fn connect(radio: &'static SharedRadio, ip: [u8; 4], port: u16) -> Result<Self, RadioError> {
        let socket = radio.lock().await.connect_tcp(ip, port).await?;
        Ok(Self { radio, socket })
    }

    pub fn id(&self) -> u8 {
        self.socket
    }
}

impl ErrorType for NinaSocket {
    type Error = RadioError;
}

impl Read for NinaSocket {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, RadioError> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            {
                let mut radio = self.radio.lock().await;
                let available = radio.available(self.socket).await?;
                if available > 0 {
                    let len = buf.len().min(available).min(MAX_CHUNK);
                    return radio.read(self.socket, &mut buf[..len]).await;
                }
                if radio.client_state(self.socket).await? != TCP_ESTABLISHED {
                    return Err(RadioError::Closed);
                }
            }
            Timer::after(READ_POLL).await;
        }
    }
}

impl Write for NinaSocket {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, RadioError> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.radio.lock().await.write(self.socket, buf).await
    }

    async fn flush(&mut self) -> Result<(), RadioError> {
        Ok(())
    }
}
