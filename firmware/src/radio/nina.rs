use embassy_rp::gpio::{Input, Output};
use embassy_rp::peripherals::SPI1;
use embassy_rp::spi::{self, Blocking, Spi};
use embassy_time::{Duration, Instant, Timer, with_timeout};
use heapless::String;

use super::frame::{
    self, ByteSource, Command, FrameError, MAX_CHUNK, NO_SOCKET, ReadError, Reply, TCP_ESTABLISHED,
    TCP_MODE, WifiStatus,
};
use super::select::Selected;

const READY_TIMEOUT: Duration = Duration::from_secs(10);
const SELECT_TIMEOUT: Duration = Duration::from_secs(1);
const RESET_HOLD: Duration = Duration::from_millis(10);
const RESET_SETTLE: Duration = Duration::from_millis(750);
const ASSOCIATE_TIMEOUT: Duration = Duration::from_secs(10);
const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const STATE_POLL: Duration = Duration::from_millis(100);

/// Status byte the firmware returns for a successful command.
const ACK: u8 = 1;

#[derive(Copy, Clone, Debug, Eq, PartialEq, defmt::Format)]
pub enum RadioError {
    /// Busy line never released or never acknowledged chip select.
    NotReady,
    /// SPI transfer failed.
    Bus,
    Frame(FrameError),
    /// Command completed but reported failure.
    Rejected(Command),
    /// Reply was well formed but its content made no sense.
    BadReply(Command),
    /// WiFi association ended in the given state.
    Association(WifiStatus),
    /// Every socket on the co-processor is in use.
    NoSocket,
    /// TCP connection did not reach the established state in time.
    ConnectTimeout,
    /// Peer closed the TCP connection.
    Closed,
}

impl From<FrameError> for RadioError {
    fn from(error: FrameError) -> Self {
        RadioError::Frame(error)
    }
}

impl From<ReadError<spi::Error>> for RadioError {
    fn from(error: ReadError<spi::Error>) -> Self {
        match error {
            ReadError::Source(_) => RadioError::Bus,
            ReadError::Frame(error) => RadioError::Frame(error),
        }
    }
}

/// Command-level driver for the co-processor.
pub struct Nina<'d> {
    spi: Spi<'d, SPI1, Blocking>,
    cs: Output<'d>,
    ready: Input<'d>,
    reset: Output<'d>,
}

struct SpiBytes<'a, 'd> {
    spi: &'a mut Spi<'d, SPI1, Blocking>,
}

impl ByteSource for SpiBytes<'_, '_> {
    type Error = spi::Error;

    fn next_byte(&mut self) -> Result<u8, spi::Error> {
        let mut byte = [0xFF];
        self.spi.blocking_transfer_in_place(&mut byte)?;
        Ok(byte[0])
    }
}

impl<'d> Nina<'d> {
    pub fn new(spi: Spi<'d, SPI1, Blocking>, cs: Output<'d>, ready: Input<'d>, reset: Output<'d>) -> Self {
        Self {
            spi,
            cs,
            ready,
            reset,
        }
    }

    /// Pulses the reset line and waits for the firmware to boot.
    pub async fn reset(&mut self) {
        self.cs.set_high();
        self.reset.set_low();
        Timer::after(RESET_HOLD).await;
        self.reset.set_high();
        Timer::after(RESET_SETTLE).await;
    }

    /// Waits for the co-processor to be idle, selects it and waits for the
    /// acknowledgement. The line is released again if the wait fails or the
    /// caller is dropped.
    async fn select<'a>(
        cs: &'a mut Output<'d>,
        ready: &mut Input<'d>,
    ) -> Result<Selected<'a, Output<'d>>, RadioError> {
        with_timeout(READY_TIMEOUT, ready.wait_for_low())
            .await
            .map_err(|_| RadioError::NotReady)?;

        let selected = Selected::assert(cs);
        with_timeout(SELECT_TIMEOUT, ready.wait_for_high())
            .await
            .map_err(|_| RadioError::NotReady)?;
        Ok(selected)
    }

    /// Sends one command and reads its reply.
    pub async fn command(&mut self, command: Command, params: &[&[u8]]) -> Result<Reply, RadioError> {
        let packet = frame::encode(command, params)?;

        {
            let _selected = Self::select(&mut self.cs, &mut self.ready).await?;
            self.spi
                .blocking_write(&packet)
                .map_err(|_| RadioError::Bus)?;
        }

        let _selected = Self::select(&mut self.cs, &mut self.ready).await?;
        Ok(frame::decode(command, &mut SpiBytes { spi: &mut self.spi })?)
    }

    async fn acknowledged(&mut self, command: Command, params: &[&[u8]]) -> Result<(), RadioError> {
        let reply = self.command(command, params).await?;
        if reply.first_byte() == Some(ACK) {
            Ok(())
        } else {
            Err(RadioError::Rejected(command))
        }
    }

    pub async fn firmware_version(&mut self) -> Result<String<8>, RadioError> {
        let reply = self.command(Command::GetFirmwareVersion, &[]).await?;
        let raw = reply
            .param(0)
            .ok_or(RadioError::BadReply(Command::GetFirmwareVersion))?;
        let trimmed = raw.split(|byte| *byte == 0).next().unwrap_or(raw);
        let text = core::str::from_utf8(trimmed)
            .map_err(|_| RadioError::BadReply(Command::GetFirmwareVersion))?;

        let mut version = String::new();
        version
            .push_str(text)
            .map_err(|_| RadioError::BadReply(Command::GetFirmwareVersion))?;
        Ok(version)
    }

    /// Station MAC address, most significant byte first.
    pub async fn mac_address(&mut self) -> Result<[u8; 6], RadioError> {
        let reply = self.command(Command::GetMacAddress, &[&[0xFF]]).await?;
        let raw = reply
            .param(0)
            .filter(|raw| raw.len() == 6)
            .ok_or(RadioError::BadReply(Command::GetMacAddress))?;

        let mut mac = [0u8; 6];
        for (slot, byte) in mac.iter_mut().zip(raw.iter().rev()) {
            *slot = *byte;
        }
        Ok(mac)
    }

    pub async fn status(&mut self) -> Result<WifiStatus, RadioError> {
        let reply = self.command(Command::GetConnStatus, &[]).await?;
        reply
            .first_byte()
            .map(WifiStatus::from_code)
            .ok_or(RadioError::BadReply(Command::GetConnStatus))
    }

    /// Joins `ssid` and waits until the association settles.
    pub async fn associate(&mut self, ssid: &str, password: &str) -> Result<(), RadioError> {
        if password.is_empty() {
            self.acknowledged(Command::SetNetwork, &[ssid.as_bytes()])
                .await?;
        } else {
            self.acknowledged(Command::SetPassphrase, &[ssid.as_bytes(), password.as_bytes()])
                .await?;
        }

        let deadline = Instant::now() + ASSOCIATE_TIMEOUT;
        loop {
            let status = self.status().await?;
            if status == WifiStatus::Connected {
                return Ok(());
            }
            if status.is_terminal_failure() || Instant::now() >= deadline {
                return Err(RadioError::Association(status));
            }
            Timer::after(STATE_POLL).await;
        }
    }

    pub async fn host_by_name(&mut self, host: &str) -> Result<[u8; 4], RadioError> {
        self.acknowledged(Command::ReqHostByName, &[host.as_bytes()])
            .await?;

        let reply = self.command(Command::GetHostByName, &[]).await?;
        reply
            .param(0)
            .and_then(|raw| <[u8; 4]>::try_from(raw).ok())
            .ok_or(RadioError::BadReply(Command::GetHostByName))
    }

    /// Opens a TCP connection and returns its socket number.
    pub async fn connect_tcp(&mut self, ip: [u8; 4], port: u16) -> Result<u8, RadioError> {
        let reply = self.command(Command::GetSocket, &[]).await?;
        let socket = reply
            .first_byte()
            .ok_or(RadioError::BadReply(Command::GetSocket))?;
        if socket == NO_SOCKET {
            return Err(RadioError::NoSocket);
        }

        self.acknowledged(
            Command::StartClientTcp,
            &[&ip, &port.to_be_bytes(), &[socket], &[TCP_MODE]],
        )
        .await?;

        let deadline = Instant::now() + TCP_CONNECT_TIMEOUT;
        while self.client_state(socket).await? != TCP_ESTABLISHED {
            if Instant::now() >= deadline {
                let _ = self.stop_client(socket).await;
                return Err(RadioError::ConnectTimeout);
            }
            Timer::after(STATE_POLL).await;
        }
        Ok(socket)
    }

    pub async fn client_state(&mut self, socket: u8) -> Result<u8, RadioError> {
        let reply = self
            .command(Command::GetClientStateTcp, &[&[socket]])
            .await?;
        reply
            .first_byte()
            .ok_or(RadioError::BadReply(Command::GetClientStateTcp))
    }

    pub async fn stop_client(&mut self, socket: u8) -> Result<(), RadioError> {
        self.acknowledged(Command::StopClientTcp, &[&[socket]]).await
    }

    /// Bytes buffered on the co-processor for `socket`.
    pub async fn available(&mut self, socket: u8) -> Result<usize, RadioError> {
        let reply = self.command(Command::AvailDataTcp, &[&[socket]]).await?;
        reply
            .first_le()
            .and_then(|count| usize::try_from(count).ok())
            .ok_or(RadioError::BadReply(Command::AvailDataTcp))
    }

    /// Reads up to one chunk into `buf`.
    pub async fn read(&mut self, socket: u8, buf: &mut [u8]) -> Result<usize, RadioError> {
        let wanted = u16::try_from(buf.len().min(MAX_CHUNK)).unwrap_or(u16::MAX);
        let reply = self
            .command(Command::GetDataBufTcp, &[&[socket], &wanted.to_le_bytes()])
            .await?;
        let data = reply
            .param(0)
            .filter(|data| data.len() <= buf.len())
            .ok_or(RadioError::BadReply(Command::GetDataBufTcp))?;

        buf[..data.len()].copy_from_slice(data);
        Ok(data.len())
    }

    /// Writes up to one chunk of `data` and confirms delivery.
    pub async fn write(&mut self, socket: u8, data: &[u8]) -> Result<usize, RadioError> {
        let chunk = &data[..data.len().min(MAX_CHUNK)];
        let reply = self
            .command(Command::SendDataTcp, &[&[socket], chunk])
            .await?;
        let sent = reply
            .first_le()
            .and_then(|count| usize::try_from(count).ok())
            .ok_or(RadioError::BadReply(Command::SendDataTcp))?;
        if sent == 0 {
            return Err(RadioError::Rejected(Command::SendDataTcp));
        }

        self.acknowledged(Command::DataSentTcp, &[&[socket]]).await?;
        Ok(sent.min(chunk.len()))
    }

    /// Unix seconds from the co-processor's SNTP client. Zero means it has
    /// not synchronized yet.
    pub async fn network_time(&mut self) -> Result<u64, RadioError> {
        let reply = self.command(Command::GetTime, &[]).await?;
        match reply.first_le() {
            Some(0) | None => Err(RadioError::BadReply(Command::GetTime)),
            Some(seconds) => Ok(seconds),
        }
    }
}
