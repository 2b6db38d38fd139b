//! Command framing for the NINA co-processor SPI protocol.
//!
//! Every exchange is a command packet followed by a reply packet:
//!
//! ```text
//! START cmd nparams { len data }* END [0xFF padding to a multiple of 4]
//! START cmd|REPLY nparams { len data }* END
//! ```
//!
//! Parameter lengths are one byte, except for the bulk socket commands which
//! use two bytes (big-endian). Framing is pure so it can be tested on the host;
//! the driver supplies reply bytes through [`ByteSource`].

use core::fmt;

use heapless::Vec;

pub const START_CMD: u8 = 0xE0;
pub const END_CMD: u8 = 0xEE;
pub const ERR_CMD: u8 = 0xEF;
pub const REPLY_FLAG: u8 = 0x80;

const PAD_BYTE: u8 = 0xFF;

/// Largest chunk moved in one socket read or write.
pub const MAX_CHUNK: usize = 512;
/// Encoded command capacity, large enough for one chunk plus framing.
pub const FRAME_CAPACITY: usize = MAX_CHUNK + 16;
/// Reply payload capacity shared by all parameters of a reply.
pub const REPLY_CAPACITY: usize = MAX_CHUNK + 8;
/// Most parameters any reply carries.
pub const MAX_REPLY_PARAMS: usize = 4;

/// Bytes read while hunting for [`START_CMD`] before giving up.
pub const START_SEARCH_LIMIT: usize = 100;

/// Encoded command packet.
pub type Frame = Vec<u8, FRAME_CAPACITY>;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
#[repr(u8)]
pub enum Command {
    SetNetwork = 0x10,
    SetPassphrase = 0x11,
    GetConnStatus = 0x20,
    GetMacAddress = 0x22,
    DataSentTcp = 0x2A,
    AvailDataTcp = 0x2B,
    StartClientTcp = 0x2D,
    StopClientTcp = 0x2E,
    GetClientStateTcp = 0x2F,
    ReqHostByName = 0x34,
    GetHostByName = 0x35,
    GetFirmwareVersion = 0x37,
    GetTime = 0x3B,
    GetSocket = 0x3F,
    SendDataTcp = 0x44,
    GetDataBufTcp = 0x45,
}

impl Command {
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Width of the length prefix on parameters this command sends.
    pub const fn send_width(self) -> LengthWidth {
        match self {
            Command::SendDataTcp | Command::GetDataBufTcp => LengthWidth::Word,
            _ => LengthWidth::Byte,
        }
    }

    /// Width of the length prefix on parameters of this command's reply.
    pub const fn reply_width(self) -> LengthWidth {
        match self {
            Command::GetDataBufTcp => LengthWidth::Word,
            _ => LengthWidth::Byte,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LengthWidth {
    Byte,
    Word,
}

/// WiFi association state reported by `GET_CONN_STATUS`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum WifiStatus {
    Idle,
    NoSsidAvailable,
    ScanCompleted,
    Connected,
    ConnectFailed,
    ConnectionLost,
    Disconnected,
    NoModule,
    Unknown(u8),
}

impl WifiStatus {
    pub const fn from_code(code: u8) -> Self {
        match code {
            0 => WifiStatus::Idle,
            1 => WifiStatus::NoSsidAvailable,
            2 => WifiStatus::ScanCompleted,
            3 => WifiStatus::Connected,
            4 => WifiStatus::ConnectFailed,
            5 => WifiStatus::ConnectionLost,
            6 => WifiStatus::Disconnected,
            0xFF => WifiStatus::NoModule,
            other => WifiStatus::Unknown(other),
        }
    }

    /// Association attempt ended and will not succeed by waiting longer.
    pub const fn is_terminal_failure(self) -> bool {
        matches!(
            self,
            WifiStatus::NoSsidAvailable | WifiStatus::ConnectFailed | WifiStatus::NoModule
        )
    }
}

/// TCP state value meaning the socket is connected.
pub const TCP_ESTABLISHED: u8 = 4;
/// Socket number returned by `GET_SOCKET` when none is free.
pub const NO_SOCKET: u8 = 0xFF;
/// `START_CLIENT_TCP` connection mode for plain TCP.
pub const TCP_MODE: u8 = 0;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum FrameError {
    /// Encoded command or reply did not fit its buffer.
    Overflow,
    /// Parameter longer than its length prefix can express.
    ParamTooLong,
    /// No start byte within [`START_SEARCH_LIMIT`] reads.
    NoStart,
    /// Co-processor answered with an error packet.
    ErrorReply,
    /// Reply was for a different command.
    UnexpectedCommand(u8),
    /// Reply did not end with [`END_CMD`].
    MissingEnd(u8),
    /// Reply carried more parameters than [`MAX_REPLY_PARAMS`].
    TooManyParams(u8),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Overflow => f.write_str("frame overflow"),
            FrameError::ParamTooLong => f.write_str("parameter too long"),
            FrameError::NoStart => f.write_str("no reply start"),
            FrameError::ErrorReply => f.write_str("error reply"),
            FrameError::UnexpectedCommand(code) => write!(f, "unexpected reply 0x{code:02x}"),
            FrameError::MissingEnd(byte) => write!(f, "missing end, got 0x{byte:02x}"),
            FrameError::TooManyParams(count) => write!(f, "{count} reply params"),
        }
    }
}

/// Builds the padded command packet for `command`.
pub fn encode(command: Command, params: &[&[u8]]) -> Result<Frame, FrameError> {
    let width = command.send_width();
    let mut frame = Frame::new();

    push(&mut frame, &[START_CMD, command.code() & !REPLY_FLAG])?;
    push(
        &mut frame,
        &[u8::try_from(params.len()).map_err(|_| FrameError::ParamTooLong)?],
    )?;

    for param in params {
        match width {
            LengthWidth::Byte => {
                let len = u8::try_from(param.len()).map_err(|_| FrameError::ParamTooLong)?;
                push(&mut frame, &[len])?;
            }
            LengthWidth::Word => {
                let len = u16::try_from(param.len()).map_err(|_| FrameError::ParamTooLong)?;
                push(&mut frame, &len.to_be_bytes())?;
            }
        }
        push(&mut frame, param)?;
    }

    push(&mut frame, &[END_CMD])?;
    while frame.len() % 4 != 0 {
        push(&mut frame, &[PAD_BYTE])?;
    }
    Ok(frame)
}

fn push(frame: &mut Frame, bytes: &[u8]) -> Result<(), FrameError> {
    frame
        .extend_from_slice(bytes)
        .map_err(|_| FrameError::Overflow)
}

/// Supplies reply bytes one at a time.
pub trait ByteSource {
    type Error;

    fn next_byte(&mut self) -> Result<u8, Self::Error>;

    fn fill(&mut self, out: &mut [u8]) -> Result<(), Self::Error> {
        for slot in out {
            *slot = self.next_byte()?;
        }
        Ok(())
    }
}

/// Failure while reading a reply.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReadError<E> {
    Source(E),
    Frame(FrameError),
}

impl<E> From<FrameError> for ReadError<E> {
    fn from(error: FrameError) -> Self {
        ReadError::Frame(error)
    }
}

/// Parameters of a decoded reply, stored back to back.
#[derive(Clone, Debug, Default)]
pub struct Reply {
    data: Vec<u8, REPLY_CAPACITY>,
    bounds: Vec<(usize, usize), MAX_REPLY_PARAMS>,
}

impl Reply {
    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    pub fn param(&self, index: usize) -> Option<&[u8]> {
        let (start, end) = *self.bounds.get(index)?;
        self.data.get(start..end)
    }

    /// First byte of the first parameter, the usual status reply.
    pub fn first_byte(&self) -> Option<u8> {
        self.param(0).and_then(|param| param.first().copied())
    }

    /// First parameter read as a little-endian integer of up to eight bytes.
    pub fn first_le(&self) -> Option<u64> {
        let param = self.param(0)?;
        if param.is_empty() || param.len() > 8 {
            return None;
        }
        let mut bytes = [0u8; 8];
        bytes[..param.len()].copy_from_slice(param);
        Some(u64::from_le_bytes(bytes))
    }
}

/// Reads one reply to `command` from `source`.
pub fn decode<S: ByteSource>(command: Command, source: &mut S) -> Result<Reply, ReadError<S::Error>> {
    seek_start(source)?;

    let code = source.next_byte().map_err(ReadError::Source)?;
    if code != command.code() | REPLY_FLAG {
        return Err(FrameError::UnexpectedCommand(code).into());
    }

    let count = source.next_byte().map_err(ReadError::Source)?;
    if usize::from(count) > MAX_REPLY_PARAMS {
        return Err(FrameError::TooManyParams(count).into());
    }

    let mut reply = Reply::default();
    for _ in 0..count {
        let len = match command.reply_width() {
            LengthWidth::Byte => usize::from(source.next_byte().map_err(ReadError::Source)?),
            LengthWidth::Word => {
                let mut prefix = [0u8; 2];
                source.fill(&mut prefix).map_err(ReadError::Source)?;
                usize::from(u16::from_be_bytes(prefix))
            }
        };

        let start = reply.data.len();
        reply
            .data
            .resize(start + len, 0)
            .map_err(|_| FrameError::Overflow)?;
        source
            .fill(&mut reply.data[start..])
            .map_err(ReadError::Source)?;
        reply
            .bounds
            .push((start, start + len))
            .map_err(|_| FrameError::TooManyParams(count))?;
    }

    let end = source.next_byte().map_err(ReadError::Source)?;
    if end != END_CMD {
        return Err(FrameError::MissingEnd(end).into());
    }
    Ok(reply)
}

fn seek_start<S: ByteSource>(source: &mut S) -> Result<(), ReadError<S::Error>> {
    for _ in 0..START_SEARCH_LIMIT {
        match source.next_byte().map_err(ReadError::Source)? {
            START_CMD => return Ok(()),
            ERR_CMD => return Err(FrameError::ErrorReply.into()),
            _ => {}
        }
    }
    Err(FrameError::NoStart.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bytes<'a> {
        bytes: &'a [u8],
        pos: usize,
    }

    impl<'a> Bytes<'a> {
        fn new(bytes: &'a [u8]) -> Self {
            Self { bytes, pos: 0 }
        }
    }

    impl ByteSource for Bytes<'_> {
        type Error = ();

        fn next_byte(&mut self) -> Result<u8, ()> {
            let byte = *self.bytes.get(self.pos).ok_or(())?;
            self.pos += 1;
            Ok(byte)
        }
    }

    #[test]
    fn command_without_params_is_padded() {
        let frame = encode(Command::GetConnStatus, &[]).unwrap();
        assert_eq!(frame.as_slice(), &[START_CMD, 0x20, 0, END_CMD]);

        let frame = encode(Command::GetMacAddress, &[&[0xFF]]).unwrap();
        assert_eq!(
            frame.as_slice(),
            &[START_CMD, 0x22, 1, 1, 0xFF, END_CMD, PAD_BYTE, PAD_BYTE]
        );
    }

    #[test]
    fn passphrase_carries_both_strings() {
        let frame = encode(Command::SetPassphrase, &[b"ssid", b"pw"]).unwrap();
        assert_eq!(
            frame.as_slice(),
            &[
                START_CMD, 0x11, 2, 4, b's', b's', b'i', b'd', 2, b'p', b'w', END_CMD
            ]
        );
        assert_eq!(frame.len() % 4, 0);
    }

    #[test]
    fn bulk_commands_use_word_lengths() {
        let frame = encode(Command::SendDataTcp, &[&[3], b"abc"]).unwrap();
        assert_eq!(
            frame.as_slice(),
            &[START_CMD, 0x44, 2, 0, 1, 3, 0, 3, b'a', b'b', b'c', END_CMD]
        );
    }

    #[test]
    fn oversized_params_are_rejected() {
        let long = [0u8; 300];
        assert_eq!(
            encode(Command::ReqHostByName, &[&long]),
            Err(FrameError::ParamTooLong)
        );
        let huge = [0u8; FRAME_CAPACITY];
        assert_eq!(
            encode(Command::SendDataTcp, &[&[0], &huge]),
            Err(FrameError::Overflow)
        );
    }

    #[test]
    fn reply_skips_idle_bytes_before_start() {
        let wire = [0xFF, 0x00, START_CMD, 0x20 | REPLY_FLAG, 1, 1, 3, END_CMD];
        let reply = decode(Command::GetConnStatus, &mut Bytes::new(&wire)).unwrap();
        assert_eq!(reply.len(), 1);
        assert_eq!(reply.first_byte(), Some(3));
        assert_eq!(WifiStatus::from_code(3), WifiStatus::Connected);
    }

    #[test]
    fn reply_with_word_lengths_and_several_params() {
        let wire = [
            START_CMD,
            0x45 | REPLY_FLAG,
            1,
            0,
            3,
            b'x',
            b'y',
            b'z',
            END_CMD,
        ];
        let reply = decode(Command::GetDataBufTcp, &mut Bytes::new(&wire)).unwrap();
        assert_eq!(reply.param(0), Some(&b"xyz"[..]));
        assert_eq!(reply.param(1), None);

        let wire = [START_CMD, 0x35 | REPLY_FLAG, 2, 4, 10, 0, 0, 1, 1, 7, END_CMD];
        let reply = decode(Command::GetHostByName, &mut Bytes::new(&wire)).unwrap();
        assert_eq!(reply.param(0), Some(&[10, 0, 0, 1][..]));
        assert_eq!(reply.param(1), Some(&[7][..]));
    }

    #[test]
    fn time_reply_is_little_endian() {
        let seconds: u32 = 1_700_000_000;
        let b = seconds.to_le_bytes();
        let wire = [START_CMD, 0x3B | REPLY_FLAG, 1, 4, b[0], b[1], b[2], b[3], END_CMD];
        let reply = decode(Command::GetTime, &mut Bytes::new(&wire)).unwrap();
        assert_eq!(reply.first_le(), Some(1_700_000_000));
    }

    #[test]
    fn malformed_replies_are_reported() {
        let wire = [ERR_CMD, 0, 0];
        assert_eq!(
            decode(Command::GetTime, &mut Bytes::new(&wire)).unwrap_err(),
            ReadError::Frame(FrameError::ErrorReply)
        );

        let wire = [START_CMD, 0x20 | REPLY_FLAG, 0, 0x00];
        assert_eq!(
            decode(Command::GetConnStatus, &mut Bytes::new(&wire)).unwrap_err(),
            ReadError::Frame(FrameError::MissingEnd(0))
        );

        let wire = [START_CMD, 0x22 | REPLY_FLAG, 0, END_CMD];
        assert_eq!(
            decode(Command::GetConnStatus, &mut Bytes::new(&wire)).unwrap_err(),
            ReadError::Frame(FrameError::UnexpectedCommand(0xA2))
        );

        let idle = [0u8; START_SEARCH_LIMIT];
        assert_eq!(
            decode(Command::GetConnStatus, &mut Bytes::new(&idle)).unwrap_err(),
            ReadError::Frame(FrameError::NoStart)
        );

        let truncated = [START_CMD, 0x20 | REPLY_FLAG, 1, 4, 1];
        assert_eq!(
            decode(Command::GetConnStatus, &mut Bytes::new(&truncated)).unwrap_err(),
            ReadError::Source(())
        );
    }
}
