//! Serial communication, with commands from the user
use ringbuffer::{ConstGenericRingBuffer, RingBuffer};

/// Size, in bytes, of the buffer for serial input
pub const SERIAL_READ_BUFFER_SIZE: usize = 16;
/// Size, in bytes, of the buffer for serial output
pub const SERIAL_WRITE_BUFFER_SIZE: usize = 96;

/// Buffers for serial communication, instantiated within a structure/a function
/// rather than a global, mutex-protected variable.
pub struct SerialBuffer<const WRITE_BUFFER_SIZE: usize, const READ_BUFFER_SIZE: usize> {
    output: ConstGenericRingBuffer<u8, WRITE_BUFFER_SIZE>,
    input: ConstGenericRingBuffer<u8, READ_BUFFER_SIZE>,
}

impl<const WRITE_BUFFER_SIZE: usize, const READ_BUFFER_SIZE: usize> Default
    for SerialBuffer<WRITE_BUFFER_SIZE, READ_BUFFER_SIZE>
{
    fn default() -> Self {
        Self {
            output: ConstGenericRingBuffer::new(),
            input: ConstGenericRingBuffer::new(),
        }
    }
}

/// Implement ufmt::uWrite for the serial buffer, to be able to call ufmt::uwriteln
impl<const WRITE_BUFFER_SIZE: usize, const READ_BUFFER_SIZE: usize> ufmt::uWrite
    for SerialBuffer<WRITE_BUFFER_SIZE, READ_BUFFER_SIZE>
{
    type Error = ();

    fn write_str(&mut self, s: &str) -> Result<(), Self::Error> {
        for byte in s.as_bytes() {
            self.output.push(*byte);
        }
        Ok(())
    }
}

/// Commands for the serial interface
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    /// Query the current rate: ?bpm
    QueryBpm,
    /// Query the inter-beat intervals, oldest first: ?ibi
    QueryIntervals,
    /// Query threshold, envelope and warm-up phase: ?env
    QueryEnvelope,
    /// Query the number of samples lost by the queue: ?ovf
    QueryOverwrites,
    /// Start a new session: !rst
    ResetSession,
    /// Toggle the per-sample telemetry: !tel
    ToggleTelemetry,
    /// Set the minimum gap between beats, in ms: !gap NNN
    SetMinBeatGap(u16),
}

/// Rejected input line
#[derive(Debug, PartialEq, Eq)]
pub enum BadCommand {
    /// The line is not a known command
    Unknown,
    /// A numeric argument holds something else than a decimal digit
    BadDigit,
}

impl ufmt::uDisplay for BadCommand {
    fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: ufmt::uWrite + ?Sized,
    {
        match self {
            BadCommand::Unknown => f.write_str("Bad command"),
            BadCommand::BadDigit => f.write_str("Bad command: digit expected"),
        }
    }
}

impl<const WRITE_BUFFER_SIZE: usize, const READ_BUFFER_SIZE: usize>
    SerialBuffer<WRITE_BUFFER_SIZE, READ_BUFFER_SIZE>
{
    /// Append one received byte to the input buffer.
    pub fn push_input(&mut self, byte: u8) {
        self.input.push(byte);
    }

    /// Take the next byte to transmit.
    pub fn pop_output(&mut self) -> Option<u8> {
        self.output.dequeue()
    }

    /// Try to dequeue a command from the input buffer. Return
    /// - Ok(Some()) when a command is identified
    /// - Err(_) when a \n separator was found, but no valid command
    ///   could be parsed
    /// - Ok(None) most of the time, when there is no/not enough data
    /// Bytes are also removed from the ring buffer.
    pub fn dequeue_command(&mut self) -> Result<Option<Command>, BadCommand> {
        while let Some(&byte) = self.input.peek() {
            if byte == b'!' || byte == b'?' {
                break;
            } else {
                self.input.dequeue();
            }
        }
        match self.input.iter().position(|&b| b == b'\n') {
            Some(4) => match &self.dequeue_to_array() {
                b"?bpm" => Ok(Some(Command::QueryBpm)),
                b"?ibi" => Ok(Some(Command::QueryIntervals)),
                b"?env" => Ok(Some(Command::QueryEnvelope)),
                b"?ovf" => Ok(Some(Command::QueryOverwrites)),
                b"!rst" => Ok(Some(Command::ResetSession)),
                b"!tel" => Ok(Some(Command::ToggleTelemetry)),
                _ => Err(BadCommand::Unknown),
            },
            Some(8) => match self.dequeue_to_array() {
                [b'!', b'g', b'a', b'p', b' ', d1, d2, d3] => {
                    let gap = Self::decode_decimal(&[d1, d2, d3])?;
                    Ok(Some(Command::SetMinBeatGap(gap)))
                }
                _ => Err(BadCommand::Unknown),
            },
            Some(_) => {
                while Some(b'\n') != self.input.dequeue() {}
                Err(BadCommand::Unknown)
            }
            None => Ok(None),
        }
    }

    /// Dequeue from the input buffer to an array of a given size,
    /// dequeing (and dropping) the separator \n
    fn dequeue_to_array<const T: usize>(&mut self) -> [u8; T] {
        let mut array = [0u8; T];
        for byte in array.iter_mut() {
            *byte = self.input.dequeue().unwrap_or_default();
        }
        // Dequeue the next \n
        self.input.dequeue();
        array
    }

    /// Decode a decimal number written in ascii digits
    fn decode_decimal(digits: &[u8]) -> Result<u16, BadCommand> {
        digits.iter().try_fold(0u16, |value, &digit| match digit {
            ascii @ b'0'..=b'9' => Ok(value * 10 + u16::from(ascii - b'0')),
            _ => Err(BadCommand::BadDigit),
        })
    }
}
