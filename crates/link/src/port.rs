use crate::errors::LinkError;
use crate::protocol::HEARTBEAT_ACK;
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::time::Duration;

// Short enough that a cycle proceeds without new serial data rather than
// waiting for one.
const READ_TIMEOUT: Duration = Duration::from_millis(20);

/// Accumulates raw bytes and yields complete newline-terminated lines.
///
/// Lines are decoded lossily (a corrupt byte becomes U+FFFD and the line
/// degrades to an unrecognized event downstream). Empty lines are dropped.
#[derive(Debug, Default)]
pub struct LineAssembler {
    buf: Vec<u8>,
    lines: VecDeque<String>,
}

impl LineAssembler {
    pub fn push(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if b == b'\n' {
                let line = String::from_utf8_lossy(&self.buf).trim().to_string();
                self.buf.clear();
                if !line.is_empty() {
                    self.lines.push_back(line);
                }
            } else {
                self.buf.push(b);
            }
        }
    }

    pub fn next_line(&mut self) -> Option<String> {
        self.lines.pop_front()
    }
}

/// Handle on the serial port to the sensor modules.
///
/// Reads are polled with a short timeout; `poll_line` returns at most one
/// complete line per call and never blocks the controller cycle. Opening
/// is the only operation that can fail hard - absence of the port is
/// surfaced to the caller, which owns the reconnect policy.
pub struct SerialLink {
    port: Box<dyn serialport::SerialPort>,
    assembler: LineAssembler,
    read_buf: [u8; 256],
}

impl SerialLink {
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, LinkError> {
        let port = serialport::new(path, baud_rate)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|source| LinkError::Open {
                path: path.to_string(),
                source,
            })?;

        tracing::info!("Serial port {} open at {} baud", path, baud_rate);

        Ok(Self {
            port,
            assembler: LineAssembler::default(),
            read_buf: [0u8; 256],
        })
    }

    /// Return the next complete line, if one is available right now.
    ///
    /// Drains whatever bytes the port has buffered, then pops one line from
    /// the assembler. `Ok(None)` means no complete line yet.
    pub fn poll_line(&mut self) -> Result<Option<String>, LinkError> {
        while self.port.bytes_to_read()? > 0 {
            match self.port.read(&mut self.read_buf) {
                Ok(0) => break,
                Ok(n) => self.assembler.push(&self.read_buf[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(self.assembler.next_line())
    }

    /// Write the heartbeat acknowledgement back to the module.
    pub fn send_ack(&mut self) -> Result<(), LinkError> {
        self.port.write_all(HEARTBEAT_ACK)?;
        self.port.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_lines_across_partial_reads() {
        let mut asm = LineAssembler::default();
        asm.push(b"(Modulo_A,1");
        assert_eq!(asm.next_line(), None);

        asm.push(b".0,2.0)\nPI");
        assert_eq!(asm.next_line(), Some("(Modulo_A,1.0,2.0)".to_string()));
        assert_eq!(asm.next_line(), None);

        asm.push(b"NG\n");
        assert_eq!(asm.next_line(), Some("PING".to_string()));
    }

    #[test]
    fn strips_carriage_returns_and_drops_empty_lines() {
        let mut asm = LineAssembler::default();
        asm.push(b"\r\n\r\nPING\r\n");
        assert_eq!(asm.next_line(), Some("PING".to_string()));
        assert_eq!(asm.next_line(), None);
    }

    #[test]
    fn corrupt_bytes_decode_lossily() {
        let mut asm = LineAssembler::default();
        asm.push(&[0xff, 0xfe, b'x', b'\n']);
        let line = asm.next_line().unwrap();
        assert!(line.ends_with('x'));
        assert!(line.contains('\u{fffd}'));
    }

    #[test]
    fn queues_multiple_lines_in_order() {
        let mut asm = LineAssembler::default();
        asm.push(b"one\ntwo\nthree\n");
        assert_eq!(asm.next_line(), Some("one".to_string()));
        assert_eq!(asm.next_line(), Some("two".to_string()));
        assert_eq!(asm.next_line(), Some("three".to_string()));
        assert_eq!(asm.next_line(), None);
    }
}
