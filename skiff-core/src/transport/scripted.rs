//! In-memory transport driven by a script of read events.
//!
//! Used by tests and by the replay tool. Writes are recorded; a number
//! of writes can be made to stall with `WouldBlock` first.

use std::collections::VecDeque;

use bytes::Bytes;

use crate::error::SkiffError;
use crate::packet::MacStatus;
use crate::transport::{RawPacket, Transport};

/// One scripted result of [`Transport::read_packet`].
#[derive(Debug)]
pub enum ReadEvent {
    Packet(RawPacket),
    NoneYet,
    WouldBlock,
    Error(std::io::ErrorKind),
}

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    reads: VecDeque<ReadEvent>,
    written: Vec<Bytes>,
    write_stalls: usize,
    write_failure: Option<std::io::ErrorKind>,
    write_attempts: usize,
    read_resets: usize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: ReadEvent) {
        self.reads.push_back(event);
    }

    /// Queue a well-formed message.
    pub fn push_packet(&mut self, payload: impl Into<Bytes>) {
        self.push(ReadEvent::Packet(RawPacket::new(payload)));
    }

    /// Queue a message whose MAC check failed.
    pub fn push_bad_mac(&mut self, payload: impl Into<Bytes>) {
        self.push(ReadEvent::Packet(
            RawPacket::new(payload).with_mac(MacStatus::Invalid),
        ));
    }

    /// Make the next `n` writes return `WouldBlock`.
    pub fn stall_writes(&mut self, n: usize) {
        self.write_stalls = n;
    }

    /// Make the next write fail with an I/O error.
    pub fn fail_next_write(&mut self, kind: std::io::ErrorKind) {
        self.write_failure = Some(kind);
    }

    /// Payloads successfully written, oldest first.
    pub fn written(&self) -> &[Bytes] {
        &self.written
    }

    pub fn take_written(&mut self) -> Vec<Bytes> {
        std::mem::take(&mut self.written)
    }

    /// Every call to `write`, including stalled and failed ones.
    pub fn write_attempts(&self) -> usize {
        self.write_attempts
    }

    pub fn read_resets(&self) -> usize {
        self.read_resets
    }

    pub fn pending_reads(&self) -> usize {
        self.reads.len()
    }
}

impl Transport for ScriptedTransport {
    fn write(&mut self, payload: &[u8]) -> Result<(), SkiffError> {
        self.write_attempts += 1;
        if self.write_stalls > 0 {
            self.write_stalls -= 1;
            return Err(SkiffError::WouldBlock);
        }
        if let Some(kind) = self.write_failure.take() {
            return Err(std::io::Error::new(kind, "scripted write failure").into());
        }
        self.written.push(Bytes::copy_from_slice(payload));
        Ok(())
    }

    fn read_packet(&mut self) -> Result<Option<RawPacket>, SkiffError> {
        match self.reads.pop_front() {
            None | Some(ReadEvent::NoneYet) => Ok(None),
            Some(ReadEvent::Packet(p)) => Ok(Some(p)),
            Some(ReadEvent::WouldBlock) => Err(SkiffError::WouldBlock),
            Some(ReadEvent::Error(kind)) => {
                Err(std::io::Error::new(kind, "scripted read failure").into())
            }
        }
    }

    fn reset_read_state(&mut self) {
        self.read_resets += 1;
    }
}
