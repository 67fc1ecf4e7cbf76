//! Messages and control commands consumed by the log writer
//!
//! Both travel on one queue as [`WriterEvent`]s, so a command takes effect
//! exactly between the messages enqueued before and after it.

use std::fmt;

use bytes::BytesMut;

/// One client read, handed from a connection handler to the writer
///
/// Wraps the pooled buffer the bytes were read into; the buffer's length is
/// the valid length. Sending a `Message` moves the buffer, the writer gives
/// it back to the pool once the bytes are written.
#[derive(Debug)]
pub struct Message {
    buffer: BytesMut,
}

impl Message {
    /// Wrap a filled buffer
    #[inline]
    pub fn new(buffer: BytesMut) -> Self {
        Self { buffer }
    }

    /// Number of valid bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the message carries no bytes
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// The message payload
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Take the buffer back, e.g. to return it to the pool
    #[inline]
    pub fn into_buffer(self) -> BytesMut {
        self.buffer
    }
}

impl AsRef<[u8]> for Message {
    fn as_ref(&self) -> &[u8] {
        &self.buffer
    }
}

/// Out-of-band instruction for the log writer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlCommand {
    /// Flush, sync and close the current file, then reopen the same path
    Rotate,
    /// Flush, sync and close the current file, then stop
    Quit,
}

impl ControlCommand {
    /// Short lowercase name for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rotate => "rotate",
            Self::Quit => "quit",
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry on the log writer's queue
#[derive(Debug)]
pub enum WriterEvent {
    Message(Message),
    Control(ControlCommand),
}

impl WriterEvent {
    /// The message, if this event carries one
    pub fn into_message(self) -> Option<Message> {
        match self {
            Self::Message(message) => Some(message),
            Self::Control(_) => None,
        }
    }
}

impl From<Message> for WriterEvent {
    fn from(message: Message) -> Self {
        Self::Message(message)
    }
}

impl From<ControlCommand> for WriterEvent {
    fn from(command: ControlCommand) -> Self {
        Self::Control(command)
    }
}
