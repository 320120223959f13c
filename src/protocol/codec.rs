use std::io;

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::command::{Command, MAX_COMMAND_LEN};

/// Server reply to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Length-prefixed frame blob.
    Frame(Bytes),
    /// The zero-length marker: no such frame, end of stream or bad request.
    NoFrame,
    /// Plain-text load metric, not length-prefixed.
    Load(String),
}

/// Server-side framing.
///
/// Each read is treated as one command, matching peers that send commands
/// without a delimiter. Newline-terminated commands that share a read are
/// split and delivered in order. Blank lines between them are skipped, but a
/// read holding nothing except whitespace is answered as malformed.
#[derive(Debug, Default)]
pub struct CommandCodec {
    /// Set while the current read still has commands left to decode.
    mid_read: bool,
}

impl Decoder for CommandCodec {
    type Item = Command;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Command>, io::Error> {
        if !self.mid_read && !src.is_empty() && src.iter().all(u8::is_ascii_whitespace) {
            let blank = src.split();
            return Ok(Some(Command::Malformed(format!(
                "<{} blank bytes>",
                blank.len()
            ))));
        }

        let command = Self::next_command(src);
        self.mid_read = command.is_some() && !src.is_empty();
        Ok(command)
    }
}

impl CommandCodec {
    fn next_command(src: &mut BytesMut) -> Option<Command> {
        loop {
            if src.is_empty() {
                return None;
            }

            let chunk = match src.iter().position(|b| *b == b'\n') {
                Some(pos) => {
                    let mut line = src.split_to(pos + 1);
                    line.truncate(pos);
                    line
                }
                None => src.split(),
            };

            if chunk.len() > MAX_COMMAND_LEN {
                return Some(Command::Malformed(format!(
                    "<{} byte command>",
                    chunk.len()
                )));
            }

            let Ok(text) = std::str::from_utf8(&chunk) else {
                return Some(Command::Malformed("<non-utf8 command>".to_string()));
            };
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            return Some(Command::parse(text));
        }
    }
}

impl Encoder<Reply> for CommandCodec {
    type Error = io::Error;

    fn encode(&mut self, reply: Reply, dst: &mut BytesMut) -> Result<(), io::Error> {
        match reply {
            Reply::Frame(blob) => {
                let len = u32::try_from(blob.len()).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidData, "frame larger than 4 GiB")
                })?;
                dst.reserve(4 + blob.len());
                dst.put_u32(len);
                dst.extend_from_slice(&blob);
            }
            Reply::NoFrame => dst.put_u32(0),
            Reply::Load(text) => dst.put_slice(text.as_bytes()),
        }
        Ok(())
    }
}
