//! Wire protocol shared by the server and the player.
//!
//! Client to server: UTF-8 text commands, `load`, `pause`, `play` or
//! `{title},{tier},{index}`. Server to client: a `u32` big-endian length
//! followed by that many bytes of frame data (`0` means no such frame), or a
//! bare text number in answer to `load`.

pub mod codec;
pub mod command;
pub mod tier;

pub use codec::{CommandCodec, Reply};
pub use command::{Command, FrameRequest, MAX_COMMAND_LEN};
pub use tier::{ResolutionTier, UnknownTier};
