//! Wire data model shared by the Trollbox client and gateway.

pub mod events;
pub mod models;

pub use events::{ChatAction, ErrorFrame, ProtocolError, ServerFrame};
pub use models::{Credentials, Message, MessageRef, Role, UnknownRole};
