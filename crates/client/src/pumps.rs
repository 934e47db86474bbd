//! Background tasks that own the two halves of the client socket.

pub(crate) mod ping;
pub(crate) mod read;
pub(crate) mod write;
