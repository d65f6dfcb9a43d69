// Handshake related constants

/// Marks a conforming handshake. A peer whose option record carries any
/// other value is dropped before framing begins.
pub const MAGIC_NUMBER: u64 = 0x3bef5c;

/// Upper bound, in bytes, of the newline-terminated option record
/// (including the newline).
pub const MAX_OPTION_RECORD_SIZE: usize = 4 * 1024;

// Frame related constants

/// Size in bytes of the little-endian `u32` length prefix that precedes
/// every encoded value on the wire.
pub const FRAME_LENGTH_FIELD_SIZE: usize = 4;

/// Largest encoded value the binary codec accepts when reading.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

// Client related constants

/// The buffer size of the completion queue created for an asynchronous call
/// when the caller does not supply one.
///
/// This value is a number of completed *calls*, not bytes. A caller that
/// shares one queue across many in-flight calls should size its own queue
/// accordingly; a full queue holds up delivery until it is drained.
pub const DEFAULT_COMPLETION_QUEUE_CAPACITY: usize = 10;
