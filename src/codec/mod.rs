//! Frame-level I/O over the two halves of an async stream.

mod framed;

pub use framed::{FrameReader, FrameWriter};
