//! Output destinations

pub mod redirect;
pub mod rotating_file;
pub mod writer;

pub use redirect::{SharedBuffer, SharedWriter};
pub use rotating_file::{FileNaming, RotatingFile, RotationPolicy, WriteOutcome, DEFAULT_MAX_SIZE};
pub use writer::OutputWriter;
