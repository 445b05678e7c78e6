//! Status-file reporting.
//!
//! A tiny embedded status endpoint: the file is truncated and rewritten
//! with the lowercase mode name after every completed transition. No
//! fsync — a torn read across a power cut only ever costs one status
//! line, which the next transition rewrites.

use std::fs;
use std::io;
use std::path::Path;

use crate::fsm::Mode;

/// Overwrite `path` with the mode name followed by a newline.
pub fn write_mode(path: &Path, mode: Mode) -> io::Result<()> {
    fs::write(path, format!("{}\n", mode.name()))
}
