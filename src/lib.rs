//! Parsing, querying and rewriting of Mach-O binaries and fat archives.
//!
//! The crate is a pure function of its byte inputs: callers hand in a
//! fully read buffer, split it into slices with [`fat::read_file`], parse
//! a slice into a [`Library`], and query or rewrite from there. No I/O
//! happens inside; hosts own files, timeouts and logging configuration.
//!
//! ```no_run
//! # fn main() -> macho_kit::Result<()> {
//! let bytes = std::fs::read("libfoo.dylib")?;
//! let file = macho_kit::read_file(&bytes)?;
//! let lib = macho_kit::Library::parse_slice(file.slices[0].clone())?;
//! for dylib in &lib.dylibs {
//!     println!("{} {}", dylib.ordinal, dylib.install_name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod bind;
pub mod commands;
pub mod consts;
pub mod edit;
pub mod emit;
pub mod errors;
pub mod exports;
pub mod fat;
pub mod header;
pub mod library;
pub mod objc;
pub mod report;
pub mod segments;
pub mod symbols;
pub mod view;

// Fixture builder shared by the unit and integration tests; not a
// supported surface.
#[doc(hidden)]
pub mod testutil;

pub use edit::MachOEditor;
pub use errors::{Error, Result};
pub use fat::{FatArch, MachFile, Slice, read_file, write_fat};
pub use library::Library;
