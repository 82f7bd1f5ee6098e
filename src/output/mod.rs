//! Output module - operator-facing results on stdout.
//!
//! Results go to stdout, one line per record; logs go to stderr through
//! `tracing`. With `--json` every command prints exactly one JSON line.

mod hexdump;
mod stdio;

pub use hexdump::{hex_dump, BYTES_PER_ROW};
pub use stdio::{write_stdout_json, write_stdout_line};
