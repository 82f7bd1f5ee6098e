//! Stdout writers.
//!
//! # Important
//!
//! - **stdout**: results only (one line per record, or one JSON document)
//! - **stderr**: logs, via the `tracing` subscriber
//! - Lines end in an explicit `\n`, not whatever `println!` picks

use std::io::{self, Write};

use serde::Serialize;

fn write_line<W: Write>(writer: &mut W, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()
}

fn write_json_line<W: Write, T: Serialize>(writer: &mut W, value: &T) -> crate::error::Result<()> {
    serde_json::to_writer(&mut *writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Write a line to stdout and flush.
pub fn write_stdout_line(line: &str) -> io::Result<()> {
    write_line(&mut io::stdout().lock(), line)
}

/// Write `value` to stdout as one JSON line.
///
/// # Errors
///
/// Returns error if serialization or write fails.
pub fn write_stdout_json<T: Serialize>(value: &T) -> crate::error::Result<()> {
    write_json_line(&mut io::stdout().lock(), value)
}
