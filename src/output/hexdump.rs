//! Address-prefixed hex dumps of flash contents.

use std::fmt::Write;

/// Bytes shown per row.
pub const BYTES_PER_ROW: usize = 16;

/// Format `data` as rows of 16 hex bytes.
///
/// With `start`, each row is prefixed with its address.
///
/// ```
/// use cpx_bootloader::output::hex_dump;
///
/// assert_eq!(hex_dump(&[0x01, 0xAB], Some(0x40000)), "00040000: 01 AB");
/// ```
pub fn hex_dump(data: &[u8], start: Option<u32>) -> String {
    let mut out = String::with_capacity(data.len() * 3 + data.len() / BYTES_PER_ROW * 11);

    for (row, chunk) in data.chunks(BYTES_PER_ROW).enumerate() {
        if row > 0 {
            out.push('\n');
        }
        if let Some(start) = start {
            let address = start.wrapping_add((row * BYTES_PER_ROW) as u32);
            let _ = write!(out, "{:08X}: ", address);
        }
        let bytes: Vec<String> = chunk.iter().map(|b| format!("{:02X}", b)).collect();
        out.push_str(&bytes.join(" "));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_and_addresses() {
        let data: Vec<u8> = (0..20).collect();
        let dump = hex_dump(&data, Some(0x100));
        let lines: Vec<&str> = dump.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("00000100: 00 01 02"));
        assert!(lines[0].ends_with("0E 0F"));
        assert_eq!(lines[1], "00000110: 10 11 12 13");
    }

    #[test]
    fn test_without_address() {
        assert_eq!(hex_dump(&[0xDE, 0xAD], None), "DE AD");
    }

    #[test]
    fn test_empty() {
        assert_eq!(hex_dump(&[], Some(0)), "");
    }
}
