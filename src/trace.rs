//! Trace front end (§6): each line is
//! `<inst_addr_hex> <bubble_count_dec> <R|W> <data_addr_hex> <size_bytes_dec>`.
//! At end of file the reader rewinds and keeps replaying the same trace,
//! matching the teacher's own trace readers (`exec`/`trace` crates),
//! which loop a recorded instruction stream rather than terminate a run
//! on exhaustion.

use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};

use crate::address::{split_straddling_access, Addr, Geometry};
use crate::error::{Error, Result};
use crate::request::AccessKind;

/// One decoded trace line before it becomes a [`crate::request::Request`]:
/// a run of `bubbles` non-memory instructions followed by one memory
/// access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEntry {
    pub inst_addr: Addr,
    pub bubbles: u32,
    pub kind: AccessKind,
    pub data_addr: Addr,
    pub size: usize,
}

impl TraceEntry {
    /// Splits this entry in two if its access straddles a block
    /// boundary (§6 Scenario F), otherwise returns itself unchanged as
    /// the sole element.
    pub fn split(self, geom: &Geometry) -> Vec<TraceEntry> {
        match split_straddling_access(geom, self.data_addr, self.size) {
            None => vec![self],
            Some((first, second)) => vec![
                TraceEntry {
                    data_addr: first.addr,
                    size: first.size,
                    bubbles: self.bubbles,
                    ..self
                },
                TraceEntry {
                    data_addr: second.addr,
                    size: second.size,
                    bubbles: 0,
                    ..self
                },
            ],
        }
    }
}

/// A self-rewinding trace reader over any seekable byte source.
pub struct TraceReader<R> {
    inner: BufReader<R>,
    line_no: u64,
    max_access_size: usize,
}

impl<R: Read + Seek> TraceReader<R> {
    pub fn new(inner: R, max_access_size: usize) -> Self {
        Self {
            inner: BufReader::new(inner),
            line_no: 0,
            max_access_size,
        }
    }

    /// Reads the next entry, skipping lines whose access is larger than
    /// `max_access_size` (§6: "accesses larger than 64 bytes are
    /// dropped"), and rewinding to the start once EOF is reached.
    pub fn next_entry(&mut self) -> Result<TraceEntry> {
        loop {
            let mut line = String::new();
            let read = self.inner.read_line(&mut line)?;
            if read == 0 {
                self.inner.seek(SeekFrom::Start(0))?;
                self.line_no = 0;
                continue;
            }
            self.line_no += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match parse_line(trimmed) {
                Ok(entry) if entry.size > self.max_access_size => continue,
                Ok(entry) => return Ok(entry),
                Err(_) => {
                    return Err(Error::TraceParse {
                        line: self.line_no,
                        text: trimmed.to_string(),
                    })
                }
            }
        }
    }
}

fn parse_line(line: &str) -> std::result::Result<TraceEntry, ()> {
    let mut fields = line.split_whitespace();
    let inst_addr = parse_hex(fields.next().ok_or(())?)?;
    let bubbles: u32 = fields.next().ok_or(())?.parse().map_err(|_| ())?;
    let kind = match fields.next().ok_or(())? {
        "R" => AccessKind::Read,
        "W" => AccessKind::Write,
        _ => return Err(()),
    };
    let data_addr = parse_hex(fields.next().ok_or(())?)?;
    let size: usize = fields.next().ok_or(())?.parse().map_err(|_| ())?;
    Ok(TraceEntry {
        inst_addr,
        bubbles,
        kind,
        data_addr,
        size,
    })
}

fn parse_hex(field: &str) -> std::result::Result<Addr, ()> {
    let field = field.strip_prefix("0x").unwrap_or(field);
    Addr::from_str_radix(field, 16).map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_a_well_formed_line() {
        let entry = parse_line("0x400000 3 R 0x7fff1000 8").unwrap();
        assert_eq!(entry.inst_addr, 0x400000);
        assert_eq!(entry.bubbles, 3);
        assert_eq!(entry.kind, AccessKind::Read);
        assert_eq!(entry.data_addr, 0x7fff1000);
        assert_eq!(entry.size, 8);
    }

    #[test]
    fn rewinds_at_eof_instead_of_stopping() {
        let data = b"0x1 0 R 0x100 4\n0x2 0 W 0x200 4\n".to_vec();
        let mut reader = TraceReader::new(Cursor::new(data), 64);
        let first = reader.next_entry().unwrap();
        let second = reader.next_entry().unwrap();
        let wrapped = reader.next_entry().unwrap();
        assert_eq!(first.inst_addr, wrapped.inst_addr);
        assert_ne!(first.inst_addr, second.inst_addr);
    }

    #[test]
    fn skips_oversized_accesses() {
        let data = b"0x1 0 R 0x100 128\n0x2 0 R 0x200 8\n".to_vec();
        let mut reader = TraceReader::new(Cursor::new(data), 64);
        let entry = reader.next_entry().unwrap();
        assert_eq!(entry.data_addr, 0x200);
    }

    #[test]
    fn splits_a_straddling_access() {
        let geom = Geometry::new(64, 16);
        let entry = TraceEntry {
            inst_addr: 0x1,
            bubbles: 0,
            kind: AccessKind::Read,
            data_addr: 60,
            size: 8,
        };
        let halves = entry.split(&geom);
        assert_eq!(halves.len(), 2);
        assert_eq!(halves[0].data_addr, 60);
        assert_eq!(halves[0].size, 4);
        assert_eq!(halves[1].data_addr, 64);
        assert_eq!(halves[1].size, 4);
    }
}
