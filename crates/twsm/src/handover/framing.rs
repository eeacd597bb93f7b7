// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-client records on the handover byte channel.
//!
//! ```text
//! | CLIENT_ID (1) | DATA_LEN (2, LE) | DATA | ... | END (0xFF) |
//! ```
//!
//! A client's data may span several records. The receiver may see the
//! stream re-chunked anywhere, including inside a record header.

use super::Progress;
use crate::config::{END_TAG, MAX_RECORD_LEN, RECORD_HEADER_LEN};
use crate::error::{Error, Result};

/// Writes records into one destination buffer.
#[derive(Debug)]
pub struct RecordWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
    max_record_len: usize,
}

impl<'a> RecordWriter<'a> {
    pub fn new(buf: &'a mut [u8], max_record_len: usize) -> Self {
        Self {
            buf,
            pos: 0,
            max_record_len: max_record_len.clamp(1, MAX_RECORD_LEN),
        }
    }

    /// Bytes written so far.
    pub fn written(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Room for a header plus at least one data byte.
    pub fn has_room_for_record(&self) -> bool {
        self.remaining() > RECORD_HEADER_LEN
    }

    /// Write one record for `client`, its data produced by `fill`.
    ///
    /// `fill` receives the data area and reports how much it used. A record
    /// with no data is not emitted.
    pub fn record<F>(&mut self, client: u8, fill: F) -> Result<Progress>
    where
        F: FnOnce(&mut [u8]) -> Result<Progress>,
    {
        if client == END_TAG {
            return Err(Error::TooManyClients);
        }
        if !self.has_room_for_record() {
            return Err(Error::BufferTooSmall {
                needed: RECORD_HEADER_LEN + 1,
                available: self.remaining(),
            });
        }
        let start = self.pos + RECORD_HEADER_LEN;
        let capacity = (self.buf.len() - start).min(self.max_record_len);
        let progress = fill(&mut self.buf[start..start + capacity])?;
        if progress.bytes > capacity {
            return Err(Error::BufferTooSmall {
                needed: progress.bytes,
                available: capacity,
            });
        }
        if progress.bytes > 0 {
            let len = progress.bytes as u16;
            self.buf[self.pos] = client;
            self.buf[self.pos + 1..start].copy_from_slice(&len.to_le_bytes());
            self.pos = start + progress.bytes;
        }
        Ok(progress)
    }

    /// Write the END tag. False when the buffer is full.
    pub fn end(&mut self) -> bool {
        if self.pos < self.buf.len() {
            self.buf[self.pos] = END_TAG;
            self.pos += 1;
            true
        } else {
            false
        }
    }
}

/// Piece of the stream returned by [`RecordParser::next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunk<'a> {
    /// Data for `client`. `record_end` is set on the last piece of a record.
    Data {
        client: u8,
        data: &'a [u8],
        record_end: bool,
    },
    /// END tag.
    End,
}

#[derive(Debug, Clone, Copy)]
enum ParseState {
    Header { have: usize, bytes: [u8; RECORD_HEADER_LEN] },
    Body { client: u8, remaining: usize },
    Ended,
}

/// Incremental record parser.
#[derive(Debug)]
pub struct RecordParser {
    clients: usize,
    state: ParseState,
}

impl RecordParser {
    /// Parser for a stream carrying `clients` client ids.
    pub fn new(clients: usize) -> Self {
        Self {
            clients,
            state: ParseState::Header {
                have: 0,
                bytes: [0; RECORD_HEADER_LEN],
            },
        }
    }

    pub fn is_ended(&self) -> bool {
        matches!(self.state, ParseState::Ended)
    }

    /// True between the header and the last data byte of a record.
    pub fn in_record(&self) -> bool {
        matches!(self.state, ParseState::Body { .. })
            || matches!(self.state, ParseState::Header { have, .. } if have > 0)
    }

    /// Take the next chunk from the front of `input`. `None` once `input`
    /// is exhausted.
    pub fn next<'a>(&mut self, input: &mut &'a [u8]) -> Result<Option<Chunk<'a>>> {
        loop {
            if input.is_empty() {
                return Ok(None);
            }
            match self.state {
                ParseState::Ended => {
                    return Err(Error::CorruptStream(format!(
                        "{} bytes after END",
                        input.len()
                    )))
                }
                ParseState::Header { mut have, mut bytes } => {
                    if have == 0 && input[0] == END_TAG {
                        *input = &input[1..];
                        self.state = ParseState::Ended;
                        return Ok(Some(Chunk::End));
                    }
                    let take = (RECORD_HEADER_LEN - have).min(input.len());
                    bytes[have..have + take].copy_from_slice(&input[..take]);
                    have += take;
                    *input = &input[take..];
                    if have < RECORD_HEADER_LEN {
                        self.state = ParseState::Header { have, bytes };
                        continue;
                    }
                    let client = bytes[0];
                    if usize::from(client) >= self.clients {
                        return Err(Error::CorruptStream(format!("unknown client id {}", client)));
                    }
                    let len = usize::from(u16::from_le_bytes([bytes[1], bytes[2]]));
                    log::trace!("[framing] record client={} len={}", client, len);
                    self.state = ParseState::Body {
                        client,
                        remaining: len,
                    };
                    if len == 0 {
                        self.reset_header();
                        return Ok(Some(Chunk::Data {
                            client,
                            data: &[],
                            record_end: true,
                        }));
                    }
                }
                ParseState::Body { client, remaining } => {
                    let take = remaining.min(input.len());
                    let (data, rest) = input.split_at(take);
                    *input = rest;
                    let left = remaining - take;
                    if left == 0 {
                        self.reset_header();
                    } else {
                        self.state = ParseState::Body {
                            client,
                            remaining: left,
                        };
                    }
                    return Ok(Some(Chunk::Data {
                        client,
                        data,
                        record_end: left == 0,
                    }));
                }
            }
        }
    }

    fn reset_header(&mut self) {
        self.state = ParseState::Header {
            have: 0,
            bytes: [0; RECORD_HEADER_LEN],
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill_with(byte: u8, count: usize) -> impl FnOnce(&mut [u8]) -> Result<Progress> {
        move |dest: &mut [u8]| {
            let n = count.min(dest.len());
            dest[..n].fill(byte);
            Ok(if n == count {
                Progress::done(n)
            } else {
                Progress::partial(n)
            })
        }
    }

    fn collect(parser: &mut RecordParser, mut input: &[u8]) -> Result<Vec<(Option<u8>, Vec<u8>, bool)>> {
        let mut out = Vec::new();
        while let Some(chunk) = parser.next(&mut input)? {
            out.push(match chunk {
                Chunk::Data {
                    client,
                    data,
                    record_end,
                } => (Some(client), data.to_vec(), record_end),
                Chunk::End => (None, Vec::new(), true),
            });
        }
        Ok(out)
    }

    #[test]
    fn test_writer_layout() {
        let mut buf = [0u8; 16];
        let mut writer = RecordWriter::new(&mut buf, MAX_RECORD_LEN);
        assert!(writer.record(0, fill_with(0xaa, 2)).unwrap().done);
        assert!(writer.record(2, fill_with(0xbb, 0)).unwrap().done);
        assert!(writer.record(1, fill_with(0xcc, 1)).unwrap().done);
        assert!(writer.end());
        let n = writer.written();
        assert_eq!(&buf[..n], &[0, 2, 0, 0xaa, 0xaa, 1, 1, 0, 0xcc, 0xff]);
    }

    #[test]
    fn test_writer_splits_at_max_record_len() {
        let mut buf = [0u8; 32];
        let mut writer = RecordWriter::new(&mut buf, 3);
        let p = writer.record(0, fill_with(7, 5)).unwrap();
        assert_eq!(p, Progress::partial(3));
        assert_eq!(writer.written(), 6);
    }

    #[test]
    fn test_writer_needs_header_room() {
        let mut buf = [0u8; 3];
        let mut writer = RecordWriter::new(&mut buf, MAX_RECORD_LEN);
        assert!(matches!(
            writer.record(0, fill_with(1, 1)),
            Err(Error::BufferTooSmall { needed: 4, available: 3 })
        ));
        assert!(writer.end());
        assert!(!writer.end());
    }

    #[test]
    fn test_parser_across_split_header() {
        let stream = [1u8, 3, 0, 9, 8, 7, 0xff];
        let mut parser = RecordParser::new(2);
        let mut chunks = Vec::new();
        for piece in stream.chunks(2) {
            chunks.extend(collect(&mut parser, piece).unwrap());
        }
        assert_eq!(
            chunks,
            vec![
                (Some(1), vec![9], false),
                (Some(1), vec![8, 7], true),
                (None, vec![], true),
            ]
        );
        assert!(parser.is_ended());
    }

    #[test]
    fn test_parser_unknown_client() {
        let mut parser = RecordParser::new(1);
        let err = collect(&mut parser, &[4, 1, 0, 0]).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_parser_bytes_after_end() {
        let mut parser = RecordParser::new(1);
        let err = collect(&mut parser, &[0xff, 0]).unwrap_err();
        assert!(matches!(err, Error::CorruptStream(msg) if msg.contains("after END")));
    }

    #[test]
    fn test_parser_mid_record_flag() {
        let mut parser = RecordParser::new(1);
        let _ = collect(&mut parser, &[0, 4]).unwrap();
        assert!(parser.in_record());
        let _ = collect(&mut parser, &[0, 1, 2, 3, 4]).unwrap();
        assert!(!parser.in_record());
    }
}
