// Copyright (c) 2026 asm-lens Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use serde_json::Value;
use std::io::{self, BufRead, BufReader, Write};

use crate::error::Error;

/// Message framing shared with the editor front end: `Content-Length`
/// headers, a blank line, then a JSON body.
pub trait Transport {
    /// `Ok(None)` on a clean end of stream between messages.
    fn read_message(&mut self) -> Result<Option<Value>, Error>;
    fn write_message(&mut self, msg: &Value) -> Result<(), Error>;
}

pub struct FramedTransport<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> FramedTransport<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    pub fn into_parts(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

pub type StdioTransport = FramedTransport<BufReader<io::Stdin>, io::Stdout>;

/// Transport over this process's stdin/stdout (child-process mode).
pub fn stdio() -> StdioTransport {
    FramedTransport::new(BufReader::new(io::stdin()), io::stdout())
}

fn transport_error(e: impl std::fmt::Display) -> Error {
    Error::Transport(e.to_string())
}

impl<R: BufRead, W: Write> Transport for FramedTransport<R, W> {
    fn read_message(&mut self) -> Result<Option<Value>, Error> {
        // Read headers until an empty line
        let mut content_length: Option<usize> = None;
        let mut saw_header = false;
        loop {
            let mut header_line = String::new();
            let n = self.reader.read_line(&mut header_line).map_err(transport_error)?;
            if n == 0 {
                if saw_header {
                    return Err(Error::Transport("EOF while reading header".into()));
                }
                return Ok(None);
            }
            let header_trim = header_line.trim();
            if header_trim.is_empty() {
                if saw_header {
                    break; // end of headers
                }
                continue;
            }
            saw_header = true;
            if header_trim.to_lowercase().starts_with("content-length") {
                if let Some(idx) = header_trim.find(':') {
                    let num = header_trim[idx + 1..].trim();
                    content_length = Some(num.parse::<usize>().map_err(transport_error)?);
                }
            }
            // ignore other headers
        }

        let len = content_length
            .ok_or_else(|| Error::Transport("Missing Content-Length header".into()))?;
        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf).map_err(transport_error)?;
        let v: Value = serde_json::from_slice(&buf).map_err(transport_error)?;
        Ok(Some(v))
    }

    fn write_message(&mut self, msg: &Value) -> Result<(), Error> {
        // Serialize first so the writer is held only for the actual write.
        let body = serde_json::to_vec(msg).map_err(transport_error)?;
        write!(self.writer, "Content-Length: {}\r\n\r\n", body.len()).map_err(transport_error)?;
        self.writer.write_all(&body).map_err(transport_error)?;
        self.writer.flush().map_err(transport_error)
    }
}
