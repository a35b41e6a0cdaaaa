// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Entity scanning without full tokenization.
//!
//! The scanner walks instance lines (`#id=TYPE(...);`) and reports their byte
//! ranges. Terminators are located with [memchr](https://docs.rs/memchr) while
//! skipping over quoted strings, so names like `'Level #1; north'` do not cut
//! an instance short.

use crate::error::{Error, Result};

/// Find the `;` terminating the instance that starts at `from`.
///
/// Returns the offset one past the semicolon.
pub fn find_instance_end(bytes: &[u8], from: usize) -> Option<usize> {
    let mut pos = from;
    loop {
        let offset = memchr::memchr2(b'\'', b';', &bytes[pos..])?;
        let at = pos + offset;
        if bytes[at] == b';' {
            return Some(at + 1);
        }
        // Skip the quoted run; doubled quotes stay inside the string.
        let mut i = at + 1;
        loop {
            let close = memchr::memchr(b'\'', &bytes[i..])?;
            i += close + 1;
            if bytes.get(i) == Some(&b'\'') {
                i += 1;
                continue;
            }
            break;
        }
        pos = i;
    }
}

/// Byte range of the DATA section body (between `DATA;` and `ENDSEC;`).
pub fn locate_data_section(content: &str) -> Result<(usize, usize)> {
    let head = content.trim_start();
    if !head.starts_with("ISO-10303-21;") {
        return Err(Error::MissingHeader);
    }

    let data = memchr::memmem::find(content.as_bytes(), b"DATA;").ok_or(Error::MissingDataSection)?;
    let start = data + "DATA;".len();
    let end = memchr::memmem::find(&content.as_bytes()[start..], b"ENDSEC;")
        .map(|offset| start + offset)
        .unwrap_or(content.len());
    Ok((start, end))
}

/// Read the first schema identifier from the `FILE_SCHEMA` header entry.
pub fn file_schema(content: &str) -> Option<String> {
    let at = memchr::memmem::find(content.as_bytes(), b"FILE_SCHEMA")?;
    let rest = &content[at..];
    let open = rest.find('\'')?;
    let close = rest[open + 1..].find('\'')?;
    Some(rest[open + 1..open + 1 + close].to_string())
}

/// Fast instance scanner.
pub struct EntityScanner<'a> {
    content: &'a str,
    position: usize,
}

impl<'a> EntityScanner<'a> {
    /// Create a scanner over a DATA section body (or any run of instances).
    pub fn new(content: &'a str) -> Self {
        Self {
            content,
            position: 0,
        }
    }

    /// Next instance as `(id, type_name, start, end)`.
    ///
    /// Returns `Ok(None)` at the end of input and an error when an instance
    /// has no terminator.
    pub fn next_entity(&mut self) -> Result<Option<(u32, &'a str, usize, usize)>> {
        let bytes = self.content.as_bytes();

        loop {
            let Some(offset) = memchr::memchr(b'#', &bytes[self.position..]) else {
                self.position = bytes.len();
                return Ok(None);
            };
            let start = self.position + offset;

            let id_start = start + 1;
            let mut id_end = id_start;
            while id_end < bytes.len() && bytes[id_end].is_ascii_digit() {
                id_end += 1;
            }

            let mut eq = id_end;
            while eq < bytes.len() && bytes[eq].is_ascii_whitespace() {
                eq += 1;
            }

            if id_end == id_start || bytes.get(eq) != Some(&b'=') {
                // Not an instance line; keep looking after this '#'.
                self.position = id_start;
                continue;
            }

            let end = find_instance_end(bytes, eq).ok_or(Error::Unterminated(start))?;
            let id = self.content[id_start..id_end]
                .parse::<u32>()
                .map_err(|e| Error::parse(id_start, e.to_string()))?;

            let type_region = self.content[eq + 1..end].trim_start();
            let type_len = type_region
                .find(|c: char| c == '(' || c.is_whitespace())
                .unwrap_or(type_region.len());
            let type_name = &type_region[..type_len];

            self.position = end;
            return Ok(Some((id, type_name, start, end)));
        }
    }
}
