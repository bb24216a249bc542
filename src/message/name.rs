use std::collections::HashMap;
use std::fmt;

use super::packer::*;
use crate::error::{Error, Result};

// The wire form of a name is limited to 255 bytes including every length
// prefix and the terminal zero. As a dotted string with trailing dot that
// is at most 254 bytes.
const NAME_DATA_LEN_MAX: usize = 254;

// A compression pointer may be followed at most this many times before the
// decoder gives up on the packet.
const MAX_COMPRESSION_POINTERS: usize = 20;

// Compression pointers carry a 14-bit offset.
const COMPRESSION_PTR_MAX: usize = 0x3FFF;

/// A fully qualified, dot-terminated DNS name.
///
/// Names compare case-insensitively, per RFC 6762 section 16 matching is on
/// ASCII case only.
#[derive(Default, Debug, Clone, Eq)]
pub struct Name {
    pub data: String,
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.data.eq_ignore_ascii_case(&other.data)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.data)
    }
}

impl Name {
    /// Builds a name from a dotted string, appending the trailing dot when
    /// missing. Labels must be 1-63 bytes and the whole name must fit the
    /// 255 byte wire limit.
    pub fn new(data: &str) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::ErrHostnameEmpty);
        }

        let data = if data.ends_with('.') {
            data.to_string()
        } else {
            format!("{data}.")
        };
        if data.len() > NAME_DATA_LEN_MAX {
            return Err(Error::ErrNameTooLong);
        }
        if data != "." {
            for label in data[..data.len() - 1].split('.') {
                if label.is_empty() {
                    return Err(Error::ErrZeroSegLen);
                }
                if label.len() > 63 {
                    return Err(Error::ErrSegTooLong);
                }
            }
        }

        Ok(Name { data })
    }

    /// Lowercase form used as a map key.
    pub fn key(&self) -> String {
        self.data.to_ascii_lowercase()
    }

    pub fn is_root(&self) -> bool {
        self.data.is_empty() || self.data == "."
    }

    // pack appends the wire format of the name to msg.
    //
    // When compression is Some, suffixes already written to the packet are
    // replaced by a 2-byte pointer and new suffixes are recorded for later
    // reuse. compression_off is where the message header begins in msg,
    // since pointer offsets are relative to it.
    pub(crate) fn pack(
        &self,
        mut msg: Vec<u8>,
        compression: &mut Option<HashMap<String, usize>>,
        compression_off: usize,
    ) -> Result<Vec<u8>> {
        if self.data.len() > NAME_DATA_LEN_MAX {
            return Err(Error::ErrNameTooLong);
        }
        if self.is_root() {
            msg.push(0);
            return Ok(msg);
        }

        let data = self.data.as_bytes();
        let mut begin = 0;
        for i in 0..data.len() {
            if data[i] != b'.' {
                continue;
            }
            if i == begin {
                return Err(Error::ErrZeroSegLen);
            }
            if i - begin > 63 {
                return Err(Error::ErrSegTooLong);
            }

            if let Some(map) = compression {
                // The whole remaining suffix may already live in the packet.
                let suffix = self.data[begin..].to_ascii_lowercase();
                if let Some(&ptr) = map.get(&suffix) {
                    return Ok(pack_uint16(msg, 0xC000 | ptr as u16));
                }
                let off = msg.len() - compression_off;
                if off <= COMPRESSION_PTR_MAX {
                    map.insert(suffix, off);
                }
            }

            msg.push((i - begin) as u8);
            msg.extend_from_slice(&data[begin..i]);
            begin = i + 1;
        }

        msg.push(0);
        Ok(msg)
    }

    // unpack parses a possibly compressed name out of msg starting at off,
    // returning the offset of the first byte after the name in the original
    // stream.
    pub(crate) fn unpack(&mut self, msg: &[u8], off: usize) -> Result<usize> {
        // curr_off is the current working offset, new_off is the offset
        // where the next record or question begins.
        let mut curr_off = off;
        let mut new_off = off;
        let mut ptr = 0;
        let mut name = String::with_capacity(NAME_DATA_LEN_MAX);

        loop {
            if curr_off >= msg.len() {
                return Err(Error::ErrBaseLen);
            }
            let c = msg[curr_off] as usize;
            match c & 0xC0 {
                0x00 => {
                    if c == 0x00 {
                        // terminal zero
                        if ptr == 0 {
                            new_off = curr_off + 1;
                        }
                        break;
                    }
                    // literal label
                    let label_end = curr_off + 1 + c;
                    if label_end > msg.len() {
                        return Err(Error::ErrCalcLen);
                    }
                    if name.len() + c + 1 > NAME_DATA_LEN_MAX {
                        return Err(Error::ErrNameTooLong);
                    }
                    let label = std::str::from_utf8(&msg[curr_off + 1..label_end])
                        .map_err(|_| Error::ErrInvalidString)?;
                    name.push_str(label);
                    name.push('.');
                    if ptr == 0 {
                        new_off = label_end;
                    }
                    curr_off = label_end;
                }
                0xC0 => {
                    // pointer
                    if curr_off + 2 > msg.len() {
                        return Err(Error::ErrBaseLen);
                    }
                    if ptr == 0 {
                        new_off = curr_off + 2;
                    }
                    ptr += 1;
                    if ptr > MAX_COMPRESSION_POINTERS {
                        return Err(Error::ErrTooManyPtr);
                    }
                    let target = ((c & 0x3F) << 8) | msg[curr_off + 1] as usize;
                    // A pointer may only reference an earlier position.
                    if target >= curr_off {
                        return Err(Error::ErrInvalidPtr);
                    }
                    curr_off = target;
                }
                _ => {
                    // the 0x80 and 0x40 prefixes are reserved
                    return Err(Error::ErrReserved);
                }
            }
        }

        if name.is_empty() {
            name.push('.');
        }
        self.data = name;
        Ok(new_off)
    }

    pub(crate) fn skip(msg: &[u8], off: usize) -> Result<usize> {
        let mut new_off = off;
        loop {
            if new_off >= msg.len() {
                return Err(Error::ErrBaseLen);
            }
            let c = msg[new_off] as usize;
            match c & 0xC0 {
                0x00 => {
                    if c == 0x00 {
                        return Ok(new_off + 1);
                    }
                    new_off += 1 + c;
                }
                0xC0 => return skip_uint16(msg, new_off),
                _ => return Err(Error::ErrReserved),
            }
        }
    }
}
