use std::collections::HashMap;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use super::name::Name;
use super::packer::*;
use super::{RecordType, CLASS_CACHE_FLUSH, CLASS_IN};
use crate::error::{Error, Result};

/// Record data, tagged by record type.
///
/// Types the engine does not understand round-trip losslessly through
/// [`RData::Raw`].
#[derive(Debug, Clone, PartialEq)]
pub enum RData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Ns(Name),
    Cname(Name),
    Ptr(Name),
    Srv {
        priority: u16,
        weight: u16,
        port: u16,
        target: Name,
    },
    /// key=value strings, each at most 255 bytes. An empty list still
    /// encodes as one zero-length string on the wire.
    Txt(Vec<String>),
    Raw(u16, Vec<u8>),
}

impl fmt::Display for RData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RData::A(ip) => write!(f, "A {ip}"),
            RData::Aaaa(ip) => write!(f, "AAAA {ip}"),
            RData::Ns(name) => write!(f, "NS {name}"),
            RData::Cname(name) => write!(f, "CNAME {name}"),
            RData::Ptr(name) => write!(f, "PTR {name}"),
            RData::Srv {
                priority,
                weight,
                port,
                target,
            } => write!(f, "SRV {priority} {weight} {port} {target}"),
            RData::Txt(entries) => write!(f, "TXT {}", entries.join(" ")),
            RData::Raw(typ, data) => write!(f, "TYPE{} [{} bytes]", typ, data.len()),
        }
    }
}

impl RData {
    pub fn rtype(&self) -> RecordType {
        match self {
            RData::A(_) => RecordType::A,
            RData::Aaaa(_) => RecordType::Aaaa,
            RData::Ns(_) => RecordType::Ns,
            RData::Cname(_) => RecordType::Cname,
            RData::Ptr(_) => RecordType::Ptr,
            RData::Srv { .. } => RecordType::Srv,
            RData::Txt(_) => RecordType::Txt,
            RData::Raw(typ, _) => RecordType::from(*typ),
        }
    }

    // pack appends the wire format of the record data to msg.
    pub(crate) fn pack(
        &self,
        mut msg: Vec<u8>,
        compression: &mut Option<HashMap<String, usize>>,
        compression_off: usize,
    ) -> Result<Vec<u8>> {
        match self {
            RData::A(ip) => Ok(pack_bytes(msg, &ip.octets())),
            RData::Aaaa(ip) => Ok(pack_bytes(msg, &ip.octets())),
            RData::Ns(name) | RData::Cname(name) | RData::Ptr(name) => {
                name.pack(msg, compression, compression_off)
            }
            RData::Srv {
                priority,
                weight,
                port,
                target,
            } => {
                msg = pack_uint16(msg, *priority);
                msg = pack_uint16(msg, *weight);
                msg = pack_uint16(msg, *port);
                // RFC 2782 forbids compressing the SRV target.
                target.pack(msg, &mut None, compression_off)
            }
            RData::Txt(entries) => {
                if entries.is_empty() {
                    msg.push(0);
                    return Ok(msg);
                }
                for entry in entries {
                    msg = pack_str(msg, entry)?;
                }
                Ok(msg)
            }
            RData::Raw(_, data) => Ok(pack_bytes(msg, data)),
        }
    }

    // unpack parses `length` bytes of record data of the given type. The
    // full message is passed through because PTR/SRV/NS/CNAME contents may
    // be compressed against it.
    pub(crate) fn unpack(
        rtype: RecordType,
        msg: &[u8],
        off: usize,
        length: usize,
    ) -> Result<(RData, usize)> {
        let end = off + length;
        if end > msg.len() {
            return Err(Error::ErrResourceLen);
        }

        let (rdata, new_off) = match rtype {
            RecordType::A => {
                let (b, new_off) = unpack_bytes(msg, off, 4)?;
                (RData::A(Ipv4Addr::new(b[0], b[1], b[2], b[3])), new_off)
            }
            RecordType::Aaaa => {
                let (b, new_off) = unpack_bytes(msg, off, 16)?;
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&b);
                (RData::Aaaa(Ipv6Addr::from(octets)), new_off)
            }
            RecordType::Ns => {
                let mut name = Name::default();
                let new_off = name.unpack(msg, off)?;
                (RData::Ns(name), new_off)
            }
            RecordType::Cname => {
                let mut name = Name::default();
                let new_off = name.unpack(msg, off)?;
                (RData::Cname(name), new_off)
            }
            RecordType::Ptr => {
                let mut name = Name::default();
                let new_off = name.unpack(msg, off)?;
                (RData::Ptr(name), new_off)
            }
            RecordType::Srv => {
                let (priority, o) = unpack_uint16(msg, off)?;
                let (weight, o) = unpack_uint16(msg, o)?;
                let (port, o) = unpack_uint16(msg, o)?;
                let mut target = Name::default();
                let new_off = target.unpack(msg, o)?;
                (
                    RData::Srv {
                        priority,
                        weight,
                        port,
                        target,
                    },
                    new_off,
                )
            }
            RecordType::Txt => {
                let mut entries = Vec::new();
                let mut o = off;
                while o < end {
                    let (s, next) = unpack_str(msg, o)?;
                    if next > end {
                        return Err(Error::ErrResourceLen);
                    }
                    // Zero-length strings carry no data; the encoder emits
                    // one for an empty TXT and the decoder drops it again.
                    if !s.is_empty() {
                        entries.push(s);
                    }
                    o = next;
                }
                (RData::Txt(entries), o)
            }
            _ => {
                let (data, new_off) = unpack_bytes(msg, off, length)?;
                (RData::Raw(rtype.value(), data), new_off)
            }
        };

        // The rdata must consume exactly the advertised length.
        if new_off != end {
            return Err(Error::ErrResourceLen);
        }
        Ok((rdata, new_off))
    }

    // Uncompressed wire bytes, as compared octet-by-octet by the probe
    // tiebreaker of RFC 6762 section 8.2.
    pub(crate) fn wire_bytes(&self) -> Vec<u8> {
        self.pack(Vec::new(), &mut None, 0).unwrap_or_default()
    }
}

/// A DNS resource record.
///
/// `class` never carries the wire's top bit; that bit lives in
/// `cache_flush`, the cache-flush/unique flag of RFC 6762 section 10.2.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub name: Name,
    pub class: u16,
    pub cache_flush: bool,
    pub ttl: u32,
    pub rdata: RData,
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Record{{name: {}, class: {}, cache_flush: {}, ttl: {}, rdata: {}}}",
            self.name, self.class, self.cache_flush, self.ttl, self.rdata
        )
    }
}

impl Record {
    pub fn new(name: Name, ttl: u32, rdata: RData) -> Self {
        Record {
            name,
            class: CLASS_IN,
            cache_flush: false,
            ttl,
            rdata,
        }
    }

    pub fn a(name: Name, ip: Ipv4Addr, ttl: u32) -> Self {
        Record::new(name, ttl, RData::A(ip))
    }

    pub fn aaaa(name: Name, ip: Ipv6Addr, ttl: u32) -> Self {
        Record::new(name, ttl, RData::Aaaa(ip))
    }

    pub fn ptr(name: Name, target: Name, ttl: u32) -> Self {
        Record::new(name, ttl, RData::Ptr(target))
    }

    pub fn srv(name: Name, port: u16, target: Name, ttl: u32) -> Self {
        Record::new(
            name,
            ttl,
            RData::Srv {
                priority: 0,
                weight: 0,
                port,
                target,
            },
        )
    }

    pub fn txt(name: Name, entries: Vec<String>, ttl: u32) -> Self {
        Record::new(name, ttl, RData::Txt(entries))
    }

    pub fn rtype(&self) -> RecordType {
        self.rdata.rtype()
    }

    // pack appends the wire format of the record to msg.
    pub(crate) fn pack(
        &self,
        mut msg: Vec<u8>,
        compression: &mut Option<HashMap<String, usize>>,
        compression_off: usize,
    ) -> Result<Vec<u8>> {
        msg = self.name.pack(msg, compression, compression_off)?;
        msg = pack_uint16(msg, self.rtype().value());
        let class = if self.cache_flush {
            self.class | CLASS_CACHE_FLUSH
        } else {
            self.class & !CLASS_CACHE_FLUSH
        };
        msg = pack_uint16(msg, class);
        msg = pack_uint32(msg, self.ttl);

        // Fill in the length once the body is known.
        let len_off = msg.len();
        msg = pack_uint16(msg, 0);
        let pre_len = msg.len();
        msg = self.rdata.pack(msg, compression, compression_off)?;
        let body_len = msg.len() - pre_len;
        if body_len > u16::MAX as usize {
            return Err(Error::ErrResTooLong);
        }
        msg[len_off] = (body_len >> 8) as u8;
        msg[len_off + 1] = (body_len & 0xFF) as u8;

        Ok(msg)
    }

    pub(crate) fn unpack(msg: &[u8], off: usize) -> Result<(Record, usize)> {
        let mut name = Name::default();
        let off = name.unpack(msg, off)?;
        let (typ, off) = unpack_uint16(msg, off)?;
        let (class, off) = unpack_uint16(msg, off)?;
        let (ttl, off) = unpack_uint32(msg, off)?;
        let (length, off) = unpack_uint16(msg, off)?;
        let (rdata, off) = RData::unpack(RecordType::from(typ), msg, off, length as usize)?;
        Ok((
            Record {
                name,
                class: class & !CLASS_CACHE_FLUSH,
                cache_flush: class & CLASS_CACHE_FLUSH != 0,
                ttl,
                rdata,
            },
            off,
        ))
    }
}
