#[cfg(test)]
mod message_test;

pub(crate) mod packer;

pub mod header;
pub mod name;
pub mod question;
pub mod record;

use std::collections::HashMap;
use std::fmt;

use header::{Header, HeaderInternal};
use question::Question;
use record::Record;

use crate::error::{Error, Result};

/// The Internet class. mDNS uses no other.
pub const CLASS_IN: u16 = 1;

/// The top bit of the wire class field: cache-flush on records, and the
/// unique-ownership marker this engine gives to probed records.
pub const CLASS_CACHE_FLUSH: u16 = 0x8000;

/// Largest message this engine will emit or accept. Anything bigger is
/// split across transmissions with the TC bit set.
pub const MAX_PACKET_LEN: usize = 9000;

// Most packets are far smaller than the limit; start the pack buffer off
// small and let it grow.
const PACK_STARTING_CAP: usize = 512;

/// A DNS record type.
///
/// The named variants are the types this engine interprets; everything
/// else travels through `Other` with its numeric code.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    Ns,
    Cname,
    Ptr,
    Txt,
    Aaaa,
    Srv,
    /// Query-only.
    Any,
    Other(u16),
}

impl RecordType {
    pub fn value(&self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::Ns => 2,
            RecordType::Cname => 5,
            RecordType::Ptr => 12,
            RecordType::Txt => 16,
            RecordType::Aaaa => 28,
            RecordType::Srv => 33,
            RecordType::Any => 255,
            RecordType::Other(v) => *v,
        }
    }

    /// Whether a question of this type matches a record of type `other`.
    pub fn matches(&self, other: RecordType) -> bool {
        *self == RecordType::Any || self.value() == other.value()
    }
}

impl From<u16> for RecordType {
    fn from(v: u16) -> Self {
        match v {
            1 => RecordType::A,
            2 => RecordType::Ns,
            5 => RecordType::Cname,
            12 => RecordType::Ptr,
            16 => RecordType::Txt,
            28 => RecordType::Aaaa,
            33 => RecordType::Srv,
            255 => RecordType::Any,
            _ => RecordType::Other(v),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::Ns => write!(f, "NS"),
            RecordType::Cname => write!(f, "CNAME"),
            RecordType::Ptr => write!(f, "PTR"),
            RecordType::Txt => write!(f, "TXT"),
            RecordType::Aaaa => write!(f, "AAAA"),
            RecordType::Srv => write!(f, "SRV"),
            RecordType::Any => write!(f, "ANY"),
            RecordType::Other(v) => write!(f, "TYPE{v}"),
        }
    }
}

// An RCode is a DNS response status code.
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq)]
pub enum RCode {
    #[default]
    Success = 0,
    FormatError = 1,
    ServerFailure = 2,
    NameError = 3,
    NotImplemented = 4,
    Refused = 5,
    Unsupported,
}

impl From<u8> for RCode {
    fn from(v: u8) -> Self {
        match v {
            0 => RCode::Success,
            1 => RCode::FormatError,
            2 => RCode::ServerFailure,
            3 => RCode::NameError,
            4 => RCode::NotImplemented,
            5 => RCode::Refused,
            _ => RCode::Unsupported,
        }
    }
}

impl fmt::Display for RCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            RCode::Success => "Success",
            RCode::FormatError => "FormatError",
            RCode::ServerFailure => "ServerFailure",
            RCode::NameError => "NameError",
            RCode::NotImplemented => "NotImplemented",
            RCode::Refused => "Refused",
            RCode::Unsupported => "Unsupported",
        };
        write!(f, "{s}")
    }
}

/// A parsed DNS message.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<Record>,
    pub authorities: Vec<Record>,
    pub additionals: Vec<Record>,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Message{{{}, questions: {}, answers: {}, authorities: {}, additionals: {}}}",
            self.header,
            self.questions.len(),
            self.answers.len(),
            self.authorities.len(),
            self.additionals.len(),
        )
    }
}

impl Message {
    /// Parses a full message. Any failure means the packet is malformed
    /// and should be dropped.
    pub fn unpack(msg: &[u8]) -> Result<Message> {
        let mut h = HeaderInternal::default();
        let mut off = h.unpack(msg, 0)?;

        let mut header = Header::default();
        header.set_from_wire(h.id, h.bits);

        // Section counts are untrusted; let the vectors grow as real
        // content arrives instead of preallocating.
        let mut questions = Vec::new();
        for _ in 0..h.questions {
            let (q, new_off) = Question::unpack(msg, off)?;
            questions.push(q);
            off = new_off;
        }

        let mut sections = [Vec::new(), Vec::new(), Vec::new()];
        for (section, count) in sections
            .iter_mut()
            .zip([h.answers, h.authorities, h.additionals])
        {
            for _ in 0..count {
                let (r, new_off) = Record::unpack(msg, off)?;
                section.push(r);
                off = new_off;
            }
        }
        let [answers, authorities, additionals] = sections;

        Ok(Message {
            header,
            questions,
            answers,
            authorities,
            additionals,
        })
    }

    /// Packs the full message, compressing names against the packet.
    ///
    /// Fails with [`Error::ErrPacketTooBig`] when the result cannot fit
    /// [`MAX_PACKET_LEN`]; the responder then splits the record set and
    /// marks all partial packets truncated.
    pub fn pack(&self) -> Result<Vec<u8>> {
        if self.questions.len() > u16::MAX as usize {
            return Err(Error::ErrTooManyQuestions);
        }
        if self.answers.len() > u16::MAX as usize {
            return Err(Error::ErrTooManyAnswers);
        }
        if self.authorities.len() > u16::MAX as usize {
            return Err(Error::ErrTooManyAuthorities);
        }
        if self.additionals.len() > u16::MAX as usize {
            return Err(Error::ErrTooManyAdditionals);
        }

        let (id, bits) = self.header.pack();
        let h = HeaderInternal {
            id,
            bits,
            questions: self.questions.len() as u16,
            answers: self.answers.len() as u16,
            authorities: self.authorities.len() as u16,
            additionals: self.additionals.len() as u16,
        };

        let mut msg = h.pack(Vec::with_capacity(PACK_STARTING_CAP));
        let compression_off = 0;
        let mut compression = Some(HashMap::new());

        for question in &self.questions {
            msg = question.pack(msg, &mut compression, compression_off)?;
        }
        for answer in &self.answers {
            msg = answer.pack(msg, &mut compression, compression_off)?;
        }
        for authority in &self.authorities {
            msg = authority.pack(msg, &mut compression, compression_off)?;
        }
        for additional in &self.additionals {
            msg = additional.pack(msg, &mut compression, compression_off)?;
        }

        if msg.len() > MAX_PACKET_LEN {
            return Err(Error::ErrPacketTooBig);
        }
        Ok(msg)
    }

    /// All records of the message, in section order.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.answers
            .iter()
            .chain(self.authorities.iter())
            .chain(self.additionals.iter())
    }
}
