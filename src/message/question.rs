use std::collections::HashMap;
use std::fmt;

use super::name::Name;
use super::{RecordType, CLASS_IN};
use crate::error::Result;
use super::packer::*;

// A Question is a DNS query.
#[derive(Debug, PartialEq, Clone)]
pub struct Question {
    pub name: Name,
    pub rtype: RecordType,
    pub class: u16,
}

impl Default for Question {
    fn default() -> Self {
        Question {
            name: Name::default(),
            rtype: RecordType::Any,
            class: CLASS_IN,
        }
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Question{{name: {}, type: {}, class: {}}}",
            self.name, self.rtype, self.class
        )
    }
}

impl Question {
    pub fn new(name: Name, rtype: RecordType) -> Self {
        Question {
            name,
            rtype,
            class: CLASS_IN,
        }
    }

    // pack appends the wire format of the question to msg.
    pub(crate) fn pack(
        &self,
        mut msg: Vec<u8>,
        compression: &mut Option<HashMap<String, usize>>,
        compression_off: usize,
    ) -> Result<Vec<u8>> {
        msg = self.name.pack(msg, compression, compression_off)?;
        msg = pack_uint16(msg, self.rtype.value());
        Ok(pack_uint16(msg, self.class))
    }

    pub(crate) fn unpack(msg: &[u8], off: usize) -> Result<(Question, usize)> {
        let mut name = Name::default();
        let off = name.unpack(msg, off)?;
        let (typ, off) = unpack_uint16(msg, off)?;
        let (class, off) = unpack_uint16(msg, off)?;
        Ok((
            Question {
                name,
                rtype: RecordType::from(typ),
                class,
            },
            off,
        ))
    }
}
