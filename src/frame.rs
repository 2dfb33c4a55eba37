//! Message framing: IPFIX message and set headers, template records, and
//! splitting a capture payload into messages.
//!
//! When a message is truncated or its sets do not tile its body, it is
//! reported as removed; the scan continues only while message boundaries
//! can still be trusted.

use crate::codec::{read_u16, read_u32, remaining, take, CodecError};
use crate::model::InfoModel;
use crate::template::{Template, TemplateField};
use crate::transcode::ENTERPRISE_BIT;
use byteorder::{BigEndian, WriteBytesExt};
use std::io::Cursor;

pub const IPFIX_VERSION: u16 = 10;
pub const MESSAGE_HEADER_LEN: usize = 16;
pub const SET_HEADER_LEN: usize = 4;
pub const TEMPLATE_SET_ID: u16 = 2;
pub const OPTIONS_TEMPLATE_SET_ID: u16 = 3;
/// Smallest set id carrying data records.
pub const MIN_DATA_SET_ID: u16 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Total message length, header included.
    pub length: u16,
    /// Export time, seconds since the UNIX epoch.
    pub export_time: u32,
    pub sequence: u32,
    pub domain: u32,
}

impl MessageHeader {
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < MESSAGE_HEADER_LEN {
            return Err(CodecError::Malformed(format!(
                "message header needs {} bytes, have {}",
                MESSAGE_HEADER_LEN,
                bytes.len()
            )));
        }
        let mut r = Cursor::new(bytes);
        let version = read_u16(&mut r)?;
        if version != IPFIX_VERSION {
            return Err(CodecError::Malformed(format!(
                "unsupported message version {}",
                version
            )));
        }
        let length = read_u16(&mut r)?;
        if (length as usize) < MESSAGE_HEADER_LEN {
            return Err(CodecError::Malformed(format!("message length {}", length)));
        }
        Ok(MessageHeader {
            length,
            export_time: read_u32(&mut r)?,
            sequence: read_u32(&mut r)?,
            domain: read_u32(&mut r)?,
        })
    }

    pub fn encode(&self, w: &mut Vec<u8>) -> Result<(), CodecError> {
        w.write_u16::<BigEndian>(IPFIX_VERSION)?;
        w.write_u16::<BigEndian>(self.length)?;
        w.write_u32::<BigEndian>(self.export_time)?;
        w.write_u32::<BigEndian>(self.sequence)?;
        w.write_u32::<BigEndian>(self.domain)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetHeader {
    pub set_id: u16,
    /// Set length, header included.
    pub length: u16,
}

impl SetHeader {
    pub fn decode(r: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let set_id = read_u16(r)?;
        let length = read_u16(r)?;
        if (length as usize) < SET_HEADER_LEN {
            return Err(CodecError::Malformed(format!(
                "set {} has length {}",
                set_id, length
            )));
        }
        Ok(SetHeader { set_id, length })
    }

    pub fn encode(&self, w: &mut Vec<u8>) -> Result<(), CodecError> {
        w.write_u16::<BigEndian>(self.set_id)?;
        w.write_u16::<BigEndian>(self.length)?;
        Ok(())
    }

    pub fn is_template(&self) -> bool {
        self.set_id == TEMPLATE_SET_ID || self.set_id == OPTIONS_TEMPLATE_SET_ID
    }

    pub fn is_data(&self) -> bool {
        self.set_id >= MIN_DATA_SET_ID
    }
}

/// Append one template record (options form when the template has a scope).
pub fn encode_template_record(
    w: &mut Vec<u8>,
    template_id: u16,
    template: &Template,
) -> Result<(), CodecError> {
    let count = u16::try_from(template.len())
        .map_err(|_| CodecError::Malformed(format!("template {} has too many fields", template_id)))?;
    w.write_u16::<BigEndian>(template_id)?;
    w.write_u16::<BigEndian>(count)?;
    if template.is_options() {
        w.write_u16::<BigEndian>(template.scope())?;
    }
    for f in template.fields() {
        if f.ie.ent != 0 {
            w.write_u16::<BigEndian>(f.ie.id | ENTERPRISE_BIT)?;
            w.write_u16::<BigEndian>(f.length)?;
            w.write_u32::<BigEndian>(f.ie.ent)?;
        } else {
            w.write_u16::<BigEndian>(f.ie.id)?;
            w.write_u16::<BigEndian>(f.length)?;
        }
    }
    Ok(())
}

/// Decode the body of a template or options template set. Each entry is a
/// template id with its template, or `None` for a withdrawal.
pub fn decode_template_set(
    model: &InfoModel,
    set_id: u16,
    body: &[u8],
) -> Result<Vec<(u16, Option<Template>)>, CodecError> {
    let options = set_id == OPTIONS_TEMPLATE_SET_ID;
    let mut r = Cursor::new(body);
    let mut out = Vec::new();
    while remaining(&r) >= 4 {
        let template_id = read_u16(&mut r)?;
        let count = read_u16(&mut r)?;
        if template_id == 0 {
            // padding
            break;
        }
        if count == 0 {
            out.push((template_id, None));
            continue;
        }
        if template_id < MIN_DATA_SET_ID {
            return Err(CodecError::Malformed(format!(
                "template record with reserved id {}",
                template_id
            )));
        }
        let scope = if options { read_u16(&mut r)? } else { 0 };
        if options && (scope == 0 || scope > count) {
            return Err(CodecError::Malformed(format!(
                "options template {} has scope {} of {} fields",
                template_id, scope, count
            )));
        }
        let mut fields = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let raw_id = read_u16(&mut r)?;
            let length = read_u16(&mut r)?;
            let ent = if raw_id & ENTERPRISE_BIT != 0 {
                read_u32(&mut r)?
            } else {
                0
            };
            let ie = model.element_or_alien(raw_id & !ENTERPRISE_BIT, ent, length);
            fields.push(TemplateField { ie, length });
        }
        out.push((
            template_id,
            Some(Template::from_wire(model, template_id, fields, scope)),
        ));
    }
    Ok(out)
}

/// Result of scanning a byte run for IPFIX messages.
#[derive(Debug, Default)]
pub struct FrameScan {
    /// Byte ranges of well-framed messages.
    pub messages: Vec<(usize, usize)>,
    /// Byte ranges that could not be framed.
    pub removed: Vec<RemovedMessage>,
}

#[derive(Debug)]
pub struct RemovedMessage {
    pub byte_range: (usize, usize),
    pub reason: String,
}

/// Split `bytes` (e.g. one UDP payload or a whole file) into messages whose
/// sets tile the message body exactly.
pub fn split_messages(bytes: &[u8]) -> FrameScan {
    let mut scan = FrameScan::default();
    let mut offset = 0;
    while offset < bytes.len() {
        let header = match MessageHeader::decode(&bytes[offset..]) {
            Ok(h) => h,
            Err(e) => {
                scan.removed.push(RemovedMessage {
                    byte_range: (offset, bytes.len()),
                    reason: e.to_string(),
                });
                break;
            }
        };
        let end = offset + header.length as usize;
        if end > bytes.len() {
            scan.removed.push(RemovedMessage {
                byte_range: (offset, bytes.len()),
                reason: format!(
                    "message claims {} bytes, {} available",
                    header.length,
                    bytes.len() - offset
                ),
            });
            break;
        }
        match check_sets(&bytes[offset + MESSAGE_HEADER_LEN..end]) {
            Ok(()) => scan.messages.push((offset, end)),
            Err(e) => scan.removed.push(RemovedMessage {
                byte_range: (offset, end),
                reason: e.to_string(),
            }),
        }
        offset = end;
    }
    scan
}

fn check_sets(body: &[u8]) -> Result<(), CodecError> {
    let mut r = Cursor::new(body);
    while remaining(&r) > 0 {
        let header = SetHeader::decode(&mut r)?;
        take(&mut r, header.length as usize - SET_HEADER_LEN)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(body: &[u8]) -> Vec<u8> {
        let mut w = Vec::new();
        MessageHeader {
            length: (MESSAGE_HEADER_LEN + body.len()) as u16,
            export_time: 1,
            sequence: 7,
            domain: 3,
        }
        .encode(&mut w)
        .expect("header");
        w.extend_from_slice(body);
        w
    }

    #[test]
    fn header_round_trip() {
        let bytes = message(&[]);
        let h = MessageHeader::decode(&bytes).expect("decode");
        assert_eq!(h.length, 16);
        assert_eq!(h.sequence, 7);
        assert_eq!(h.domain, 3);
    }

    #[test]
    fn rejects_other_versions() {
        let mut bytes = message(&[]);
        bytes[1] = 9;
        assert!(matches!(
            MessageHeader::decode(&bytes),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn split_keeps_good_messages_and_reports_truncation() {
        let mut bytes = message(&[1, 0, 0, 4]);
        bytes.extend(message(&[1, 0, 0, 8, 0, 0, 0, 0]));
        let good = bytes.len();
        bytes.extend(&message(&[])[..10]);
        let scan = split_messages(&bytes);
        assert_eq!(scan.messages, vec![(0, 20), (20, good)]);
        assert_eq!(scan.removed.len(), 1);
        assert_eq!(scan.removed[0].byte_range, (good, bytes.len()));
    }

    #[test]
    fn split_removes_message_with_bad_set_length() {
        let bytes = message(&[1, 0, 0, 9, 0, 0]);
        let scan = split_messages(&bytes);
        assert!(scan.messages.is_empty());
        assert_eq!(scan.removed[0].byte_range, (0, bytes.len()));
    }

    #[test]
    fn template_set_round_trip() {
        let model = InfoModel::new();
        let mut t = Template::new(&model);
        t.add_element("sourceTransportPort").expect("add");
        t.add_element("interfaceName").expect("add");
        let mut body = Vec::new();
        encode_template_record(&mut body, 300, &t).expect("encode");
        body.extend([0, 0]);
        let decoded = decode_template_set(&model, TEMPLATE_SET_ID, &body).expect("decode");
        assert_eq!(decoded.len(), 1);
        let (tid, wire) = &decoded[0];
        assert_eq!(*tid, 300);
        let wire = wire.as_ref().expect("template");
        assert!(wire.same_layout(&t));
        assert!(!wire.is_options());
    }

    #[test]
    fn withdrawal_has_no_template() {
        let body = [0x01, 0x2c, 0, 0];
        let decoded =
            decode_template_set(&InfoModel::new(), TEMPLATE_SET_ID, &body).expect("decode");
        assert_eq!(decoded.len(), 1);
        assert!(decoded[0].1.is_none());
    }
}
