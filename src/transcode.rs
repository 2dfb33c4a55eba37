//! Transcoding between records and the IPFIX wire layout of a template.
//!
//! Record fields and template fields are matched by element identity and
//! occurrence, so a record may be read from (or written to) any template that
//! shares some of its elements: unmatched template fields are written as zeros,
//! unmatched record fields are left zeroed on read. Integers are sign-extended
//! or truncated between reduced and full lengths.

use crate::codec::{
    patch_u16, read_u16, read_u32, read_u8, read_varlen_prefix, remaining, take,
    write_varfield, CodecError, Endianness,
};
use crate::list::{BasicList, ListSemantic, StmlEntry, SubTemplateList, SubTemplateMultiList};
use crate::model::{DataType, InfoModel, VARLEN};
use crate::record::{Record, Slot};
use crate::session::{NestedAction, Session};
use crate::template::Template;
use crate::value::Value;
use byteorder::{BigEndian, WriteBytesExt};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

/// Enterprise bit of a field specifier's element id.
pub const ENTERPRISE_BIT: u16 = 0x8000;
/// Deepest list nesting accepted on decode.
pub const MAX_NESTING: usize = 16;

/// For each template field, the index of the record field carrying it.
fn field_map(rec: &Record, template: &Template) -> Vec<Option<usize>> {
    let mut seen: HashMap<(u32, u16), usize> = HashMap::new();
    let mut by_occurrence = HashMap::new();
    for (i, f) in rec.fields().iter().enumerate() {
        let n = seen.entry(f.ie.key()).or_insert(0);
        by_occurrence.insert((f.ie.key(), *n), i);
        *n += 1;
    }
    seen.clear();
    template
        .fields()
        .iter()
        .map(|tf| {
            let n = seen.entry(tf.ie.key()).or_insert(0);
            let hit = by_occurrence.get(&(tf.ie.key(), *n)).copied();
            *n += 1;
            hit
        })
        .collect()
}

// ==================== Encode ====================

pub(crate) struct Encoder<'s> {
    session: &'s Session,
    /// Template ids referenced by nested lists, in first-use order.
    pub nested: Vec<u16>,
}

impl<'s> Encoder<'s> {
    pub(crate) fn new(session: &'s Session) -> Self {
        Encoder {
            session,
            nested: Vec::new(),
        }
    }

    pub(crate) fn record(
        &mut self,
        w: &mut Vec<u8>,
        rec: &Record,
        template: &Template,
    ) -> Result<(), CodecError> {
        let map = field_map(rec, template);
        for (tf, hit) in template.fields().iter().zip(map) {
            let dt = tf.ie.data_type;
            let i = match hit {
                Some(i) => i,
                None if dt.is_list() || tf.is_varlen() => {
                    w.write_u8(0)?;
                    continue;
                }
                None => {
                    w.resize(w.len() + tf.length as usize, 0);
                    continue;
                }
            };
            match rec.slot(i) {
                Slot::Basic(bl) => {
                    let payload = self.basic_list(bl, &rec.fields()[i].key.to_string())?;
                    write_varfield(w, &payload)?;
                }
                Slot::Stl(stl) => {
                    let payload = self.sub_template_list(stl, &rec.fields()[i].key.to_string())?;
                    write_varfield(w, &payload)?;
                }
                Slot::Stml(stml) => {
                    let payload =
                        self.sub_template_multi_list(stml, &rec.fields()[i].key.to_string())?;
                    write_varfield(w, &payload)?;
                }
                Slot::Var(bytes) if tf.is_varlen() => write_varfield(w, bytes)?,
                Slot::Var(bytes) => {
                    let start = w.len();
                    w.resize(start + tf.length as usize, 0);
                    let n = bytes.len().min(tf.length as usize);
                    w[start..start + n].copy_from_slice(&bytes[..n]);
                }
                Slot::Inline => {
                    let f = &rec.fields()[i];
                    let src = rec.fixed(i);
                    let mut out = vec![0u8; if tf.is_varlen() { src.len() } else { tf.length as usize }];
                    convert_fixed(f.data_type(), src, f.order(), &mut out, Endianness::Big)?;
                    if tf.is_varlen() {
                        write_varfield(w, &out)?;
                    } else {
                        w.extend_from_slice(&out);
                    }
                }
            }
        }
        Ok(())
    }

    fn basic_list(&mut self, bl: &BasicList, key: &str) -> Result<Vec<u8>, CodecError> {
        let ie = match (bl.is_initialized(), bl.element()) {
            (true, Some(ie)) => ie.clone(),
            (true, None) => return Ok(Vec::new()),
            _ => {
                return Err(CodecError::NotInitialized(format!(
                    "basicList {} must be initialized before export",
                    key
                )))
            }
        };
        let mut w = Vec::new();
        w.write_u8(bl.semantic().code())?;
        if ie.ent != 0 {
            w.write_u16::<BigEndian>(ie.id | ENTERPRISE_BIT)?;
            w.write_u16::<BigEndian>(ie.length)?;
            w.write_u32::<BigEndian>(ie.ent)?;
        } else {
            w.write_u16::<BigEndian>(ie.id)?;
            w.write_u16::<BigEndian>(ie.length)?;
        }
        for item in bl.iter() {
            if ie.is_varlen() {
                let bytes = item.as_bytes().ok_or_else(|| {
                    CodecError::TypeMismatch(format!("{} item in basicList {}", item.kind(), key))
                })?;
                write_varfield(&mut w, bytes)?;
            } else {
                let mut buf = vec![0u8; ie.length as usize];
                item.write_fixed(ie.data_type, &mut buf, Endianness::Big)?;
                w.extend_from_slice(&buf);
            }
        }
        Ok(w)
    }

    /// Wire template for nested entries; it must be known to the peer.
    fn entry_template(&mut self, template_id: u16) -> Result<Arc<Template>, CodecError> {
        let template = self
            .session
            .get_template(template_id, false)
            .map_err(|_| CodecError::NotRegistered(template_id))?;
        if !self.nested.contains(&template_id) {
            self.nested.push(template_id);
        }
        Ok(template)
    }

    fn sub_template_list(&mut self, stl: &SubTemplateList, key: &str) -> Result<Vec<u8>, CodecError> {
        if !stl.is_initialized() {
            return Err(CodecError::NotInitialized(format!(
                "subTemplateList {} must be initialized before export",
                key
            )));
        }
        let mut w = Vec::new();
        w.write_u8(stl.semantic().code())?;
        w.write_u16::<BigEndian>(stl.template_id())?;
        // an empty list still names its template
        let template = self.entry_template(stl.template_id())?;
        for entry in stl.iter() {
            self.record(&mut w, entry, &template)?;
        }
        Ok(w)
    }

    fn sub_template_multi_list(
        &mut self,
        stml: &SubTemplateMultiList,
        key: &str,
    ) -> Result<Vec<u8>, CodecError> {
        if !stml.is_initialized() {
            return Err(CodecError::NotInitialized(format!(
                "subTemplateMultiList {} must be initialized before export",
                key
            )));
        }
        let mut w = Vec::new();
        w.write_u8(stml.semantic().code())?;
        for (n, entry) in stml.iter().enumerate() {
            if !entry.is_initialized() {
                return Err(CodecError::NotInitialized(format!(
                    "entry {} of subTemplateMultiList {} must be initialized before export",
                    n, key
                )));
            }
            let template = self.entry_template(entry.template_id())?;
            let start = w.len();
            w.write_u16::<BigEndian>(entry.template_id())?;
            w.write_u16::<BigEndian>(0)?;
            for rec in entry.iter() {
                self.record(&mut w, rec, &template)?;
            }
            let len = u16::try_from(w.len() - start).map_err(|_| {
                CodecError::Malformed(format!("subTemplateMultiList {} entry exceeds 65535 bytes", key))
            })?;
            patch_u16(&mut w, start + 2, len);
        }
        Ok(w)
    }
}

/// Convert a fixed-width value between two slots of possibly different width
/// and byte order.
fn convert_fixed(
    dt: DataType,
    src: &[u8],
    src_order: Endianness,
    dst: &mut [u8],
    dst_order: Endianness,
) -> Result<(), CodecError> {
    if dt.is_integral() || dt.is_float() || src_order != dst_order {
        let v = Value::read_fixed(dt, src, src_order);
        if let Value::Bytes(_) = v {
            copy_padded(dst, src);
            return Ok(());
        }
        v.write_fixed(dt, dst, dst_order)
    } else {
        copy_padded(dst, src);
        Ok(())
    }
}

fn copy_padded(dst: &mut [u8], src: &[u8]) {
    let n = dst.len().min(src.len());
    dst[..n].copy_from_slice(&src[..n]);
    dst[n..].fill(0);
}

/// Encode `record` in the wire layout of `template`.
pub fn encode(record: &Record, template: &Template, session: &Session) -> Result<Vec<u8>, CodecError> {
    let mut w = Vec::with_capacity(record.length());
    Encoder::new(session).record(&mut w, record, template)?;
    Ok(w)
}

// ==================== Decode ====================

pub(crate) struct Decoder<'s> {
    session: &'s mut Session,
    model: InfoModel,
    depth: usize,
}

impl<'s> Decoder<'s> {
    pub(crate) fn new(session: &'s mut Session) -> Self {
        let model = session.model().clone();
        Decoder {
            session,
            model,
            depth: 0,
        }
    }

    pub(crate) fn record(
        &mut self,
        r: &mut Cursor<&[u8]>,
        template: &Template,
        rec: &mut Record,
    ) -> Result<(), CodecError> {
        if self.depth > MAX_NESTING {
            return Err(CodecError::Malformed(format!(
                "lists nested deeper than {}",
                MAX_NESTING
            )));
        }
        rec.clear();
        let map = field_map(rec, template);
        for (tf, hit) in template.fields().iter().zip(map) {
            let dt = tf.ie.data_type;
            if dt.is_list() {
                let len = read_varlen_prefix(r)?;
                let payload = take(r, len)?;
                self.depth += 1;
                let slot = match dt {
                    DataType::BasicList => self.basic_list(payload).map(Slot::Basic),
                    DataType::SubTemplateList => self.sub_template_list(payload).map(Slot::Stl),
                    _ => self.sub_template_multi_list(payload).map(Slot::Stml),
                };
                self.depth -= 1;
                let slot = slot?;
                if let Some(i) = hit {
                    if rec.fields()[i].is_list() {
                        rec.put_slot(i, slot);
                    }
                }
                continue;
            }
            let bytes = if tf.is_varlen() {
                let len = read_varlen_prefix(r)?;
                take(r, len)?
            } else {
                take(r, tf.length as usize)?
            };
            let Some(i) = hit else { continue };
            let f = &rec.fields()[i];
            if f.is_list() {
                continue;
            }
            if f.is_varfield() {
                rec.put_slot(i, Slot::Var(bytes.to_vec()));
            } else {
                let (dt, order) = (f.data_type(), f.order());
                convert_fixed(dt, bytes, Endianness::Big, rec.fixed_mut(i), order)?;
            }
        }
        Ok(())
    }

    fn basic_list(&mut self, payload: &[u8]) -> Result<BasicList, CodecError> {
        if payload.is_empty() {
            return Ok(BasicList::decoded_empty());
        }
        let mut r = Cursor::new(payload);
        let semantic = ListSemantic::from_wire(read_u8(&mut r)?);
        let raw_id = read_u16(&mut r)?;
        let len = read_u16(&mut r)?;
        let ent = if raw_id & ENTERPRISE_BIT != 0 {
            read_u32(&mut r)?
        } else {
            0
        };
        let ie = self.model.element_or_alien(raw_id & !ENTERPRISE_BIT, ent, len);
        let mut items = Vec::new();
        while remaining(&r) > 0 {
            let value = if len == VARLEN {
                let n = read_varlen_prefix(&mut r)?;
                let bytes = take(&mut r, n)?;
                match ie.data_type {
                    DataType::String => Value::String(String::from_utf8_lossy(bytes).into_owned()),
                    _ => Value::Bytes(bytes.to_vec()),
                }
            } else if len == 0 {
                return Err(CodecError::Malformed("basicList of zero-length items".into()));
            } else {
                let bytes = take(&mut r, len as usize)?;
                if ie.data_type.is_list() {
                    Value::Bytes(bytes.to_vec())
                } else {
                    Value::read_fixed(ie.data_type, bytes, Endianness::Big)
                }
            };
            items.push(value);
        }
        Ok(BasicList::decoded(ie, semantic, items))
    }

    /// Decode the records of one nested group; `None` when the group is dropped.
    fn entries(
        &mut self,
        external_id: u16,
        body: &[u8],
    ) -> Result<Option<(u16, Arc<Template>, Vec<Record>)>, CodecError> {
        let internal_id = match self.session.nested_action(external_id) {
            NestedAction::Drop => {
                log::debug!("dropping nested entries of template {}", external_id);
                return Ok(None);
            }
            NestedAction::Decode(id) => id,
        };
        let external = match self.session.get_template(external_id, false) {
            Ok(t) => t,
            Err(_) => {
                if !body.is_empty() {
                    log::warn!("nested template {} is unknown; entries skipped", external_id);
                }
                return Ok(None);
            }
        };
        let internal = self.session.internal_for(internal_id)?;
        let min = external.min_record_length();
        if min == 0 {
            return Ok(Some((internal_id, internal, Vec::new())));
        }
        let mut r = Cursor::new(body);
        let mut records = Vec::new();
        while remaining(&r) >= min {
            let mut rec = Record::from_shared(&self.model, internal.clone());
            self.record(&mut r, &external, &mut rec)?;
            records.push(rec);
        }
        Ok(Some((internal_id, internal, records)))
    }

    fn sub_template_list(&mut self, payload: &[u8]) -> Result<SubTemplateList, CodecError> {
        if payload.is_empty() {
            return Ok(SubTemplateList::decoded(ListSemantic::Undefined, 0, None, Vec::new()));
        }
        let mut r = Cursor::new(payload);
        let semantic = ListSemantic::from_wire(read_u8(&mut r)?);
        let external_id = read_u16(&mut r)?;
        let body = &payload[3..];
        Ok(match self.entries(external_id, body)? {
            Some((id, template, records)) => {
                SubTemplateList::decoded(semantic, id, Some(template), records)
            }
            None => SubTemplateList::decoded(semantic, external_id, None, Vec::new()),
        })
    }

    fn sub_template_multi_list(&mut self, payload: &[u8]) -> Result<SubTemplateMultiList, CodecError> {
        if payload.is_empty() {
            return Ok(SubTemplateMultiList::decoded(ListSemantic::Undefined, Vec::new()));
        }
        let mut r = Cursor::new(payload);
        let semantic = ListSemantic::from_wire(read_u8(&mut r)?);
        let mut groups = Vec::new();
        while remaining(&r) >= 4 {
            let external_id = read_u16(&mut r)?;
            let len = read_u16(&mut r)? as usize;
            if len < 4 {
                return Err(CodecError::Malformed(format!(
                    "subTemplateMultiList entry length {}",
                    len
                )));
            }
            let body = take(&mut r, len - 4)?;
            if let Some((id, template, records)) = self.entries(external_id, body)? {
                groups.push(StmlEntry::decoded(id, Some(template), records));
            }
        }
        Ok(SubTemplateMultiList::decoded(semantic, groups))
    }
}

/// Decode one record laid out by `external` from the start of `bytes` into
/// `record`; returns the number of bytes consumed.
pub fn decode(
    bytes: &[u8],
    external: &Template,
    record: &mut Record,
    session: &mut Session,
) -> Result<usize, CodecError> {
    let mut r = Cursor::new(bytes);
    Decoder::new(session).record(&mut r, external, record)?;
    Ok(r.position() as usize)
}
