//! Buffer: the record-at-a-time collecting and exporting engine.
//!
//! A [`Buffer`] is bound once to either a [`Collector`] (any `Read`) or an
//! [`Exporter`] (any `Write`) together with the [`Session`] holding its
//! templates. Collection reads whole IPFIX messages, feeds template sets into
//! the session's external namespace and yields data records one at a time.
//! Export packs records into data sets, sends each template before its first
//! use, and writes a message whenever the next record would not fit.

use crate::codec::{patch_u16, CodecError};
use crate::frame::{
    decode_template_set, encode_template_record, MessageHeader, SetHeader, MESSAGE_HEADER_LEN,
    OPTIONS_TEMPLATE_SET_ID, SET_HEADER_LEN, TEMPLATE_SET_ID,
};
use crate::record::Record;
use crate::session::Session;
use crate::template::Template;
use crate::transcode::{Decoder, Encoder};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, ErrorKind, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Largest message the 16-bit length field can describe.
pub const MAX_MESSAGE_LEN: usize = u16::MAX as usize;

// ==================== Transport shims ====================

/// Byte source for a collecting buffer.
pub struct Collector {
    source: Box<dyn Read>,
    /// Bytes of a message not yet read completely.
    pending: Vec<u8>,
}

impl Collector {
    pub fn from_reader<R: Read + 'static>(reader: R) -> Self {
        Collector {
            source: Box::new(reader),
            pending: Vec::new(),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, CodecError> {
        let file = File::open(path)?;
        Ok(Collector::from_reader(BufReader::new(file)))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Collector::from_reader(Cursor::new(bytes))
    }

    /// Next whole message. A source reporting `WouldBlock` keeps the partial
    /// message for the next call.
    fn read_message(&mut self) -> Result<Vec<u8>, CodecError> {
        loop {
            let want = if self.pending.len() < MESSAGE_HEADER_LEN {
                MESSAGE_HEADER_LEN
            } else {
                match MessageHeader::decode(&self.pending) {
                    Ok(h) => h.length as usize,
                    Err(e) => {
                        self.pending.clear();
                        return Err(e);
                    }
                }
            };
            if self.pending.len() >= want {
                return Ok(std::mem::take(&mut self.pending));
            }
            let start = self.pending.len();
            self.pending.resize(want, 0);
            let read = self.source.read(&mut self.pending[start..]);
            match read {
                Ok(0) => {
                    self.pending.clear();
                    if start == 0 {
                        return Err(CodecError::EndOfStream);
                    }
                    return Err(CodecError::Malformed(format!(
                        "input ends {} bytes into a message",
                        start
                    )));
                }
                Ok(n) => self.pending.truncate(start + n),
                Err(e) => {
                    self.pending.truncate(start);
                    match e.kind() {
                        ErrorKind::Interrupted => {}
                        ErrorKind::WouldBlock => return Err(CodecError::WouldBlock),
                        _ => return Err(e.into()),
                    }
                }
            }
        }
    }
}

enum Sink {
    Writer(Box<dyn Write>),
    Memory(Vec<u8>),
}

/// Byte sink for an exporting buffer.
pub struct Exporter {
    sink: Sink,
    max_message: usize,
}

impl Exporter {
    pub fn from_writer<W: Write + 'static>(writer: W) -> Self {
        Exporter {
            sink: Sink::Writer(Box::new(writer)),
            max_message: MAX_MESSAGE_LEN,
        }
    }

    pub fn create(path: impl AsRef<Path>) -> Result<Self, CodecError> {
        let file = File::create(path)?;
        Ok(Exporter::from_writer(BufWriter::new(file)))
    }

    /// Collect messages in memory; see [`Buffer::take_output`].
    pub fn in_memory() -> Self {
        Exporter {
            sink: Sink::Memory(Vec::new()),
            max_message: MAX_MESSAGE_LEN,
        }
    }

    /// Cap the size of emitted messages (e.g. to fit a path MTU).
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message = size.clamp(MESSAGE_HEADER_LEN + SET_HEADER_LEN + 1, MAX_MESSAGE_LEN);
        self
    }

    fn write_message(&mut self, message: &[u8]) -> Result<(), CodecError> {
        match &mut self.sink {
            Sink::Writer(w) => {
                w.write_all(message)?;
                w.flush()?;
            }
            Sink::Memory(buf) => buf.extend_from_slice(message),
        }
        Ok(())
    }

    fn take(&mut self) -> Vec<u8> {
        match &mut self.sink {
            Sink::Memory(buf) => std::mem::take(buf),
            Sink::Writer(_) => Vec::new(),
        }
    }
}

// ==================== Buffer ====================

enum Mode {
    Uninitialized,
    Collection(Collector),
    Export(Exporter),
}

impl Mode {
    fn name(&self) -> &'static str {
        match self {
            Mode::Uninitialized => "uninitialized",
            Mode::Collection(_) => "collection",
            Mode::Export(_) => "export",
        }
    }
}

pub struct Buffer {
    session: Option<Session>,
    mode: Mode,
    record: Option<Record>,
    int_tid: Option<u16>,
    ext_tid: Option<u16>,
    auto: bool,
    auto_insert: bool,
    ignore_options: bool,
    last_template: Option<Arc<Template>>,
    // collection cursor: inside a data set while `pos < set_end`
    msg: Vec<u8>,
    pos: usize,
    set_end: usize,
    set_id: u16,
    messages_read: u64,
    // records of the current message were skipped without being counted
    uncounted: bool,
    sequence_gaps: u64,
    // export state
    out: Vec<u8>,
    out_records: u32,
    data_set: Option<(usize, u16)>,
    sent: HashSet<u16>,
}

impl Default for Buffer {
    fn default() -> Self {
        Buffer::new()
    }
}

impl Buffer {
    pub fn new() -> Self {
        Buffer {
            session: None,
            mode: Mode::Uninitialized,
            record: None,
            int_tid: None,
            ext_tid: None,
            auto: false,
            auto_insert: false,
            ignore_options: false,
            last_template: None,
            msg: Vec::new(),
            pos: 0,
            set_end: 0,
            set_id: 0,
            messages_read: 0,
            uncounted: false,
            sequence_gaps: 0,
            out: Vec::new(),
            out_records: 0,
            data_set: None,
            sent: HashSet::new(),
        }
    }

    /// Bind to a source for reading; the mode cannot change afterwards.
    pub fn init_collection(&mut self, session: Session, collector: Collector) -> Result<(), CodecError> {
        self.bind(session, Mode::Collection(collector))
    }

    /// Bind to a sink for writing; the mode cannot change afterwards.
    pub fn init_export(&mut self, session: Session, exporter: Exporter) -> Result<(), CodecError> {
        self.bind(session, Mode::Export(exporter))
    }

    fn bind(&mut self, session: Session, mode: Mode) -> Result<(), CodecError> {
        if !matches!(self.mode, Mode::Uninitialized) {
            return Err(CodecError::InvalidMode(format!(
                "buffer is already in {} mode",
                self.mode.name()
            )));
        }
        log::debug!("buffer bound for {}", mode.name());
        self.session = Some(session);
        self.mode = mode;
        Ok(())
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    fn bound_session(&self) -> Result<&Session, CodecError> {
        self.session
            .as_ref()
            .ok_or_else(|| CodecError::InvalidMode("buffer is not initialized".into()))
    }

    fn require_collection(&self) -> Result<(), CodecError> {
        match self.mode {
            Mode::Collection(_) => Ok(()),
            ref other => Err(CodecError::InvalidMode(format!(
                "collection required, buffer is {}",
                other.name()
            ))),
        }
    }

    fn require_export(&self) -> Result<(), CodecError> {
        match self.mode {
            Mode::Export(_) => Ok(()),
            ref other => Err(CodecError::InvalidMode(format!(
                "export required, buffer is {}",
                other.name()
            ))),
        }
    }

    /// Internal template describing records handed to or returned by the buffer.
    pub fn set_internal_template(&mut self, id: u16) -> Result<(), CodecError> {
        if id == 0 {
            return Err(CodecError::InvalidTemplateId(0));
        }
        if !self.bound_session()?.has_internal(id) {
            return Err(CodecError::NotRegistered(id));
        }
        self.int_tid = Some(id);
        Ok(())
    }

    /// External template that appended records are written with.
    pub fn set_export_template(&mut self, id: u16) -> Result<(), CodecError> {
        if id == 0 {
            return Err(CodecError::InvalidTemplateId(0));
        }
        if !self.bound_session()?.has_external(id) {
            return Err(CodecError::NotRegistered(id));
        }
        self.ext_tid = Some(id);
        Ok(())
    }

    pub fn internal_template_id(&self) -> Option<u16> {
        self.int_tid
    }

    pub fn export_template_id(&self) -> Option<u16> {
        self.ext_tid
    }

    /// Bind the record that [`Buffer::next_record`] decodes into; its template,
    /// when registered internally, becomes the internal template.
    pub fn set_record(&mut self, record: Record) {
        if let (Some(t), Some(session)) = (record.template(), self.session.as_ref()) {
            if t.template_id() != 0 && session.has_internal(t.template_id()) {
                self.int_tid = Some(t.template_id());
            }
        }
        self.record = Some(record);
    }

    pub fn record(&self) -> Option<&Record> {
        self.record.as_ref()
    }

    /// Register an internal template for every new external template seen.
    pub fn set_auto(&mut self, auto: bool) {
        self.auto = auto;
    }

    /// Register elements described by type-information options records
    /// carrying a private enterprise number.
    pub fn auto_insert(&mut self) {
        self.auto_insert = true;
    }

    /// Skip data sets described by options templates.
    pub fn ignore_options(&mut self, ignore: bool) {
        self.ignore_options = ignore;
    }

    /// Messages whose sequence number did not follow from the records
    /// before them. Messages after skipped records are not checked.
    pub fn sequence_gaps(&self) -> u64 {
        self.sequence_gaps
    }

    /// External template of the last record read.
    pub fn get_template(&self) -> Option<Arc<Template>> {
        self.last_template.clone()
    }

    // ==================== Collection ====================

    /// Advance to the next data record and return its external template.
    pub fn next_template(&mut self) -> Result<Arc<Template>, CodecError> {
        self.require_collection()?;
        let id = self.advance_to_record()?;
        self.bound_session()?.get_template(id, false)
    }

    /// Decode the next data record. Into the bound record when one is set
    /// (a copy is returned), otherwise into a fresh record of the internal
    /// template.
    pub fn next_record(&mut self) -> Result<Record, CodecError> {
        self.require_collection()?;
        if self.auto {
            self.auto_step()?;
        }
        let bound = self.record.is_some();
        let mut rec = match self.record.take() {
            Some(rec) => rec,
            None => {
                let id = self.int_tid.ok_or_else(|| {
                    CodecError::NotConfigured("no internal template set".into())
                })?;
                let template = self.bound_session()?.get_template(id, true)?;
                Record::from_shared(self.bound_session()?.model(), template)
            }
        };
        let result = self.decode_into(&mut rec);
        if bound {
            let copy = rec.clone();
            self.record = Some(rec);
            result.map(|_| copy)
        } else {
            result.map(|_| rec)
        }
    }

    /// Decode the next data record into `rec`.
    pub fn next_record_into(&mut self, rec: &mut Record) -> Result<(), CodecError> {
        self.require_collection()?;
        if self.auto {
            self.auto_step()?;
        }
        self.decode_into(rec)
    }

    fn auto_step(&mut self) -> Result<(), CodecError> {
        let id = self.advance_to_record()?;
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| CodecError::InvalidMode("buffer is not initialized".into()))?;
        let internal = session.internal_for(id)?;
        if self.int_tid != Some(id) {
            self.int_tid = Some(id);
            if self.record.is_some() {
                self.record = Some(Record::from_shared(session.model(), internal));
            }
        }
        Ok(())
    }

    fn decode_into(&mut self, rec: &mut Record) -> Result<(), CodecError> {
        if self.int_tid.is_none() {
            return Err(CodecError::NotConfigured("no internal template set".into()));
        }
        if rec.is_empty() {
            return Err(CodecError::NotConfigured("record has no fields".into()));
        }
        let ext_id = self.advance_to_record()?;
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| CodecError::InvalidMode("buffer is not initialized".into()))?;
        let external = session.get_template(ext_id, false)?;
        let mut r = Cursor::new(&self.msg[self.pos..self.set_end]);
        if let Err(e) = Decoder::new(session).record(&mut r, &external, rec) {
            // the rest of the set can no longer be framed
            self.pos = self.set_end;
            self.uncounted = true;
            return Err(e);
        }
        self.pos += r.position() as usize;
        session.set_sequence(session.sequence().wrapping_add(1));
        self.last_template = Some(external);
        Ok(())
    }

    /// Position the cursor at a data record whose template is known and
    /// wanted; returns that template's id.
    fn advance_to_record(&mut self) -> Result<u16, CodecError> {
        loop {
            if self.pos < self.set_end {
                let session = self
                    .session
                    .as_mut()
                    .ok_or_else(|| CodecError::InvalidMode("buffer is not initialized".into()))?;
                let template = session.get_template(self.set_id, false)?;
                let min = template.min_record_length();
                if min == 0 || self.set_end - self.pos < min {
                    // padding
                    self.pos = self.set_end;
                    continue;
                }
                if self.auto_insert && is_type_information(&template) {
                    self.insert_options_element(template)?;
                    continue;
                }
                return Ok(self.set_id);
            }
            if self.pos + SET_HEADER_LEN <= self.msg.len() {
                self.next_set()?;
                continue;
            }
            self.load_message()?;
        }
    }

    fn next_set(&mut self) -> Result<(), CodecError> {
        let mut r = Cursor::new(&self.msg[self.pos..]);
        let header = match SetHeader::decode(&mut r) {
            Ok(h) => h,
            Err(e) => {
                self.pos = self.msg.len();
                self.set_end = self.pos;
                return Err(e);
            }
        };
        let start = self.pos + SET_HEADER_LEN;
        let end = self.pos + header.length as usize;
        if end > self.msg.len() {
            self.pos = self.msg.len();
            self.set_end = self.pos;
            return Err(CodecError::Malformed(format!(
                "set {} overruns its message",
                header.set_id
            )));
        }
        self.pos = end;
        self.set_end = end;
        log::trace!("set {} ({} bytes)", header.set_id, header.length);
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| CodecError::InvalidMode("buffer is not initialized".into()))?;
        if header.is_template() {
            let model = session.model().clone();
            let templates = match decode_template_set(&model, header.set_id, &self.msg[start..end]) {
                Ok(t) => t,
                Err(e) => {
                    log::warn!("skipping malformed template set: {}", e);
                    return Ok(());
                }
            };
            for (id, template) in templates {
                match template {
                    Some(t) => {
                        log::debug!("received template {} ({} fields)", id, t.len());
                        session.insert_external(t);
                    }
                    None => log::debug!("ignoring withdrawal of template {}", id),
                }
            }
        } else if header.is_data() {
            match session.get_template(header.set_id, false) {
                Err(_) => {
                    log::warn!("no template for data set {}; skipped", header.set_id);
                    self.uncounted = true;
                }
                Ok(t) if t.is_options()
                    && self.ignore_options
                    && !(self.auto_insert && is_type_information(&t)) =>
                {
                    self.uncounted = true;
                }
                Ok(_) => {
                    self.set_id = header.set_id;
                    self.pos = start;
                }
            }
        } else {
            log::trace!("skipping set {}", header.set_id);
        }
        Ok(())
    }

    fn load_message(&mut self) -> Result<(), CodecError> {
        let Mode::Collection(collector) = &mut self.mode else {
            return Err(CodecError::InvalidMode("collection required".into()));
        };
        let msg = collector.read_message()?;
        let header = MessageHeader::decode(&msg)?;
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| CodecError::InvalidMode("buffer is not initialized".into()))?;
        if self.messages_read > 0 && !self.uncounted && header.sequence != session.sequence() {
            self.sequence_gaps += 1;
            log::warn!(
                "sequence gap in domain {}: expected {}, got {}",
                header.domain,
                session.sequence(),
                header.sequence
            );
        }
        session.set_domain(header.domain);
        session.set_sequence(header.sequence);
        self.messages_read += 1;
        self.uncounted = false;
        self.msg = msg;
        self.pos = MESSAGE_HEADER_LEN;
        self.set_end = MESSAGE_HEADER_LEN;
        Ok(())
    }

    fn insert_options_element(&mut self, external: Arc<Template>) -> Result<(), CodecError> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| CodecError::InvalidMode("buffer is not initialized".into()))?;
        let internal = session.internal_for(external.template_id())?;
        let mut rec = Record::from_shared(session.model(), internal);
        let mut r = Cursor::new(&self.msg[self.pos..self.set_end]);
        if let Err(e) = Decoder::new(session).record(&mut r, &external, &mut rec) {
            self.pos = self.set_end;
            self.uncounted = true;
            return Err(e);
        }
        self.pos += r.position() as usize;
        session.set_sequence(session.sequence().wrapping_add(1));
        let pen = rec
            .get("privateEnterpriseNumber")
            .ok()
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        if pen != 0 {
            session.model().add_options_element(&rec)?;
        }
        Ok(())
    }

    // ==================== Export ====================

    /// Encode `rec` with the export template and queue it.
    pub fn append(&mut self, rec: &Record) -> Result<(), CodecError> {
        self.require_export()?;
        let (Some(_), Some(ext_id)) = (self.int_tid, self.ext_tid) else {
            return Err(CodecError::NotConfigured(
                "internal and export templates must both be set".into(),
            ));
        };
        if rec.is_empty() {
            return Err(CodecError::NotConfigured("record has no fields".into()));
        }
        let session = self.bound_session()?;
        let template = session.get_template(ext_id, false)?;
        let mut encoder = Encoder::new(session);
        let mut body = Vec::with_capacity(rec.length());
        encoder.record(&mut body, rec, &template)?;

        let mut unsent: Vec<u16> = Vec::new();
        for id in encoder.nested.iter().copied().chain(std::iter::once(ext_id)) {
            if !self.sent.contains(&id) && !unsent.contains(&id) {
                unsent.push(id);
            }
        }
        let mut template_sets = Vec::new();
        for &id in &unsent {
            let t = session.get_template(id, false)?;
            let start = template_sets.len();
            SetHeader {
                set_id: if t.is_options() {
                    OPTIONS_TEMPLATE_SET_ID
                } else {
                    TEMPLATE_SET_ID
                },
                length: 0,
            }
            .encode(&mut template_sets)?;
            encode_template_record(&mut template_sets, id, &t)?;
            let len = template_sets.len() - start;
            patch_u16(&mut template_sets, start + 2, len as u16);
        }

        let Mode::Export(exporter) = &self.mode else {
            return Err(CodecError::InvalidMode("export required".into()));
        };
        let max = exporter.max_message;
        // a fresh message always opens a data set
        let alone = MESSAGE_HEADER_LEN + template_sets.len() + SET_HEADER_LEN + body.len();
        if alone > max {
            return Err(CodecError::Malformed(format!(
                "record of {} bytes does not fit a {} byte message",
                body.len(),
                max
            )));
        }
        let opens_set = !template_sets.is_empty() || self.data_set.map(|(_, id)| id) != Some(ext_id);
        let needed = template_sets.len() + body.len() + if opens_set { SET_HEADER_LEN } else { 0 };
        if !self.out.is_empty() && self.out.len() + needed > max {
            self.emit()?;
        }
        if self.out.is_empty() {
            self.out.resize(MESSAGE_HEADER_LEN, 0);
        }
        if !template_sets.is_empty() {
            self.close_data_set();
            self.out.extend_from_slice(&template_sets);
            self.sent.extend(unsent);
        }
        if self.data_set.map(|(_, id)| id) != Some(ext_id) {
            self.close_data_set();
            self.data_set = Some((self.out.len(), ext_id));
            SetHeader {
                set_id: ext_id,
                length: 0,
            }
            .encode(&mut self.out)?;
        }
        self.out.extend_from_slice(&body);
        self.out_records += 1;
        Ok(())
    }

    fn close_data_set(&mut self) {
        if let Some((start, _)) = self.data_set.take() {
            let len = self.out.len() - start;
            patch_u16(&mut self.out, start + 2, len as u16);
        }
    }

    /// Write the pending message, if any, to the sink.
    pub fn emit(&mut self) -> Result<(), CodecError> {
        self.require_export()?;
        if self.out.len() <= MESSAGE_HEADER_LEN {
            self.out.clear();
            return Ok(());
        }
        self.close_data_set();
        let length = u16::try_from(self.out.len())
            .map_err(|_| CodecError::Malformed(format!("message of {} bytes", self.out.len())))?;
        let export_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| CodecError::InvalidMode("buffer is not initialized".into()))?;
        let mut header = Vec::with_capacity(MESSAGE_HEADER_LEN);
        MessageHeader {
            length,
            export_time,
            sequence: session.sequence(),
            domain: session.domain(),
        }
        .encode(&mut header)?;
        self.out[..MESSAGE_HEADER_LEN].copy_from_slice(&header);
        let Mode::Export(exporter) = &mut self.mode else {
            return Err(CodecError::InvalidMode("export required".into()));
        };
        exporter.write_message(&self.out)?;
        log::debug!(
            "emitted message of {} bytes with {} records",
            self.out.len(),
            self.out_records
        );
        session.set_sequence(session.sequence().wrapping_add(self.out_records));
        self.out.clear();
        self.out_records = 0;
        Ok(())
    }

    /// Emit, then hand over everything an in-memory exporter has collected.
    pub fn take_output(&mut self) -> Result<Vec<u8>, CodecError> {
        self.emit()?;
        match &mut self.mode {
            Mode::Export(exporter) => Ok(exporter.take()),
            other => Err(CodecError::InvalidMode(format!(
                "export required, buffer is {}",
                other.name()
            ))),
        }
    }

    /// Describe the element `name` with an RFC 5610 type-information record
    /// written through `template`; the current templates are restored after.
    pub fn write_ie_options_record(
        &mut self,
        name: &str,
        template: &mut Template,
    ) -> Result<(), CodecError> {
        self.require_export()?;
        if !template.is_options() {
            return Err(CodecError::InvalidSpec(
                "type information needs an options template".into(),
            ));
        }
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| CodecError::InvalidMode("buffer is not initialized".into()))?;
        let registered = template.is_finalized()
            && session.has_internal(template.template_id())
            && session.has_external(template.template_id());
        let tid = if registered {
            template.template_id()
        } else {
            session.add_template(template, 0)?
        };
        let ie = session.model().element(name)?;
        let mut rec = Record::from_template(session.model(), template);
        rec.set("privateEnterpriseNumber", ie.ent)?;
        rec.set("informationElementId", ie.id)?;
        rec.set("informationElementDataType", ie.data_type.code())?;
        rec.set("informationElementSemantics", ie.semantic.code())?;
        rec.set("informationElementUnits", ie.units.code())?;
        rec.set("informationElementRangeBegin", ie.min)?;
        rec.set("informationElementRangeEnd", ie.max)?;
        rec.set("informationElementName", ie.name.as_str())?;
        if let Some(desc) = &ie.description {
            rec.set("informationElementDescription", desc.as_str())?;
        }
        let saved = (self.int_tid, self.ext_tid);
        self.int_tid = Some(tid);
        self.ext_tid = Some(tid);
        let result = self.append(&rec);
        (self.int_tid, self.ext_tid) = saved;
        result
    }
}

fn is_type_information(t: &Template) -> bool {
    t.is_options()
        && t.contains("privateEnterpriseNumber")
        && t.contains("informationElementId")
        && t.contains("informationElementName")
}

impl Iterator for Buffer {
    type Item = Result<Record, CodecError>;

    /// Ends at the end of the stream; `WouldBlock` is yielded so the caller can retry.
    fn next(&mut self) -> Option<Self::Item> {
        match self.next_record() {
            Err(CodecError::EndOfStream) => None,
            other => Some(other),
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if matches!(self.mode, Mode::Export(_)) && self.out_records > 0 {
            if let Err(e) = self.emit() {
                log::warn!("failed to emit pending records on drop: {}", e);
            }
        }
    }
}
