//! Records: a flat byte layout described by a schema table, plus the nested
//! lists and varfield payloads its slots refer to.
//!
//! Fixed-width values live in `data` at their schema offset. Endian elements
//! are kept in host order, everything else in network order. Varfield and list
//! slots reserve their in-memory size in `data` but keep their contents in the
//! per-field `slots` arena, so clearing a record releases every nested list.

use crate::codec::{CodecError, Endianness};
use crate::list::{create_stml_from_list, BasicList, SubTemplateList, SubTemplateMultiList};
use crate::model::{DataType, FieldKind, InfoElement, InfoModel, VARFIELD_SLOT, VARLEN};
use crate::template::Template;
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Field key: element (or alias) name plus occurrence index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldKey {
    pub name: String,
    pub index: usize,
}

impl FieldKey {
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        FieldKey {
            name: name.into(),
            index,
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.index == 0 {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}[{}]", self.name, self.index)
        }
    }
}

/// Ways to address a record field.
#[derive(Debug, Clone, Copy)]
pub enum Key<'a> {
    Name(&'a str, usize),
    Position(usize),
}

impl<'a> From<&'a str> for Key<'a> {
    fn from(name: &'a str) -> Self {
        Key::Name(name, 0)
    }
}

impl<'a> From<&'a String> for Key<'a> {
    fn from(name: &'a String) -> Self {
        Key::Name(name, 0)
    }
}

impl<'a> From<(&'a str, usize)> for Key<'a> {
    fn from((name, index): (&'a str, usize)) -> Self {
        Key::Name(name, index)
    }
}

impl<'a> From<&'a FieldKey> for Key<'a> {
    fn from(key: &'a FieldKey) -> Self {
        Key::Name(&key.name, key.index)
    }
}

impl From<usize> for Key<'_> {
    fn from(pos: usize) -> Self {
        Key::Position(pos)
    }
}

impl fmt::Display for Key<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name, 0) => write!(f, "{}", name),
            Key::Name(name, i) => write!(f, "{}[{}]", name, i),
            Key::Position(p) => write!(f, "#{}", p),
        }
    }
}

/// One schema entry.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub key: FieldKey,
    /// Element carried on the wire (the list element for list fields).
    pub ie: Arc<InfoElement>,
    pub offset: usize,
    /// In-record slot size.
    pub length: u16,
    /// Template length: the (reduced) fixed length, or `VARLEN`.
    pub wire_length: u16,
    pub kind: FieldKind,
}

impl FieldDef {
    pub fn data_type(&self) -> DataType {
        self.ie.data_type
    }

    pub fn is_varfield(&self) -> bool {
        self.kind == FieldKind::Plain && self.wire_length == VARLEN
    }

    pub fn is_list(&self) -> bool {
        self.kind.is_list()
    }

    pub(crate) fn order(&self) -> Endianness {
        storage_order(&self.ie)
    }
}

/// Host order for endian elements, network order otherwise.
pub(crate) fn storage_order(ie: &InfoElement) -> Endianness {
    if ie.endian {
        Endianness::native()
    } else {
        Endianness::Big
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Slot {
    Inline,
    Var(Vec<u8>),
    Basic(BasicList),
    Stl(SubTemplateList),
    Stml(SubTemplateMultiList),
}

/// Data record bound to a template or to a hand-built field list.
#[derive(Debug, Clone)]
pub struct Record {
    model: InfoModel,
    template: Option<Arc<Template>>,
    fields: Vec<FieldDef>,
    index: HashMap<FieldKey, usize>,
    data: Vec<u8>,
    slots: Vec<Slot>,
    frozen: bool,
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(a, b)| a.key == b.key && a.ie.key() == b.ie.key())
            && self.data == other.data
            && self.slots == other.slots
    }
}

impl Record {
    /// Empty record; fields are added with [`Record::add_element`].
    pub fn new(model: &InfoModel) -> Self {
        Record {
            model: model.clone(),
            template: None,
            fields: Vec::new(),
            index: HashMap::new(),
            data: Vec::new(),
            slots: Vec::new(),
            frozen: false,
        }
    }

    /// Record with one field per template field, in template order.
    pub fn from_template(model: &InfoModel, template: &Template) -> Self {
        Record::from_shared(model, Arc::new(template.clone()))
    }

    pub(crate) fn from_shared(model: &InfoModel, template: Arc<Template>) -> Self {
        let mut rec = Record::new(model);
        for f in template.fields() {
            let kind = FieldKind::of(f.ie.data_type);
            let length = slot_length(kind, f.length);
            rec.push_field(f.ie.name.clone(), f.ie.clone(), f.length, length, kind, None);
        }
        rec.template = Some(template);
        rec
    }

    /// Same schema and template as `other`, with zeroed values and fresh lists.
    pub fn with_schema_of(other: &Record) -> Self {
        let mut rec = Record {
            model: other.model.clone(),
            template: other.template.clone(),
            fields: other.fields.clone(),
            index: other.index.clone(),
            data: vec![0u8; other.data.len()],
            slots: Vec::with_capacity(other.slots.len()),
            frozen: false,
        };
        for (f, s) in other.fields.iter().zip(&other.slots) {
            let binding = match s {
                Slot::Basic(bl) => bl.element().cloned(),
                _ => None,
            };
            rec.slots.push(empty_slot(f.kind, f.wire_length, binding));
        }
        rec
    }

    fn push_field(
        &mut self,
        name: String,
        ie: Arc<InfoElement>,
        wire_length: u16,
        length: u16,
        kind: FieldKind,
        binding: Option<Arc<InfoElement>>,
    ) -> FieldKey {
        let mut key = FieldKey::new(name, 0);
        while self.index.contains_key(&key) {
            key.index += 1;
        }
        let offset = self.data.len();
        self.data.resize(offset + length as usize, 0);
        self.index.insert(key.clone(), self.fields.len());
        self.slots.push(empty_slot(kind, wire_length, binding));
        self.fields.push(FieldDef {
            key: key.clone(),
            ie,
            offset,
            length,
            wire_length,
            kind,
        });
        key
    }

    /// Append a field keyed `key_name`. `element` names the element when the
    /// key is an alias; for a basicList field it may name the item element.
    /// A non-zero `length` requests reduced-length encoding.
    pub fn add_element(
        &mut self,
        key_name: &str,
        kind: FieldKind,
        element: Option<&str>,
        length: u16,
    ) -> Result<FieldKey, CodecError> {
        if self.frozen {
            return Err(CodecError::AlreadyFrozen);
        }
        let element_name = element.unwrap_or(key_name);
        let found = self.model.get_element(element_name);
        let (ie, kind, binding) = match (kind, found) {
            (FieldKind::Plain, None) => {
                return Err(CodecError::UnknownElement(element_name.to_string()))
            }
            (FieldKind::Plain, Some(ie)) => {
                let kind = FieldKind::of(ie.data_type);
                (ie, kind, None)
            }
            (list_kind, found) => {
                let std_ie = match &found {
                    Some(ie) if FieldKind::of(ie.data_type) == list_kind => ie.clone(),
                    _ => {
                        let std_name = list_kind.element_name().unwrap_or_default();
                        self.model
                            .get_element(std_name)
                            .ok_or_else(|| CodecError::UnknownElement(std_name.to_string()))?
                    }
                };
                let binding = match (list_kind, found) {
                    (FieldKind::BasicList, Some(ie)) if !ie.data_type.is_list() => Some(ie),
                    _ => None,
                };
                (std_ie, list_kind, binding)
            }
        };
        // list fields follow the same override rules as their list element
        let wire_length = if length != 0 {
            if length > ie.length || !ie.data_type.allows_reduced_length(length) {
                return Err(CodecError::InvalidSpec(format!(
                    "{}: {} does not support a length of {}",
                    element_name,
                    ie.data_type.name(),
                    length
                )));
            }
            length
        } else if kind.is_list() {
            VARLEN
        } else {
            ie.length
        };
        let slot = slot_length(kind, wire_length);
        Ok(self.push_field(key_name.to_string(), ie, wire_length, slot, kind, binding))
    }

    /// Add each named element at its default length.
    pub fn add_element_list(&mut self, names: &[&str]) -> Result<(), CodecError> {
        for name in names {
            self.add_element(name, FieldKind::Plain, None, 0)?;
        }
        Ok(())
    }

    fn position<'a>(&self, key: impl Into<Key<'a>>) -> Result<usize, CodecError> {
        let key = key.into();
        match key {
            Key::Name(name, index) => self
                .index
                .get(&FieldKey::new(name, index))
                .copied()
                .ok_or_else(|| CodecError::KeyNotFound(key.to_string())),
            Key::Position(p) if p < self.fields.len() => Ok(p),
            Key::Position(_) => Err(CodecError::KeyNotFound(key.to_string())),
        }
    }

    pub fn field<'a>(&self, key: impl Into<Key<'a>>) -> Result<&FieldDef, CodecError> {
        Ok(&self.fields[self.position(key)?])
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn contains<'a>(&self, key: impl Into<Key<'a>>) -> bool {
        self.position(key).is_ok()
    }

    pub fn is_list<'a>(&self, key: impl Into<Key<'a>>) -> Result<bool, CodecError> {
        Ok(self.field(key)?.is_list())
    }

    /// Read a field, converted to its canonical value.
    pub fn get<'a>(&self, key: impl Into<Key<'a>>) -> Result<Value, CodecError> {
        let i = self.position(key)?;
        Ok(self.value_at(i))
    }

    fn value_at(&self, i: usize) -> Value {
        let f = &self.fields[i];
        match &self.slots[i] {
            Slot::Inline => Value::read_fixed(f.data_type(), self.fixed(i), f.order()),
            Slot::Var(bytes) => match f.data_type() {
                DataType::String => Value::String(String::from_utf8_lossy(bytes).into_owned()),
                _ => Value::Bytes(bytes.clone()),
            },
            Slot::Basic(bl) => Value::BasicList(bl.clone()),
            Slot::Stl(stl) => Value::SubTemplateList(stl.clone()),
            Slot::Stml(stml) => Value::SubTemplateMultiList(stml.clone()),
        }
    }

    /// Raw stored bytes: the varfield payload, or the fixed slot as stored.
    pub fn get_bytes<'a>(&self, key: impl Into<Key<'a>>) -> Result<&[u8], CodecError> {
        let i = self.position(key)?;
        match &self.slots[i] {
            Slot::Inline => Ok(self.fixed(i)),
            Slot::Var(bytes) => Ok(bytes),
            _ => Err(CodecError::TypeMismatch(format!(
                "{} is a list field",
                self.fields[i].key
            ))),
        }
    }

    /// Write a field, coercing `value` to the field's datatype.
    pub fn set<'a>(
        &mut self,
        key: impl Into<Key<'a>>,
        value: impl Into<Value>,
    ) -> Result<(), CodecError> {
        let i = self.position(key)?;
        self.set_at(i, value.into())
    }

    fn set_at(&mut self, i: usize, value: Value) -> Result<(), CodecError> {
        let dt = self.fields[i].data_type();
        let wire_length = self.fields[i].wire_length;
        match self.fields[i].kind {
            FieldKind::Plain if wire_length == VARLEN => {
                let payload = match value.coerce(dt, VARLEN)? {
                    Value::String(s) => s.into_bytes(),
                    Value::Bytes(b) => b,
                    other => return Err(CodecError::TypeMismatch(other.kind().to_string())),
                };
                if payload.len() > u16::MAX as usize {
                    return Err(CodecError::TypeMismatch(format!(
                        "{} bytes exceed a varfield",
                        payload.len()
                    )));
                }
                self.slots[i] = Slot::Var(payload);
            }
            FieldKind::Plain => {
                let v = value.coerce(dt, wire_length)?;
                let order = self.fields[i].order();
                let range = self.range(i);
                v.write_fixed(dt, &mut self.data[range], order)?;
            }
            FieldKind::BasicList => self.set_basic_list(i, value)?,
            FieldKind::SubTemplateList => {
                let stl = match value {
                    Value::SubTemplateList(stl) => stl,
                    Value::Records(records) => {
                        let template = records
                            .iter()
                            .find_map(|r| r.template().cloned())
                            .ok_or(CodecError::NoTemplate)?;
                        let first = records.first().ok_or(CodecError::NoTemplate)?;
                        let mut stl = SubTemplateList::new();
                        stl.entry_init(first, &template, records.len())?;
                        for (n, rec) in records.into_iter().enumerate() {
                            stl.set(n, rec)?;
                        }
                        stl
                    }
                    other => return Err(list_mismatch(&self.fields[i], &other)),
                };
                self.frozen = true;
                self.slots[i] = Slot::Stl(stl);
            }
            FieldKind::SubTemplateMultiList => {
                let stml = match value {
                    Value::SubTemplateMultiList(stml) => stml,
                    Value::Records(records) => create_stml_from_list(records)?,
                    other => return Err(list_mismatch(&self.fields[i], &other)),
                };
                self.frozen = true;
                self.slots[i] = Slot::Stml(stml);
            }
        }
        Ok(())
    }

    fn set_basic_list(&mut self, i: usize, value: Value) -> Result<(), CodecError> {
        let key = self.fields[i].key.clone();
        let Slot::Basic(current) = &mut self.slots[i] else {
            return Err(CodecError::TypeMismatch(format!("{} is not a basicList", key)));
        };
        let items = match value {
            Value::BasicList(bl) => {
                *current = bl;
                self.frozen = true;
                return Ok(());
            }
            Value::List(items) => items,
            scalar => vec![scalar],
        };
        if current.element().is_none() {
            return Err(CodecError::NotInitialized(format!(
                "basicList {} has no element; call init_basic_list",
                key
            )));
        }
        if !current.is_initialized() {
            current.init(items.len())?;
        }
        current.copy(&items)?;
        self.frozen = true;
        Ok(())
    }

    /// Size the basicList at `key` to `count` items of `element` (or of the
    /// element it was declared with).
    pub fn init_basic_list<'a>(
        &mut self,
        key: impl Into<Key<'a>>,
        count: usize,
        element: Option<&str>,
    ) -> Result<&mut BasicList, CodecError> {
        let i = self.position(key)?;
        let bound = match &self.slots[i] {
            Slot::Basic(bl) => bl.element().cloned(),
            _ => {
                return Err(CodecError::TypeMismatch(format!(
                    "{} is not a basicList",
                    self.fields[i].key
                )))
            }
        };
        let ie = match element {
            Some(name) => self
                .model
                .get_element(name)
                .ok_or_else(|| CodecError::UnknownElement(name.to_string()))?,
            None => bound.ok_or_else(|| {
                CodecError::NotInitialized(format!(
                    "{} must be initialized to an information element",
                    self.fields[i].key
                ))
            })?,
        };
        let bl = BasicList::with_element(ie, count, Default::default())?;
        self.slots[i] = Slot::Basic(bl);
        self.basic_list_mut(i)
    }

    /// Release the basicList at `key`.
    pub fn clear_basic_list<'a>(&mut self, key: impl Into<Key<'a>>) -> Result<(), CodecError> {
        self.basic_list_mut(key)?.clear();
        Ok(())
    }

    pub fn basic_list<'a>(&self, key: impl Into<Key<'a>>) -> Result<&BasicList, CodecError> {
        let i = self.position(key)?;
        match &self.slots[i] {
            Slot::Basic(bl) => Ok(bl),
            _ => Err(not_kind(&self.fields[i], "basicList")),
        }
    }

    pub fn basic_list_mut<'a>(
        &mut self,
        key: impl Into<Key<'a>>,
    ) -> Result<&mut BasicList, CodecError> {
        let i = self.position(key)?;
        self.frozen = true;
        match &mut self.slots[i] {
            Slot::Basic(bl) => Ok(bl),
            _ => Err(not_kind(&self.fields[i], "basicList")),
        }
    }

    pub fn sub_template_list<'a>(
        &self,
        key: impl Into<Key<'a>>,
    ) -> Result<&SubTemplateList, CodecError> {
        let i = self.position(key)?;
        match &self.slots[i] {
            Slot::Stl(stl) => Ok(stl),
            _ => Err(not_kind(&self.fields[i], "subTemplateList")),
        }
    }

    /// Mutable access to the subTemplateList at `key`; freezes the schema.
    pub fn sub_template_list_mut<'a>(
        &mut self,
        key: impl Into<Key<'a>>,
    ) -> Result<&mut SubTemplateList, CodecError> {
        let i = self.position(key)?;
        self.frozen = true;
        match &mut self.slots[i] {
            Slot::Stl(stl) => Ok(stl),
            _ => Err(not_kind(&self.fields[i], "subTemplateList")),
        }
    }

    pub fn sub_template_multi_list<'a>(
        &self,
        key: impl Into<Key<'a>>,
    ) -> Result<&SubTemplateMultiList, CodecError> {
        let i = self.position(key)?;
        match &self.slots[i] {
            Slot::Stml(stml) => Ok(stml),
            _ => Err(not_kind(&self.fields[i], "subTemplateMultiList")),
        }
    }

    pub fn sub_template_multi_list_mut<'a>(
        &mut self,
        key: impl Into<Key<'a>>,
    ) -> Result<&mut SubTemplateMultiList, CodecError> {
        let i = self.position(key)?;
        self.frozen = true;
        match &mut self.slots[i] {
            Slot::Stml(stml) => Ok(stml),
            _ => Err(not_kind(&self.fields[i], "subTemplateMultiList")),
        }
    }

    /// Replace the subTemplateMultiList at `key` with `type_count` empty groups.
    pub fn init_sub_template_multi_list<'a>(
        &mut self,
        key: impl Into<Key<'a>>,
        type_count: usize,
    ) -> Result<&mut SubTemplateMultiList, CodecError> {
        let stml = self.sub_template_multi_list_mut(key)?;
        *stml = SubTemplateMultiList::new(type_count);
        Ok(stml)
    }

    /// Copy every field whose key also exists in `other` from `other`.
    pub fn copy(&mut self, other: &Record) -> Result<(), CodecError> {
        for i in 0..self.fields.len() {
            let key = self.fields[i].key.clone();
            if let Some(&j) = other.index.get(&key) {
                self.set_at(i, other.value_at(j))?;
            }
        }
        Ok(())
    }

    /// Field-by-field compatibility with `template`; list fields match any list.
    pub fn matches_template(&self, template: &Template) -> bool {
        template
            .fields()
            .iter()
            .zip(&self.fields)
            .all(|(tf, rf)| tf.ie.data_type.is_list() || tf.ie.key() == rf.ie.key())
    }

    /// Associate a template with the same number of fields.
    pub fn set_template(&mut self, template: &Template) -> Result<(), CodecError> {
        if template.len() != self.fields.len() {
            return Err(CodecError::SchemaMismatch(format!(
                "template has {} fields, record has {}",
                template.len(),
                self.fields.len()
            )));
        }
        self.template = Some(Arc::new(template.clone()));
        Ok(())
    }

    pub(crate) fn bind_template(&mut self, template: Arc<Template>) {
        self.template = Some(template);
    }

    pub fn template(&self) -> Option<&Arc<Template>> {
        self.template.as_ref()
    }

    pub fn model(&self) -> &InfoModel {
        &self.model
    }

    /// Occurrences of the field name `name`.
    pub fn count(&self, name: &str) -> usize {
        self.fields.iter().filter(|f| f.key.name == name).count()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// In-memory size: the sum of every field's slot.
    pub fn length(&self) -> usize {
        self.data.len()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn keys(&self) -> impl Iterator<Item = &FieldKey> + '_ {
        self.fields.iter().map(|f| &f.key)
    }

    /// `(key, value)` pairs in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&FieldKey, Value)> + '_ {
        self.fields
            .iter()
            .enumerate()
            .map(move |(i, f)| (&f.key, self.value_at(i)))
    }

    /// Zero every value and release all varfields and lists.
    pub fn clear(&mut self) {
        self.data.fill(0);
        for i in 0..self.slots.len() {
            self.reset_slot(i);
        }
    }

    /// Release the top-level lists only.
    pub fn clear_all_lists(&mut self) {
        for slot in self.slots.iter_mut() {
            match slot {
                Slot::Basic(bl) => bl.clear(),
                Slot::Stl(stl) => stl.clear(),
                Slot::Stml(stml) => stml.clear(),
                _ => {}
            }
        }
    }

    fn reset_slot(&mut self, i: usize) {
        let binding = match &self.slots[i] {
            Slot::Basic(bl) => bl.element().cloned(),
            _ => None,
        };
        let f = &self.fields[i];
        self.slots[i] = empty_slot(f.kind, f.wire_length, binding);
    }

    // ----- transcoder access -----

    fn range(&self, i: usize) -> std::ops::Range<usize> {
        let f = &self.fields[i];
        f.offset..f.offset + f.length as usize
    }

    pub(crate) fn fixed(&self, i: usize) -> &[u8] {
        &self.data[self.range(i)]
    }

    pub(crate) fn fixed_mut(&mut self, i: usize) -> &mut [u8] {
        let r = self.range(i);
        &mut self.data[r]
    }

    pub(crate) fn slot(&self, i: usize) -> &Slot {
        &self.slots[i]
    }

    pub(crate) fn put_slot(&mut self, i: usize, slot: Slot) {
        self.slots[i] = slot;
    }

    /// Raw in-memory layout.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

fn slot_length(kind: FieldKind, wire_length: u16) -> u16 {
    if kind.is_list() {
        kind.slot()
    } else if wire_length == VARLEN {
        VARFIELD_SLOT
    } else {
        wire_length
    }
}

fn empty_slot(kind: FieldKind, wire_length: u16, binding: Option<Arc<InfoElement>>) -> Slot {
    match kind {
        FieldKind::Plain if wire_length == VARLEN => Slot::Var(Vec::new()),
        FieldKind::Plain => Slot::Inline,
        FieldKind::BasicList => Slot::Basic(BasicList::pending(binding)),
        FieldKind::SubTemplateList => Slot::Stl(SubTemplateList::new()),
        FieldKind::SubTemplateMultiList => Slot::Stml(SubTemplateMultiList::uninitialized()),
    }
}

fn not_kind(f: &FieldDef, what: &str) -> CodecError {
    CodecError::TypeMismatch(format!("{} is not a {}", f.key, what))
}

fn list_mismatch(f: &FieldDef, v: &Value) -> CodecError {
    CodecError::TypeMismatch(format!("{} value for list field {}", v.kind(), f.key))
}
