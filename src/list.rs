//! RFC 6313 structured data: basicList, subTemplateList and subTemplateMultiList.
//!
//! Lists own their entries. Dropping or clearing a list releases every record
//! it holds, nested lists included.

use crate::codec::CodecError;
use crate::model::{InfoElement, InfoModel};
use crate::record::Record;
use crate::template::Template;
use crate::value::Value;
use std::sync::Arc;

/// Relationship among list items (RFC 6313 section 4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ListSemantic {
    NoneOf,
    ExactlyOneOf,
    OneOrMoreOf,
    AllOf,
    Ordered,
    #[default]
    Undefined,
}

impl ListSemantic {
    pub fn from_code(code: u8) -> Option<ListSemantic> {
        match code {
            0 => Some(ListSemantic::NoneOf),
            1 => Some(ListSemantic::ExactlyOneOf),
            2 => Some(ListSemantic::OneOrMoreOf),
            3 => Some(ListSemantic::AllOf),
            4 => Some(ListSemantic::Ordered),
            0xff => Some(ListSemantic::Undefined),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            ListSemantic::NoneOf => 0,
            ListSemantic::ExactlyOneOf => 1,
            ListSemantic::OneOrMoreOf => 2,
            ListSemantic::AllOf => 3,
            ListSemantic::Ordered => 4,
            ListSemantic::Undefined => 0xff,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ListSemantic::NoneOf => "noneOf",
            ListSemantic::ExactlyOneOf => "exactlyOneOf",
            ListSemantic::OneOrMoreOf => "oneOrMoreOf",
            ListSemantic::AllOf => "allOf",
            ListSemantic::Ordered => "ordered",
            ListSemantic::Undefined => "undefined",
        }
    }

    pub(crate) fn from_wire(code: u8) -> ListSemantic {
        ListSemantic::from_code(code).unwrap_or_else(|| {
            log::debug!("unknown list semantic {}", code);
            ListSemantic::Undefined
        })
    }
}

// ==================== basicList ====================

/// Homogeneous list of one element's values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BasicList {
    element: Option<Arc<InfoElement>>,
    semantic: ListSemantic,
    items: Vec<Value>,
    initialized: bool,
}

impl BasicList {
    /// List of `count` zero values of the element named `element`.
    pub fn new(
        model: &InfoModel,
        element: &str,
        count: usize,
        semantic: ListSemantic,
    ) -> Result<Self, CodecError> {
        let ie = model
            .get_element(element)
            .ok_or_else(|| CodecError::UnknownElement(element.to_string()))?;
        BasicList::with_element(ie, count, semantic)
    }

    pub fn with_element(
        ie: Arc<InfoElement>,
        count: usize,
        semantic: ListSemantic,
    ) -> Result<Self, CodecError> {
        if ie.data_type.is_list() {
            return Err(CodecError::InvalidSpec(format!(
                "basicList of {} is not supported",
                ie.name
            )));
        }
        let mut bl = BasicList {
            element: Some(ie),
            semantic,
            items: Vec::new(),
            initialized: false,
        };
        bl.init(count)?;
        Ok(bl)
    }

    /// Bound to an element (or not) but not yet sized.
    pub(crate) fn pending(element: Option<Arc<InfoElement>>) -> Self {
        BasicList {
            element,
            ..BasicList::default()
        }
    }

    /// Present on the wire with a zero-length payload.
    pub(crate) fn decoded_empty() -> Self {
        BasicList {
            initialized: true,
            ..BasicList::default()
        }
    }

    pub(crate) fn decoded(ie: Arc<InfoElement>, semantic: ListSemantic, items: Vec<Value>) -> Self {
        BasicList {
            element: Some(ie),
            semantic,
            items,
            initialized: true,
        }
    }

    /// Size the list to `count` zero values of the bound element.
    pub fn init(&mut self, count: usize) -> Result<(), CodecError> {
        let ie = self
            .element
            .as_ref()
            .ok_or_else(|| CodecError::NotInitialized("basicList has no element".into()))?;
        let zero = Value::zero(ie.data_type, ie.length);
        self.items = vec![zero; count];
        self.initialized = true;
        Ok(())
    }

    pub fn element(&self) -> Option<&Arc<InfoElement>> {
        self.element.as_ref()
    }

    pub fn semantic(&self) -> ListSemantic {
        self.semantic
    }

    pub fn set_semantic(&mut self, semantic: ListSemantic) {
        self.semantic = semantic;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }

    pub fn get(&self, index: usize) -> Result<&Value, CodecError> {
        self.items.get(index).ok_or(CodecError::IndexOutOfRange {
            index,
            count: self.items.len(),
        })
    }

    pub fn set(&mut self, index: usize, value: impl Into<Value>) -> Result<(), CodecError> {
        let ie = self
            .element
            .as_ref()
            .ok_or_else(|| CodecError::NotInitialized("basicList has no element".into()))?;
        let count = self.items.len();
        if index >= count {
            return Err(CodecError::IndexOutOfRange { index, count });
        }
        self.items[index] = value.into().coerce(ie.data_type, ie.length)?;
        Ok(())
    }

    /// Copy up to `len()` leading values of `values`; returns how many were copied.
    pub fn copy(&mut self, values: &[Value]) -> Result<usize, CodecError> {
        let n = self.items.len().min(values.len());
        for (i, v) in values.iter().take(n).enumerate() {
            self.set(i, v.clone())?;
        }
        Ok(n)
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.items.contains(value)
    }

    /// Drop all values; the element binding survives for a later `init`.
    pub fn clear(&mut self) {
        self.items = Vec::new();
    }
}

// ==================== subTemplateList ====================

/// Homogeneous list of records sharing one template.
#[derive(Debug, Clone, Default)]
pub struct SubTemplateList {
    semantic: ListSemantic,
    template: Option<Arc<Template>>,
    template_id: u16,
    entries: Vec<Record>,
    initialized: bool,
}

impl PartialEq for SubTemplateList {
    fn eq(&self, other: &Self) -> bool {
        self.semantic == other.semantic
            && self.template_id == other.template_id
            && self.entries == other.entries
    }
}

impl SubTemplateList {
    pub fn new() -> Self {
        SubTemplateList::default()
    }

    pub(crate) fn decoded(
        semantic: ListSemantic,
        template_id: u16,
        template: Option<Arc<Template>>,
        entries: Vec<Record>,
    ) -> Self {
        SubTemplateList {
            semantic,
            template,
            template_id,
            entries,
            initialized: true,
        }
    }

    /// Reserve `count` entries shaped like `record`, bound to `template`.
    pub fn entry_init(
        &mut self,
        record: &Record,
        template: &Template,
        count: usize,
    ) -> Result<(), CodecError> {
        self.init_shared(record, Arc::new(template.clone()), count)
    }

    fn init_shared(
        &mut self,
        record: &Record,
        template: Arc<Template>,
        count: usize,
    ) -> Result<(), CodecError> {
        let (entries, template_id) = reserve(record, &template, count)?;
        self.entries = entries;
        self.template_id = template_id;
        self.template = Some(template);
        self.initialized = true;
        Ok(())
    }

    /// Store `record` at `index`. An uninitialized list first initializes
    /// itself to one entry of the record's template.
    pub fn set(&mut self, index: usize, record: Record) -> Result<(), CodecError> {
        if !self.initialized {
            let template = record.template().cloned().ok_or_else(|| {
                CodecError::NotInitialized("subTemplateList has not been initialized".into())
            })?;
            self.init_shared(&record, template, 1)?;
        }
        place(&mut self.entries, self.template.as_ref(), index, record)
    }

    pub fn get(&self, index: usize) -> Result<&Record, CodecError> {
        self.entries.get(index).ok_or(CodecError::IndexOutOfRange {
            index,
            count: self.entries.len(),
        })
    }

    pub fn get_mut(&mut self, index: usize) -> Result<&mut Record, CodecError> {
        let count = self.entries.len();
        self.entries
            .get_mut(index)
            .ok_or(CodecError::IndexOutOfRange { index, count })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.entries.iter()
    }

    pub fn records(&self) -> &[Record] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the list's template includes the element `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.template.as_ref().map_or(false, |t| t.contains(name))
    }

    /// Template id entries are transcoded with.
    pub fn template_id(&self) -> u16 {
        self.template_id
    }

    pub fn template(&self) -> Option<&Arc<Template>> {
        self.template.as_ref()
    }

    pub fn semantic(&self) -> ListSemantic {
        self.semantic
    }

    pub fn set_semantic(&mut self, semantic: ListSemantic) {
        self.semantic = semantic;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Release every entry; the list keeps its template and reads as empty.
    pub fn clear(&mut self) {
        self.entries = Vec::new();
    }
}

fn reserve(
    record: &Record,
    template: &Arc<Template>,
    count: usize,
) -> Result<(Vec<Record>, u16), CodecError> {
    if record.len() != template.len() {
        return Err(CodecError::SchemaMismatch(format!(
            "record has {} fields, template has {}",
            record.len(),
            template.len()
        )));
    }
    let entries = (0..count)
        .map(|_| {
            let mut entry = Record::with_schema_of(record);
            entry.bind_template(template.clone());
            entry
        })
        .collect();
    Ok((entries, template.template_id()))
}

fn place(
    entries: &mut [Record],
    template: Option<&Arc<Template>>,
    index: usize,
    mut record: Record,
) -> Result<(), CodecError> {
    if let Some(t) = template {
        if record.len() != t.len() {
            return Err(CodecError::SchemaMismatch(format!(
                "record has {} fields, list template has {}",
                record.len(),
                t.len()
            )));
        }
        if record.template().is_none() {
            record.bind_template(t.clone());
        }
    }
    let count = entries.len();
    let slot = entries
        .get_mut(index)
        .ok_or(CodecError::IndexOutOfRange { index, count })?;
    *slot = record;
    Ok(())
}

// ==================== subTemplateMultiList ====================

/// One group of a subTemplateMultiList: records sharing one template.
#[derive(Debug, Clone, Default)]
pub struct StmlEntry {
    template: Option<Arc<Template>>,
    template_id: u16,
    records: Vec<Record>,
    initialized: bool,
}

impl PartialEq for StmlEntry {
    fn eq(&self, other: &Self) -> bool {
        self.template_id == other.template_id && self.records == other.records
    }
}

impl StmlEntry {
    pub(crate) fn decoded(template_id: u16, template: Option<Arc<Template>>, records: Vec<Record>) -> Self {
        StmlEntry {
            template,
            template_id,
            records,
            initialized: true,
        }
    }

    /// Reserve `count` records shaped like `record`, bound to `template`.
    pub fn entry_init(
        &mut self,
        record: &Record,
        template: &Template,
        count: usize,
    ) -> Result<(), CodecError> {
        self.init_shared(record, Arc::new(template.clone()), count)
    }

    fn init_shared(
        &mut self,
        record: &Record,
        template: Arc<Template>,
        count: usize,
    ) -> Result<(), CodecError> {
        let (records, template_id) = reserve(record, &template, count)?;
        self.records = records;
        self.template_id = template_id;
        self.template = Some(template);
        self.initialized = true;
        Ok(())
    }

    /// Bind a template without a sample record; reserves one record.
    pub fn set_template(&mut self, template: &Template) -> Result<(), CodecError> {
        let shared = Arc::new(template.clone());
        let sample = Record::from_shared(template.model(), shared.clone());
        self.init_shared(&sample, shared, 1)
    }

    /// Store `record` at `index`, initializing the group to one record of the
    /// record's template on first use.
    pub fn set(&mut self, index: usize, record: Record) -> Result<(), CodecError> {
        if !self.initialized {
            let template = record.template().cloned().ok_or_else(|| {
                CodecError::NotInitialized("subTemplateMultiList entry has not been initialized".into())
            })?;
            self.init_shared(&record, template, 1)?;
        }
        place(&mut self.records, self.template.as_ref(), index, record)
    }

    pub fn get(&self, index: usize) -> Result<&Record, CodecError> {
        self.records.get(index).ok_or(CodecError::IndexOutOfRange {
            index,
            count: self.records.len(),
        })
    }

    pub fn get_mut(&mut self, index: usize) -> Result<&mut Record, CodecError> {
        let count = self.records.len();
        self.records
            .get_mut(index)
            .ok_or(CodecError::IndexOutOfRange { index, count })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.template.as_ref().map_or(false, |t| t.contains(name))
    }

    pub fn template_id(&self) -> u16 {
        self.template_id
    }

    pub fn template(&self) -> Option<&Arc<Template>> {
        self.template.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// Heterogeneous list: one [`StmlEntry`] per template group.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubTemplateMultiList {
    semantic: ListSemantic,
    entries: Vec<StmlEntry>,
    initialized: bool,
}

impl SubTemplateMultiList {
    /// List with `type_count` uninitialized groups (one per distinct template
    /// to export, even if two groups share a template).
    pub fn new(type_count: usize) -> Self {
        SubTemplateMultiList {
            semantic: ListSemantic::Undefined,
            entries: vec![StmlEntry::default(); type_count],
            initialized: true,
        }
    }

    pub(crate) fn decoded(semantic: ListSemantic, entries: Vec<StmlEntry>) -> Self {
        SubTemplateMultiList {
            semantic,
            entries,
            initialized: true,
        }
    }

    pub(crate) fn uninitialized() -> Self {
        SubTemplateMultiList::default()
    }

    /// Fill group `index` with `records`, all of the first record's template.
    pub fn set(&mut self, index: usize, records: Vec<Record>) -> Result<(), CodecError> {
        if records.is_empty() {
            return Err(CodecError::EmptyList);
        }
        let template = records[0].template().cloned().ok_or(CodecError::NoTemplate)?;
        let count = self.entries.len();
        let entry = self
            .entries
            .get_mut(index)
            .ok_or(CodecError::IndexOutOfRange { index, count })?;
        entry.init_shared(&records[0], template, records.len())?;
        for (i, rec) in records.into_iter().enumerate() {
            entry.set(i, rec)?;
        }
        Ok(())
    }

    pub fn get(&self, index: usize) -> Result<&StmlEntry, CodecError> {
        self.entries.get(index).ok_or(CodecError::IndexOutOfRange {
            index,
            count: self.entries.len(),
        })
    }

    pub fn get_mut(&mut self, index: usize) -> Result<&mut StmlEntry, CodecError> {
        let count = self.entries.len();
        self.entries
            .get_mut(index)
            .ok_or(CodecError::IndexOutOfRange { index, count })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StmlEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[StmlEntry] {
        &self.entries
    }

    /// Number of template groups.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the first group's template includes the element `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.first().map_or(false, |e| e.contains(name))
    }

    pub fn semantic(&self) -> ListSemantic {
        self.semantic
    }

    pub fn set_semantic(&mut self, semantic: ListSemantic) {
        self.semantic = semantic;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Release every group and record.
    pub fn clear(&mut self) {
        self.entries = Vec::new();
    }
}

/// Group `records` by template into a new list, in order of first appearance.
pub fn create_stml_from_list(records: Vec<Record>) -> Result<SubTemplateMultiList, CodecError> {
    let mut groups: Vec<(Arc<Template>, Vec<Record>)> = Vec::new();
    for (i, rec) in records.into_iter().enumerate() {
        let template = rec.template().cloned().ok_or_else(|| {
            log::debug!("record {} in list has no template", i + 1);
            CodecError::NoTemplate
        })?;
        match groups.iter_mut().find(|(t, _)| same_template(t, &template)) {
            Some((_, group)) => group.push(rec),
            None => groups.push((template, vec![rec])),
        }
    }
    let mut stml = SubTemplateMultiList::new(groups.len());
    for (i, (_, group)) in groups.into_iter().enumerate() {
        stml.set(i, group)?;
    }
    Ok(stml)
}

fn same_template(a: &Arc<Template>, b: &Arc<Template>) -> bool {
    Arc::ptr_eq(a, b) || (a.template_id() != 0 && a.template_id() == b.template_id())
}
