//! Information Elements and the Information Model that registers them.
//!
//! The model is a cheap-to-clone handle over a shared registry so that templates,
//! records and buffers created from it all observe elements registered later
//! (for example from RFC 5610 type-information records received on the wire).

use crate::codec::CodecError;
use crate::record::Record;
use crate::value::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// CERT private enterprise number.
pub const CERT_PEN: u32 = 6871;
/// Length sentinel for variable-length elements.
pub const VARLEN: u16 = 65535;
/// Enterprise number under which reverse IANA elements are registered (RFC 5103).
pub const REVERSE_PEN: u32 = 29305;
/// Id bit marking the reverse of a vendor element.
pub const REVERSE_ID_BIT: u16 = 0x4000;

/// In-record size of a varfield slot.
pub const VARFIELD_SLOT: u16 = 16;
/// In-record size of a basicList slot.
pub const BASIC_LIST_SLOT: u16 = 24;
/// In-record size of a subTemplateList slot.
pub const SUB_TEMPLATE_LIST_SLOT: u16 = 32;
/// In-record size of a subTemplateMultiList slot.
pub const SUB_TEMPLATE_MULTI_LIST_SLOT: u16 = 16;

const IANA_REGISTRY: &str = include_str!("iana.ies");

/// Abstract data types (RFC 5610 informationElementDataType codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    OctetArray = 0,
    Unsigned8 = 1,
    Unsigned16 = 2,
    Unsigned32 = 3,
    Unsigned64 = 4,
    Signed8 = 5,
    Signed16 = 6,
    Signed32 = 7,
    Signed64 = 8,
    Float32 = 9,
    Float64 = 10,
    Boolean = 11,
    MacAddress = 12,
    String = 13,
    DateTimeSeconds = 14,
    DateTimeMilliseconds = 15,
    DateTimeMicroseconds = 16,
    DateTimeNanoseconds = 17,
    Ipv4Address = 18,
    Ipv6Address = 19,
    BasicList = 20,
    SubTemplateList = 21,
    SubTemplateMultiList = 22,
}

const DATA_TYPES: [DataType; 23] = [
    DataType::OctetArray,
    DataType::Unsigned8,
    DataType::Unsigned16,
    DataType::Unsigned32,
    DataType::Unsigned64,
    DataType::Signed8,
    DataType::Signed16,
    DataType::Signed32,
    DataType::Signed64,
    DataType::Float32,
    DataType::Float64,
    DataType::Boolean,
    DataType::MacAddress,
    DataType::String,
    DataType::DateTimeSeconds,
    DataType::DateTimeMilliseconds,
    DataType::DateTimeMicroseconds,
    DataType::DateTimeNanoseconds,
    DataType::Ipv4Address,
    DataType::Ipv6Address,
    DataType::BasicList,
    DataType::SubTemplateList,
    DataType::SubTemplateMultiList,
];

impl DataType {
    pub fn from_code(code: u8) -> Option<DataType> {
        DATA_TYPES.get(code as usize).copied()
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// IANA name of the type, as used in registry files.
    pub fn name(self) -> &'static str {
        match self {
            DataType::OctetArray => "octetArray",
            DataType::Unsigned8 => "unsigned8",
            DataType::Unsigned16 => "unsigned16",
            DataType::Unsigned32 => "unsigned32",
            DataType::Unsigned64 => "unsigned64",
            DataType::Signed8 => "signed8",
            DataType::Signed16 => "signed16",
            DataType::Signed32 => "signed32",
            DataType::Signed64 => "signed64",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
            DataType::Boolean => "boolean",
            DataType::MacAddress => "macAddress",
            DataType::String => "string",
            DataType::DateTimeSeconds => "dateTimeSeconds",
            DataType::DateTimeMilliseconds => "dateTimeMilliseconds",
            DataType::DateTimeMicroseconds => "dateTimeMicroseconds",
            DataType::DateTimeNanoseconds => "dateTimeNanoseconds",
            DataType::Ipv4Address => "ipv4Address",
            DataType::Ipv6Address => "ipv6Address",
            DataType::BasicList => "basicList",
            DataType::SubTemplateList => "subTemplateList",
            DataType::SubTemplateMultiList => "subTemplateMultiList",
        }
    }

    pub fn from_name(name: &str) -> Option<DataType> {
        DATA_TYPES.iter().copied().find(|dt| dt.name() == name)
    }

    /// Wire length of a full-width value of this type.
    pub fn natural_length(self) -> u16 {
        match self {
            DataType::OctetArray
            | DataType::String
            | DataType::BasicList
            | DataType::SubTemplateList
            | DataType::SubTemplateMultiList => VARLEN,
            DataType::Unsigned8 | DataType::Signed8 | DataType::Boolean => 1,
            DataType::Unsigned16 | DataType::Signed16 => 2,
            DataType::Unsigned32
            | DataType::Signed32
            | DataType::Float32
            | DataType::DateTimeSeconds
            | DataType::Ipv4Address => 4,
            DataType::MacAddress => 6,
            DataType::Unsigned64
            | DataType::Signed64
            | DataType::Float64
            | DataType::DateTimeMilliseconds
            | DataType::DateTimeMicroseconds
            | DataType::DateTimeNanoseconds => 8,
            DataType::Ipv6Address => 16,
        }
    }

    pub fn is_list(self) -> bool {
        matches!(
            self,
            DataType::BasicList | DataType::SubTemplateList | DataType::SubTemplateMultiList
        )
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            DataType::Signed8 | DataType::Signed16 | DataType::Signed32 | DataType::Signed64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    /// Types whose values are integers on the wire (including timestamps).
    pub fn is_integral(self) -> bool {
        matches!(
            self,
            DataType::Unsigned8
                | DataType::Unsigned16
                | DataType::Unsigned32
                | DataType::Unsigned64
                | DataType::Signed8
                | DataType::Signed16
                | DataType::Signed32
                | DataType::Signed64
                | DataType::DateTimeSeconds
                | DataType::DateTimeMilliseconds
                | DataType::DateTimeMicroseconds
                | DataType::DateTimeNanoseconds
        )
    }

    /// Whether a value of this type may be carried in `len` bytes instead of
    /// its natural length (RFC 7011 section 6.2).
    pub fn allows_reduced_length(self, len: u16) -> bool {
        match self {
            DataType::Unsigned16 | DataType::Signed16 => len >= 1 && len <= 2,
            DataType::Unsigned32 | DataType::Signed32 => len >= 1 && len <= 4,
            DataType::Unsigned64 | DataType::Signed64 => len >= 1 && len <= 8,
            DataType::Float64 => len == 4 || len == 8,
            _ => len == self.natural_length(),
        }
    }
}

macro_rules! coded_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $code:literal => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        #[repr(u8)]
        pub enum $name {
            #[default]
            $($variant = $code),+
        }

        impl $name {
            pub fn from_code(code: u8) -> Option<$name> {
                match code {
                    $($code => Some($name::$variant),)+
                    _ => None,
                }
            }

            pub fn code(self) -> u8 {
                self as u8
            }

            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn from_name(name: &str) -> Option<$name> {
                match name {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

coded_enum!(
    /// informationElementUnits codes.
    Units {
        None = 0 => "none",
        Bits = 1 => "bits",
        Octets = 2 => "octets",
        Packets = 3 => "packets",
        Flows = 4 => "flows",
        Seconds = 5 => "seconds",
        Milliseconds = 6 => "milliseconds",
        Microseconds = 7 => "microseconds",
        Nanoseconds = 8 => "nanoseconds",
        Words = 9 => "words",
        Messages = 10 => "messages",
        Hops = 11 => "hops",
        Entries = 12 => "entries",
    }
);

coded_enum!(
    /// informationElementSemantics codes.
    Semantic {
        Default = 0 => "default",
        Quantity = 1 => "quantity",
        TotalCounter = 2 => "totalCounter",
        DeltaCounter = 3 => "deltaCounter",
        Identifier = 4 => "identifier",
        Flags = 5 => "flags",
        List = 6 => "list",
    }
);

/// How a record field is stored: inline, or as one of the RFC 6313 lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldKind {
    #[default]
    Plain,
    BasicList,
    SubTemplateList,
    SubTemplateMultiList,
}

impl FieldKind {
    pub fn of(dt: DataType) -> FieldKind {
        match dt {
            DataType::BasicList => FieldKind::BasicList,
            DataType::SubTemplateList => FieldKind::SubTemplateList,
            DataType::SubTemplateMultiList => FieldKind::SubTemplateMultiList,
            _ => FieldKind::Plain,
        }
    }

    pub fn is_list(self) -> bool {
        self != FieldKind::Plain
    }

    /// Standard element carrying this list kind.
    pub fn element_name(self) -> Option<&'static str> {
        match self {
            FieldKind::Plain => None,
            FieldKind::BasicList => Some("basicList"),
            FieldKind::SubTemplateList => Some("subTemplateList"),
            FieldKind::SubTemplateMultiList => Some("subTemplateMultiList"),
        }
    }

    pub fn slot(self) -> u16 {
        match self {
            FieldKind::Plain => VARFIELD_SLOT,
            FieldKind::BasicList => BASIC_LIST_SLOT,
            FieldKind::SubTemplateList => SUB_TEMPLATE_LIST_SLOT,
            FieldKind::SubTemplateMultiList => SUB_TEMPLATE_MULTI_LIST_SLOT,
        }
    }
}

/// A typed field definition, identified by (enterprise number, element id).
#[derive(Debug, Clone, PartialEq)]
pub struct InfoElement {
    pub name: String,
    pub ent: u32,
    pub id: u16,
    pub length: u16,
    pub data_type: DataType,
    pub units: Units,
    pub semantic: Semantic,
    pub min: u64,
    pub max: u64,
    pub reversible: bool,
    pub endian: bool,
    pub description: Option<String>,
}

impl InfoElement {
    /// A variable-length octetArray element; refine it with the builder methods.
    pub fn new(name: impl Into<String>, ent: u32, id: u16) -> Self {
        InfoElement {
            name: name.into(),
            ent,
            id: id & 0x7fff,
            length: VARLEN,
            data_type: DataType::OctetArray,
            units: Units::None,
            semantic: Semantic::Default,
            min: 0,
            max: 0,
            reversible: false,
            endian: false,
            description: None,
        }
    }

    pub fn length(mut self, length: u16) -> Self {
        self.length = length;
        self
    }

    /// Set the datatype; a still-variable length adopts the type's natural length.
    pub fn data_type(mut self, dt: DataType) -> Self {
        self.data_type = dt;
        if self.length == VARLEN {
            self.length = dt.natural_length();
        }
        self
    }

    pub fn endian(mut self) -> Self {
        self.endian = true;
        self
    }

    pub fn reversible(mut self) -> Self {
        self.reversible = true;
        self
    }

    pub fn units(mut self, units: Units) -> Self {
        self.units = units;
        self
    }

    pub fn semantic(mut self, semantic: Semantic) -> Self {
        self.semantic = semantic;
        self
    }

    pub fn range(mut self, min: u64, max: u64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn is_varlen(&self) -> bool {
        self.length == VARLEN
    }

    /// Identity key used by registries and template matching.
    pub fn key(&self) -> (u32, u16) {
        (self.ent, self.id)
    }

    /// Shadow element for the reverse direction of a biflow.
    pub fn reverse(&self) -> Option<InfoElement> {
        if !self.reversible {
            return None;
        }
        let mut rev = self.clone();
        let mut chars = self.name.chars();
        let capitalized = match chars.next() {
            Some(c) => c.to_uppercase().chain(chars).collect::<String>(),
            None => String::new(),
        };
        rev.name = format!("reverse{}", capitalized);
        rev.reversible = false;
        if self.ent == 0 {
            rev.ent = REVERSE_PEN;
        } else {
            rev.id |= REVERSE_ID_BIT;
        }
        Some(rev)
    }
}

#[derive(Default)]
struct Registry {
    by_name: HashMap<String, Arc<InfoElement>>,
    by_id: HashMap<(u32, u16), Arc<InfoElement>>,
}

impl Registry {
    fn insert(&mut self, ie: InfoElement) -> Arc<InfoElement> {
        let ie = Arc::new(ie);
        self.by_name.insert(ie.name.clone(), ie.clone());
        self.by_id.insert(ie.key(), ie.clone());
        ie
    }
}

/// Registry of Information Elements, shared by every clone of the handle.
#[derive(Clone)]
pub struct InfoModel {
    inner: Arc<RwLock<Registry>>,
}

impl std::fmt::Debug for InfoModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfoModel").field("elements", &self.len()).finish()
    }
}

impl Default for InfoModel {
    fn default() -> Self {
        InfoModel::new()
    }
}

impl InfoModel {
    /// Model preloaded with the built-in IANA element subset.
    pub fn new() -> Self {
        let model = InfoModel::empty();
        if let Err(e) = model.load_str(IANA_REGISTRY) {
            log::error!("built-in element registry failed to load: {}", e);
        }
        model
    }

    pub fn empty() -> Self {
        InfoModel {
            inner: Arc::new(RwLock::new(Registry::default())),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// True when both handles refer to the same registry.
    pub fn same_as(&self, other: &InfoModel) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Register `ie` (and its reverse, if reversible). A later element with the
    /// same (ent, id) replaces the earlier one for id lookups.
    pub fn add_element(&self, ie: InfoElement) -> Arc<InfoElement> {
        let reverse = ie.reverse();
        let mut reg = self.write();
        if let Some(old) = reg.by_id.get(&ie.key()) {
            if old.name != ie.name {
                log::debug!("element {}:{} {} replaces {}", ie.ent, ie.id, ie.name, old.name);
            }
        }
        let added = reg.insert(ie);
        if let Some(rev) = reverse {
            reg.insert(rev);
        }
        added
    }

    /// Register every present element, skipping `None` entries.
    pub fn add_element_list<I, T>(&self, list: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<Option<InfoElement>>,
    {
        for ie in list.into_iter().filter_map(Into::into) {
            self.add_element(ie);
        }
    }

    /// Lookup by name; `None` when unknown.
    pub fn get_element(&self, name: &str) -> Option<Arc<InfoElement>> {
        self.read().by_name.get(name).cloned()
    }

    /// Lookup by name, failing with `NotFound` when unknown.
    pub fn element(&self, name: &str) -> Result<Arc<InfoElement>, CodecError> {
        self.get_element(name)
            .ok_or_else(|| CodecError::NotFound(format!("element {}", name)))
    }

    /// Lookup by (id, enterprise number).
    pub fn element_by_id(&self, id: u16, ent: u32) -> Option<Arc<InfoElement>> {
        self.read().by_id.get(&(ent, id & 0x7fff)).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.read().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wire length of `name` (`VARLEN` for variable-length elements). With a
    /// list kind, the size of the record slot holding that list structure.
    pub fn get_element_length(
        &self,
        name: &str,
        list: Option<FieldKind>,
    ) -> Result<u16, CodecError> {
        let ie = self.element(name)?;
        match list {
            Some(kind) if kind.is_list() => Ok(kind.slot()),
            _ => Ok(ie.length),
        }
    }

    pub fn get_element_type(&self, name: &str) -> Result<DataType, CodecError> {
        Ok(self.element(name)?.data_type)
    }

    /// Element for a wire (id, ent) pair, registering an octetArray stand-in
    /// when the model has never heard of it.
    pub fn element_or_alien(&self, id: u16, ent: u32, length: u16) -> Arc<InfoElement> {
        if let Some(ie) = self.element_by_id(id, ent) {
            return ie;
        }
        let name = format!("_alien_{}_{}", ent, id & 0x7fff);
        log::debug!("registering unknown element {}:{} as {}", ent, id, name);
        self.add_element(InfoElement::new(name, ent, id).length(length))
    }

    /// Register the element described by an RFC 5610 type-information record.
    pub fn add_options_element(&self, rec: &Record) -> Result<Arc<InfoElement>, CodecError> {
        let name = match rec.get("informationElementName")? {
            Value::String(s) => s,
            Value::Bytes(b) => String::from_utf8_lossy(&b).into_owned(),
            other => return Err(CodecError::TypeMismatch(format!("element name {:?}", other))),
        };
        let ent = uint_field(rec, "privateEnterpriseNumber")? as u32;
        let id = uint_field(rec, "informationElementId")? as u16;
        let dt_code = uint_field(rec, "informationElementDataType")? as u8;
        let data_type = DataType::from_code(dt_code).unwrap_or(DataType::OctetArray);
        let semantic =
            Semantic::from_code(uint_field(rec, "informationElementSemantics")? as u8)
                .unwrap_or_default();
        let units = Units::from_code(uint_field(rec, "informationElementUnits")? as u8)
            .unwrap_or_default();
        let min = uint_field(rec, "informationElementRangeBegin").unwrap_or(0);
        let max = uint_field(rec, "informationElementRangeEnd").unwrap_or(0);
        let mut ie = InfoElement::new(name, ent, id)
            .data_type(data_type)
            .semantic(semantic)
            .units(units)
            .range(min, max);
        if data_type.is_integral() || data_type.is_float() || data_type == DataType::Ipv4Address {
            ie = ie.endian();
        }
        if let Ok(desc) = rec.get("informationElementDescription") {
            match desc {
                Value::String(s) if !s.is_empty() => ie = ie.description(s),
                Value::Bytes(b) if !b.is_empty() => {
                    ie = ie.description(String::from_utf8_lossy(&b).into_owned())
                }
                _ => {}
            }
        }
        log::debug!("options record defines {} ({}:{})", ie.name, ie.ent, ie.id);
        Ok(self.add_element(ie))
    }

    /// Register every element of a registry file body; returns how many were added.
    pub fn load_str(&self, src: &str) -> Result<usize, CodecError> {
        let elements = crate::parser::parse_registry(src).map_err(CodecError::Parse)?;
        let n = elements.len();
        self.add_element_list(elements);
        Ok(n)
    }

    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<usize, CodecError> {
        let src = std::fs::read_to_string(path)?;
        self.load_str(&src)
    }
}

fn uint_field(rec: &Record, name: &str) -> Result<u64, CodecError> {
    rec.get(name)?
        .as_u64()
        .ok_or_else(|| CodecError::TypeMismatch(format!("{} is not an unsigned integer", name)))
}
