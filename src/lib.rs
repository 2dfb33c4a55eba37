//! # ipfixcodec: IPFIX (RFC 7011) record transcoding
//!
//! Reads and writes IPFIX messages one record at a time, including the
//! RFC 6313 structured data types (basicList, subTemplateList,
//! subTemplateMultiList) and RFC 5610 type-information options records.
//!
//! ## Building blocks
//!
//! - **InfoModel**: registry of Information Elements, loaded from the compiled-in
//!   IANA subset and from registry files written in a small text format
//! - **Template**: ordered element layout, optionally with reduced lengths
//! - **Session**: internal (application) and external (wire) template namespaces
//! - **Record**: one data record with typed field access by name, occurrence or position
//! - **Buffer**: collector or exporter driving the message framing
//!
//! ## Registry format
//!
//! ```text
//! # name            [ent:]id  type        [length] flags
//! sourceTransportPort  7      unsigned16  endian semantic(identifier);
//! myCounter         6871:100  unsigned64  endian reversible units(octets);
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use ipfixcodec::{Buffer, Exporter, InfoModel, Record, Session, Template};
//!
//! let model = InfoModel::new();
//! let mut template = Template::new(&model);
//! template.add_element("sourceTransportPort")?;
//! template.add_element("octetTotalCount")?;
//! let mut session = Session::new(&model);
//! let tid = session.add_template(&mut template, 0)?;
//!
//! let mut rec = Record::from_template(&model, &template);
//! rec.set("sourceTransportPort", 80u16)?;
//! rec.set("octetTotalCount", 1500u64)?;
//!
//! let mut buf = Buffer::new();
//! buf.init_export(session, Exporter::create("flows.ipfix")?)?;
//! buf.set_internal_template(tid)?;
//! buf.set_export_template(tid)?;
//! buf.append(&rec)?;
//! buf.emit()?;
//! # Ok::<(), ipfixcodec::CodecError>(())
//! ```
//!
//! See `tests/integration.rs` for collection and nested-list examples.

pub mod buffer;
pub mod codec;
pub mod dump;
pub mod frame;
pub mod list;
pub mod model;
pub mod parser;
pub mod record;
pub mod session;
pub mod template;
pub mod transcode;
pub mod value;

pub use buffer::{Buffer, Collector, Exporter};
pub use codec::{CodecError, Endianness};
pub use frame::{split_messages, FrameScan};
pub use list::{create_stml_from_list, BasicList, ListSemantic, StmlEntry, SubTemplateList, SubTemplateMultiList};
pub use model::{DataType, FieldKind, InfoElement, InfoModel, Semantic, Units, CERT_PEN, REVERSE_PEN, VARLEN};
pub use parser::parse_registry;
pub use record::{FieldDef, FieldKey, Key, Record};
pub use session::Session;
pub use template::{InfoElementSpec, Template, TemplateField};
pub use value::Value;
