//! Templates: ordered element layouts, built locally from specs or received on the wire.

use crate::codec::CodecError;
use crate::model::{InfoElement, InfoModel, VARLEN};
use std::sync::Arc;

/// Reference to an element by name, with an optional reduced length (0 = default).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoElementSpec {
    pub name: String,
    pub length: u16,
}

impl InfoElementSpec {
    pub fn new(name: impl Into<String>) -> Self {
        InfoElementSpec {
            name: name.into(),
            length: 0,
        }
    }

    pub fn with_length(name: impl Into<String>, length: u16) -> Self {
        InfoElementSpec {
            name: name.into(),
            length,
        }
    }
}

/// A resolved template field: the element and its wire length (`VARLEN` for varfields).
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateField {
    pub ie: Arc<InfoElement>,
    pub length: u16,
}

impl TemplateField {
    pub fn is_varlen(&self) -> bool {
        self.length == VARLEN
    }
}

/// RFC 5610 type-information options layout; the first two fields are the scope.
const OPTIONS_LAYOUT: [(&str, u16); 10] = [
    ("privateEnterpriseNumber", 0),
    ("informationElementId", 0),
    ("informationElementDataType", 0),
    ("informationElementSemantics", 0),
    ("informationElementUnits", 0),
    ("paddingOctets", 6),
    ("informationElementRangeBegin", 0),
    ("informationElementRangeEnd", 0),
    ("informationElementName", 0),
    ("informationElementDescription", 0),
];

/// Ordered field layout. Mutable until registered with a [`crate::Session`].
#[derive(Debug, Clone)]
pub struct Template {
    model: InfoModel,
    specs: Vec<InfoElementSpec>,
    fields: Vec<TemplateField>,
    scope: u16,
    options: bool,
    template_id: u16,
    finalized: bool,
}

impl Template {
    pub fn new(model: &InfoModel) -> Self {
        Template {
            model: model.clone(),
            specs: Vec::new(),
            fields: Vec::new(),
            scope: 0,
            options: false,
            template_id: 0,
            finalized: false,
        }
    }

    /// Information Element Type options template (RFC 5610), scope count 2.
    pub fn new_options(model: &InfoModel) -> Result<Self, CodecError> {
        let mut t = Template::new(model);
        for (name, length) in OPTIONS_LAYOUT {
            let ie = model
                .get_element(name)
                .ok_or_else(|| CodecError::UnknownElement(name.to_string()))?;
            let wire = if length == 0 { ie.length } else { length };
            t.specs.push(InfoElementSpec::with_length(name, length));
            t.fields.push(TemplateField { ie, length: wire });
        }
        t.scope = 2;
        t.options = true;
        Ok(t)
    }

    /// Template received from a peer: resolved fields, no specs until
    /// [`Template::build_spec_list`].
    pub(crate) fn from_wire(
        model: &InfoModel,
        template_id: u16,
        fields: Vec<TemplateField>,
        scope: u16,
    ) -> Self {
        Template {
            model: model.clone(),
            specs: Vec::new(),
            fields,
            scope,
            options: scope > 0,
            template_id,
            finalized: true,
        }
    }

    pub fn add_spec(&mut self, spec: InfoElementSpec) -> Result<(), CodecError> {
        if self.finalized {
            return Err(CodecError::AlreadyFinalized);
        }
        let field = self.resolve(&spec)?;
        self.specs.push(spec);
        self.fields.push(field);
        Ok(())
    }

    /// Add every spec; stops at the first invalid one.
    pub fn add_spec_list<I>(&mut self, specs: I) -> Result<(), CodecError>
    where
        I: IntoIterator<Item = InfoElementSpec>,
    {
        if self.finalized {
            return Err(CodecError::AlreadyFinalized);
        }
        for spec in specs {
            self.add_spec(spec)?;
        }
        Ok(())
    }

    /// Add an element by name at its default length.
    pub fn add_element(&mut self, name: &str) -> Result<(), CodecError> {
        self.add_spec(InfoElementSpec::new(name))
    }

    fn resolve(&self, spec: &InfoElementSpec) -> Result<TemplateField, CodecError> {
        let ie = self
            .model
            .get_element(&spec.name)
            .ok_or_else(|| CodecError::UnknownElement(spec.name.clone()))?;
        if spec.length == 0 {
            return Ok(TemplateField {
                length: ie.length,
                ie,
            });
        }
        if spec.length > ie.length {
            return Err(CodecError::InvalidSpec(format!(
                "{}: length {} exceeds the element length {}",
                spec.name, spec.length, ie.length
            )));
        }
        if !ie.data_type.allows_reduced_length(spec.length) {
            return Err(CodecError::InvalidSpec(format!(
                "{}: {} does not support a length of {}",
                spec.name,
                ie.data_type.name(),
                spec.length
            )));
        }
        Ok(TemplateField {
            length: spec.length,
            ie,
        })
    }

    /// Spec with the given element name (first match).
    pub fn get(&self, name: &str) -> Result<&InfoElementSpec, CodecError> {
        self.specs
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| CodecError::NotFound(format!("no spec named {}", name)))
    }

    pub fn spec(&self, index: usize) -> Result<&InfoElementSpec, CodecError> {
        self.specs.get(index).ok_or(CodecError::IndexOutOfRange {
            index,
            count: self.specs.len(),
        })
    }

    pub fn specs(&self) -> &[InfoElementSpec] {
        &self.specs
    }

    pub fn fields(&self) -> &[TemplateField] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&TemplateField> {
        self.fields.get(index)
    }

    /// Rebuild the spec list from the resolved fields.
    pub fn build_spec_list(&mut self) -> &[InfoElementSpec] {
        self.specs = self
            .fields
            .iter()
            .map(|f| {
                if f.is_varlen() || f.length == f.ie.length {
                    InfoElementSpec::new(f.ie.name.clone())
                } else {
                    InfoElementSpec::with_length(f.ie.name.clone(), f.length)
                }
            })
            .collect();
        &self.specs
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.ie.name == name)
    }

    pub fn contains_element(&self, ie: &InfoElement) -> bool {
        self.fields.iter().any(|f| f.ie.key() == ie.key())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn scope(&self) -> u16 {
        self.scope
    }

    pub fn set_scope(&mut self, scope: u16) -> Result<(), CodecError> {
        if self.finalized {
            return Err(CodecError::AlreadyFinalized);
        }
        if scope as usize > self.fields.len() {
            return Err(CodecError::InvalidSpec(format!(
                "scope {} exceeds {} fields",
                scope,
                self.fields.len()
            )));
        }
        self.scope = scope;
        self.options = scope > 0;
        Ok(())
    }

    pub fn is_options(&self) -> bool {
        self.options
    }

    /// Id assigned by the last session registration (0 if never registered).
    pub fn template_id(&self) -> u16 {
        self.template_id
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn model(&self) -> &InfoModel {
        &self.model
    }

    pub(crate) fn finalize(&mut self, template_id: u16) {
        self.template_id = template_id;
        self.finalized = true;
    }

    /// Smallest encoded size of one record (one prefix byte per varfield).
    pub fn min_record_length(&self) -> usize {
        self.fields
            .iter()
            .map(|f| if f.is_varlen() { 1 } else { f.length as usize })
            .sum()
    }

    /// Same fields at the same lengths.
    pub fn same_layout(&self, other: &Template) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(a, b)| a.ie.key() == b.ie.key() && a.length == b.length)
    }
}
