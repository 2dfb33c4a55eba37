//! Template registry shared by a collecting or exporting buffer.

use crate::codec::CodecError;
use crate::model::InfoModel;
use crate::template::Template;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// First template id available to data sets (RFC 7011 section 3.4.1).
pub const MIN_TEMPLATE_ID: u16 = 256;

/// What to do with a nested list entry carrying a given external template id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NestedAction {
    Drop,
    /// Transcode with this internal template id.
    Decode(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Namespace {
    Internal,
    External,
    Both,
}

/// Internal (application-facing) and external (wire) template namespaces.
#[derive(Debug, Clone)]
pub struct Session {
    model: InfoModel,
    internal: HashMap<u16, Arc<Template>>,
    external: HashMap<u16, Arc<Template>>,
    decode_only: HashSet<u16>,
    ignore: HashSet<u16>,
    pairs: HashMap<u16, u16>,
    domain: u32,
    sequence: u32,
}

impl Session {
    pub fn new(model: &InfoModel) -> Self {
        Session {
            model: model.clone(),
            internal: HashMap::new(),
            external: HashMap::new(),
            decode_only: HashSet::new(),
            ignore: HashSet::new(),
            pairs: HashMap::new(),
            domain: 0,
            sequence: 0,
        }
    }

    pub fn model(&self) -> &InfoModel {
        &self.model
    }

    /// Register `template` as both internal and external; `id` 0 auto-assigns.
    pub fn add_template(&mut self, template: &mut Template, id: u32) -> Result<u16, CodecError> {
        self.register(template, id, Namespace::Both)
    }

    pub fn add_internal_template(
        &mut self,
        template: &mut Template,
        id: u32,
    ) -> Result<u16, CodecError> {
        self.register(template, id, Namespace::Internal)
    }

    pub fn add_external_template(
        &mut self,
        template: &mut Template,
        id: u32,
    ) -> Result<u16, CodecError> {
        self.register(template, id, Namespace::External)
    }

    fn register(
        &mut self,
        template: &mut Template,
        id: u32,
        ns: Namespace,
    ) -> Result<u16, CodecError> {
        if !template.model().same_as(&self.model) {
            log::debug!("template built on a different information model");
        }
        let tid = match id {
            0 => self.next_free_id(ns)?,
            id if id > u16::MAX as u32 || id < MIN_TEMPLATE_ID as u32 => {
                return Err(CodecError::InvalidTemplateId(id))
            }
            id => id as u16,
        };
        template.finalize(tid);
        let shared = Arc::new(template.clone());
        if ns != Namespace::External {
            self.internal.insert(tid, shared.clone());
        }
        if ns != Namespace::Internal {
            self.external.insert(tid, shared);
        }
        log::debug!(
            "registered template {} ({} fields, {:?})",
            tid,
            template.len(),
            ns
        );
        Ok(tid)
    }

    fn next_free_id(&self, ns: Namespace) -> Result<u16, CodecError> {
        (MIN_TEMPLATE_ID..=u16::MAX)
            .find(|id| {
                let int_free = ns == Namespace::External || !self.internal.contains_key(id);
                let ext_free = ns == Namespace::Internal || !self.external.contains_key(id);
                int_free && ext_free
            })
            .ok_or_else(|| CodecError::InvalidTemplateId(0))
    }

    /// Template registered under `id` in the requested namespace.
    pub fn get_template(&self, id: u16, internal: bool) -> Result<Arc<Template>, CodecError> {
        let map = if internal { &self.internal } else { &self.external };
        map.get(&id).cloned().ok_or_else(|| {
            CodecError::NotFound(format!(
                "{} template {}",
                if internal { "internal" } else { "external" },
                id
            ))
        })
    }

    pub fn has_internal(&self, id: u16) -> bool {
        self.internal.contains_key(&id)
    }

    pub fn has_external(&self, id: u16) -> bool {
        self.external.contains_key(&id)
    }

    /// Ids of the external namespace, sorted.
    pub fn external_ids(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.external.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Store a template received on the wire, replacing any earlier definition.
    pub(crate) fn insert_external(&mut self, template: Template) -> Arc<Template> {
        let tid = template.template_id();
        let shared = Arc::new(template);
        if let Some(old) = self.external.insert(tid, shared.clone()) {
            if !old.same_layout(&shared) {
                log::debug!("external template {} redefined", tid);
                // an internal template derived from the old layout no longer applies
                if self.internal.get(&tid).map_or(false, |t| t.same_layout(&old)) {
                    self.internal.remove(&tid);
                }
            }
        }
        shared
    }

    /// Only decode nested entries whose template id is listed.
    pub fn decode_only(&mut self, ids: &[u16]) {
        self.decode_only.extend(ids.iter().copied());
    }

    /// Drop nested entries whose template id is listed.
    pub fn ignore_templates(&mut self, ids: &[u16]) {
        self.ignore.extend(ids.iter().copied());
    }

    /// Decode nested entries of `external_id` with `internal_id` (0 = drop them).
    /// Once any pair exists, nested entries with an unpaired id are dropped.
    pub fn add_template_pair(&mut self, external_id: u16, internal_id: u16) -> Result<(), CodecError> {
        if internal_id != 0 && !self.internal.contains_key(&internal_id) {
            return Err(CodecError::NotRegistered(internal_id));
        }
        self.pairs.insert(external_id, internal_id);
        Ok(())
    }

    pub(crate) fn nested_action(&self, external_id: u16) -> NestedAction {
        if let Some(&internal) = self.pairs.get(&external_id) {
            return match internal {
                0 => NestedAction::Drop,
                id => NestedAction::Decode(id),
            };
        }
        if !self.pairs.is_empty()
            || self.ignore.contains(&external_id)
            || (!self.decode_only.is_empty() && !self.decode_only.contains(&external_id))
        {
            return NestedAction::Drop;
        }
        NestedAction::Decode(external_id)
    }

    /// Internal template for decoding `id`, derived from the external
    /// template and memoized on first use.
    pub(crate) fn internal_for(&mut self, id: u16) -> Result<Arc<Template>, CodecError> {
        if let Some(t) = self.internal.get(&id) {
            return Ok(t.clone());
        }
        let ext = self.external.get(&id).ok_or(CodecError::NotRegistered(id))?;
        let mut derived = Template::clone(ext);
        derived.build_spec_list();
        derived.finalize(id);
        log::debug!("auto-generated internal template {}", id);
        let shared = Arc::new(derived);
        self.internal.insert(id, shared.clone());
        Ok(shared)
    }

    pub fn set_domain(&mut self, domain: u32) {
        self.domain = domain;
    }

    /// Observation domain id written to (or last read from) message headers.
    pub fn domain(&self) -> u32 {
        self.domain
    }

    /// Sequence number: data records exported so far, or expected next on collection.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub(crate) fn set_sequence(&mut self, sequence: u32) {
        self.sequence = sequence;
    }
}
