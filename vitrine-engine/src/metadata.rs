//! Metadata extraction engine.
//!
//! For every definition that applies to a node, the definition's template is
//! rendered by substituting `{Token}` placeholders. A token resolves to:
//!
//! 1. a value computed from the node's own fields, for the kinds that are not
//!    file-derived ([`MetadataKind::is_computed`]);
//! 2. a value freshly read by the [`MetadataExtractor`], when extraction is
//!    enabled for the gallery;
//! 3. a value produced earlier in the same run (definitions run in sequence
//!    order, so templated kinds can build on each other);
//! 4. the value already materialized on the node.
//!
//! Rendered text is sanitized except for [`MetadataKind::HtmlSource`], then
//! committed to the node's [`MetadataCollection`] under a [`CommitMode`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use vitrine_core::{
    GallerySettings, LeafKind, MetadataDefinition, MetadataKind, MetadataRecord, NodeId, NodeKind,
    NodeRecord, RenditionKind, Timestamp, VitrineResult,
};

use crate::context::EngineContext;
use crate::node::Node;
use crate::tree::NodeData;

static TOKEN: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| Regex::new(r"\{([A-Za-z_]+)\}"));

static SCRIPT_BLOCK: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>"));

static TAG: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>"));

// ============================================================================
// METADATA COLLECTION
// ============================================================================

/// One metadata item as held by a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataItem {
    pub record: MetadataRecord,
    /// Changed since it was loaded or last persisted.
    pub has_changes: bool,
    /// Marked for removal on the next save.
    pub is_deleted: bool,
}

impl MetadataItem {
    pub fn kind(&self) -> MetadataKind {
        self.record.kind
    }

    pub fn value(&self) -> &str {
        &self.record.value
    }
}

/// Metadata of one node, unique per kind, ordered by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataCollection {
    items: Vec<MetadataItem>,
}

impl MetadataCollection {
    pub fn from_records(mut records: Vec<MetadataRecord>) -> Self {
        records.sort_by_key(|r| r.kind);
        records.dedup_by_key(|r| r.kind);
        Self {
            items: records
                .into_iter()
                .map(|record| MetadataItem {
                    record,
                    has_changes: false,
                    is_deleted: false,
                })
                .collect(),
        }
    }

    /// Live item of `kind`.
    pub fn get(&self, kind: MetadataKind) -> Option<&MetadataItem> {
        self.items.iter().find(|i| i.record.kind == kind && !i.is_deleted)
    }

    pub fn value(&self, kind: MetadataKind) -> Option<&str> {
        self.get(kind).map(|i| i.record.value.as_str())
    }

    /// Set the value of `kind`, reviving a deleted item or adding a new one.
    /// Returns whether anything changed.
    pub fn set(&mut self, kind: MetadataKind, value: &str, raw_value: Option<String>) -> bool {
        match self.items.binary_search_by_key(&kind, |i| i.record.kind) {
            Ok(pos) => {
                let item = &mut self.items[pos];
                if item.record.value == value && !item.is_deleted && item.record.raw_value == raw_value {
                    return false;
                }
                item.record.value = value.to_string();
                item.record.raw_value = raw_value;
                item.is_deleted = false;
                item.has_changes = true;
                true
            }
            Err(pos) => {
                self.items.insert(
                    pos,
                    MetadataItem {
                        record: MetadataRecord {
                            id: 0,
                            node_id: NodeId::NEW,
                            kind,
                            raw_value,
                            value: value.to_string(),
                        },
                        has_changes: true,
                        is_deleted: false,
                    },
                );
                true
            }
        }
    }

    /// Mark the item of `kind` for removal. Returns whether one was live.
    pub fn mark_deleted(&mut self, kind: MetadataKind) -> bool {
        match self
            .items
            .iter_mut()
            .find(|i| i.record.kind == kind && !i.is_deleted)
        {
            Some(item) => {
                item.is_deleted = true;
                true
            }
            None => false,
        }
    }

    /// Live items.
    pub fn iter(&self) -> impl Iterator<Item = &MetadataItem> {
        self.items.iter().filter(|i| !i.is_deleted)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn items_mut(&mut self) -> &mut Vec<MetadataItem> {
        &mut self.items
    }

    /// Items that need a store write: deleted ones, changed ones and ones
    /// never inserted.
    pub(crate) fn pending(&self) -> Vec<MetadataItem> {
        self.items
            .iter()
            .filter(|i| i.is_deleted || i.has_changes || i.record.id == 0)
            .cloned()
            .collect()
    }

    /// The same values as brand-new items, for a copied node.
    pub(crate) fn duplicated(&self) -> Self {
        Self {
            items: self
                .iter()
                .map(|i| MetadataItem {
                    record: MetadataRecord {
                        id: 0,
                        node_id: NodeId::NEW,
                        ..i.record.clone()
                    },
                    has_changes: true,
                    is_deleted: false,
                })
                .collect(),
        }
    }
}

// ============================================================================
// EXTRACTION AND SANITIZING
// ============================================================================

/// A value read from a media file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedValue {
    /// Unformatted value, when it differs from `formatted`.
    pub raw: Option<String>,
    pub formatted: String,
}

impl ExtractedValue {
    pub fn new(formatted: impl Into<String>) -> Self {
        Self {
            raw: None,
            formatted: formatted.into(),
        }
    }

    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = Some(raw.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionRequest<'a> {
    pub node_id: NodeId,
    pub leaf_kind: LeafKind,
    pub file_name: &'a str,
    /// Absolute path of the original, when it could be derived.
    pub original_path: Option<&'a Path>,
}

/// Reads metadata (EXIF, tags, dimensions, ...) from a leaf's original file.
pub trait MetadataExtractor: Send + Sync {
    fn extract(
        &self,
        request: &ExtractionRequest<'_>,
    ) -> VitrineResult<HashMap<MetadataKind, ExtractedValue>>;
}

/// Extractor that finds nothing. Computed kinds still resolve.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExtractor;

impl MetadataExtractor for NoopExtractor {
    fn extract(
        &self,
        _request: &ExtractionRequest<'_>,
    ) -> VitrineResult<HashMap<MetadataKind, ExtractedValue>> {
        Ok(HashMap::new())
    }
}

/// Strips markup from text that came out of media files or user input.
pub trait Sanitizer: Send + Sync {
    fn sanitize(&self, input: &str) -> String;
}

/// Removes `<script>`/`<style>` blocks and every remaining tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlTagStripper;

impl Sanitizer for HtmlTagStripper {
    fn sanitize(&self, input: &str) -> String {
        match (SCRIPT_BLOCK.as_ref(), TAG.as_ref()) {
            (Ok(block), Ok(tag)) => {
                let without_blocks = block.replace_all(input, "");
                tag.replace_all(&without_blocks, "").into_owned()
            }
            _ => input.replace('<', "&lt;").replace('>', "&gt;"),
        }
    }
}

// ============================================================================
// TEMPLATES
// ============================================================================

/// Render `template`, resolving each `{Token}` through `lookup`.
///
/// Unknown tokens are left as written. A template whose tokens all resolve
/// to nothing renders as the empty string, so `"{Width} x {Height}"` does not
/// leave a bare `"x"` behind.
pub fn render_template<F>(template: &str, mut lookup: F) -> String
where
    F: FnMut(MetadataKind) -> Option<String>,
{
    let Ok(token) = TOKEN.as_ref() else {
        tracing::error!("metadata token pattern failed to compile");
        return template.to_string();
    };

    let mut tokens = 0usize;
    let mut resolved = 0usize;
    let rendered = token.replace_all(template, |caps: &regex::Captures<'_>| {
        match caps[1].parse::<MetadataKind>() {
            Ok(kind) => {
                tokens += 1;
                let value = lookup(kind).unwrap_or_default();
                if !value.trim().is_empty() {
                    resolved += 1;
                }
                value
            }
            Err(_) => caps[0].to_string(),
        }
    });

    if tokens > 0 && resolved == 0 {
        return String::new();
    }
    rendered.trim().to_string()
}

/// Whether a rendered value overwrites an existing item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitMode {
    /// Re-inflation and synchronization: an empty render never blanks a
    /// container's Title or Caption.
    #[default]
    Routine,
    /// As `Routine`, except an empty render also resets a container's Title
    /// and Caption to the empty string.
    Full,
}

/// What a commit changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetadataSummary {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl MetadataSummary {
    pub fn changed(&self) -> bool {
        self.added + self.updated + self.deleted > 0
    }
}

/// A rendered definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Candidate {
    pub kind: MetadataKind,
    pub value: String,
    pub raw: Option<String>,
}

/// The node fields computed kinds are derived from.
#[derive(Debug, Clone)]
pub(crate) struct NodeFacts {
    pub kind: NodeKind,
    pub file_name: Option<String>,
    pub size_kb: Option<u64>,
    pub date_added: Timestamp,
    pub external_html: Option<String>,
}

impl NodeFacts {
    pub fn of(data: &NodeData) -> Self {
        match &data.record {
            NodeRecord::Album(a) => Self {
                kind: NodeKind::Container,
                file_name: None,
                size_kb: None,
                date_added: a.date_added,
                external_html: None,
            },
            NodeRecord::Media(m) => Self {
                kind: NodeKind::Leaf,
                file_name: Some(m.original.file_name.clone()).filter(|f| !f.is_empty()),
                size_kb: Some(m.original.size_kb),
                date_added: m.date_added,
                external_html: m.external_html.clone(),
            },
        }
    }

    fn computed(&self, kind: MetadataKind) -> Option<String> {
        match kind {
            MetadataKind::FileName => self.file_name.clone(),
            MetadataKind::FileNameWithoutExtension => {
                self.file_name.as_deref().map(|f| file_stem(f).to_string())
            }
            MetadataKind::FileSizeKb => self.size_kb.map(|kb| kb.to_string()),
            MetadataKind::DateAdded => Some(self.date_added.format("%Y-%m-%d %H:%M:%S").to_string()),
            MetadataKind::HtmlSource => self.external_html.clone(),
            _ => None,
        }
    }
}

/// `"beach.jpg"` → `"beach"`. Names without an extension come back whole.
pub(crate) fn file_stem(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(pos) if pos > 0 => &file_name[..pos],
        _ => file_name,
    }
}

/// Render every applicable definition, in sequence order.
pub(crate) fn build_candidates(
    definitions: &[MetadataDefinition],
    facts: &NodeFacts,
    existing: &MetadataCollection,
    extracted: &HashMap<MetadataKind, ExtractedValue>,
    extract_enabled: bool,
    sanitizer: &dyn Sanitizer,
) -> Vec<Candidate> {
    let mut ordered: Vec<&MetadataDefinition> = definitions
        .iter()
        .filter(|d| d.applies_to(facts.kind))
        .collect();
    ordered.sort_by_key(|d| d.sequence);

    let mut resolved: HashMap<MetadataKind, String> = HashMap::new();
    let mut candidates = Vec::with_capacity(ordered.len());

    for definition in ordered {
        let rendered = render_template(&definition.template, |token| {
            if token.is_computed() {
                return facts.computed(token);
            }
            if extract_enabled {
                if let Some(value) = extracted.get(&token) {
                    return Some(value.formatted.clone());
                }
            }
            resolved
                .get(&token)
                .cloned()
                .or_else(|| existing.value(token).map(str::to_string))
        });

        let value = if definition.kind.is_raw_html() {
            rendered
        } else {
            sanitizer.sanitize(&rendered).trim().to_string()
        };

        // The raw value only carries over for a plain `{Kind}` template.
        let raw = if definition.template == format!("{{{}}}", definition.kind.as_str()) {
            extracted
                .get(&definition.kind)
                .filter(|_| extract_enabled)
                .and_then(|v| v.raw.clone())
        } else {
            None
        };

        resolved.insert(definition.kind, value.clone());
        candidates.push(Candidate {
            kind: definition.kind,
            value,
            raw,
        });
    }
    candidates
}

/// Apply rendered values to a collection.
///
/// An existing item takes any non-empty value. An empty value deletes the
/// item unless its kind is required; a required item on a container is reset
/// to empty only under [`CommitMode::Full`]. Missing items are added when
/// non-empty or required.
pub(crate) fn commit(
    collection: &mut MetadataCollection,
    candidates: Vec<Candidate>,
    mode: CommitMode,
    node_kind: NodeKind,
) -> MetadataSummary {
    let mut summary = MetadataSummary::default();

    for candidate in candidates {
        let existing = collection.get(candidate.kind).map(|i| i.record.value.clone());
        match existing {
            Some(current) => {
                if !candidate.value.is_empty() {
                    if collection.set(candidate.kind, &candidate.value, candidate.raw) {
                        summary.updated += 1;
                    }
                } else if !candidate.kind.is_required() {
                    if collection.mark_deleted(candidate.kind) {
                        summary.deleted += 1;
                    }
                } else if mode == CommitMode::Full
                    && node_kind == NodeKind::Container
                    && !current.is_empty()
                    && collection.set(candidate.kind, "", candidate.raw)
                {
                    summary.updated += 1;
                }
            }
            None => {
                if (!candidate.value.is_empty() || candidate.kind.is_required())
                    && collection.set(candidate.kind, &candidate.value, candidate.raw)
                {
                    summary.added += 1;
                }
            }
        }
    }
    summary
}

// ============================================================================
// ENGINE ENTRY POINT
// ============================================================================

impl EngineContext {
    /// Re-render the metadata of `node` and commit it in memory.
    ///
    /// Keeps the legacy scalars in step: the Title item and the title field,
    /// the FileName item and the original file name.
    pub(crate) fn build_metadata(&self, node: &Node, mode: CommitMode) -> VitrineResult<MetadataSummary> {
        node.require_writable()?;
        node.ensure_loaded()?;
        let settings = self.settings(node.gallery_id()?)?;

        let (facts, existing, leaf_kind) = node.tree.read(node.idx, |d| {
            let leaf_kind = match &d.record {
                NodeRecord::Media(m) => m.leaf_kind().ok(),
                NodeRecord::Album(_) => None,
            };
            (NodeFacts::of(d), d.metadata.clone(), leaf_kind)
        })?;

        let extracted = match leaf_kind {
            Some(kind) if settings.extract_metadata && kind.has_original_file() => {
                self.extract_from_file(node, kind, &facts, &settings)
            }
            _ => HashMap::new(),
        };

        let candidates = build_candidates(
            &settings.metadata_definitions,
            &facts,
            &existing,
            &extracted,
            settings.extract_metadata,
            self.sanitizer.as_ref(),
        );

        let observers = self.observers();
        let candidates: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| {
                existing.get(c.kind).is_some()
                    || observers.iter().all(|o| o.before_add_metadata(node, c.kind, &c.value))
            })
            .collect();

        let summary = node.tree.write(node.idx, |d| {
            let kind = d.kind();
            let summary = commit(&mut d.metadata, candidates, mode, kind);
            if let Some(title) = d.metadata.value(MetadataKind::Title).map(str::to_string) {
                if title != d.title() {
                    d.set_title(&title);
                }
            }
            if summary.changed() {
                d.dirty = true;
            }
            summary
        })?;

        tracing::debug!(
            id = %node.id(),
            added = summary.added,
            updated = summary.updated,
            deleted = summary.deleted,
            "metadata built"
        );
        Ok(summary)
    }

    fn extract_from_file(
        &self,
        node: &Node,
        leaf_kind: LeafKind,
        facts: &NodeFacts,
        settings: &Arc<GallerySettings>,
    ) -> HashMap<MetadataKind, ExtractedValue> {
        let file_name = facts.file_name.clone().unwrap_or_default();
        let original_path = node
            .rendition_path_with(settings, RenditionKind::Original)
            .ok()
            .flatten();
        let request = ExtractionRequest {
            node_id: node.id(),
            leaf_kind,
            file_name: &file_name,
            original_path: original_path.as_deref(),
        };
        match self.extractor.extract(&request) {
            Ok(values) => values,
            Err(e) => {
                tracing::warn!(id = %node.id(), error = %e, "metadata extraction failed");
                HashMap::new()
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn leaf_facts() -> NodeFacts {
        NodeFacts {
            kind: NodeKind::Leaf,
            file_name: Some("beach.jpg".to_string()),
            size_kb: Some(2100),
            date_added: Utc::now(),
            external_html: None,
        }
    }

    fn extracted(pairs: &[(MetadataKind, &str)]) -> HashMap<MetadataKind, ExtractedValue> {
        pairs
            .iter()
            .map(|(k, v)| (*k, ExtractedValue::new(*v)))
            .collect()
    }

    #[test]
    fn test_render_substitutes_and_keeps_unknown_tokens() {
        let out = render_template("{Width} x {Height} {Bogus}", |k| match k {
            MetadataKind::Width => Some("640".to_string()),
            MetadataKind::Height => Some("480".to_string()),
            _ => None,
        });
        assert_eq!(out, "640 x 480 {Bogus}");
    }

    #[test]
    fn test_render_all_empty_tokens_is_empty() {
        assert_eq!(render_template("{Width} x {Height}", |_| None), "");
        assert_eq!(render_template("plain text", |_| None), "plain text");
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("beach.jpg"), "beach");
        assert_eq!(file_stem("archive.tar.gz"), "archive.tar");
        assert_eq!(file_stem(".hidden"), ".hidden");
        assert_eq!(file_stem("README"), "README");
    }

    #[test]
    fn test_tag_stripper() {
        let s = HtmlTagStripper;
        assert_eq!(s.sanitize("<b>Bold</b> move"), "Bold move");
        assert_eq!(s.sanitize("a<script>alert(1)</script>b"), "ab");
        assert_eq!(s.sanitize("no markup"), "no markup");
    }

    #[test]
    fn test_computed_kinds_resolve_without_extraction() {
        let defs = MetadataDefinition::defaults();
        let candidates = build_candidates(
            &defs,
            &leaf_facts(),
            &MetadataCollection::default(),
            &extracted(&[(MetadataKind::CameraModel, "X100")]),
            false,
            &HtmlTagStripper,
        );
        let value = |k| candidates.iter().find(|c| c.kind == k).map(|c| c.value.clone());
        assert_eq!(value(MetadataKind::FileName).as_deref(), Some("beach.jpg"));
        assert_eq!(value(MetadataKind::FileNameWithoutExtension).as_deref(), Some("beach"));
        assert_eq!(value(MetadataKind::FileSizeKb).as_deref(), Some("2100 KB"));
        // Extraction disabled: file-derived kinds stay empty.
        assert_eq!(value(MetadataKind::CameraModel).as_deref(), Some(""));
        assert_eq!(value(MetadataKind::Dimensions).as_deref(), Some(""));
    }

    #[test]
    fn test_templates_build_on_earlier_definitions() {
        let defs = vec![
            MetadataDefinition::new(MetadataKind::Width, "{Width}", 1),
            MetadataDefinition::new(MetadataKind::Height, "{Height}", 2),
            MetadataDefinition::new(MetadataKind::Dimensions, "{Width} x {Height}", 3),
            MetadataDefinition::new(MetadataKind::Description, "<i>{Dimensions}</i> px", 4),
        ];
        let candidates = build_candidates(
            &defs,
            &leaf_facts(),
            &MetadataCollection::default(),
            &extracted(&[(MetadataKind::Width, "640"), (MetadataKind::Height, "480")]),
            true,
            &HtmlTagStripper,
        );
        let description = candidates
            .iter()
            .find(|c| c.kind == MetadataKind::Description)
            .map(|c| c.value.as_str());
        assert_eq!(description, Some("640 x 480 px"));
    }

    #[test]
    fn test_html_source_is_not_sanitized() {
        let defs = vec![MetadataDefinition::new(MetadataKind::HtmlSource, "{HtmlSource}", 1)];
        let mut facts = leaf_facts();
        facts.external_html = Some("<iframe src=\"x\"></iframe>".to_string());
        let candidates = build_candidates(
            &defs,
            &facts,
            &MetadataCollection::default(),
            &HashMap::new(),
            true,
            &HtmlTagStripper,
        );
        assert_eq!(candidates[0].value, "<iframe src=\"x\"></iframe>");
    }

    #[test]
    fn test_title_falls_back_to_materialized_value() {
        let defs = vec![MetadataDefinition::new(MetadataKind::Title, "{Title}", 1)];
        let mut existing = MetadataCollection::default();
        existing.set(MetadataKind::Title, "My trip", None);
        let candidates = build_candidates(
            &defs,
            &leaf_facts(),
            &existing,
            &HashMap::new(),
            true,
            &HtmlTagStripper,
        );
        assert_eq!(candidates[0].value, "My trip");
    }

    #[test]
    fn test_routine_commit_keeps_container_title_on_empty_render() {
        let mut collection = MetadataCollection::default();
        collection.set(MetadataKind::Title, "Hand written", None);
        let rendered = |value: &str| Candidate {
            kind: MetadataKind::Title,
            value: value.to_string(),
            raw: None,
        };

        let summary = commit(&mut collection, vec![rendered("")], CommitMode::Routine, NodeKind::Container);
        assert_eq!(collection.value(MetadataKind::Title), Some("Hand written"));
        assert!(!summary.changed());

        let summary = commit(&mut collection, vec![rendered("Extracted")], CommitMode::Routine, NodeKind::Container);
        assert_eq!(collection.value(MetadataKind::Title), Some("Extracted"));
        assert_eq!(summary.updated, 1);

        commit(&mut collection, vec![rendered("")], CommitMode::Full, NodeKind::Container);
        assert_eq!(collection.value(MetadataKind::Title), Some(""));
    }

    #[test]
    fn test_full_commit_keeps_leaf_title_on_empty_render() {
        let mut collection = MetadataCollection::default();
        collection.set(MetadataKind::Title, "sunset", None);
        let candidate = Candidate {
            kind: MetadataKind::Title,
            value: String::new(),
            raw: None,
        };

        commit(&mut collection, vec![candidate], CommitMode::Full, NodeKind::Leaf);
        assert_eq!(collection.value(MetadataKind::Title), Some("sunset"));
    }

    #[test]
    fn test_commit_deletes_empty_unless_required() {
        let mut collection = MetadataCollection::default();
        collection.set(MetadataKind::Caption, "Keep me", None);
        collection.set(MetadataKind::CameraModel, "X100", None);

        let summary = commit(
            &mut collection,
            vec![
                Candidate { kind: MetadataKind::Caption, value: String::new(), raw: None },
                Candidate { kind: MetadataKind::CameraModel, value: String::new(), raw: None },
                Candidate { kind: MetadataKind::Title, value: String::new(), raw: None },
            ],
            CommitMode::Full,
            NodeKind::Leaf,
        );

        assert_eq!(collection.value(MetadataKind::Caption), Some("Keep me"));
        assert!(collection.get(MetadataKind::CameraModel).is_none());
        // Required kinds are added even when empty.
        assert_eq!(collection.value(MetadataKind::Title), Some(""));
        assert_eq!(summary, MetadataSummary { added: 1, updated: 0, deleted: 1 });
    }

    #[test]
    fn test_collection_set_revives_deleted_item() {
        let mut collection = MetadataCollection::default();
        collection.set(MetadataKind::Author, "Ann", None);
        collection.mark_deleted(MetadataKind::Author);
        assert!(collection.is_empty());
        assert!(collection.set(MetadataKind::Author, "Ann", None));
        assert_eq!(collection.value(MetadataKind::Author), Some("Ann"));
        assert!(!collection.set(MetadataKind::Author, "Ann", None));
    }
}
