//! Output organization onto a filesystem.
//!
//! Lays enriched chunks out under a target directory according to a layout
//! strategy and writes a `manifest.json` summarizing entities, quality,
//! and configuration. Chunk file content is a deterministic function of
//! (chunk, strategy), so retrying a failed call is safe.

mod manifest;

pub use manifest::{EntitySummary, Manifest, QualitySummary};

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{DocshardError, Result};
use crate::format::OutputFormat;
use crate::types::Chunk;

/// Layout policy controlling where chunk files land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrganizationStrategy {
    /// One sub-folder per source document
    ByDocument,
    /// One folder per entity type, plus `uncategorized`
    ByEntity,
    /// Everything directly under the output directory
    Flat,
}

impl std::fmt::Display for OrganizationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrganizationStrategy::ByDocument => write!(f, "by_document"),
            OrganizationStrategy::ByEntity => write!(f, "by_entity"),
            OrganizationStrategy::Flat => write!(f, "flat"),
        }
    }
}

impl std::str::FromStr for OrganizationStrategy {
    type Err = DocshardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "by_document" | "by-document" | "document" => Ok(OrganizationStrategy::ByDocument),
            "by_entity" | "by-entity" | "entity" => Ok(OrganizationStrategy::ByEntity),
            "flat" => Ok(OrganizationStrategy::Flat),
            other => Err(DocshardError::InvalidConfig(format!(
                "unknown organization strategy: {}",
                other
            ))),
        }
    }
}

/// Folder for chunks that reference no entity under [`OrganizationStrategy::ByEntity`].
const UNCATEGORIZED: &str = "uncategorized";

/// What one organize call produced. Write-once.
#[derive(Debug, Clone)]
pub struct OrganizationResult {
    /// Layout strategy used
    pub strategy: OrganizationStrategy,

    /// Root the files were written under
    pub output_dir: PathBuf,

    /// Paths written, relative to `output_dir`
    pub files_created: Vec<String>,

    /// Where the manifest landed
    pub manifest_path: PathBuf,

    /// The manifest content
    pub manifest: Manifest,
}

/// Writes chunk files and the manifest.
#[derive(Debug)]
pub struct Organizer {
    chunk_format: OutputFormat,
}

impl Default for Organizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Organizer {
    /// Create an organizer writing pretty-printed JSON chunk files.
    pub fn new() -> Self {
        Self {
            chunk_format: OutputFormat::JsonPretty,
        }
    }

    /// Lay chunks out under `output_dir` and write `manifest.json`.
    ///
    /// An empty chunk slice produces a valid manifest with zero chunks.
    /// Filesystem failures are fatal for this call only; partial output
    /// may remain, and retrying is safe.
    pub fn organize(
        &self,
        chunks: &[Chunk],
        output_dir: &Path,
        strategy: OrganizationStrategy,
        config_snapshot: Option<serde_json::Value>,
    ) -> Result<OrganizationResult> {
        ensure_dir(output_dir)?;

        if strategy == OrganizationStrategy::ByEntity {
            self.create_entity_folders(chunks, output_dir)?;
        }

        let mut files_created = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let relative = self.chunk_relative_path(chunk, strategy);
            let path = output_dir.join(&relative);
            if let Some(parent) = path.parent() {
                ensure_dir(parent)?;
            }
            let content = self.chunk_format.render(chunk)?;
            write_file(&path, &content)?;
            files_created.push(relative);
        }

        let manifest = Manifest::build(chunks, strategy, config_snapshot, files_created.clone());
        let manifest_path = output_dir.join("manifest.json");
        let rendered = serde_json::to_string_pretty(&manifest).map_err(|source| {
            DocshardError::Format {
                chunk_id: chunks.first().map(|c| c.id).unwrap_or_default(),
                source,
            }
        })?;
        write_file(&manifest_path, &rendered)?;

        info!(
            strategy = %strategy,
            chunks = chunks.len(),
            files = files_created.len(),
            output_dir = %output_dir.display(),
            "organized chunk output"
        );

        Ok(OrganizationResult {
            strategy,
            output_dir: output_dir.to_path_buf(),
            files_created,
            manifest_path,
            manifest,
        })
    }

    /// One folder per distinct entity type seen across all chunks.
    fn create_entity_folders(&self, chunks: &[Chunk], output_dir: &Path) -> Result<()> {
        let mut folders: BTreeSet<String> = BTreeSet::new();
        for chunk in chunks {
            if chunk.metadata.entity_tags.is_empty() {
                folders.insert(UNCATEGORIZED.to_string());
            }
            for tag in &chunk.metadata.entity_tags {
                folders.insert(sanitize_filename(&tag.entity_type));
            }
        }
        for folder in folders {
            ensure_dir(&output_dir.join(folder))?;
        }
        Ok(())
    }

    /// Relative path for a chunk file under the given strategy.
    fn chunk_relative_path(&self, chunk: &Chunk, strategy: OrganizationStrategy) -> String {
        let stem = source_stem(&chunk.metadata.source_file);
        let file_name = format!("{}_chunk_{:04}.json", stem, chunk.position_index);
        match strategy {
            OrganizationStrategy::Flat => file_name,
            OrganizationStrategy::ByDocument => format!("{}/{}", stem, file_name),
            OrganizationStrategy::ByEntity => {
                let folder = dominant_entity_type(chunk)
                    .map(sanitize_filename)
                    .unwrap_or_else(|| UNCATEGORIZED.to_string());
                format!("{}/{}", folder, file_name)
            }
        }
    }
}

/// The entity type a chunk is filed under: the most frequent among its
/// tags, ties resolved to the earliest tag.
fn dominant_entity_type(chunk: &Chunk) -> Option<&str> {
    let tags = &chunk.metadata.entity_tags;
    if tags.is_empty() {
        return None;
    }
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for tag in tags {
        match counts.iter_mut().find(|(t, _)| *t == tag.entity_type) {
            Some((_, n)) => *n += 1,
            None => counts.push((tag.entity_type.as_str(), 1)),
        }
    }
    let mut best = counts[0];
    for candidate in &counts[1..] {
        if candidate.1 > best.1 {
            best = *candidate;
        }
    }
    Some(best.0)
}

/// Replace path-hostile characters with an underscore.
///
/// A Windows-style drive-letter colon is the only colon tolerated.
pub fn sanitize_filename(name: &str) -> String {
    let has_drive_prefix = {
        let bytes = name.as_bytes();
        bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
    };
    name.chars()
        .enumerate()
        .map(|(i, c)| match c {
            ':' if i == 1 && has_drive_prefix => ':',
            ':' | '*' | '?' | '"' | '<' | '>' | '|' | '/' | '\\' => '_',
            other => other,
        })
        .collect()
}

/// Sanitized file stem of a source identifier.
fn source_stem(source_file: &str) -> String {
    let name = source_file
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(source_file);
    let stem = match name.rfind('.') {
        Some(0) | None => name,
        Some(i) => &name[..i],
    };
    let stem = if stem.is_empty() { "document" } else { stem };
    sanitize_filename(stem)
}

fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|source| DocshardError::Organize {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).map_err(|source| DocshardError::Organize {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ChunkingEngine;
    use crate::enrich::MetadataEnricher;
    use crate::types::{
        ChunkingConfig, Document, DocumentMetadata, DocumentType, Entity, Sentence,
    };
    use pretty_assertions::assert_eq;

    fn source(name: &str) -> DocumentMetadata {
        DocumentMetadata {
            source_file: name.to_string(),
            file_hash: "beef99".to_string(),
            page_ocr_confidence: vec![0.9],
            completeness_ratio: 0.85,
            document_type: DocumentType::Policy,
        }
    }

    fn chunks_for(text: &str, name: &str, entities: Vec<Entity>) -> Vec<Chunk> {
        let metadata = source(name);
        let doc = Document::new(text, metadata.clone()).with_entities(entities);
        let sentences = vec![Sentence::new(0, text.len())];
        let engine = ChunkingEngine::new(ChunkingConfig::with_size(4096)).unwrap();
        let raw: Vec<Chunk> = engine.chunk_document(&doc, &sentences).unwrap().collect();
        MetadataEnricher::new().enrich_all(raw, &metadata)
    }

    fn risk_entity(id: &str, start: usize, end: usize) -> Entity {
        Entity {
            entity_type: "risk".to_string(),
            id: id.to_string(),
            text: String::new(),
            confidence: 1.0,
            start,
            end,
        }
    }

    #[test]
    fn test_empty_input_produces_valid_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let result = Organizer::new()
            .organize(&[], dir.path(), OrganizationStrategy::Flat, None)
            .unwrap();

        assert_eq!(result.manifest.total_chunks, 0);
        assert!(result.files_created.is_empty());
        assert!(result.manifest_path.exists());

        let raw = std::fs::read_to_string(&result.manifest_path).unwrap();
        let parsed: Manifest = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.total_chunks, 0);
    }

    #[test]
    fn test_flat_layout_prefixes_stem() {
        let dir = tempfile::tempdir().unwrap();
        let chunks = chunks_for("A single sentence document.", "docs/policy v2.pdf", vec![]);
        let result = Organizer::new()
            .organize(&chunks, dir.path(), OrganizationStrategy::Flat, None)
            .unwrap();

        assert_eq!(result.files_created.len(), 1);
        assert!(result.files_created[0].starts_with("policy v2_chunk_"));
        assert!(dir.path().join(&result.files_created[0]).exists());
    }

    #[test]
    fn test_by_document_layout_uses_subfolder() {
        let dir = tempfile::tempdir().unwrap();
        let chunks = chunks_for("A single sentence document.", "audit/q3_review.docx", vec![]);
        let result = Organizer::new()
            .organize(&chunks, dir.path(), OrganizationStrategy::ByDocument, None)
            .unwrap();

        assert_eq!(result.files_created[0], "q3_review/q3_review_chunk_0000.json");
        assert!(dir.path().join("q3_review").is_dir());
    }

    #[test]
    fn test_by_entity_layout_routes_by_type() {
        let dir = tempfile::tempdir().unwrap();
        let text = "RISK-009 remains open for review.";
        let mut chunks = chunks_for(text, "a.pdf", vec![risk_entity("RISK-009", 0, 8)]);
        chunks.extend(chunks_for("No entities in this one.", "b.pdf", vec![]));

        let result = Organizer::new()
            .organize(&chunks, dir.path(), OrganizationStrategy::ByEntity, None)
            .unwrap();

        assert!(dir.path().join("risk").is_dir());
        assert!(dir.path().join("uncategorized").is_dir());
        assert!(result.files_created.iter().any(|f| f.starts_with("risk/")));
        assert!(result
            .files_created
            .iter()
            .any(|f| f.starts_with("uncategorized/")));
    }

    #[test]
    fn test_manifest_summaries() {
        let dir = tempfile::tempdir().unwrap();
        let text = "RISK-009 remains open. CTRL-001 monitors it.";
        let chunks = chunks_for(
            text,
            "a.pdf",
            vec![
                risk_entity("RISK-009", 0, 8),
                Entity {
                    entity_type: "control".to_string(),
                    id: "CTRL-001".to_string(),
                    text: String::new(),
                    confidence: 1.0,
                    start: 23,
                    end: 31,
                },
            ],
        );
        let result = Organizer::new()
            .organize(&chunks, dir.path(), OrganizationStrategy::Flat, None)
            .unwrap();

        let entity_summary = &result.manifest.entity_summary;
        assert_eq!(entity_summary.total_entities, 2);
        assert_eq!(entity_summary.entity_types, vec!["control", "risk"]);
        assert_eq!(entity_summary.unique_entity_ids, 2);

        let quality_summary = &result.manifest.quality_summary;
        assert_eq!(quality_summary.chunks_with_quality, chunks.len());
        // ocr 0.9 and completeness 0.85 raise both source flags.
        assert!(quality_summary.flag_counts.contains_key("low_ocr"));
        assert!(quality_summary
            .flag_counts
            .contains_key("incomplete_extraction"));
    }

    #[test]
    fn test_manifest_deterministic_across_directories() {
        let chunks = chunks_for(
            "RISK-009 remains open for review.",
            "a.pdf",
            vec![risk_entity("RISK-009", 0, 8)],
        );
        let snapshot = serde_json::json!({"chunk_size": 4096});

        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let organizer = Organizer::new();
        let a = organizer
            .organize(
                &chunks,
                dir_a.path(),
                OrganizationStrategy::Flat,
                Some(snapshot.clone()),
            )
            .unwrap();
        let b = organizer
            .organize(
                &chunks,
                dir_b.path(),
                OrganizationStrategy::Flat,
                Some(snapshot),
            )
            .unwrap();

        let mut value_a: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&a.manifest_path).unwrap()).unwrap();
        let mut value_b: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&b.manifest_path).unwrap()).unwrap();
        value_a["generated_at"] = serde_json::Value::Null;
        value_b["generated_at"] = serde_json::Value::Null;
        assert_eq!(value_a, value_b);
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("plain_name"), "plain_name");
        assert_eq!(sanitize_filename("my:b*c?d\"e<f>g|h"), "my_b_c_d_e_f_g_h");
        assert_eq!(sanitize_filename("path/to\\thing"), "path_to_thing");
        // Drive-letter colon survives; later colons do not.
        assert_eq!(sanitize_filename("C:report:final"), "C:report_final");
    }

    #[test]
    fn test_source_stem() {
        assert_eq!(source_stem("reports/q3 review.pdf"), "q3 review");
        assert_eq!(source_stem("C:\\docs\\audit.docx"), "audit");
        assert_eq!(source_stem("plain"), "plain");
        assert_eq!(source_stem(".hidden"), ".hidden");
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!(
            "by_entity".parse::<OrganizationStrategy>().unwrap(),
            OrganizationStrategy::ByEntity
        );
        assert_eq!(
            "flat".parse::<OrganizationStrategy>().unwrap(),
            OrganizationStrategy::Flat
        );
        assert!("pile".parse::<OrganizationStrategy>().is_err());
    }
}
