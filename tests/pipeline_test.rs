//! End-to-end pipeline tests: document in, organized chunk files and
//! manifest out.

use docshard::prelude::*;
use docshard::{ChunkRecord, OutputFormat};
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Naive tiling segmenter standing in for the external sentence splitter.
fn split_sentences(text: &str) -> Vec<Sentence> {
    let mut spans = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if matches!(bytes[i], b'.' | b'!' | b'?') {
            let mut j = i + 1;
            while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                j += 1;
            }
            if j > i + 1 || j == bytes.len() {
                spans.push(Sentence::new(start, j));
                start = j;
                i = j;
                continue;
            }
        }
        i += 1;
    }
    if start < text.len() {
        spans.push(Sentence::new(start, text.len()));
    }
    spans
}

fn risk_report() -> Document {
    let text = "# Quarterly Risk Review\n\nRISK-001 is mitigated by CTRL-042 encryption \
                control. The control owner reviews evidence monthly. RISK-002 remains \
                open pending vendor assessment. CTRL-042 implements POL-7 requirements \
                for data at rest. The residual exposure stays within appetite. \
                Follow-up actions are tracked in the register.";
    let metadata = DocumentMetadata {
        source_file: "reviews/q2 risk review.pdf".to_string(),
        file_hash: "4f9a11".to_string(),
        page_ocr_confidence: vec![0.97, 0.92],
        completeness_ratio: 0.96,
        document_type: DocumentType::Assessment,
    };

    let mut entities = Vec::new();
    for (entity_type, id) in [
        ("risk", "RISK-001"),
        ("control", "CTRL-042"),
        ("risk", "RISK-002"),
        ("policy", "POL-7"),
    ] {
        let mut from = 0;
        while let Some(found) = text[from..].find(id) {
            let start = from + found;
            entities.push(Entity {
                entity_type: entity_type.to_string(),
                id: id.to_string(),
                text: id.to_string(),
                confidence: 0.98,
                start,
                end: start + id.len(),
            });
            from = start + id.len();
        }
    }

    Document::new(text, metadata).with_entities(entities)
}

#[test]
fn pipeline_produces_traceable_enriched_chunks() {
    init_tracing();
    let document = risk_report();
    let sentences = split_sentences(&document.text);
    let engine = ChunkingEngine::new(
        ChunkingConfig::with_size(24).with_overlap_pct(0.0),
    )
    .unwrap();

    let raw: Vec<Chunk> = engine.chunk_document(&document, &sentences).unwrap().collect();
    assert!(raw.len() > 1);

    let rebuilt: String = raw.iter().map(|c| c.core_text()).collect();
    assert_eq!(rebuilt, document.text);

    let enricher = MetadataEnricher::new();
    let chunks = enricher.enrich_all(raw, &document.metadata);

    for chunk in &chunks {
        let quality = chunk.metadata.quality.as_ref().expect("enriched");
        assert!((0.0..=1.0).contains(&quality.overall));
        assert!(quality.has_flag(QualityFlag::LowOcr), "mean ocr 0.945 < 0.95");
        assert_eq!(chunk.metadata.section_context.as_deref(), Some("Quarterly Risk Review"));
    }

    // The mitigation phrasing between the first two entities is detected.
    let relationships: Vec<&EntityRelationship> = chunks
        .iter()
        .flat_map(|c| &c.metadata.entity_relationships)
        .collect();
    assert!(relationships.iter().any(|r| {
        r.subject_id == "RISK-001" && r.relation == "mitigated_by" && r.object_id == "CTRL-042"
    }));

    // Every entity mention lands whole in some chunk.
    for id in ["RISK-001", "RISK-002", "CTRL-042", "POL-7"] {
        assert!(
            chunks.iter().any(|c| c
                .find_entity(id)
                .map(|r| !r.is_partial)
                .unwrap_or(false)),
            "{} not preserved whole in any chunk",
            id
        );
    }
}

#[test]
fn pipeline_writes_manifest_and_wire_records() {
    init_tracing();
    let document = risk_report();
    let sentences = split_sentences(&document.text);
    let engine = ChunkingEngine::new(ChunkingConfig::with_size(24)).unwrap();
    let enricher = MetadataEnricher::new();

    let raw: Vec<Chunk> = engine.chunk_document(&document, &sentences).unwrap().collect();
    let chunks = enricher.enrich_all(raw, &document.metadata);

    let dir = tempfile::tempdir().unwrap();
    let snapshot = serde_json::to_value(engine.config()).unwrap();
    let result = Organizer::new()
        .organize(&chunks, dir.path(), OrganizationStrategy::ByEntity, Some(snapshot))
        .unwrap();

    assert_eq!(result.manifest.total_chunks, chunks.len());
    assert_eq!(result.files_created.len(), chunks.len());
    assert_eq!(
        result.manifest.source_files.get("reviews/q2 risk review.pdf"),
        Some(&"4f9a11".to_string())
    );
    assert!(result
        .manifest
        .entity_summary
        .entity_types
        .iter()
        .any(|t| t == "risk"));

    // Every written file parses back into the wire record layout.
    for relative in &result.files_created {
        let raw = std::fs::read_to_string(dir.path().join(relative)).unwrap();
        let record: ChunkRecord = serde_json::from_str(&raw).unwrap();
        assert!(chunks.iter().any(|c| c.id == record.chunk_id));
        assert!(record.quality.is_some());
    }

    // The manifest on disk matches the returned manifest.
    let manifest_raw = std::fs::read_to_string(&result.manifest_path).unwrap();
    let reparsed: docshard::organize::Manifest = serde_json::from_str(&manifest_raw).unwrap();
    assert_eq!(reparsed.total_chunks, result.manifest.total_chunks);
    assert_eq!(reparsed.files_created, result.manifest.files_created);
}

#[test]
fn pipeline_overlap_preserves_reconstruction_and_entities() {
    init_tracing();
    let document = risk_report();
    let sentences = split_sentences(&document.text);
    let engine = ChunkingEngine::new(
        ChunkingConfig::with_size(20).with_overlap_pct(0.25),
    )
    .unwrap();

    let chunks: Vec<Chunk> = engine.chunk_document(&document, &sentences).unwrap().collect();
    assert!(chunks.iter().skip(1).any(|c| c.overlap_len > 0));

    let rebuilt: String = chunks.iter().map(|c| c.core_text()).collect();
    assert_eq!(rebuilt, document.text);

    // Overlap boundaries never cut an entity span.
    for chunk in &chunks {
        for tag in &chunk.metadata.entity_tags {
            assert!(!tag.is_partial, "{} split at chunk {}", tag.entity_id, chunk.position_index);
        }
    }
}

#[tokio::test]
async fn pipeline_batch_runs_documents_independently() {
    init_tracing();
    let engine = Arc::new(ChunkingEngine::new(ChunkingConfig::with_size(24)).unwrap());
    let processor = BatchProcessor::new(engine, BatchConfig::default());

    let good = risk_report();
    let good_sentences = split_sentences(&good.text);
    let mut broken = risk_report();
    broken.metadata.source_file = String::new();
    let broken_sentences = split_sentences(&broken.text);

    let cancel = CancelFlag::new();
    let (chunks, result) = processor
        .process_batch(
            vec![(broken, broken_sentences), (good, good_sentences)],
            &cancel,
        )
        .await
        .unwrap();

    assert_eq!(result.total_documents, 2);
    assert_eq!(result.processed_documents, 1);
    assert_eq!(result.failed_documents, 1);
    assert!(!chunks.is_empty());

    let dir = tempfile::tempdir().unwrap();
    let organized = Organizer::new()
        .organize(&chunks, dir.path(), OrganizationStrategy::ByDocument, None)
        .unwrap();
    assert_eq!(organized.manifest.total_chunks, chunks.len());

    // Text output for the same chunks renders without error.
    let text = OutputFormat::Text.render_all(&chunks).unwrap();
    assert!(text.contains("q2 risk review.pdf"));
}
