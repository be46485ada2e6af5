//! Chunk enrichment and quality scoring.
//!
//! Fills each raw chunk's quality assessment from its text and the
//! source-level metadata of the document it was cut from. Scoring is
//! deterministic: identical inputs always produce bit-identical scores.

mod readability;

pub use readability::{coherence, flesch_kincaid_grade, gunning_fog_index, lexical_diversity};

use tracing::debug;

use crate::approx_token_count;
use crate::types::{Chunk, DocumentMetadata, QualityFlag, QualityScore, ReadabilityScores};

use readability::finite_or_zero;

/// OCR confidence below this raises `low_ocr`.
const LOW_OCR_THRESHOLD: f64 = 0.95;

/// Completeness below this raises `incomplete_extraction`.
const COMPLETENESS_THRESHOLD: f64 = 0.90;

/// Flesch-Kincaid grade above this raises `high_complexity`.
const HIGH_COMPLEXITY_GRADE: f64 = 15.0;

/// Non-alphabetic character fraction above this raises `gibberish`.
const GIBBERISH_RATIO: f64 = 0.30;

/// Computes per-chunk quality scores and counts.
///
/// Stateless: one enricher may serve many documents concurrently.
#[derive(Debug, Default)]
pub struct MetadataEnricher;

impl MetadataEnricher {
    /// Create a new enricher.
    pub fn new() -> Self {
        Self
    }

    /// Populate a chunk's quality score and recompute its counts.
    ///
    /// The chunk is mutated exactly once, here, and treated as immutable
    /// afterwards. A failed sub-metric degrades to 0.0; it never drops the
    /// chunk.
    pub fn enrich_chunk(&self, mut chunk: Chunk, source: &DocumentMetadata) -> Chunk {
        chunk.word_count = chunk.text.split_whitespace().count();
        chunk.token_count = approx_token_count(&chunk.text);

        let flesch_kincaid = finite_or_zero(flesch_kincaid_grade(&chunk.text));
        let gunning_fog = finite_or_zero(gunning_fog_index(&chunk.text));
        let diversity = finite_or_zero(lexical_diversity(&chunk.text));
        let coherence = finite_or_zero(coherence(&chunk.text));

        let ocr_confidence = source.ocr_confidence().clamp(0.0, 1.0);
        let completeness = source.completeness_ratio.clamp(0.0, 1.0);
        let readability_norm = (1.0 - flesch_kincaid / 20.0).clamp(0.0, 1.0);

        let overall = finite_or_zero(
            0.40 * ocr_confidence
                + 0.30 * completeness
                + 0.20 * coherence
                + 0.10 * readability_norm,
        )
        .clamp(0.0, 1.0);

        let mut quality = QualityScore {
            readability_flesch_kincaid: flesch_kincaid,
            readability_gunning_fog: gunning_fog,
            ocr_confidence,
            completeness,
            coherence,
            overall,
            flags: Vec::new(),
        };
        if ocr_confidence < LOW_OCR_THRESHOLD {
            quality.add_flag(QualityFlag::LowOcr);
        }
        if completeness < COMPLETENESS_THRESHOLD {
            quality.add_flag(QualityFlag::IncompleteExtraction);
        }
        if flesch_kincaid > HIGH_COMPLEXITY_GRADE {
            quality.add_flag(QualityFlag::HighComplexity);
        }
        if gibberish_ratio(&chunk.text) > GIBBERISH_RATIO {
            quality.add_flag(QualityFlag::Gibberish);
        }

        if !quality.flags.is_empty() {
            debug!(
                chunk_id = %chunk.id,
                flags = quality.flags.len(),
                overall,
                "quality flags raised"
            );
        }

        chunk.readability = ReadabilityScores {
            flesch_kincaid_grade: flesch_kincaid,
            gunning_fog,
            lexical_diversity: diversity,
        };
        chunk.quality_score = Some(overall);
        chunk.metadata.quality = Some(quality);
        chunk
    }

    /// Enrich a whole chunk sequence in position order.
    pub fn enrich_all(&self, chunks: Vec<Chunk>, source: &DocumentMetadata) -> Vec<Chunk> {
        chunks
            .into_iter()
            .map(|chunk| self.enrich_chunk(chunk, source))
            .collect()
    }
}

/// Fraction of non-alphabetic characters among non-whitespace characters.
fn gibberish_ratio(text: &str) -> f64 {
    let mut total = 0usize;
    let mut non_alpha = 0usize;
    for c in text.chars() {
        if c.is_whitespace() {
            continue;
        }
        total += 1;
        if !c.is_alphabetic() {
            non_alpha += 1;
        }
    }
    if total == 0 {
        return 0.0;
    }
    non_alpha as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ChunkingEngine;
    use crate::types::{ChunkingConfig, Document, DocumentMetadata, DocumentType, Sentence};
    use pretty_assertions::assert_eq;

    fn metadata_with(ocr: Option<f64>, completeness: f64) -> DocumentMetadata {
        DocumentMetadata {
            source_file: "docs/sample.pdf".to_string(),
            file_hash: "cafe01".to_string(),
            page_ocr_confidence: ocr.map(|v| vec![v]).unwrap_or_default(),
            completeness_ratio: completeness,
            document_type: DocumentType::Assessment,
        }
    }

    fn chunk_of(text: &str, source: &DocumentMetadata) -> Chunk {
        let doc = Document::new(text, source.clone());
        let sentences = vec![Sentence::new(0, text.len())];
        let engine = ChunkingEngine::new(ChunkingConfig::with_size(4096)).unwrap();
        engine
            .chunk_document(&doc, &sentences)
            .unwrap()
            .next()
            .expect("one chunk")
    }

    #[test]
    fn test_overall_within_unit_interval() {
        let enricher = MetadataEnricher::new();
        for text in [
            "A perfectly ordinary sentence about controls.",
            "!!! ??? ### $$$ %%% ^^^ &&& *** ((( )))",
            "x",
        ] {
            let source = metadata_with(Some(0.5), 0.5);
            let chunk = chunk_of(text, &source);
            let enriched = enricher.enrich_chunk(chunk, &source);
            let overall = enriched.metadata.quality.as_ref().unwrap().overall;
            assert!((0.0..=1.0).contains(&overall), "overall {} for {:?}", overall, text);
        }
    }

    #[test]
    fn test_overall_within_unit_interval_for_empty_text() {
        let enricher = MetadataEnricher::new();
        let source = metadata_with(Some(0.2), 0.1);
        let mut chunk = chunk_of("placeholder", &source);
        chunk.text.clear();
        chunk.overlap_len = 0;
        let enriched = enricher.enrich_chunk(chunk, &source);
        let quality = enriched.metadata.quality.unwrap();
        assert!((0.0..=1.0).contains(&quality.overall));
        assert_eq!(quality.readability_flesch_kincaid, 0.0);
        assert_eq!(quality.readability_gunning_fog, 0.0);
    }

    #[test]
    fn test_enrichment_is_deterministic() {
        let enricher = MetadataEnricher::new();
        let source = metadata_with(Some(0.91), 0.88);
        let chunk = chunk_of("RISK-001 is mitigated by CTRL-042. The control runs daily.", &source);

        let a = enricher.enrich_chunk(chunk.clone(), &source);
        let b = enricher.enrich_chunk(chunk, &source);
        assert_eq!(a.metadata.quality, b.metadata.quality);
        assert_eq!(a.word_count, b.word_count);
        assert_eq!(a.token_count, b.token_count);
    }

    #[test]
    fn test_low_ocr_and_incomplete_flags() {
        let enricher = MetadataEnricher::new();
        let source = metadata_with(Some(0.85), 0.80);
        let chunk = chunk_of("Ordinary prose for the scorer to look at.", &source);
        let quality = enricher
            .enrich_chunk(chunk, &source)
            .metadata
            .quality
            .unwrap();
        assert!(quality.has_flag(QualityFlag::LowOcr));
        assert!(quality.has_flag(QualityFlag::IncompleteExtraction));
    }

    #[test]
    fn test_gibberish_flag_on_punctuation() {
        let enricher = MetadataEnricher::new();
        let source = metadata_with(None, 1.0);
        let chunk = chunk_of("@@@ ### $$$ %%% ^^^ &&&", &source);
        let quality = enricher
            .enrich_chunk(chunk, &source)
            .metadata
            .quality
            .unwrap();
        assert!(quality.has_flag(QualityFlag::Gibberish));
    }

    #[test]
    fn test_clean_text_raises_no_flags() {
        let enricher = MetadataEnricher::new();
        let source = metadata_with(None, 1.0);
        let chunk = chunk_of("The cat sat on the mat. The dog sat near the cat.", &source);
        let quality = enricher
            .enrich_chunk(chunk, &source)
            .metadata
            .quality
            .unwrap();
        assert!(quality.flags.is_empty(), "unexpected flags: {:?}", quality.flags);
    }

    #[test]
    fn test_counts_recomputed() {
        let enricher = MetadataEnricher::new();
        let source = metadata_with(None, 1.0);
        let mut chunk = chunk_of("one two three four", &source);
        chunk.word_count = 0;
        chunk.token_count = 0;
        let enriched = enricher.enrich_chunk(chunk, &source);
        assert_eq!(enriched.word_count, 4);
        assert_eq!(enriched.token_count, 5);
    }

    #[test]
    fn test_single_sentence_coherence_is_one() {
        let enricher = MetadataEnricher::new();
        let source = metadata_with(None, 1.0);
        let chunk = chunk_of("Only one sentence lives here.", &source);
        let quality = enricher
            .enrich_chunk(chunk, &source)
            .metadata
            .quality
            .unwrap();
        assert_eq!(quality.coherence, 1.0);
    }
}
