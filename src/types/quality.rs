//! Quality score types.

use serde::{Deserialize, Serialize};

/// A recognized quality flag raised during enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    /// Mean OCR confidence below 0.95
    LowOcr,
    /// Extraction completeness below 0.90
    IncompleteExtraction,
    /// Flesch-Kincaid grade above 15
    HighComplexity,
    /// More than 30% non-alphabetic characters
    Gibberish,
}

impl QualityFlag {
    /// Stable wire name, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityFlag::LowOcr => "low_ocr",
            QualityFlag::IncompleteExtraction => "incomplete_extraction",
            QualityFlag::HighComplexity => "high_complexity",
            QualityFlag::Gibberish => "gibberish",
        }
    }
}

impl std::fmt::Display for QualityFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Composite quality assessment for one chunk.
///
/// Computed once by the enricher from chunk text and source-level metadata;
/// identical inputs always produce bit-identical scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    /// Flesch-Kincaid grade level of the chunk text
    pub readability_flesch_kincaid: f64,

    /// Gunning fog index of the chunk text
    pub readability_gunning_fog: f64,

    /// Mean OCR confidence inherited from the source document
    pub ocr_confidence: f64,

    /// Extraction completeness inherited from the source document
    pub completeness: f64,

    /// Mean lexical overlap across consecutive sentence pairs
    pub coherence: f64,

    /// Weighted composite in [0, 1]
    pub overall: f64,

    /// Flags raised for this chunk, append-only and without duplicates
    pub flags: Vec<QualityFlag>,
}

impl QualityScore {
    /// Check whether a flag was raised.
    pub fn has_flag(&self, flag: QualityFlag) -> bool {
        self.flags.contains(&flag)
    }

    /// Append a flag unless it is already present.
    pub fn add_flag(&mut self, flag: QualityFlag) {
        if !self.flags.contains(&flag) {
            self.flags.push(flag);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_flag_deduplicates() {
        let mut score = QualityScore {
            readability_flesch_kincaid: 0.0,
            readability_gunning_fog: 0.0,
            ocr_confidence: 1.0,
            completeness: 1.0,
            coherence: 1.0,
            overall: 1.0,
            flags: Vec::new(),
        };
        score.add_flag(QualityFlag::LowOcr);
        score.add_flag(QualityFlag::LowOcr);
        score.add_flag(QualityFlag::Gibberish);
        assert_eq!(score.flags, vec![QualityFlag::LowOcr, QualityFlag::Gibberish]);
    }

    #[test]
    fn test_flag_wire_names() {
        assert_eq!(
            serde_json::to_string(&QualityFlag::IncompleteExtraction).unwrap(),
            "\"incomplete_extraction\""
        );
        assert_eq!(QualityFlag::LowOcr.as_str(), "low_ocr");
    }
}
