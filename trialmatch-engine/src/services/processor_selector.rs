//! Choose the document extraction processor for an incoming file
//!
//! Keyword scoring over the file name and any text already extracted.
//! Protocol keywords win ties against form keywords.

use serde::{Deserialize, Serialize};

const PROTOCOL_INDICATORS: &[&str] = &[
    "protocol",
    "clinical trial",
    "study protocol",
    "investigational",
    "inclusion criteria",
    "exclusion criteria",
    "primary endpoint",
    "secondary endpoint",
    "adverse event",
    "sponsor",
];

const FORM_INDICATORS: &[&str] = &[
    "consent form",
    "informed consent",
    "case report form",
    "crf",
    "patient reported outcome",
    "questionnaire",
    "survey",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorKind {
    ClinicalTrial,
    FormParser,
    GeneralProcessor,
}

impl ProcessorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessorKind::ClinicalTrial => "clinical_trial",
            ProcessorKind::FormParser => "form_parser",
            ProcessorKind::GeneralProcessor => "general_processor",
        }
    }
}

pub fn select_processor(file_path: &str, extracted_text: Option<&str>) -> ProcessorKind {
    let file_name = file_path.to_lowercase();
    let content = extracted_text.unwrap_or_default().to_lowercase();
    let score = |indicators: &[&str]| {
        indicators
            .iter()
            .filter(|i| file_name.contains(*i) || content.contains(*i))
            .count()
    };

    let protocol_score = score(PROTOCOL_INDICATORS);
    let form_score = score(FORM_INDICATORS);
    tracing::debug!(protocol_score, form_score, "Processor selection scores");

    if protocol_score > 0 && protocol_score >= form_score {
        ProcessorKind::ClinicalTrial
    } else if form_score > 0 {
        ProcessorKind::FormParser
    } else {
        ProcessorKind::GeneralProcessor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_file_name_selects_clinical_trial() {
        assert_eq!(
            select_processor("/uploads/ABC-101_Study_Protocol_v2.pdf", None),
            ProcessorKind::ClinicalTrial
        );
    }

    #[test]
    fn consent_text_selects_form_parser() {
        assert_eq!(
            select_processor(
                "scan_0042.pdf",
                Some("INFORMED CONSENT FORM. Please answer the questionnaire.")
            ),
            ProcessorKind::FormParser
        );
    }

    #[test]
    fn ties_favour_protocol() {
        assert_eq!(
            select_processor("protocol_survey.pdf", None),
            ProcessorKind::ClinicalTrial
        );
    }

    #[test]
    fn no_indicators_selects_general() {
        assert_eq!(
            select_processor("invoice.pdf", Some("Total due: 42")),
            ProcessorKind::GeneralProcessor
        );
    }
}
