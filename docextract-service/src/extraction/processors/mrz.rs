//! Machine Readable Zone (ICAO 9303) text parser.
//!
//! Works on the MRZ text itself, not on image pixels: the upload is decoded
//! as text and matched against the TD1 (ID card, 3 x 30) and TD3 (passport,
//! 2 x 44) layouts. Check digits are not verified and confidences are fixed
//! per field.

use std::time::Instant;

use async_trait::async_trait;

use super::DocumentProcessor;
use crate::error::ProcessorError;
use crate::extraction::types::{DocumentType, ExtractionField, ExtractionResult};

const FILLER: char = '<';
const NAME_SEPARATOR: &str = "<<";

const TD1_WIDTH: usize = 30;
const TD3_WIDTH: usize = 44;

const UNKNOWN_FORMAT_WARNING: &str =
    "Could not detect MRZ format. Expected TD1 (3 lines) or TD3 (2 lines).";

// Static per-field confidences
const CONFIDENCE_DOCUMENT_TYPE: f64 = 0.95;
const CONFIDENCE_GENDER: f64 = 0.95;
const CONFIDENCE_DATE: f64 = 0.92;
const CONFIDENCE_TD3_DOCUMENT_NUMBER: f64 = 0.92;
const CONFIDENCE_TD1_DOCUMENT_NUMBER: f64 = 0.90;
const CONFIDENCE_NATIONALITY: f64 = 0.90;
const CONFIDENCE_TD3_NAME: f64 = 0.90;
const CONFIDENCE_TD1_NAME: f64 = 0.88;

/// MRZ text processor for ID cards and passports
#[derive(Debug, Default, Clone, Copy)]
pub struct MrzProcessor;

impl MrzProcessor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentProcessor for MrzProcessor {
    fn name(&self) -> &'static str {
        "mrz"
    }

    fn can_process(&self, doc_type: DocumentType) -> bool {
        matches!(doc_type, DocumentType::IdCard | DocumentType::Passport)
    }

    async fn process(
        &self,
        data: &[u8],
        doc_type: DocumentType,
    ) -> Result<ExtractionResult, ProcessorError> {
        let start = Instant::now();
        let text = String::from_utf8_lossy(data);
        let (fields, warnings) = parse_mrz(&text, doc_type);

        Ok(ExtractionResult {
            document_type: doc_type,
            fields,
            warnings,
            processing_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MrzFormat {
    Td1,
    Td3,
}

fn detect_format(lines: &[&str]) -> Option<MrzFormat> {
    let first_len = lines.first().map(|l| l.chars().count()).unwrap_or(0);
    match lines.len() {
        3 if first_len >= TD1_WIDTH => Some(MrzFormat::Td1),
        2 if first_len >= TD3_WIDTH => Some(MrzFormat::Td3),
        _ => None,
    }
}

/// Parse MRZ text into fields and warnings.
///
/// An unrecognised layout yields no fields and a warning rather than an error.
pub(crate) fn parse_mrz(text: &str, doc_type: DocumentType) -> (Vec<ExtractionField>, Vec<String>) {
    let lines: Vec<&str> = text.trim().split('\n').map(str::trim).collect();

    match detect_format(&lines) {
        Some(MrzFormat::Td1) => (parse_td1(&lines, doc_type), Vec::new()),
        Some(MrzFormat::Td3) => (parse_td3(&lines, doc_type), Vec::new()),
        None => (Vec::new(), vec![UNKNOWN_FORMAT_WARNING.to_string()]),
    }
}

/// TD1 (ID card):
/// line 1: type, issuer, document number;
/// line 2: birth date, sex, expiry, nationality;
/// line 3: SURNAME<<GIVEN<NAMES
fn parse_td1(lines: &[&str], doc_type: DocumentType) -> Vec<ExtractionField> {
    let line1 = MrzLine::padded(lines[0], TD1_WIDTH);
    let line2 = MrzLine::padded(lines[1], TD1_WIDTH);
    let line3 = MrzLine::padded(lines[2], TD1_WIDTH);

    let mut fields = FieldCollector::new(doc_type);

    fields.push(
        "document_type",
        line1.slice(0, 1),
        CONFIDENCE_DOCUMENT_TYPE,
    );
    fields.push_non_empty(
        "document_number",
        strip_filler(&line1.slice(5, 14)),
        CONFIDENCE_TD1_DOCUMENT_NUMBER,
    );
    fields.push_date("date_of_birth", line2.slice(0, 6));
    fields.push_gender(line2.slice(7, 8));
    fields.push_date("expiry_date", line2.slice(8, 14));
    fields.push_non_empty(
        "nationality",
        strip_filler(&line2.slice(15, 18)),
        CONFIDENCE_NATIONALITY,
    );
    fields.push_names(&line3.slice(0, TD1_WIDTH), CONFIDENCE_TD1_NAME);

    fields.into_fields()
}

/// TD3 (passport):
/// line 1: type, issuer, SURNAME<<GIVEN<NAMES;
/// line 2: document number, nationality, birth date, sex, expiry
fn parse_td3(lines: &[&str], doc_type: DocumentType) -> Vec<ExtractionField> {
    let line1 = MrzLine::padded(lines[0], TD3_WIDTH);
    let line2 = MrzLine::padded(lines[1], TD3_WIDTH);

    let mut fields = FieldCollector::new(doc_type);

    fields.push(
        "document_type",
        line1.slice(0, 1),
        CONFIDENCE_DOCUMENT_TYPE,
    );
    fields.push_names(&line1.slice(5, TD3_WIDTH), CONFIDENCE_TD3_NAME);
    fields.push_non_empty(
        "document_number",
        strip_filler(&line2.slice(0, 9)),
        CONFIDENCE_TD3_DOCUMENT_NUMBER,
    );
    fields.push_non_empty(
        "nationality",
        strip_filler(&line2.slice(10, 13)),
        CONFIDENCE_NATIONALITY,
    );
    fields.push_date("date_of_birth", line2.slice(13, 19));
    fields.push_gender(line2.slice(20, 21));
    fields.push_date("expiry_date", line2.slice(21, 27));

    fields.into_fields()
}

/// One MRZ line, filler-padded (or cut) to its nominal width.
///
/// Indexing is by character so non-ASCII noise from a bad decode can't
/// split a code point.
struct MrzLine(Vec<char>);

impl MrzLine {
    fn padded(line: &str, width: usize) -> Self {
        let mut chars: Vec<char> = line.chars().take(width).collect();
        chars.resize(width, FILLER);
        Self(chars)
    }

    fn slice(&self, start: usize, end: usize) -> String {
        self.0[start..end].iter().collect()
    }
}

/// Accumulates fields in extraction order, tagged with the source document type.
struct FieldCollector {
    doc_type: DocumentType,
    fields: Vec<ExtractionField>,
}

impl FieldCollector {
    fn new(doc_type: DocumentType) -> Self {
        Self {
            doc_type,
            fields: Vec::new(),
        }
    }

    fn push(&mut self, key: &str, value: String, confidence: f64) {
        self.fields
            .push(ExtractionField::new(key, value, confidence, self.doc_type));
    }

    fn push_non_empty(&mut self, key: &str, value: String, confidence: f64) {
        if !value.is_empty() {
            self.push(key, value, confidence);
        }
    }

    fn push_date(&mut self, key: &str, value: String) {
        if is_mrz_date(&value) {
            self.push(key, value, CONFIDENCE_DATE);
        }
    }

    fn push_gender(&mut self, value: String) {
        if value == "M" || value == "F" {
            self.push("gender", value, CONFIDENCE_GENDER);
        }
    }

    /// Split `SURNAME<<GIVEN<NAMES` on the first double filler.
    fn push_names(&mut self, section: &str, confidence: f64) {
        let (surname, given) = match section.split_once(NAME_SEPARATOR) {
            Some((surname, given)) => (surname, Some(given)),
            None => (section, None),
        };

        self.push_non_empty("last_name", clean_name(surname), confidence);
        if let Some(given) = given {
            self.push_non_empty("first_name", clean_name(given), confidence);
        }
    }

    fn into_fields(self) -> Vec<ExtractionField> {
        self.fields
    }
}

/// Drop every filler character, then trailing spaces.
fn strip_filler(value: &str) -> String {
    value.replace(FILLER, "").trim_end_matches(' ').to_string()
}

/// Drop trailing filler and turn interior single fillers into spaces.
fn clean_name(value: &str) -> String {
    value
        .trim_end_matches([FILLER, ' '])
        .replace(FILLER, " ")
        .trim()
        .to_string()
}

/// YYMMDD: exactly six ASCII digits. Calendar validity is not checked.
fn is_mrz_date(value: &str) -> bool {
    value.len() == 6 && value.bytes().all(|b| b.is_ascii_digit())
}
