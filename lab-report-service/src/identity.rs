//! Identity fields read out of report text.
//!
//! Every analyzer and the client reconciliation step share one
//! [`IdentityExtractor`], driven by an ordered table of labels per field.
//! Labels are tried top to bottom; the first one that yields a usable value
//! wins.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::debug;

use crate::models::PatientIdentity;

static DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})[/-](\d{1,2})[/-](\d{4}|\d{2})$").unwrap());
static LEADING_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}[/-]\d{1,2}[/-](?:\d{4}|\d{2})\b").unwrap());
static VALUE_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" {2,}|\t").unwrap());

static STANDARD_PATTERNS: LazyLock<Arc<IdentityPatterns>> = LazyLock::new(|| {
    Arc::new(IdentityPatterns::new(&IdentityLabels::standard()).unwrap())
});

/// A label as it appears in a report, e.g. `Patient Name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label {
    pub text: &'static str,
    /// Generic single words like `Name` only count when followed by a colon.
    pub colon_required: bool,
}

impl Label {
    pub const fn loose(text: &'static str) -> Self {
        Self {
            text,
            colon_required: false,
        }
    }

    pub const fn strict(text: &'static str) -> Self {
        Self {
            text,
            colon_required: true,
        }
    }
}

/// Ordered label cascades, one per identity field.
#[derive(Debug, Clone)]
pub struct IdentityLabels {
    pub name: Vec<Label>,
    pub date_of_birth: Vec<Label>,
    pub test_date: Vec<Label>,
    pub patient_id: Vec<Label>,
}

impl IdentityLabels {
    pub fn standard() -> Self {
        Self {
            name: vec![
                Label::loose("Patient Name"),
                Label::loose("Client Name"),
                Label::strict("Name"),
                Label::strict("Patient"),
            ],
            date_of_birth: vec![
                Label::loose("Date of Birth"),
                Label::loose("DOB"),
                Label::loose("Birth Date"),
            ],
            test_date: vec![
                Label::loose("Test Date"),
                Label::loose("Collection Date"),
                Label::loose("Assessment Date"),
                Label::strict("Date"),
            ],
            patient_id: vec![
                Label::loose("Patient ID"),
                Label::loose("Sample ID"),
                Label::strict("Reference"),
                Label::strict("ID"),
            ],
        }
    }
}

/// Compiled form of [`IdentityLabels`].
#[derive(Debug)]
pub struct IdentityPatterns {
    name: Vec<Regex>,
    date_of_birth: Vec<Regex>,
    test_date: Vec<Regex>,
    patient_id: Vec<Regex>,
}

impl IdentityPatterns {
    pub fn new(labels: &IdentityLabels) -> Result<Self, regex::Error> {
        Ok(Self {
            name: compile(&labels.name)?,
            date_of_birth: compile(&labels.date_of_birth)?,
            test_date: compile(&labels.test_date)?,
            patient_id: compile(&labels.patient_id)?,
        })
    }
}

fn compile(labels: &[Label]) -> Result<Vec<Regex>, regex::Error> {
    labels.iter().map(label_regex).collect()
}

/// `label`, optional or required colon, then the rest of the line.
fn label_regex(label: &Label) -> Result<Regex, regex::Error> {
    let words: Vec<String> = label.text.split_whitespace().map(regex::escape).collect();
    let colon = if label.colon_required { ":" } else { ":?" };
    Regex::new(&format!(
        r"(?i)\b{}\b[ \t]*{}[ \t]*(?P<value>[^\r\n]*)",
        words.join(r"[ \t]+"),
        colon
    ))
}

/// Values stop at a run of two or more spaces or a tab.
fn field_value(raw: &str) -> &str {
    let end = VALUE_END.find(raw).map(|m| m.start()).unwrap_or(raw.len());
    raw[..end].trim()
}

fn leading_date(value: &str) -> Option<&str> {
    LEADING_DATE.find(value).map(|m| m.as_str())
}

fn person_name(value: &str) -> Option<String> {
    let end = value
        .find(|c: char| !(c.is_alphabetic() || matches!(c, ' ' | '.' | '\'' | '-')))
        .unwrap_or(value.len());
    let name = value[..end].trim();
    name.chars().any(char::is_alphabetic).then(|| name.to_string())
}

fn reference_id(value: &str) -> Option<String> {
    value
        .split_whitespace()
        .next()
        .filter(|token| {
            token.chars().any(|c| c.is_ascii_alphanumeric())
                && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
        .map(str::to_string)
}

/// Parse `M/D/Y` or `M-D-Y`. Two-digit years are 20xx; impossible
/// calendar dates are rejected rather than clamped.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let caps = DATE.captures(value.trim())?;
    let month: u32 = caps[1].parse().ok()?;
    let day: u32 = caps[2].parse().ok()?;
    let year_digits = &caps[3];
    let mut year: i32 = year_digits.parse().ok()?;
    if year_digits.len() == 2 {
        year += 2000;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

#[derive(Debug, Clone)]
pub struct IdentityExtractor {
    patterns: Arc<IdentityPatterns>,
}

impl Default for IdentityExtractor {
    fn default() -> Self {
        Self {
            patterns: STANDARD_PATTERNS.clone(),
        }
    }
}

impl IdentityExtractor {
    pub fn new(patterns: IdentityPatterns) -> Self {
        Self {
            patterns: Arc::new(patterns),
        }
    }

    pub fn extract(&self, text: &str) -> PatientIdentity {
        let identity = PatientIdentity {
            patient_name: self.patient_name(text),
            date_of_birth: self.date_of_birth(text),
            test_date: self.test_date(text),
            patient_id: self.patient_id(text),
        };
        debug!(
            has_name = identity.patient_name.is_some(),
            has_test_date = identity.test_date.is_some(),
            has_patient_id = identity.patient_id.is_some(),
            "Extracted identity fields"
        );
        identity
    }

    pub fn patient_name(&self, text: &str) -> Option<String> {
        first_value(&self.patterns.name, text, person_name)
    }

    pub fn date_of_birth(&self, text: &str) -> Option<String> {
        first_value(&self.patterns.date_of_birth, text, |value| {
            leading_date(value).map(str::to_string)
        })
    }

    /// The first test-date label present decides; a bad date there is `None`.
    pub fn test_date(&self, text: &str) -> Option<NaiveDate> {
        let value = self
            .patterns
            .test_date
            .iter()
            .find_map(|pattern| pattern.captures(text))
            .map(|caps| field_value(&caps["value"]).to_string())?;
        leading_date(&value).and_then(parse_date)
    }

    pub fn patient_id(&self, text: &str) -> Option<String> {
        first_value(&self.patterns.patient_id, text, reference_id)
    }
}

/// Walk the cascade and every occurrence of each label until `accept`
/// produces a value.
fn first_value<T>(patterns: &[Regex], text: &str, accept: impl Fn(&str) -> Option<T>) -> Option<T> {
    patterns.iter().find_map(|pattern| {
        pattern
            .captures_iter(text)
            .find_map(|caps| accept(field_value(&caps["value"])))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "KBMO FIT 176\n\
        Patient Name: Jane Doe    Sample ID: KB-2291\n\
        Date of Birth: 7/14/88\n\
        Collection Date: 03/04/25\n";

    #[test]
    fn parses_dates_with_two_and_four_digit_years() {
        assert_eq!(parse_date("03/04/25"), NaiveDate::from_ymd_opt(2025, 3, 4));
        assert_eq!(parse_date("3-4-2025"), NaiveDate::from_ymd_opt(2025, 3, 4));
        assert_eq!(parse_date("12/31/1999"), NaiveDate::from_ymd_opt(1999, 12, 31));
    }

    #[test]
    fn rejects_impossible_dates() {
        assert_eq!(parse_date("13/40/2025"), None);
        assert_eq!(parse_date("02/30/2024"), None);
        assert_eq!(parse_date("2025-03-04"), None);
        assert_eq!(parse_date("soon"), None);
    }

    #[test]
    fn extracts_all_fields_from_a_report() {
        let identity = IdentityExtractor::default().extract(REPORT);

        assert_eq!(identity.patient_name.as_deref(), Some("Jane Doe"));
        assert_eq!(identity.patient_id.as_deref(), Some("KB-2291"));
        assert_eq!(identity.date_of_birth.as_deref(), Some("7/14/88"));
        assert_eq!(identity.test_date, NaiveDate::from_ymd_opt(2025, 3, 4));
    }

    #[test]
    fn cascade_falls_through_to_generic_labels() {
        let extractor = IdentityExtractor::default();

        assert_eq!(
            extractor.patient_name("client name John Smith").as_deref(),
            Some("John Smith")
        );
        assert_eq!(extractor.patient_name("Name: Ana Ruiz").as_deref(), Some("Ana Ruiz"));
        assert_eq!(extractor.patient_name("Patient: Lee Park").as_deref(), Some("Lee Park"));
        assert_eq!(extractor.patient_name("Name pending review"), None);
    }

    #[test]
    fn name_labels_skip_values_without_letters() {
        let text = "Patient Name: 12345\nClient Name: Maria Lopez";
        assert_eq!(
            IdentityExtractor::default().patient_name(text).as_deref(),
            Some("Maria Lopez")
        );
    }

    #[test]
    fn patient_id_label_is_not_read_as_a_name() {
        let text = "Patient ID: P-100";
        let extractor = IdentityExtractor::default();

        assert_eq!(extractor.patient_name(text), None);
        assert_eq!(extractor.patient_id(text).as_deref(), Some("P-100"));
    }

    #[test]
    fn first_test_date_label_decides() {
        let extractor = IdentityExtractor::default();
        let text = "Test Date: 13/40/2025\nCollection Date: 01/02/2025";

        assert_eq!(extractor.test_date(text), None);
        assert_eq!(
            extractor.test_date("Report Date: 1/2/2025"),
            NaiveDate::from_ymd_opt(2025, 1, 2)
        );
    }

    #[test]
    fn custom_label_tables_are_supported() {
        let mut labels = IdentityLabels::standard();
        labels.name = vec![Label::loose("Nombre")];
        let extractor = IdentityExtractor::new(IdentityPatterns::new(&labels).unwrap());

        assert_eq!(extractor.patient_name("Nombre: Lucia Vega").as_deref(), Some("Lucia Vega"));
        assert_eq!(extractor.patient_name("Patient Name: Jane Doe"), None);
    }
}
