//! Client identity reconciliation: the name printed on the document wins
//! over the operator-entered one when the two disagree.

use tracing::{info, warn};

use crate::config::NameMatchPolicy;
use crate::identity::IdentityExtractor;
use crate::models::{ClientData, DataSource, FormData, PdfExtractedData};

const MIN_RAW_TEXT_CHARS: usize = 100;

#[derive(Clone, Default)]
pub struct ClientDataPriority {
    identity: IdentityExtractor,
    policy: NameMatchPolicy,
}

impl ClientDataPriority {
    pub fn new(identity: IdentityExtractor, policy: NameMatchPolicy) -> Self {
        Self { identity, policy }
    }

    /// Build a [`PdfExtractedData`] straight from document text.
    pub fn extract(&self, raw_text: &str) -> PdfExtractedData {
        PdfExtractedData {
            client_name: self.identity.patient_name(raw_text),
            assessment_date: self.identity.test_date(raw_text),
            raw_text: raw_text.to_string(),
        }
    }

    pub fn reconcile(&self, form: &FormData, pdf: &PdfExtractedData) -> ClientData {
        let pdf_name = pdf
            .client_name
            .clone()
            .or_else(|| self.identity.patient_name(&pdf.raw_text));
        let assessment_date = pdf.assessment_date.or(form.assessment_date);

        match pdf_name {
            Some(pdf_name) if !self.names_match(&pdf_name, &form.client_name) => {
                info!(
                    pdf_name = %pdf_name,
                    form_name = %form.client_name,
                    "Client name from document overrides form entry"
                );
                let (first, last) = split_name(&pdf_name);
                ClientData {
                    client_name: pdf_name,
                    client_email: form.client_email.clone(),
                    client_first_name: first,
                    client_last_name: last,
                    assessment_date,
                    data_source: DataSource::PdfPriority,
                    form_override: Some(form.client_name.clone()),
                }
            }
            _ => ClientData {
                client_name: form.client_name.clone(),
                client_email: form.client_email.clone(),
                client_first_name: form.client_first_name.clone(),
                client_last_name: form.client_last_name.clone(),
                assessment_date,
                data_source: DataSource::FormEntry,
                form_override: None,
            },
        }
    }

    fn names_match(&self, pdf_name: &str, form_name: &str) -> bool {
        match self.policy {
            NameMatchPolicy::Exact => pdf_name == form_name,
            NameMatchPolicy::Normalized => normalize_name(pdf_name) == normalize_name(form_name),
        }
    }
}

fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// First token and the remainder, for multi-word names only.
fn split_name(name: &str) -> (Option<String>, Option<String>) {
    let mut parts = name.split_whitespace();
    let first = parts.next().map(str::to_string);
    let rest: Vec<&str> = parts.collect();
    if rest.is_empty() {
        (first, None)
    } else {
        (first, Some(rest.join(" ")))
    }
}

pub fn data_source_message(client: &ClientData) -> String {
    match client.data_source {
        DataSource::PdfPriority => match &client.form_override {
            Some(form_name) => format!(
                "Using client name from PDF: {} (overrode form entry: {})",
                client.client_name, form_name
            ),
            None => format!("Using client name from PDF: {}", client.client_name),
        },
        DataSource::FormEntry => format!("Using client name from form: {}", client.client_name),
        DataSource::Merged => format!("Using merged client data: {}", client.client_name),
    }
}

/// Problems that make the reconciled data unfit for a client record.
pub fn validate_analysis_data(client: &ClientData, pdf: &PdfExtractedData) -> Vec<String> {
    let mut issues = Vec::new();
    if client.client_name.trim().is_empty() {
        issues.push("Client name is required".to_string());
    }
    if pdf.raw_text.trim().chars().count() < MIN_RAW_TEXT_CHARS {
        issues.push("PDF text extraction appears incomplete".to_string());
    }
    if !issues.is_empty() {
        warn!(?issues, "Client analysis data has issues");
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn form(name: &str) -> FormData {
        FormData {
            client_name: name.to_string(),
            client_email: Some("client@example.com".to_string()),
            ..Default::default()
        }
    }

    fn pdf(text: &str) -> PdfExtractedData {
        PdfExtractedData {
            raw_text: text.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn differing_document_name_takes_priority() {
        let client = ClientDataPriority::default()
            .reconcile(&form("John Smith"), &pdf("Patient Name: Jane Doe"));

        assert_eq!(client.data_source, DataSource::PdfPriority);
        assert_eq!(client.client_name, "Jane Doe");
        assert_eq!(client.form_override.as_deref(), Some("John Smith"));
        assert_eq!(client.client_first_name.as_deref(), Some("Jane"));
        assert_eq!(client.client_last_name.as_deref(), Some("Doe"));
        assert_eq!(client.client_email.as_deref(), Some("client@example.com"));
        assert_eq!(
            data_source_message(&client),
            "Using client name from PDF: Jane Doe (overrode form entry: John Smith)"
        );
    }

    #[test]
    fn matching_name_keeps_form_entry() {
        let client = ClientDataPriority::default()
            .reconcile(&form("John Smith"), &pdf("Patient Name: John Smith"));

        assert_eq!(client.data_source, DataSource::FormEntry);
        assert_eq!(client.client_name, "John Smith");
        assert_eq!(client.form_override, None);
        assert_eq!(data_source_message(&client), "Using client name from form: John Smith");
    }

    #[test]
    fn no_document_name_keeps_form_entry() {
        let client = ClientDataPriority::default()
            .reconcile(&form("John Smith"), &pdf("Energy score 42"));
        assert_eq!(client.data_source, DataSource::FormEntry);
    }

    #[test]
    fn exact_policy_is_case_sensitive() {
        let exact = ClientDataPriority::default()
            .reconcile(&form("john  smith"), &pdf("Patient Name: John Smith"));
        assert_eq!(exact.data_source, DataSource::PdfPriority);

        let normalized = ClientDataPriority::new(IdentityExtractor::default(), NameMatchPolicy::Normalized)
            .reconcile(&form("john  smith"), &pdf("Patient Name: John Smith"));
        assert_eq!(normalized.data_source, DataSource::FormEntry);
        assert_eq!(normalized.client_name, "john  smith");
    }

    #[test]
    fn document_date_wins_independently_of_name() {
        let form_date = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        let pdf_date = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        let mut form = form("John Smith");
        form.assessment_date = Some(form_date);

        let mut matching = pdf("Patient Name: John Smith");
        matching.assessment_date = Some(pdf_date);
        let client = ClientDataPriority::default().reconcile(&form, &matching);
        assert_eq!(client.data_source, DataSource::FormEntry);
        assert_eq!(client.assessment_date, Some(pdf_date));

        let client = ClientDataPriority::default().reconcile(&form, &pdf("no identity here"));
        assert_eq!(client.assessment_date, Some(form_date));
    }

    #[test]
    fn short_text_and_empty_name_are_flagged() {
        let client = ClientDataPriority::default().reconcile(&form(""), &pdf("short"));
        let issues = validate_analysis_data(&client, &pdf("short"));
        assert_eq!(
            issues,
            vec!["Client name is required", "PDF text extraction appears incomplete"]
        );

        let long = pdf(&"Patient Name: John Smith\n".repeat(5));
        let client = ClientDataPriority::default().reconcile(&form("John Smith"), &long);
        assert!(validate_analysis_data(&client, &long).is_empty());
    }
}
