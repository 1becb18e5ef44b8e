// ABOUTME: Configurable parser for the delivery-report text carried in deliver_sm
// ABOUTME: The wire format is a de-facto convention, not part of SMPP, so the regex is deployment config

use std::collections::BTreeMap;

use regex::Regex;
use serde::Serialize;

/// Default pattern for the short_message of a delivery receipt, per the
/// SMPP v3.4 Appendix B convention. The `text` capture is limited to 20
/// characters by the convention itself.
pub const DEFAULT_DELIVERY_REPORT_REGEX: &str = r"id:(?P<id>\S{0,65}) +sub:(?P<sub>...) +dlvrd:(?P<dlvrd>...) +submit date:(?P<submit_date>\d*) +done date:(?P<done_date>\d*) +stat:(?P<stat>[A-Z]{7}) +err:(?P<err>...) +[Tt]ext:(?P<text>.{0,20}).*";

/// Parsed delivery report: the named capture groups of the configured
/// pattern, keyed by group name.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DeliveryReceipt {
    fields: BTreeMap<String, String>,
}

impl DeliveryReceipt {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// SMSC-assigned message id, correlating back to a submit_sm_resp
    pub fn message_id(&self) -> Option<&str> {
        self.get("id")
    }

    /// Final delivery state token, e.g. DELIVRD or REJECTD
    pub fn stat(&self) -> Option<&str> {
        self.get("stat")
    }

    /// Completion timestamp in YYMMDDHHMMSS
    pub fn done_date(&self) -> Option<&str> {
        self.get("done_date")
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }
}

/// Applies the configured delivery-report regex to deliver_sm text.
#[derive(Clone, Debug)]
pub struct DeliveryReportParser {
    regex: Regex,
}

impl DeliveryReportParser {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(DeliveryReportParser {
            regex: Regex::new(pattern)?,
        })
    }

    /// Match `text` against the pattern, returning the capture dictionary
    /// on success.
    pub fn parse(&self, text: &str) -> Option<DeliveryReceipt> {
        let captures = self.regex.captures(text)?;
        let fields = self
            .regex
            .capture_names()
            .flatten()
            .filter_map(|name| {
                captures
                    .name(name)
                    .map(|m| (name.to_string(), m.as_str().to_string()))
            })
            .collect();
        Some(DeliveryReceipt { fields })
    }
}

impl Default for DeliveryReportParser {
    fn default() -> Self {
        DeliveryReportParser {
            regex: Regex::new(DEFAULT_DELIVERY_REPORT_REGEX)
                .unwrap_or_else(|_| unreachable!("default pattern is valid")),
        }
    }
}
