// ABOUTME: Maps a destination MSISDN to a network-specific source MSISDN override
// ABOUTME: Pure lookup over the configured country-code / prefix / network tables

use std::collections::HashMap;

use serde::Deserialize;

/// One level of the operator prefix table: either a network name or a deeper
/// map of longer prefixes.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PrefixEntry {
    Network(String),
    Nested(HashMap<String, PrefixEntry>),
}

/// Prefix -> network tables, e.g. `{ "27": { "27761": "NETWORK1" } }`
pub type OperatorPrefixes = HashMap<String, PrefixEntry>;

/// Network -> source MSISDN, e.g. `{ "NETWORK1": "27999" }`
pub type OperatorNumbers = HashMap<String, String>;

/// Substitute the country code for a single leading zero. Anything else is
/// passed through untouched.
pub fn normalize_msisdn(msisdn: &str, country_code: &str) -> String {
    match msisdn.strip_prefix('0') {
        Some(rest) if !country_code.is_empty() => format!("{country_code}{rest}"),
        _ => msisdn.to_string(),
    }
}

/// Walk the prefix table by longest matching prefix at each level.
fn operator_name<'a>(msisdn: &str, prefixes: &'a HashMap<String, PrefixEntry>) -> Option<&'a str> {
    let (_, entry) = prefixes
        .iter()
        .filter(|(prefix, _)| msisdn.starts_with(prefix.as_str()))
        .max_by_key(|(prefix, _)| prefix.len())?;

    match entry {
        PrefixEntry::Network(name) => Some(name),
        PrefixEntry::Nested(deeper) => operator_name(msisdn, deeper),
    }
}

/// Resolve the source MSISDN to use for `to_addr`, if the destination's
/// network has one configured. `None` means: trust the message's from_addr.
pub fn operator_number(
    to_addr: &str,
    country_code: &str,
    prefixes: &OperatorPrefixes,
    numbers: &OperatorNumbers,
) -> Option<String> {
    let msisdn = normalize_msisdn(to_addr, country_code);
    let network = operator_name(&msisdn, prefixes)?;
    numbers.get(network).cloned()
}
