//! Address normalization
//!
//! Canonicalizes raw free-text address fields into comparable components:
//! case folding, whitespace collapse, abbreviation expansion, and
//! unit-designator stripping. The normalized form is the sole input to
//! deterministic identity derivation, so any change here changes every
//! derived listing id.

use regex::Regex;
use serde::{Deserialize, Serialize};
use zipintel_common::types::RawAddress;
use zipintel_common::{IngestError, Result};

/// Canonical address components
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    /// Optional extra discriminator for otherwise-identical addresses
    /// (e.g. two stalls sharing one street address)
    pub disambiguator: Option<String>,
}

/// Normalize a raw address against the configured postal-code pattern
///
/// Fails with `InvalidAddress` when the street is missing/empty or the
/// postal code is missing or does not match `postal_pattern`.
pub fn normalize(raw: &RawAddress, postal_pattern: &Regex) -> Result<NormalizedAddress> {
    let street = raw
        .street
        .as_deref()
        .map(normalize_street)
        .unwrap_or_default();
    if street.is_empty() {
        return Err(IngestError::invalid_address("missing street"));
    }

    let postal_code = raw.postal_code.as_deref().unwrap_or("").trim().to_string();
    if !postal_pattern.is_match(&postal_code) {
        return Err(IngestError::invalid_address(format!(
            "postal code {postal_code:?} does not match expected shape"
        )));
    }

    Ok(NormalizedAddress {
        street,
        city: fold(raw.city.as_deref().unwrap_or("")),
        state: fold(raw.state.as_deref().unwrap_or("")),
        postal_code,
        disambiguator: None,
    })
}

/// Case fold and collapse internal whitespace
fn fold(s: &str) -> String {
    s.split_whitespace()
        .map(|t| t.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonicalize one street line
///
/// Tokens are lowercased, trailing punctuation dropped, directionals and
/// street types expanded, and everything from the first unit designator
/// onward discarded.
fn normalize_street(street: &str) -> String {
    let mut parts = Vec::new();

    for token in street.split_whitespace() {
        let token = token
            .trim_matches(|c: char| c == '.' || c == ',')
            .to_lowercase();
        if token.is_empty() {
            continue;
        }

        // "#4b" and everything after a unit designator is unit detail,
        // not part of the street identity.
        if token.starts_with('#') || is_unit_designator(&token) {
            break;
        }

        parts.push(expand_token(&token).to_string());
    }

    parts.join(" ")
}

fn is_unit_designator(token: &str) -> bool {
    matches!(
        token,
        "apt" | "apartment" | "suite" | "ste" | "unit" | "fl" | "floor" | "rm" | "room" | "bldg"
    )
}

/// Expand common street-type and directional abbreviations
fn expand_token(token: &str) -> &str {
    match token {
        "st" => "street",
        "ave" | "av" => "avenue",
        "blvd" => "boulevard",
        "rd" => "road",
        "dr" => "drive",
        "ln" => "lane",
        "ct" => "court",
        "pl" => "place",
        "pkwy" => "parkway",
        "hwy" => "highway",
        "cir" => "circle",
        "ter" => "terrace",
        "n" => "north",
        "s" => "south",
        "e" => "east",
        "w" => "west",
        "ne" => "northeast",
        "nw" => "northwest",
        "se" => "southeast",
        "sw" => "southwest",
        other => other,
    }
}
