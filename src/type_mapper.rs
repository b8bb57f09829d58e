//! Bidirectional class-name / symbolic-name mapping (spec §4.1), kept stable
//! across refactors of the in-memory Rust types that back a record.
//!
//! Mirrors the shape of `eventually-core`'s process-wide, reset-able
//! registries (the type mapper is the storage-stability analogue of the
//! adapter provider singletons in `crate::adapter::provider`).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// Bidirectional mapping between Rust type names and their symbolic
/// (storage-stable) counterparts.
///
/// A single process-wide instance is reachable via [`StoreTypeMapper::global`];
/// tests should call [`StoreTypeMapper::reset`] between cases that register
/// explicit mappings.
#[derive(Default)]
pub struct StoreTypeMapper {
    to_symbolic: RwLock<HashMap<String, String>>,
    to_type: RwLock<HashMap<String, String>>,
}

impl StoreTypeMapper {
    /// Returns the process-wide singleton instance.
    pub fn global() -> Arc<StoreTypeMapper> {
        GLOBAL.clone()
    }

    /// Registers an explicit bidirectional mapping; last write wins.
    pub fn mapping(&self, type_name: impl Into<String>, symbolic_name: impl Into<String>) {
        let type_name = type_name.into();
        let symbolic_name = symbolic_name.into();

        self.to_symbolic
            .write()
            .insert(type_name.clone(), symbolic_name.clone());
        self.to_type.write().insert(symbolic_name, type_name);
    }

    /// Converts a Rust type name to its symbolic form.
    ///
    /// Uses the explicit registration if one exists; otherwise applies the
    /// PascalCase/CamelCase -> kebab-case convention.
    pub fn to_symbolic_name(&self, type_name: &str) -> String {
        if let Some(symbolic) = self.to_symbolic.read().get(type_name) {
            return symbolic.clone();
        }

        to_kebab_case(type_name)
    }

    /// Converts a symbolic name back to a Rust type name.
    ///
    /// Uses the explicit registration if one exists; otherwise splits on
    /// `-` and capitalizes each segment.
    pub fn to_type_name(&self, symbolic_name: &str) -> String {
        if let Some(type_name) = self.to_type.read().get(symbolic_name) {
            return type_name.clone();
        }

        from_kebab_case(symbolic_name)
    }

    /// Clears all explicit registrations. For test isolation.
    pub fn reset(&self) {
        self.to_symbolic.write().clear();
        self.to_type.write().clear();
    }
}

/// `XMLParser` -> `xml-parser`: insert a `-` at a lowercase-then-uppercase
/// boundary, and at the boundary between a run of uppercase letters and the
/// following `Upper-Lower` pair (so `XMLParser` splits as `XML` | `Parser`,
/// not `X` | `M` | `L` | `Parser`). Then lowercase everything.
fn to_kebab_case(type_name: &str) -> String {
    let chars: Vec<char> = type_name.chars().collect();
    let mut out = String::with_capacity(chars.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        let prev = i.checked_sub(1).map(|j| chars[j]);
        let next = chars.get(i + 1).copied();

        let lower_to_upper = matches!(prev, Some(p) if p.is_lowercase()) && c.is_uppercase();
        let upper_run_end = c.is_uppercase()
            && matches!(prev, Some(p) if p.is_uppercase())
            && matches!(next, Some(n) if n.is_lowercase());

        if i > 0 && (lower_to_upper || upper_run_end) {
            out.push('-');
        }

        out.push(c);
    }

    out.to_lowercase()
}

/// Inverse convention: split on `-`, capitalize each segment, join.
fn from_kebab_case(symbolic: &str) -> String {
    symbolic
        .split('-')
        .map(capitalize)
        .collect::<Vec<_>>()
        .join("")
}

fn capitalize(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL: Arc<StoreTypeMapper> = Arc::new(StoreTypeMapper::default());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convention_round_trips_simple_names() {
        assert_eq!(to_kebab_case("AccountOpened"), "account-opened");
        assert_eq!(from_kebab_case("account-opened"), "AccountOpened");
    }

    #[test]
    fn convention_handles_acronym_runs() {
        assert_eq!(to_kebab_case("XMLParser"), "xml-parser");
    }

    #[test]
    fn round_trip_is_identity_for_conventional_names() {
        for name in ["AccountOpened", "FundsDeposited", "XMLParser", "HTTPServer"] {
            let symbolic = to_kebab_case(name);
            let type_name = from_kebab_case(&symbolic);
            let re_symbolic = to_kebab_case(&type_name);
            assert_eq!(symbolic, re_symbolic);
        }
    }

    #[test]
    fn explicit_mapping_takes_priority_and_resets() {
        let mapper = StoreTypeMapper::default();
        mapper.mapping("AccountOpened", "acct-opened-v1");

        assert_eq!(mapper.to_symbolic_name("AccountOpened"), "acct-opened-v1");
        assert_eq!(mapper.to_type_name("acct-opened-v1"), "AccountOpened");

        mapper.reset();
        assert_eq!(mapper.to_symbolic_name("AccountOpened"), "account-opened");
    }
}
