//! `DATABASE_URL` derivation from service bindings

use serde_json::Value;
use tracing::debug;

/// Schemes recognised as databases, with the scheme written to `DATABASE_URL`
const SCHEMES: [(&str, &str); 4] = [
    ("mysql2", "mysql2"),
    ("mysql", "mysql2"),
    ("postgresql", "postgres"),
    ("postgres", "postgres"),
];

/// First database URI among the bindings, with its scheme normalised
///
/// Labels are scanned in sorted order, bindings in array order. Bindings
/// that are not valid JSON yield nothing.
pub fn database_url(services: &str) -> Option<String> {
    let value: Value = match serde_json::from_str(services) {
        Ok(value) => value,
        Err(e) => {
            debug!("Service bindings are not JSON, skipping DATABASE_URL: {}", e);
            return None;
        }
    };

    let labels = value.as_object()?;
    let mut names: Vec<&String> = labels.keys().collect();
    names.sort();

    names
        .into_iter()
        .filter_map(|label| labels.get(label).and_then(Value::as_array))
        .flatten()
        .filter_map(|binding| binding.pointer("/credentials/uri").and_then(Value::as_str))
        .find_map(normalise)
}

fn normalise(uri: &str) -> Option<String> {
    let (scheme, rest) = uri.split_once("://")?;
    SCHEMES
        .iter()
        .find(|(known, _)| scheme.eq_ignore_ascii_case(known))
        .map(|(_, target)| format!("{}://{}", target, rest))
}
