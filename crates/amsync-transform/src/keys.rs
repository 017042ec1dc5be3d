//! Namespaced-key normalization.
//!
//! AM records use `namespace:field` keys at the top level (e.g.
//! `loc:Locatie_geometrie`). The local replica instead nests these under a
//! `{namespace: {field: value}}` bucket, with `.` replaced by `_` in field
//! names (ArangoDB document keys can't contain `.`). Below the top level,
//! any stray `ns:` prefix is stripped without creating a bucket, and `.`
//! is still replaced by `_`. `@`-prefixed keys (`@id`, `@type`) are always
//! preserved verbatim. Both passes are idempotent: running them again on
//! already-normalized input is a no-op.
//!
//! Two entry points exist because the asset hot path (hundreds of
//! thousands of records per fill) can't afford a single fully recursive
//! walk that re-checks "is this depth 0" at every nesting level:
//!
//! - [`transform_keys`] is the straightforward single-pass recursive
//!   version, used for the low-volume `agents`/`betrokkenerelaties`
//!   resources.
//! - [`normalize_asset`] splits the work into a top-level bucketing pass
//!   ([`normalize_asset_top_level_keys`]) and a nested-stripping pass
//!   ([`normalize_nested_keys`]) applied over the result, each with a
//!   fast path that avoids allocating a new key when nothing needs to
//!   change.

use serde_json::{Map, Value};

fn clean_field_name(field: &str) -> String {
    field.replace('.', "_")
}

/// Derive an ArangoDB document `_key` from a full AM URI by taking its
/// last `/`-separated segment — `https://.../assets/<uuid>` becomes
/// `<uuid>`. Ground truth: `InitialFillStep.to_short_uri`.
pub fn short_key_from_uri(uri: &str) -> &str {
    uri.rsplit('/').next().unwrap_or(uri)
}

/// Fully recursive key transform: at depth 0, `ns:field` keys become
/// `{ns: {field: ...}}`; at any deeper level, a stray `ns:` prefix is
/// stripped with no bucket created. Used for `agents` and
/// `betrokkenerelaties`.
pub fn transform_keys(value: &Value) -> Value {
    transform_keys_at(value, 0)
}

fn transform_keys_at(value: &Value, depth: usize) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, val) in map {
                let transformed_val = transform_keys_at(val, depth + 1);
                if key.starts_with('@') {
                    out.insert(key.clone(), transformed_val);
                    continue;
                }
                if depth == 0 {
                    if let Some((ns, field)) = key.split_once(':') {
                        let field = clean_field_name(field);
                        let bucket = out
                            .entry(ns.to_string())
                            .or_insert_with(|| Value::Object(Map::new()));
                        if let Value::Object(bucket_map) = bucket {
                            bucket_map.insert(field, transformed_val);
                        }
                        continue;
                    }
                    out.insert(clean_field_name(key), transformed_val);
                } else {
                    let stripped = match key.split_once(':') {
                        Some((_, field)) => field,
                        None => key.as_str(),
                    };
                    out.insert(clean_field_name(stripped), transformed_val);
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| transform_keys_at(v, depth)).collect()),
        other => other.clone(),
    }
}

/// Normalize an asset document: top-level namespace bucketing, then
/// nested-key cleanup within each bucket.
pub fn normalize_asset(value: &Value) -> Value {
    let bucketed = normalize_asset_top_level_keys(value);
    normalize_nested_keys(&bucketed)
}

/// Top-level-only pass: bucket `ns:field` keys, preserve `@`-keys, leave
/// everything else (including nested structures) untouched. Does not
/// recurse — [`normalize_nested_keys`] handles the rest in a second pass.
fn normalize_asset_top_level_keys(value: &Value) -> Value {
    let Value::Object(map) = value else {
        return value.clone();
    };
    let mut out = Map::with_capacity(map.len());
    for (key, val) in map {
        if key.starts_with('@') {
            out.insert(key.clone(), val.clone());
            continue;
        }
        if let Some((ns, field)) = key.split_once(':') {
            let field = clean_field_name(field);
            let bucket = out.entry(ns.to_string()).or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(bucket_map) = bucket {
                bucket_map.insert(field, val.clone());
            }
            continue;
        }
        if key.contains('.') {
            out.insert(clean_field_name(key), val.clone());
        } else {
            // fast path: key needs no change, avoid the replace() allocation
            out.insert(key.clone(), val.clone());
        }
    }
    Value::Object(out)
}

/// Recursive pass: strip any stray `ns:` prefix (no bucketing) and clean
/// `.` in field names at every level, including the top. Safe to run on
/// the output of [`normalize_asset_top_level_keys`] because top-level keys
/// are already bucket names or plain fields with no `:` left in them.
fn normalize_nested_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, val) in map {
                let normalized_val = normalize_nested_keys(val);
                if key.starts_with('@') {
                    out.insert(key.clone(), normalized_val);
                    continue;
                }
                let stripped: &str = match key.split_once(':') {
                    Some((_, field)) => field,
                    None => key.as_str(),
                };
                if stripped.contains('.') {
                    out.insert(stripped.replace('.', "_"), normalized_val);
                } else if stripped.len() == key.len() {
                    // fast path: nothing stripped, no dots — reuse the original key
                    out.insert(key.clone(), normalized_val);
                } else {
                    out.insert(stripped.to_string(), normalized_val);
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(normalize_nested_keys).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn buckets_top_level_namespaced_keys() {
        let input = json!({
            "@id": "https://example/assets/1",
            "@type": "Asset",
            "loc:Locatie_geometrie": "POINT (1 2)",
            "AIMDBStatus:isActief": true,
        });
        let out = normalize_asset(&input);
        assert_eq!(out["@id"], "https://example/assets/1");
        assert_eq!(out["loc"]["Locatie_geometrie"], "POINT (1 2)");
        assert_eq!(out["AIMDBStatus"]["isActief"], true);
    }

    #[test]
    fn replaces_dots_in_field_names() {
        let input = json!({ "tz:Toezicht.Groep": "x" });
        let out = normalize_asset(&input);
        assert_eq!(out["tz"]["Toezicht_Groep"], "x");
    }

    #[test]
    fn strips_nested_namespace_prefix_without_bucketing() {
        let input = json!({
            "geo:Geometrie_log": [
                { "geo:DtcLog_geometrie": "POINT (1 2)" }
            ]
        });
        let out = normalize_asset(&input);
        let entry = &out["geo"]["Geometrie_log"][0];
        assert_eq!(entry["DtcLog_geometrie"], "POINT (1 2)");
    }

    #[test]
    fn is_idempotent_on_normalized_input() {
        let input = json!({ "tz": { "Groep": "x" }, "@id": "1" });
        let once = normalize_asset(&input);
        let twice = normalize_asset(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn transform_keys_matches_normalize_asset_for_simple_shapes() {
        let input = json!({
            "@id": "1",
            "loc:Locatie_geometrie": "POINT (1 2)",
        });
        assert_eq!(transform_keys(&input), normalize_asset(&input));
    }
}
