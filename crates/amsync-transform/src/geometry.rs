//! Geometry extraction and reprojection.
//!
//! AM's "GeoJSON geometry" for an asset is actually a WKT string tucked
//! away in one of three possible locations, checked in this strict
//! priority order:
//!
//! 1. `geo.Geometrie_log[0].DtcLog_geometrie` (an explicit geometry log
//!    entry, when present).
//! 2. `loc.Locatie_geometrie` (a direct WKT field).
//! 3. `loc.Locatie_puntlocatie.3Dpunt_puntgeometrie`, which holds raw
//!    Lambert72/Lambert2008 coordinates rather than WKT — synthesized
//!    here into a `POINT Z (x y z)` string before reprojection, preferring
//!    Lambert72 over Lambert2008 when both are present.
//!
//! Once a WKT string is in hand, [`reproject_wkt_to_wgs84`] strips any
//! `SRID=...;` prefix and reprojects from Belgian Lambert 2008
//! (EPSG:3812) to WGS84 (EPSG:4326). Simple points take a fast manual-parse
//! path; anything else falls back to a full WKT parse and a per-vertex
//! reprojection. `geo_types::Coord` is 2D-only, so output coordinates are
//! always 2D even when the source WKT carried a Z ordinate — there is no
//! separate truncation step because there is nowhere for the third
//! dimension to go.

use geo::MapCoordsInPlace;
use proj::Proj;
use serde_json::Value;
use std::cell::RefCell;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("could not parse WKT: {0}")]
    Parse(String),
    #[error("reprojection failed: {0}")]
    Reprojection(String),
}

/// Extract a WKT geometry string from a normalized asset document,
/// trying each of the three known locations in priority order.
pub fn extract_wkt(doc: &Value) -> Option<String> {
    if let Some(wkt) = doc.pointer("/geo/Geometrie_log/0/DtcLog_geometrie").and_then(Value::as_str) {
        return Some(wkt.to_string());
    }
    if let Some(wkt) = doc.pointer("/loc/Locatie_geometrie").and_then(Value::as_str) {
        return Some(wkt.to_string());
    }
    let point = doc.pointer("/loc/Locatie_puntlocatie/3Dpunt_puntgeometrie")?;
    for key in ["DtcCoord_lambert72", "DtcCoord_lambert2008"] {
        let Some(coords) = point.get(key) else { continue };
        let x = coords.get("x").and_then(Value::as_f64);
        let y = coords.get("y").and_then(Value::as_f64);
        if let (Some(x), Some(y)) = (x, y) {
            let z = coords.get("z").and_then(Value::as_f64).unwrap_or(0.0);
            return Some(format!("POINT Z ({x} {y} {z})"));
        }
    }
    None
}

fn strip_srid_prefix(wkt: &str) -> &str {
    let wkt = wkt.trim();
    match wkt.strip_prefix("SRID=").and_then(|rest| rest.split_once(';')) {
        Some((_srid, geometry)) => geometry.trim(),
        None => wkt,
    }
}

/// Manual fast-path parse for `POINT (x y)` / `POINT Z (x y z)`, skipping
/// the general WKT parser and its heap allocations for the overwhelmingly
/// common single-point case.
fn fast_parse_point(wkt: &str) -> Option<(f64, f64)> {
    let rest = wkt.strip_prefix("POINT Z").or_else(|| wkt.strip_prefix("POINT"))?;
    let inner = rest.trim().strip_prefix('(')?.strip_suffix(')')?;
    let mut parts = inner.split_whitespace();
    let x: f64 = parts.next()?.parse().ok()?;
    let y: f64 = parts.next()?.parse().ok()?;
    Some((x, y))
}

fn reprojector() -> Result<Proj, GeometryError> {
    Proj::new_known_crs("EPSG:3812", "EPSG:4326", None)
        .map_err(|e| GeometryError::Reprojection(format!("failed to build EPSG:3812 -> EPSG:4326 transform: {e}")))
}

/// Reproject a WKT geometry (assumed Belgian Lambert 2008 / EPSG:3812, the
/// upstream default) to WGS84 and return it as GeoJSON.
pub fn reproject_wkt_to_wgs84(wkt: &str) -> Result<geojson::Geometry, GeometryError> {
    let cleaned = strip_srid_prefix(wkt);
    let proj = reprojector()?;

    if let Some((x, y)) = fast_parse_point(cleaned) {
        let (lon, lat) = proj
            .convert((x, y))
            .map_err(|e| GeometryError::Reprojection(e.to_string()))?;
        return Ok(geojson::Geometry::new(geojson::Value::Point(vec![lon, lat])));
    }

    let geometry: geo_types::Geometry<f64> = wkt::TryFromWkt::try_from_wkt_str(cleaned)
        .map_err(|e| GeometryError::Parse(e.to_string()))?;
    let reprojected = reproject_geometry(geometry, &proj)?;
    Ok(geojson::Geometry::from(&reprojected))
}

fn reproject_geometry(
    mut geometry: geo_types::Geometry<f64>,
    proj: &Proj,
) -> Result<geo_types::Geometry<f64>, GeometryError> {
    let error: RefCell<Option<GeometryError>> = RefCell::new(None);
    geometry.map_coords_in_place(|c| match proj.convert((c.x, c.y)) {
        Ok((lon, lat)) => geo_types::Coord { x: lon, y: lat },
        Err(e) => {
            *error.borrow_mut() = Some(GeometryError::Reprojection(e.to_string()));
            c
        }
    });
    match error.into_inner() {
        Some(e) => Err(e),
        None => Ok(geometry),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_from_geometrie_log_first() {
        let doc = json!({
            "geo": { "Geometrie_log": [{ "DtcLog_geometrie": "POINT (1 2)" }] },
            "loc": { "Locatie_geometrie": "POINT (9 9)" },
        });
        assert_eq!(extract_wkt(&doc).as_deref(), Some("POINT (1 2)"));
    }

    #[test]
    fn falls_back_to_locatie_geometrie() {
        let doc = json!({ "loc": { "Locatie_geometrie": "POINT (3 4)" } });
        assert_eq!(extract_wkt(&doc).as_deref(), Some("POINT (3 4)"));
    }

    #[test]
    fn synthesizes_point_preferring_lambert72_over_lambert2008() {
        let doc = json!({
            "loc": {
                "Locatie_puntlocatie": {
                    "3Dpunt_puntgeometrie": {
                        "DtcCoord_lambert72": { "x": 1.0, "y": 2.0, "z": 3.0 },
                        "DtcCoord_lambert2008": { "x": 10.0, "y": 20.0, "z": 30.0 },
                    }
                }
            }
        });
        assert_eq!(extract_wkt(&doc).as_deref(), Some("POINT Z (1 2 3)"));
    }

    #[test]
    fn synthesizes_point_from_lambert2008_when_lambert72_absent() {
        let doc = json!({
            "loc": {
                "Locatie_puntlocatie": {
                    "3Dpunt_puntgeometrie": {
                        "DtcCoord_lambert2008": { "x": 10.0, "y": 20.0, "z": 30.0 },
                    }
                }
            }
        });
        assert_eq!(extract_wkt(&doc).as_deref(), Some("POINT Z (10 20 30)"));
    }

    #[test]
    fn strips_srid_prefix() {
        assert_eq!(strip_srid_prefix("SRID=3812;POINT (1 2)"), "POINT (1 2)");
        assert_eq!(strip_srid_prefix("POINT (1 2)"), "POINT (1 2)");
    }

    #[test]
    fn fast_parses_point_z_ignoring_the_z_ordinate() {
        assert_eq!(fast_parse_point("POINT Z (150000 200000 10)"), Some((150000.0, 200000.0)));
        assert_eq!(fast_parse_point("POINT (150000 200000)"), Some((150000.0, 200000.0)));
        assert_eq!(fast_parse_point("LINESTRING (1 2, 3 4)"), None);
    }
}
