//! # Variable Catalog
//!
//! Static alias table mapping human-facing variable names to the arrays of the
//! ARCO ERA5 store. Every variable is reachable by its canonical store name
//! (e.g. `2m_temperature`) and by its ECMWF short name (e.g. `t2m`); lookups
//! are case-insensitive.
//!
//! ```rust
//! use era5fetch::catalog::{lookup, VariableKind};
//!
//! let spec = lookup("t2m").unwrap();
//! assert_eq!(spec.name, "2m_temperature");
//! assert_eq!(spec.kind, VariableKind::Surface);
//! ```

use crate::error::FetchError;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::LazyLock;

/// Whether a variable spans the pressure-level axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    /// Defined on every pressure level
    Level,
    /// Single-level (surface) field
    Surface,
}

impl fmt::Display for VariableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableKind::Level => write!(f, "pressure-level"),
            VariableKind::Surface => write!(f, "surface"),
        }
    }
}

/// One entry of the alias table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableSpec {
    /// Array name in the store
    pub name: &'static str,
    /// Short name
    pub alias: &'static str,
    pub kind: VariableKind,
    /// Informational unit, used when the store carries none
    pub units: &'static str,
    pub long_name: &'static str,
}

const fn level(
    name: &'static str,
    alias: &'static str,
    units: &'static str,
    long_name: &'static str,
) -> VariableSpec {
    VariableSpec {
        name,
        alias,
        kind: VariableKind::Level,
        units,
        long_name,
    }
}

const fn surface(
    name: &'static str,
    alias: &'static str,
    units: &'static str,
    long_name: &'static str,
) -> VariableSpec {
    VariableSpec {
        name,
        alias,
        kind: VariableKind::Surface,
        units,
        long_name,
    }
}

static VARIABLES: [VariableSpec; 20] = [
    level("geopotential", "z", "m**2 s**-2", "Geopotential"),
    level("specific_humidity", "q", "kg kg**-1", "Specific humidity"),
    level("temperature", "t", "K", "Temperature"),
    level("u_component_of_wind", "u", "m s**-1", "U component of wind"),
    level("v_component_of_wind", "v", "m s**-1", "V component of wind"),
    level("fraction_of_cloud_cover", "cc", "(0 - 1)", "Fraction of cloud cover"),
    level("ozone_mass_mixing_ratio", "o3", "kg kg**-1", "Ozone mass mixing ratio"),
    level(
        "specific_cloud_ice_water_content",
        "ciwc",
        "kg kg**-1",
        "Specific cloud ice water content",
    ),
    level(
        "specific_cloud_liquid_water_content",
        "clwc",
        "kg kg**-1",
        "Specific cloud liquid water content",
    ),
    level("potential_vorticity", "pv", "K m**2 kg**-1 s**-1", "Potential vorticity"),
    level("vertical_velocity", "w", "Pa s**-1", "Vertical velocity"),
    surface("2m_temperature", "t2m", "K", "2 metre temperature"),
    surface("2m_dewpoint_temperature", "d2m", "K", "2 metre dewpoint temperature"),
    surface("10m_u_component_of_wind", "u10", "m s**-1", "10 metre U wind component"),
    surface("10m_v_component_of_wind", "v10", "m s**-1", "10 metre V wind component"),
    surface("mean_sea_level_pressure", "msl", "Pa", "Mean sea level pressure"),
    surface("surface_pressure", "sp", "Pa", "Surface pressure"),
    surface("total_precipitation", "tp", "m", "Total precipitation"),
    surface("total_cloud_cover", "tcc", "(0 - 1)", "Total cloud cover"),
    surface("sea_surface_temperature", "sst", "K", "Sea surface temperature"),
];

/// Variables fetched when a request names none: one surface and one
/// pressure-level field.
pub const DEFAULT_VARIABLES: [&str; 2] = ["2m_temperature", "temperature"];

static INDEX: LazyLock<HashMap<&'static str, &'static VariableSpec>> = LazyLock::new(|| {
    let mut index = HashMap::with_capacity(VARIABLES.len() * 2);
    for spec in VARIABLES.iter() {
        index.insert(spec.name, spec);
        index.insert(spec.alias, spec);
    }
    index
});

/// All known variables in table order.
pub fn all() -> &'static [VariableSpec] {
    &VARIABLES
}

/// Looks up a variable by canonical name or short alias.
pub fn lookup(name: &str) -> Option<&'static VariableSpec> {
    let key = name.trim().to_ascii_lowercase();
    INDEX.get(key.as_str()).copied()
}

/// Every accepted name: canonical names followed by short aliases.
pub fn valid_names() -> Vec<String> {
    VARIABLES
        .iter()
        .map(|v| v.name.to_string())
        .chain(VARIABLES.iter().map(|v| v.alias.to_string()))
        .collect()
}

/// Resolves a list of requested names into unique specs.
///
/// Order of first appearance is kept and names that resolve to the same
/// canonical variable (`t` and `temperature`) collapse into one entry. All
/// unknown names are collected before failing.
pub fn resolve(names: &[String]) -> Result<Vec<&'static VariableSpec>, FetchError> {
    let mut resolved = Vec::new();
    let mut seen = HashSet::new();
    let mut unknown = Vec::new();

    for name in names {
        match lookup(name) {
            Some(spec) => {
                if seen.insert(spec.name) {
                    resolved.push(spec);
                }
            }
            None => unknown.push(name.clone()),
        }
    }

    if !unknown.is_empty() {
        return Err(FetchError::UnknownVariables {
            unknown,
            valid: valid_names(),
        });
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name_and_alias() {
        assert_eq!(lookup("temperature").unwrap().alias, "t");
        assert_eq!(lookup("t").unwrap().name, "temperature");
        assert_eq!(lookup("  MSL ").unwrap().name, "mean_sea_level_pressure");
        assert!(lookup("not_a_variable").is_none());
    }

    #[test]
    fn test_aliases_are_unique() {
        let mut names = HashSet::new();
        for spec in all() {
            assert!(names.insert(spec.name), "duplicate name {}", spec.name);
            assert!(names.insert(spec.alias), "duplicate alias {}", spec.alias);
        }
    }

    #[test]
    fn test_defaults_cover_both_kinds() {
        let defaults: Vec<String> = DEFAULT_VARIABLES.iter().map(|s| s.to_string()).collect();
        let specs = resolve(&defaults).unwrap();
        assert!(specs.iter().any(|s| s.kind == VariableKind::Surface));
        assert!(specs.iter().any(|s| s.kind == VariableKind::Level));
    }

    #[test]
    fn test_resolve_dedupes_by_canonical_name() {
        let names = vec!["t".to_string(), "temperature".to_string(), "t2m".to_string()];
        let specs = resolve(&names).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].name, "temperature");
        assert_eq!(specs[1].name, "2m_temperature");
    }

    #[test]
    fn test_resolve_reports_all_unknown_names() {
        let names = vec![
            "temperature".to_string(),
            "foo".to_string(),
            "bar".to_string(),
        ];
        match resolve(&names) {
            Err(FetchError::UnknownVariables { unknown, valid }) => {
                assert_eq!(unknown, vec!["foo".to_string(), "bar".to_string()]);
                assert!(valid.contains(&"geopotential".to_string()));
                assert!(valid.contains(&"sst".to_string()));
                assert_eq!(valid.len(), all().len() * 2);
            }
            other => panic!("Expected UnknownVariables, got {:?}", other),
        }
    }
}
