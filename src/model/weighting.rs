//! Transport-mode weighting table `W` and the tag-normalization map used to
//! look segment type tags up in it, grounded in
//! `pyosmroute/osm/_osmcache.py`'s `_WEIGHTINGS`/`_EQUALTAGS` dictionaries
//! and reconciled against the Glossary table in `spec.md` (see `DESIGN.md`
//! Open Question 3 for the `trunk` divergence from the original).

use serde::{Deserialize, Serialize};
use std::fmt;

/// A transport mode the weighting table is indexed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    Car,
    Cycle,
    Foot,
    Horse,
    Mtb,
    Train,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportMode::Car => "car",
            TransportMode::Cycle => "cycle",
            TransportMode::Foot => "foot",
            TransportMode::Horse => "horse",
            TransportMode::Mtb => "mtb",
            TransportMode::Train => "train",
        };
        write!(f, "{s}")
    }
}

/// Collapses tag synonyms onto the canonical class name used to key `W`.
///
/// `trunk` and `residential` are intentionally left un-collapsed: `spec.md`'s
/// Glossary lists each as its own weighted class, diverging from the
/// original Python's `_EQUALTAGS["trunk"] = "primary"` and
/// `_EQUALTAGS["residential"] = "unclassified"` (see `DESIGN.md`). Neither
/// tag appears in §4.R's prose list of things the normalization map
/// collapses (`*_link`, `steps`, `pedestrian`, `bridleway`, `track`,
/// `driveway`, `arcade`, `light_rail`), unlike `track`/`bridleway`, which are
/// named there and so keep collapsing onto `cycleway` even though doing so
/// leaves their own Glossary rows unreachable.
pub fn normalize_tag(tag: &str) -> &str {
    match tag {
        "motorway_link" => "motorway",
        "primary_link" => "primary",
        "trunk_link" => "primary",
        "secondary_link" => "secondary",
        "tertiary_link" => "tertiary",
        "minor" => "unclassified",
        "steps" => "footway",
        "driveway" => "service",
        "pedestrian" => "footway",
        "bridleway" => "cycleway",
        "track" => "cycleway",
        "arcade" => "footway",
        "canal" => "river",
        "riverbank" => "river",
        "lake" => "river",
        "light_rail" => "railway",
        other => other,
    }
}

/// Looks up the weight of a (possibly un-normalized) type tag for a given
/// transport mode. Returns `0.0` when no entry exists in `W` for the
/// normalized tag, or for the mode within it — per `spec.md` §4.R, absence
/// means the segment is unroutable for that mode.
pub fn transport_weight(mode: TransportMode, tag: &str) -> f64 {
    let class = normalize_tag(tag);
    let row: &[(&str, f64)] = match class {
        "motorway" => &[("car", 10.0)],
        "trunk" => &[("car", 10.0), ("cycle", 0.05)],
        "primary" => &[("cycle", 0.3), ("car", 2.0), ("foot", 1.0), ("horse", 0.1)],
        "secondary" => &[("cycle", 1.0), ("car", 1.5), ("foot", 1.0), ("horse", 0.2)],
        "tertiary" => &[("cycle", 1.0), ("car", 1.0), ("foot", 1.0), ("horse", 0.3)],
        "unclassified" => &[("cycle", 1.0), ("car", 1.0), ("foot", 1.0), ("horse", 1.0)],
        "cycleway" => &[("cycle", 3.0), ("foot", 0.2)],
        "residential" => &[("cycle", 3.0), ("car", 0.7), ("foot", 1.0), ("horse", 1.0)],
        "track" => &[
            ("cycle", 1.0),
            ("car", 1.0),
            ("foot", 1.0),
            ("horse", 1.0),
            ("mtb", 3.0),
        ],
        "service" => &[("cycle", 1.0), ("car", 1.0), ("foot", 1.0), ("horse", 1.0)],
        "bridleway" => &[("cycle", 0.8), ("foot", 1.0), ("horse", 10.0), ("mtb", 3.0)],
        "footway" => &[("cycle", 0.2), ("foot", 1.0)],
        "rail" | "light_rail" | "subway" => &[("train", 1.0)],
        _ => &[],
    };
    let mode_str = mode.to_string();
    row.iter()
        .find(|(m, _)| *m == mode_str)
        .map(|(_, w)| *w)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motorway_only_routable_by_car() {
        assert_eq!(transport_weight(TransportMode::Car, "motorway"), 10.0);
        assert_eq!(transport_weight(TransportMode::Foot, "motorway"), 0.0);
    }

    #[test]
    fn trunk_keeps_its_own_weights_not_collapsed_into_primary() {
        assert_eq!(transport_weight(TransportMode::Car, "trunk"), 10.0);
        assert_eq!(transport_weight(TransportMode::Cycle, "trunk"), 0.05);
        assert_eq!(transport_weight(TransportMode::Foot, "trunk"), 0.0);
    }

    #[test]
    fn unknown_tag_is_unroutable() {
        assert_eq!(transport_weight(TransportMode::Car, "river"), 0.0);
    }

    #[test]
    fn link_roads_normalize_onto_parent_class() {
        assert_eq!(
            transport_weight(TransportMode::Car, "motorway_link"),
            transport_weight(TransportMode::Car, "motorway")
        );
    }

    #[test]
    fn tertiary_keeps_its_own_weights_not_collapsed_into_secondary() {
        assert_eq!(transport_weight(TransportMode::Car, "tertiary"), 1.0);
        assert_eq!(transport_weight(TransportMode::Horse, "tertiary"), 0.3);
        assert_eq!(
            transport_weight(TransportMode::Car, "tertiary_link"),
            transport_weight(TransportMode::Car, "tertiary")
        );
    }

    #[test]
    fn residential_keeps_its_own_weights_not_collapsed_into_unclassified() {
        assert_eq!(transport_weight(TransportMode::Car, "residential"), 0.7);
        assert_eq!(transport_weight(TransportMode::Cycle, "residential"), 3.0);
        assert_eq!(transport_weight(TransportMode::Car, "unclassified"), 1.0);
    }

    #[test]
    fn minor_still_collapses_onto_unclassified_since_their_weights_agree() {
        assert_eq!(
            transport_weight(TransportMode::Car, "minor"),
            transport_weight(TransportMode::Car, "unclassified")
        );
    }
}
