use serde::{Deserialize, Serialize};

/// Coordinate axis role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Axis {
    /// Longitude
    X,
    /// Latitude
    Y,
    /// Vertical level
    Z,
    /// Time
    T,
    /// Unclassified
    Unknown,
}

impl Axis {
    /// Classify an axis from a name token (`lat`, `longitude`, `time`, ...).
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "x" | "lon" | "long" | "longitude" => Axis::X,
            "y" | "lat" | "latitude" => Axis::Y,
            "z" | "lev" | "level" | "plev" | "depth" | "height" => Axis::Z,
            "t" | "time" => Axis::T,
            _ => Axis::Unknown,
        }
    }

    /// Short lower-case token for messages and result ids.
    pub fn token(&self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
            Axis::T => "t",
            Axis::Unknown => "?",
        }
    }

    /// True for X / Y / Z.
    pub fn is_spatial(&self) -> bool {
        matches!(self, Axis::X | Axis::Y | Axis::Z)
    }

    /// Parse a compact axis list such as `"xyt"` or `"x,y,t"`.
    pub fn parse_list(spec: &str) -> Vec<Axis> {
        if spec.contains(',') {
            spec.split(',')
                .map(|s| Axis::from_name(s.trim()))
                .collect()
        } else {
            spec.chars()
                .map(|c| Axis::from_name(&c.to_string()))
                .collect()
        }
    }
}
