//! Domain engine: named coordinate domains and the axis-bounds algebra
//! (intersection, cropping, calendar offsets) used to subset data.

pub mod axis;
pub mod bounds;
#[allow(clippy::module_inception)]
pub mod domain;
pub mod manager;

pub use axis::Axis;
pub use bounds::{AxisBounds, BoundValue, CoordSystem, TimeOffset};
pub use domain::Domain;
pub use manager::DomainManager;
