//! Device-specific drivers.
//!
//! Each driver contributes a codec-entry table for the registry and a
//! typed device struct assembled from discovered characteristic roles.

pub mod owon;
pub mod sensirion;

pub use owon::Multimeter;
pub use sensirion::SmartGadget;
