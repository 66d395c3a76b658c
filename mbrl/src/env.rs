//! Reference environments.
mod flow_merge;
mod risky_point_mass;
pub use flow_merge::{FlowMerge, FlowMergeConfig};
pub use risky_point_mass::{RiskyPointMass, RiskyPointMassConfig};
