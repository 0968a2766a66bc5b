//! Compartmental epidemic model and the immutable per-period `State`.
pub mod epidemic;
pub mod mobility;
pub mod state;

pub use epidemic::{EpidemicModel, ExogenousInfo, SimulationOutcome};
pub use mobility::{
    CommuterFlows, ContactMatrices, ContactMatrix, Mobility, PopulationTable, RegionInfo,
};
pub use state::{Compartment, Compartments, State, WaveContext, WaveState, NEGATIVE_TOLERANCE};
