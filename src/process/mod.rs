//! The decision process: allocation policies, exogenous information and the
//! controlled Markov chain that ties them to the epidemic model.
pub mod decision;
pub mod exogenous;
pub mod policy;
pub mod weights;

pub use decision::{DecisionProcess, ProcessVariant, StopReason, StoppingCriteria, StrategyUsage};
pub use exogenous::{
    ConstantSupply, ControlMeasures, ControlMode, ControlUpdate, HistoricSupply, NoSupply,
    VaccineSupply, WaveSchedule, DEFAULT_WAVE_DURATION,
};
pub use policy::{
    enforce_feasibility, AdultsFirst, AllocationContext, AllocationPolicy, InfectionBased,
    NoVaccines, OldestFirst, PolicyKind, RandomAllocation, SusceptibleBased, WeightedPolicy,
    ADULTS_FIRST_ORDER,
};
pub use weights::PolicyWeights;
