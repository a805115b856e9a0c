pub mod consequence;
pub mod engine;
pub mod record;
pub mod scoring;
pub mod session;

#[cfg(test)]
mod tests;

pub use consequence::{
    Consequence, ConsequencePolicy, ContinuousReinforcement, FixedRatioReinforcement,
};
pub use engine::{BlockSummary, EngineRoles, SessionError, TrialEngine, TrialPhase};
pub use record::{MemorySink, SinkError, TrialRecord, TrialSink};
pub use scoring::{
    GoNoGoScoring, ObservedResponse, Outcome, ScoringPolicy, TwoAltChoiceScoring,
};
pub use session::{SessionRunner, SessionSummary, StopHandle};
