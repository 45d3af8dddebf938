pub mod coordinator;
pub mod simulation;
pub mod types;

pub use coordinator::{AudioUpload, Job, JobCoordinator, JobStage};
pub use simulation::{SimulationGenerator, SIMULATION_JOB_ID};
pub use types::{
    complete_stem_slots, ClassificationResult, CombinedResult, ResultStatus, SeparationResult,
    SoundEvent, SpectrumPoint, StemMap, STEM_CATEGORIES,
};
