pub mod applier;
pub mod params;
pub mod result;
pub mod runner;

pub use applier::{ConstantNoiseApplier, LaplaceNoiseApplier, NoiseApplier};
pub use params::{JobScopedPrivacyParams, Mechanism, PrivacyParamsError};
pub use result::NoisedAggregationResult;
pub use runner::NoisedAggregationRunner;
