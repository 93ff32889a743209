//! Residual binning and bounded residual pools used for bootstrapping.

mod binner;
mod pool;

pub use binner::{BinInterval, BinnerConfig, QuantileBinner};
pub use pool::{
    downsample, BinnedResiduals, ResidualPools, StepResiduals, IN_SAMPLE_BIN_SEED,
    IN_SAMPLE_STEP_SEED, MAX_FLAT_RESIDUALS, MAX_RESIDUALS_PER_BIN,
};
