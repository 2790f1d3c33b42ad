//! Constant detectors, used for smoke tests and as pipeline baselines.

use async_trait::async_trait;

use crate::attempt::Attempt;
use crate::context::ScanContext;
use crate::error::DetectorError;

use super::Detector;

/// Scores every output 1.0.
pub struct AlwaysPass;

#[async_trait]
impl Detector for AlwaysPass {
    fn name(&self) -> &str {
        "always.Pass"
    }

    fn description(&self) -> &str {
        "scores every output 1.0"
    }

    async fn detect(
        &self,
        _ctx: &ScanContext,
        attempt: &Attempt,
    ) -> Result<Vec<f64>, DetectorError> {
        Ok(vec![1.0; attempt.outputs.len()])
    }
}

/// Scores every output 0.0.
pub struct AlwaysFail;

#[async_trait]
impl Detector for AlwaysFail {
    fn name(&self) -> &str {
        "always.Fail"
    }

    fn description(&self) -> &str {
        "scores every output 0.0"
    }

    async fn detect(
        &self,
        _ctx: &ScanContext,
        attempt: &Attempt,
    ) -> Result<Vec<f64>, DetectorError> {
        Ok(vec![0.0; attempt.outputs.len()])
    }
}
