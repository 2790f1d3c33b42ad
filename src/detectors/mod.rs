//! Detector contract and built-in detectors.
//!
//! A detector scores each output of an attempt on `[0.0, 1.0]`; 1.0 means
//! the attack-success signal is strongest for that output. Every detector
//! must return exactly one score per output.

pub mod always;
pub mod dan;
pub mod judge;
pub mod productkey;
pub mod signatures;
pub mod toolmanip;

pub use judge::HarmJudge;
pub use signatures::SignatureDetector;
pub use toolmanip::ToolManipulationDetector;

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;

use crate::attempt::Attempt;
use crate::context::ScanContext;
use crate::error::DetectorError;
use crate::registry::{from_map, Config, PluginMeta, Registry};

/// Scores attack success per model output.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Fully qualified detector name, e.g. `"knownbadsignatures.EICAR"`.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str {
        ""
    }

    /// Returns one score in `[0.0, 1.0]` per attempt output.
    async fn detect(
        &self,
        ctx: &ScanContext,
        attempt: &Attempt,
    ) -> Result<Vec<f64>, DetectorError>;
}

static REGISTRY: OnceLock<Registry<Arc<dyn Detector>>> = OnceLock::new();

/// The process-wide detector registry.
pub fn registry() -> &'static Registry<Arc<dyn Detector>> {
    REGISTRY.get_or_init(|| Registry::new("detector"))
}

/// Registers the built-in detectors.
pub fn register_builtin() {
    let reg = registry();

    reg.register_with_meta(
        "always.Pass",
        from_map(
            |_bag: &Config| Ok(()),
            |_| Ok(Arc::new(always::AlwaysPass) as Arc<dyn Detector>),
        ),
        PluginMeta::new("always.Pass", "scores every output 1.0"),
    );

    reg.register_with_meta(
        "always.Fail",
        from_map(
            |_bag: &Config| Ok(()),
            |_| Ok(Arc::new(always::AlwaysFail) as Arc<dyn Detector>),
        ),
        PluginMeta::new("always.Fail", "scores every output 0.0"),
    );

    reg.register_with_meta(
        "dan.DAN",
        from_map(
            |_bag: &Config| Ok(()),
            |_| Ok(Arc::new(dan::DanDetector) as Arc<dyn Detector>),
        ),
        PluginMeta::new("dan.DAN", "looks for the DAN persona prefix"),
    );

    reg.register_with_meta(
        "dan.AntiDan",
        from_map(
            |_bag: &Config| Ok(()),
            |_| Ok(Arc::new(dan::AntiDanDetector) as Arc<dyn Detector>),
        ),
        PluginMeta::new("dan.AntiDan", "looks for the ANTI-DAN persona prefix"),
    );

    reg.register_with_meta(
        "knownbadsignatures.EICAR",
        from_map(
            |_bag: &Config| Ok(()),
            |_| Ok(Arc::new(signatures::eicar()) as Arc<dyn Detector>),
        ),
        PluginMeta::new("knownbadsignatures.EICAR", "EICAR test signature in output"),
    );

    reg.register_with_meta(
        "knownbadsignatures.GTUBE",
        from_map(
            |_bag: &Config| Ok(()),
            |_| Ok(Arc::new(signatures::gtube()) as Arc<dyn Detector>),
        ),
        PluginMeta::new("knownbadsignatures.GTUBE", "GTUBE spam signature in output"),
    );

    reg.register_with_meta(
        "productkey.Win5x5",
        from_map(
            |_bag: &Config| Ok(()),
            |_| Ok(Arc::new(productkey::Win5x5::new()) as Arc<dyn Detector>),
        ),
        PluginMeta::new("productkey.Win5x5", "5x5 product key in output"),
    );

    reg.register_with_meta(
        "agenttool.Manipulation",
        from_map(ToolManipulationDetector::config_from_bag, |cfg| {
            Ok(Arc::new(ToolManipulationDetector::new(cfg)) as Arc<dyn Detector>)
        }),
        PluginMeta::new(
            "agenttool.Manipulation",
            "forbidden or unexpected agent tool calls",
        ),
    );

    reg.register_with_meta(
        "judge.HarmJudge",
        from_map(judge::judge_config_from_bag, |cfg| {
            let generator = crate::generators::registry()
                .create(&cfg.generator, &cfg.generator_settings)
                .map_err(anyhow::Error::from)?;
            Ok(Arc::new(HarmJudge::new(generator)) as Arc<dyn Detector>)
        }),
        PluginMeta::new("judge.HarmJudge", "LLM judge for harmful content"),
    );
}
