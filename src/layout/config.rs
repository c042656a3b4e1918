use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::{LayoutError, Result};
use crate::geometry::Padding;
use crate::logging::Logger;
use crate::metrics::LayoutMetrics;

/// Configuration for a [`ConstraintLayout`](super::ConstraintLayout).
#[derive(Debug, Clone)]
pub struct LayoutConfig {
    /// Build the model on a worker thread instead of the caller's thread.
    pub async_setup: bool,
    /// Width/height ratio reported before a model is active.
    pub pre_setup_aspect_ratio: f64,
    /// Scale applied to `dp` literals.
    pub density: f64,
    pub padding: Padding,
    pub logger: Option<Logger>,
    pub metrics: Option<Arc<Mutex<LayoutMetrics>>>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            async_setup: true,
            pre_setup_aspect_ratio: 1.0,
            density: 1.0,
            padding: Padding::default(),
            logger: None,
            metrics: None,
        }
    }
}

impl LayoutConfig {
    pub fn with_async_setup(mut self, async_setup: bool) -> Self {
        self.async_setup = async_setup;
        self
    }

    pub fn with_aspect_ratio(mut self, ratio: f64) -> Self {
        self.pre_setup_aspect_ratio = ratio;
        self
    }

    pub fn with_density(mut self, density: f64) -> Self {
        self.density = density;
        self
    }

    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Enable metrics collection if it has not already been configured.
    pub fn enable_metrics(&mut self) {
        if self.metrics.is_none() {
            self.metrics = Some(Arc::new(Mutex::new(LayoutMetrics::new())));
        }
    }

    pub fn metrics_handle(&self) -> Option<Arc<Mutex<LayoutMetrics>>> {
        self.metrics.as_ref().map(Arc::clone)
    }

    pub fn validate(&self) -> Result<()> {
        positive("preSetupAspectRatio", self.pre_setup_aspect_ratio)?;
        positive("density", self.density)?;
        if [
            self.padding.left,
            self.padding.top,
            self.padding.right,
            self.padding.bottom,
        ]
        .iter()
        .any(|side| *side < 0)
        {
            return Err(LayoutError::Configuration(
                "padding must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

pub(crate) fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(LayoutError::Configuration(format!(
            "{name} must be a positive number, got {value}"
        )))
    }
}

/// Declarative constraint source, as read from a JSON attribute set.
///
/// ```json
/// { "constraints": ["blue.width == 120dp"], "asyncSetup": false, "preSetupAspectRatio": 1.5 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintSource {
    #[serde(default)]
    pub constraints: Option<Vec<String>>,
    #[serde(default = "default_async_setup")]
    pub async_setup: bool,
    #[serde(default = "default_ratio")]
    pub pre_setup_aspect_ratio: f64,
    #[serde(default = "default_density")]
    pub density: f64,
}

fn default_async_setup() -> bool {
    true
}

fn default_ratio() -> f64 {
    1.0
}

fn default_density() -> f64 {
    1.0
}

impl ConstraintSource {
    pub fn new<I, S>(constraints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            constraints: Some(constraints.into_iter().map(Into::into).collect()),
            async_setup: default_async_setup(),
            pre_setup_aspect_ratio: default_ratio(),
            density: default_density(),
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// The statements, or a configuration error when the source has none.
    pub fn constraints(&self) -> Result<&[String]> {
        self.constraints.as_deref().ok_or_else(|| {
            LayoutError::Configuration("missing `constraints` in constraint source".to_string())
        })
    }

    /// Carry the source's options over onto `config`.
    pub fn apply(&self, config: LayoutConfig) -> LayoutConfig {
        config
            .with_async_setup(self.async_setup)
            .with_aspect_ratio(self.pre_setup_aspect_ratio)
            .with_density(self.density)
    }
}
