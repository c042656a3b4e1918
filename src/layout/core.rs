use std::sync::{Arc, MutexGuard};
use std::time::Instant;

use crate::error::{LayoutError, Result};
use crate::geometry::Size;
use crate::host::{MeasureHost, RegionHandle, RegionResolver};
use crate::logging::{LogLevel, MEASURE_TARGET, METRICS_TARGET, elapsed_us, emit, json_kv, json_str};
use crate::metrics::{LayoutMetrics, MetricSnapshot};
use crate::model::{ConstraintModel, NodeGeometry};
use crate::setup::{
    CallbackPoster, SetupCoordinator, SetupFailure, SetupState, SetupTicket, SharedModel,
};
use crate::sizing::{MeasureSpec, Placement, SizingPass, placeholder_size};

use super::config::{ConstraintSource, LayoutConfig, positive};

/// Container that lays out its children from a constraint model.
///
/// Until a setup completes the container reports a placeholder size and
/// places nothing. Once a model is active every measure pass runs the
/// solve/measure/solve loop against it.
pub struct ConstraintLayout {
    config: LayoutConfig,
    coordinator: SetupCoordinator,
    resolver: Arc<dyn RegionResolver>,
}

impl ConstraintLayout {
    pub fn new(
        config: LayoutConfig,
        resolver: Arc<dyn RegionResolver>,
        poster: CallbackPoster,
    ) -> Result<Self> {
        config.validate()?;
        let coordinator = SetupCoordinator::new(poster)
            .with_logger(config.logger.clone())
            .with_metrics(config.metrics_handle());
        Ok(Self {
            config,
            coordinator,
            resolver,
        })
    }

    /// Build a container from a declarative source and start its setup.
    pub fn from_source(
        source: &ConstraintSource,
        config: LayoutConfig,
        resolver: Arc<dyn RegionResolver>,
        poster: CallbackPoster,
    ) -> Result<(Self, Option<SetupTicket>)> {
        let constraints = source.constraints()?.to_vec();
        let layout = Self::new(source.apply(config), resolver, poster)?;
        let ticket = layout.setup(Some(constraints))?;
        Ok((layout, ticket))
    }

    /// Start a setup using the configured mode. Async setups return a ticket.
    pub fn setup(&self, constraints: Option<Vec<String>>) -> Result<Option<SetupTicket>> {
        let constraints = constraints.ok_or_else(|| {
            LayoutError::Configuration("no constraint source was supplied".to_string())
        })?;
        if self.config.async_setup {
            self.setup_async(constraints).map(Some)
        } else {
            self.setup_sync(constraints).map(|_| None)
        }
    }

    pub fn setup_async(&self, constraints: Vec<String>) -> Result<SetupTicket> {
        let density = self.config.density;
        self.coordinator
            .start_async(move || ConstraintModel::build(Some(constraints.as_slice()), density))
    }

    pub fn setup_sync(&self, constraints: Vec<String>) -> Result<SharedModel> {
        let density = self.config.density;
        self.coordinator
            .run_sync(|| ConstraintModel::build(Some(constraints.as_slice()), density))
    }

    pub fn on_setup_complete<F>(&self, observer: F) -> Result<()>
    where
        F: FnOnce(SharedModel) + Send + 'static,
    {
        self.coordinator.on_setup_complete(observer)
    }

    pub fn on_setup_failed<F>(&self, observer: F) -> Result<()>
    where
        F: Fn(&SetupFailure) + Send + Sync + 'static,
    {
        self.coordinator.on_setup_failed(observer)
    }

    /// The container left the host tree; any in-flight setup is abandoned.
    pub fn detach(&self) -> Result<()> {
        self.coordinator.detach()
    }

    pub fn model(&self) -> Result<Option<SharedModel>> {
        self.coordinator.active()
    }

    pub fn setup_state(&self) -> Result<SetupState> {
        self.coordinator.state()
    }

    pub fn is_setup_complete(&self) -> Result<bool> {
        Ok(self.coordinator.active()?.is_some())
    }

    pub fn last_setup_failure(&self) -> Result<Option<SetupFailure>> {
        self.coordinator.last_failure()
    }

    /// True once after each completed setup; the host should re-run layout.
    pub fn take_layout_request(&self) -> bool {
        self.coordinator.take_layout_request()
    }

    pub fn pre_setup_aspect_ratio(&self) -> f64 {
        self.config.pre_setup_aspect_ratio
    }

    pub fn set_pre_setup_aspect_ratio(&mut self, ratio: f64) -> Result<()> {
        positive("preSetupAspectRatio", ratio)?;
        self.config.pre_setup_aspect_ratio = ratio;
        Ok(())
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Size this container reports for the given requests.
    pub fn measure<H: MeasureHost + ?Sized>(
        &self,
        host: &mut H,
        width: MeasureSpec,
        height: MeasureSpec,
    ) -> Result<Size> {
        let Some(model) = self.coordinator.active()? else {
            let started = Instant::now();
            let size = placeholder_size(width, height, self.config.pre_setup_aspect_ratio);
            self.record(LayoutMetrics::record_placeholder_measure);
            emit(
                self.config.logger.as_ref(),
                LogLevel::Debug,
                MEASURE_TARGET,
                "placeholder_measure",
                [
                    json_str("width_spec", width.to_string()),
                    json_str("height_spec", height.to_string()),
                    json_kv("width", size.width),
                    json_kv("height", size.height),
                    elapsed_us("elapsed_us", started),
                ],
            );
            return Ok(size);
        };

        // The host is called with the model unlocked so it may query geometry.
        let children = host.children();
        let mut plan = self.pass(&mut *lock(&model)?).begin(&children, width, height)?;
        plan.run(host);
        let report = self.pass(&mut *lock(&model)?).finish(plan)?;
        self.record_with(|metrics| {
            metrics.record_solved_measure();
            metrics.record_solves(report.solves);
            metrics.record_intrinsic_edits(report.intrinsic_edits);
        });
        Ok(report.size)
    }

    /// Solve and place every visible child. Nothing is placed before setup.
    pub fn layout<H: MeasureHost + ?Sized>(&self, host: &H) -> Result<Vec<Placement>> {
        let Some(model) = self.coordinator.active()? else {
            return Ok(Vec::new());
        };
        let children = host.children();
        let mut guard = lock(&model)?;
        let solves_before = guard.solve_count();
        let placements = self.pass(&mut guard).place(&children)?;
        let solves = guard.solve_count().saturating_sub(solves_before);
        drop(guard);
        self.record_with(|metrics| {
            metrics.record_layout();
            metrics.record_solves(solves);
        });
        Ok(placements)
    }

    /// Child rectangles from the last solve, without solving again.
    pub fn positions<H: MeasureHost + ?Sized>(&self, host: &H) -> Result<Vec<Placement>> {
        let Some(model) = self.coordinator.active()? else {
            return Ok(Vec::new());
        };
        let children = host.children();
        let mut guard = lock(&model)?;
        self.pass(&mut guard).positions(&children)
    }

    /// Resolved geometry of the child registered under `handle`.
    pub fn node_geometry_by_handle(&self, handle: RegionHandle) -> Result<NodeGeometry> {
        let model = self
            .coordinator
            .active()?
            .ok_or(LayoutError::SetupIncomplete)?;
        let name = self.resolver.require_name(handle)?;
        let guard = lock(&model)?;
        guard.geometry(&name)
    }

    pub fn metrics_snapshot(&self) -> Option<MetricSnapshot> {
        let metrics = self.config.metrics.as_ref()?;
        metrics.lock().ok().map(|guard| guard.snapshot())
    }

    /// Log the current metrics snapshot, if both metrics and a logger are configured.
    pub fn emit_metrics(&self) {
        if let (Some(logger), Some(snapshot)) = (self.config.logger.as_ref(), self.metrics_snapshot()) {
            let _ = logger.log_event(snapshot.to_log_event(METRICS_TARGET));
        }
    }

    fn pass<'a>(&'a self, model: &'a mut ConstraintModel) -> SizingPass<'a> {
        SizingPass::new(model, self.resolver.as_ref())
            .with_padding(self.config.padding)
            .with_logger(self.config.logger.as_ref())
    }

    fn record(&self, update: fn(&mut LayoutMetrics)) {
        self.record_with(update);
    }

    fn record_with(&self, update: impl FnOnce(&mut LayoutMetrics)) {
        if let Some(metrics) = self.config.metrics.as_ref() {
            if let Ok(mut guard) = metrics.lock() {
                update(&mut guard);
            }
        }
    }
}

impl std::fmt::Debug for ConstraintLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstraintLayout")
            .field("config", &self.config)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

fn lock(model: &SharedModel) -> Result<MutexGuard<'_, ConstraintModel>> {
    model.lock().map_err(|_| LayoutError::Poisoned)
}
