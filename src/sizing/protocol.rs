use std::time::Instant;

use crate::error::{LayoutError, Result};
use crate::geometry::{Padding, Rect, Size};
use crate::host::{ChildView, MeasureHost, RegionHandle, RegionResolver};
use crate::logging::{LAYOUT_TARGET, LogLevel, Logger, MEASURE_TARGET, elapsed_us, emit, json_kv, json_str};
use crate::model::{Axis, CONTAINER_NAME, ConstraintModel};
use crate::parser::Attribute;

use super::spec::{MeasureMode, MeasureSpec};

/// Outcome of one solved measure pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasureReport {
    /// Size the container reports for itself, padding included.
    pub size: Size,
    pub solves: u64,
    pub intrinsic_edits: usize,
    pub children_measured: usize,
}

/// Final rectangle for one child, in container coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub handle: RegionHandle,
    pub name: String,
    pub rect: Rect,
}

/// Request sent to the host for one visible child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildRequest {
    pub handle: RegionHandle,
    pub name: String,
    pub width: MeasureSpec,
    pub height: MeasureSpec,
    intrinsic_width: bool,
    intrinsic_height: bool,
    measured: Option<Size>,
}

/// First half of a measure pass: the container is bound and solved, and
/// every visible child has a request waiting for the host.
///
/// A plan does not borrow the model, so the host may query the layout
/// while [`MeasurePlan::run`] is measuring its children.
#[derive(Debug, Clone)]
pub struct MeasurePlan {
    width: MeasureSpec,
    height: MeasureSpec,
    started: Instant,
    solves_before: u64,
    requests: Vec<ChildRequest>,
}

impl MeasurePlan {
    pub fn requests(&self) -> &[ChildRequest] {
        &self.requests
    }

    /// Ask the host for the natural size of every requested child.
    pub fn run<H: MeasureHost + ?Sized>(&mut self, host: &mut H) {
        for request in &mut self.requests {
            request.measured = Some(host.measure_child(request.handle, request.width, request.height));
        }
    }
}

/// Drives the measure/solve loop and placement against one model.
pub struct SizingPass<'a> {
    model: &'a mut ConstraintModel,
    resolver: &'a dyn RegionResolver,
    padding: Padding,
    logger: Option<&'a Logger>,
}

impl<'a> SizingPass<'a> {
    pub fn new(model: &'a mut ConstraintModel, resolver: &'a dyn RegionResolver) -> Self {
        Self {
            model,
            resolver,
            padding: Padding::default(),
            logger: None,
        }
    }

    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_logger(mut self, logger: Option<&'a Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Bind the container to the host request, solve, measure children,
    /// feed intrinsic sizes back and solve again.
    pub fn measure<H: MeasureHost + ?Sized>(
        &mut self,
        host: &mut H,
        width: MeasureSpec,
        height: MeasureSpec,
    ) -> Result<MeasureReport> {
        let children = host.children();
        let mut plan = self.begin(&children, width, height)?;
        plan.run(host);
        self.finish(plan)
    }

    /// Bind the container, solve, and build a request for each visible child.
    pub fn begin(
        &mut self,
        children: &[ChildView],
        width: MeasureSpec,
        height: MeasureSpec,
    ) -> Result<MeasurePlan> {
        let started = Instant::now();
        let solves_before = self.model.solve_count();
        emit(
            self.logger,
            LogLevel::Debug,
            MEASURE_TARGET,
            "measure_start",
            [
                json_str("width_spec", width.to_string()),
                json_str("height_spec", height.to_string()),
            ],
        );

        self.bind_container(Attribute::Width, width.shrink(self.padding.horizontal()))?;
        self.bind_container(Attribute::Height, height.shrink(self.padding.vertical()))?;
        self.model.solve();

        let requests = self.child_requests(children, width.mode, height.mode)?;
        Ok(MeasurePlan {
            width,
            height,
            started,
            solves_before,
            requests,
        })
    }

    /// Feed measured intrinsic sizes back, solve again and report.
    pub fn finish(&mut self, plan: MeasurePlan) -> Result<MeasureReport> {
        let MeasurePlan {
            width,
            height,
            started,
            solves_before,
            requests,
        } = plan;

        let mut intrinsic_edits = 0;
        for request in &requests {
            let size = request.measured.ok_or_else(|| {
                LayoutError::Configuration(format!(
                    "child `{}` was not measured before the pass finished",
                    request.name
                ))
            })?;
            if request.intrinsic_width
                && self.model.set_intrinsic(&request.name, Axis::Horizontal, size.width)?
            {
                intrinsic_edits += 1;
                self.log_intrinsic(&request.name, Axis::Horizontal, size.width);
            }
            if request.intrinsic_height
                && self.model.set_intrinsic(&request.name, Axis::Vertical, size.height)?
            {
                intrinsic_edits += 1;
                self.log_intrinsic(&request.name, Axis::Vertical, size.height);
            }
        }
        emit(
            self.logger,
            LogLevel::Debug,
            MEASURE_TARGET,
            "children_measured",
            [json_kv("count", requests.len())],
        );
        self.model.solve();

        let container_width = self.model.value(CONTAINER_NAME, Attribute::Width)?;
        let container_height = self.model.value(CONTAINER_NAME, Attribute::Height)?;
        let size = Size::new(
            report_axis(width, container_width, self.padding.horizontal()),
            report_axis(height, container_height, self.padding.vertical()),
        );

        emit(
            self.logger,
            LogLevel::Debug,
            MEASURE_TARGET,
            "measure_complete",
            [
                json_kv("width", size.width),
                json_kv("height", size.height),
                json_kv("intrinsic_edits", intrinsic_edits),
                elapsed_us("elapsed_us", started),
            ],
        );

        Ok(MeasureReport {
            size,
            solves: self.model.solve_count().saturating_sub(solves_before),
            intrinsic_edits,
            children_measured: requests.len(),
        })
    }

    /// Solve once more and place every visible child.
    pub fn place(&mut self, children: &[ChildView]) -> Result<Vec<Placement>> {
        let started = Instant::now();
        self.model.solve();
        let container = self.model.geometry(CONTAINER_NAME)?;
        emit(
            self.logger,
            LogLevel::Debug,
            LAYOUT_TARGET,
            "layout_container",
            [
                json_kv("width", container.width),
                json_kv("height", container.height),
                json_kv("center_x", container.center_x),
                json_kv("center_y", container.center_y),
            ],
        );
        let placements = self.positions(children)?;
        emit(
            self.logger,
            LogLevel::Debug,
            LAYOUT_TARGET,
            "layout_complete",
            [
                json_kv("children", placements.len()),
                elapsed_us("elapsed_us", started),
            ],
        );
        Ok(placements)
    }

    /// Read child rectangles from the last solve without solving again.
    pub fn positions(&self, children: &[ChildView]) -> Result<Vec<Placement>> {
        let mut placements = Vec::new();
        for child in children.iter().filter(|child| child.visible) {
            let name = self.resolver.require_name(child.handle)?;
            let geometry = self.model.geometry(&name)?;
            let rect = Rect::new(
                round(geometry.left) + self.padding.left,
                round(geometry.top) + self.padding.top,
                round(geometry.width),
                round(geometry.height),
            );
            emit(
                self.logger,
                LogLevel::Debug,
                LAYOUT_TARGET,
                "child_placed",
                [
                    json_str("child", name.as_str()),
                    json_kv("x", rect.x),
                    json_kv("y", rect.y),
                    json_kv("width", rect.width),
                    json_kv("height", rect.height),
                ],
            );
            placements.push(Placement {
                handle: child.handle,
                name,
                rect,
            });
        }
        Ok(placements)
    }

    fn bind_container(&mut self, attribute: Attribute, spec: MeasureSpec) -> Result<()> {
        let value = f64::from(spec.size);
        match spec.mode {
            MeasureMode::Exact => self.model.set_variable_to_value(CONTAINER_NAME, attribute, value),
            MeasureMode::AtMost => self.model.set_variable_to_at_most(CONTAINER_NAME, attribute, value),
            MeasureMode::Unspecified => self.model.release_variable(CONTAINER_NAME, attribute),
        }
    }

    fn child_requests(
        &self,
        children: &[ChildView],
        parent_width: MeasureMode,
        parent_height: MeasureMode,
    ) -> Result<Vec<ChildRequest>> {
        let container_width = round(self.model.value(CONTAINER_NAME, Attribute::Width)?);
        let mut requests = Vec::new();

        for child in children.iter().filter(|child| child.visible) {
            let name = self.resolver.require_name(child.handle)?;
            let node = self.model.node_by_name(&name)?;
            let intrinsic_width = node.has_intrinsic_width();
            let intrinsic_height = node.has_intrinsic_height();
            let geometry = self.model.geometry(&name)?;

            let mut width = if intrinsic_width {
                MeasureSpec::unspecified()
            } else {
                MeasureSpec::exact(round(geometry.width))
            };
            let height = if intrinsic_height {
                MeasureSpec::unspecified()
            } else {
                MeasureSpec::exact(round(geometry.height))
            };
            if parent_width == MeasureMode::Unspecified {
                width = MeasureSpec::at_most(container_width);
            }

            emit(
                self.logger,
                LogLevel::Debug,
                MEASURE_TARGET,
                "child_measure",
                [
                    json_str("child", name.as_str()),
                    json_str("width_spec", width.to_string()),
                    json_str("height_spec", height.to_string()),
                    json_str("parent_height_mode", format!("{parent_height:?}")),
                ],
            );
            requests.push(ChildRequest {
                handle: child.handle,
                name,
                width,
                height,
                intrinsic_width,
                intrinsic_height,
                measured: None,
            });
        }
        Ok(requests)
    }

    fn log_intrinsic(&self, name: &str, axis: Axis, value: i32) {
        emit(
            self.logger,
            LogLevel::Debug,
            MEASURE_TARGET,
            "intrinsic_update",
            [
                json_str("child", name),
                json_str("attribute", axis.intrinsic().name()),
                json_kv("value", value),
            ],
        );
    }
}

/// Exact axes report the request; others report the solved size plus padding.
fn report_axis(spec: MeasureSpec, solved: f64, padding: i32) -> i32 {
    match spec.mode {
        MeasureMode::Exact => spec.size,
        MeasureMode::AtMost | MeasureMode::Unspecified => round(solved) + padding,
    }
}

fn round(value: f64) -> i32 {
    value.round() as i32
}
