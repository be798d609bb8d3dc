/// Request orchestration and output objects.
///
/// Swiss-cheese layer: **Output**
/// Validates the job, runs the selected strategy and places its result in
/// the machine's frame: workpiece offset on X/Y (or B on a rotary axis), a
/// scaled time estimate, and the head/mode labels the front end expects.
use crate::config::JobConfig;
use crate::error::Result;
use crate::geometry::Vec2;
use crate::motion::{AxisMapping, AxisRange, MotionBounds, MotionCommand};
use crate::progress::ProgressObserver;
use crate::toolpath::{select_strategy, ReliefSource};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Raw path time is multiplied by this to cover acceleration and dwell.
pub const TIME_ESTIMATE_FACTOR: f64 = 1.6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPathObject {
    pub head_type: String,
    pub mode: String,
    pub movement_mode: String,
    pub data: Vec<MotionCommand>,
    /// Seconds.
    pub estimated_time: f64,
    pub position_x: f64,
    pub position_y: f64,
    pub position_z: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation_b: Option<f64>,
    pub bounding_box: MotionBounds,
    pub is_rotate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diameter: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewPathObject {
    pub data: Vec<Vec<Vec2>>,
    pub position_x: f64,
    pub position_y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation_b: Option<f64>,
    pub width: f64,
    pub height: f64,
    pub bounding_box: MotionBounds,
    pub is_rotate: bool,
}

/// Runs one relief request from configuration to output object.
#[derive(Debug, Clone)]
pub struct ReliefPathPlanner {
    config: JobConfig,
}

impl ReliefPathPlanner {
    pub fn new(config: JobConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    fn stock_mapping(&self) -> AxisMapping {
        if self.config.is_rotate {
            AxisMapping::Rotary {
                diameter: self.config.diameter,
            }
        } else {
            AxisMapping::Linear
        }
    }

    pub fn generate_toolpath(
        &self,
        source: &ReliefSource,
        progress: &mut dyn ProgressObserver,
    ) -> Result<ToolPathObject> {
        let cfg = &self.config;
        let strategy = select_strategy(cfg);
        let acc = strategy.generate(source, progress)?;

        let mapping = self.stock_mapping();
        let mut bounds = *acc.bounding_box();
        let rotation_b = if cfg.is_rotate {
            let b = mapping.to_b(cfg.position_x);
            if let Some(r) = bounds.b.as_mut() {
                r.shift(b);
            }
            Some(b)
        } else {
            if let Some(r) = bounds.x.as_mut() {
                r.shift(cfg.position_x);
            }
            None
        };
        if let Some(r) = bounds.y.as_mut() {
            r.shift(cfg.position_y);
        }

        let movement_mode = if cfg.is_laser_greyscale() {
            cfg.movement_mode.clone()
        } else {
            String::new()
        };
        let estimated_time = acc.estimated_time() * TIME_ESTIMATE_FACTOR;
        let data = acc.into_commands();
        info!(
            strategy = strategy.name(),
            commands = data.len(),
            estimated_time,
            "toolpath generated"
        );

        Ok(ToolPathObject {
            head_type: cfg.head_type.clone(),
            mode: cfg.mode.clone(),
            movement_mode,
            data,
            estimated_time,
            position_x: if cfg.is_rotate { 0.0 } else { cfg.position_x },
            position_y: cfg.position_y,
            position_z: cfg.position_z,
            rotation_b,
            bounding_box: bounds,
            is_rotate: cfg.is_rotate,
            diameter: cfg.is_rotate.then_some(cfg.diameter),
        })
    }

    pub fn generate_view(&self, source: &ReliefSource) -> Result<ViewPathObject> {
        let cfg = &self.config;
        let strategy = select_strategy(cfg);
        let view = strategy.generate_view(source)?;

        let centred = |centre: f64, span: f64| AxisRange {
            min: centre - span / 2.0,
            max: centre + span / 2.0,
        };
        let bounding_box = MotionBounds {
            x: Some(centred(cfg.position_x, view.width)),
            y: Some(centred(cfg.position_y, view.height)),
            z: Some(view.z),
            b: None,
        };
        info!(
            strategy = strategy.name(),
            paths = view.data.len(),
            "preview generated"
        );

        Ok(ViewPathObject {
            data: view.data,
            position_x: if cfg.is_rotate { 0.0 } else { cfg.position_x },
            position_y: cfg.position_y,
            rotation_b: cfg
                .is_rotate
                .then(|| self.stock_mapping().to_b(cfg.position_x)),
            width: view.width,
            height: view.height,
            bounding_box,
            is_rotate: cfg.is_rotate,
        })
    }
}
