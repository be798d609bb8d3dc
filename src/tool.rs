/// Tool definitions for relief carving.
///
/// Swiss-cheese layer: **Tool geometry**
/// A conical (V-bit style) cutter. The cone angle bounds how steep a wall the
/// tool can leave; the diameter bounds the useful sampling density.
use crate::config::JobConfig;
use serde::{Deserialize, Serialize};

/// Fraction of the tool diameter one raster line advances.
pub const OVERLAP_RATE: f64 = 0.5;
/// Upper bound on samples per unit, regardless of tool or image size.
pub const MAX_DENSITY: f64 = 20.0;
/// Sample budget for a raster job (`width × height × density²`).
const MAX_SAMPLES: f64 = 5_000_000.0;

/// Conical cutting tool.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToolGeometry {
    /// Tool diameter in mm.
    pub diameter: f64,
    /// Included cone angle in degrees (0 = flat end).
    pub angle_deg: f64,
}

impl Default for ToolGeometry {
    fn default() -> Self {
        Self {
            diameter: 0.2,
            angle_deg: 30.0,
        }
    }
}

impl ToolGeometry {
    pub fn new(diameter: f64, angle_deg: f64) -> Self {
        Self {
            diameter,
            angle_deg,
        }
    }

    pub fn from_config(config: &JobConfig) -> Self {
        Self::new(config.tool_diameter, config.tool_angle)
    }

    pub fn cone_half_angle_rad(&self) -> f64 {
        (self.angle_deg / 2.0).to_radians()
    }

    /// Horizontal run per unit of depth along the cone flank. Zero disables
    /// reachability smoothing.
    pub fn tool_slope(&self) -> f64 {
        self.cone_half_angle_rad().tan().max(0.0)
    }

    /// Largest density worth sampling a `width × height` job at.
    pub fn max_density(&self, width: f64, height: f64) -> f64 {
        let by_size = (MAX_SAMPLES / width / height).sqrt().floor();
        let by_tool = 1.0 / (self.diameter * OVERLAP_RATE);
        MAX_DENSITY.min(by_size).min(by_tool)
    }
}
