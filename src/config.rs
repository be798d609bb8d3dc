/// Job configuration, as sent from the browser as JSON.
///
/// Swiss-cheese layer: **Parameters**
/// Every field has a default so partial configs from older front ends still
/// parse. `validate` runs before any geometry work.
use crate::error::{ReliefError, Result};
use crate::mesh::Plane;
use serde::{Deserialize, Serialize};

/// Pass depths are rounded to 2 decimals; a smaller step cannot be cut.
pub const MIN_STEP_DOWN: f64 = 0.01;

/// How a mesh is machined on a rotary axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SliceMode {
    /// Unwrap the whole part into one cylindrical relief.
    #[default]
    Rotation,
    /// Carve four planar reliefs, a quarter turn apart.
    MultiFace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(default = "default_tool_diameter")]
    pub tool_diameter: f64,
    /// Included cone angle, degrees.
    #[serde(default = "default_tool_angle")]
    pub tool_angle: f64,
    #[serde(default = "default_target_depth")]
    pub target_depth: f64,
    #[serde(default = "default_step_down")]
    pub step_down: f64,
    /// Samples per mm.
    #[serde(default = "default_density")]
    pub density: f64,
    #[serde(default = "default_jog_speed")]
    pub jog_speed: f64,
    #[serde(default = "default_work_speed")]
    pub work_speed: f64,
    #[serde(default)]
    pub spindle_speed: Option<f64>,
    #[serde(default = "default_safety_height")]
    pub safety_height: f64,
    #[serde(default = "default_stop_height")]
    pub stop_height: f64,
    #[serde(default)]
    pub is_rotate: bool,
    /// Stock diameter on a rotary machine.
    #[serde(default = "default_diameter")]
    pub diameter: f64,
    #[serde(default)]
    pub extension_x: usize,
    #[serde(default)]
    pub extension_y: usize,
    #[serde(default)]
    pub invert: bool,
    /// Bit 2 mirrors horizontally, bit 1 vertically.
    #[serde(default)]
    pub flip: u8,
    /// Radians, counter-clockwise.
    #[serde(default)]
    pub rotation_z: f64,
    #[serde(default = "default_size")]
    pub width: f64,
    #[serde(default = "default_size")]
    pub height: f64,
    #[serde(default)]
    pub position_x: f64,
    #[serde(default)]
    pub position_y: f64,
    #[serde(default)]
    pub position_z: f64,
    #[serde(default)]
    pub min_grey: f64,
    #[serde(default = "default_max_grey")]
    pub max_grey: f64,
    #[serde(default)]
    pub plane: Plane,
    #[serde(default)]
    pub slice_mode: SliceMode,
    #[serde(default = "default_head_type")]
    pub head_type: String,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub movement_mode: String,
}

fn default_tool_diameter() -> f64 {
    0.2
}
fn default_tool_angle() -> f64 {
    30.0
}
fn default_target_depth() -> f64 {
    2.0
}
fn default_step_down() -> f64 {
    0.5
}
fn default_density() -> f64 {
    5.0
}
fn default_jog_speed() -> f64 {
    1500.0
}
fn default_work_speed() -> f64 {
    600.0
}
fn default_safety_height() -> f64 {
    1.0
}
fn default_stop_height() -> f64 {
    10.0
}
fn default_diameter() -> f64 {
    35.0
}
fn default_size() -> f64 {
    40.0
}
fn default_max_grey() -> f64 {
    255.0
}
fn default_head_type() -> String {
    "cnc".into()
}
fn default_mode() -> String {
    "greyscale".into()
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            tool_diameter: default_tool_diameter(),
            tool_angle: default_tool_angle(),
            target_depth: default_target_depth(),
            step_down: default_step_down(),
            density: default_density(),
            jog_speed: default_jog_speed(),
            work_speed: default_work_speed(),
            spindle_speed: None,
            safety_height: default_safety_height(),
            stop_height: default_stop_height(),
            is_rotate: false,
            diameter: default_diameter(),
            extension_x: 0,
            extension_y: 0,
            invert: false,
            flip: 0,
            rotation_z: 0.0,
            width: default_size(),
            height: default_size(),
            position_x: 0.0,
            position_y: 0.0,
            position_z: 0.0,
            min_grey: 0.0,
            max_grey: default_max_grey(),
            plane: Plane::default(),
            slice_mode: SliceMode::default(),
            head_type: default_head_type(),
            mode: default_mode(),
            movement_mode: String::new(),
        }
    }
}

impl JobConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reject configurations the planner cannot run to completion.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("step_down", self.step_down),
            ("density", self.density),
            ("jog_speed", self.jog_speed),
            ("work_speed", self.work_speed),
            ("tool_diameter", self.tool_diameter),
            ("width", self.width),
            ("height", self.height),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ReliefError::InvalidConfig(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if self.step_down < MIN_STEP_DOWN {
            return Err(ReliefError::InvalidConfig(format!(
                "step_down must be at least {MIN_STEP_DOWN}, got {}",
                self.step_down
            )));
        }
        if !(self.target_depth.is_finite() && self.target_depth >= 0.0) {
            return Err(ReliefError::InvalidConfig(format!(
                "target_depth must not be negative, got {}",
                self.target_depth
            )));
        }
        if !(0.0..180.0).contains(&self.tool_angle) {
            return Err(ReliefError::InvalidConfig(format!(
                "tool_angle must be in [0, 180), got {}",
                self.tool_angle
            )));
        }
        if self.is_rotate && !(self.diameter.is_finite() && self.diameter > 0.0) {
            return Err(ReliefError::InvalidConfig(format!(
                "diameter must be positive on a rotary machine, got {}",
                self.diameter
            )));
        }
        if self.min_grey > self.max_grey {
            return Err(ReliefError::InvalidConfig(format!(
                "min_grey {} exceeds max_grey {}",
                self.min_grey, self.max_grey
            )));
        }
        Ok(())
    }

    /// Whether this job carries a laser movement mode through to the output.
    pub fn is_laser_greyscale(&self) -> bool {
        self.head_type == "laser" && self.mode == "greyscale"
    }
}
