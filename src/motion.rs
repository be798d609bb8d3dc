/// Machine motion commands and their accumulator.
///
/// Swiss-cheese layer: **Machine output**
/// The accumulator is append-only: every command updates the running
/// position, bounding box and time estimate, and nothing already emitted is
/// ever rewritten. Planners speak Cartesian X; on a rotary machine the
/// accumulator turns X into a B angle on the way in.
use crate::geometry::round_to;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Axis words carried by a motion command. Absent axes are not moved.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Axes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b: Option<f64>,
    /// Feed rate for this move.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f: Option<f64>,
}

impl Axes {
    pub fn with_feed(mut self, feed: f64) -> Self {
        self.f = Some(feed);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MotionCommand {
    AbsolutePositioning,
    Rapid(Axes),
    Feed(Axes),
    SpindleOn {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        speed: Option<f64>,
    },
    SpindleOff,
}

impl MotionCommand {
    pub fn axes(&self) -> Option<&Axes> {
        match self {
            MotionCommand::Rapid(a) | MotionCommand::Feed(a) => Some(a),
            _ => None,
        }
    }

    pub fn is_rapid(&self) -> bool {
        matches!(self, MotionCommand::Rapid(_))
    }
}

/// How the planner's X axis reaches the machine.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AxisMapping {
    #[default]
    Linear,
    /// X is wrapped around a cylinder of this diameter and driven as B.
    Rotary { diameter: f64 },
}

impl AxisMapping {
    /// Degrees of B for a surface distance `x`, rounded to 2 decimals.
    pub fn to_b(&self, x: f64) -> f64 {
        match self {
            AxisMapping::Linear => x,
            AxisMapping::Rotary { diameter } => round_to(x / diameter / PI * 360.0, 2),
        }
    }

    /// Surface distance for `b` degrees.
    pub fn to_x(&self, b: f64) -> f64 {
        match self {
            AxisMapping::Linear => b,
            AxisMapping::Rotary { diameter } => b / 360.0 * PI * diameter,
        }
    }

    fn map(&self, axes: Axes) -> Axes {
        match (self, axes.x) {
            (AxisMapping::Rotary { .. }, Some(x)) => Axes {
                x: None,
                b: Some(self.to_b(x)),
                ..axes
            },
            _ => axes,
        }
    }
}

/// Running machine position. Axes never commanded stay at zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub b: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
}

impl AxisRange {
    fn point(v: f64) -> Self {
        Self { min: v, max: v }
    }

    fn include(range: &mut Option<Self>, v: f64) {
        match range {
            Some(r) => {
                r.min = r.min.min(v);
                r.max = r.max.max(v);
            }
            None => *range = Some(Self::point(v)),
        }
    }

    pub fn shift(&mut self, by: f64) {
        self.min += by;
        self.max += by;
    }

    pub fn contains(&self, other: &AxisRange) -> bool {
        self.min <= other.min && self.max >= other.max
    }
}

/// Per-axis extent of every commanded coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MotionBounds {
    pub x: Option<AxisRange>,
    pub y: Option<AxisRange>,
    pub z: Option<AxisRange>,
    pub b: Option<AxisRange>,
}

impl MotionBounds {
    fn extend(&mut self, axes: &Axes) {
        for (range, v) in [
            (&mut self.x, axes.x),
            (&mut self.y, axes.y),
            (&mut self.z, axes.z),
            (&mut self.b, axes.b),
        ] {
            if let Some(v) = v {
                AxisRange::include(range, v);
            }
        }
    }

    /// True when every axis of `other` lies within this box.
    pub fn contains(&self, other: &MotionBounds) -> bool {
        [
            (&self.x, &other.x),
            (&self.y, &other.y),
            (&self.z, &other.z),
            (&self.b, &other.b),
        ]
        .iter()
        .all(|(mine, theirs)| match (mine, theirs) {
            (_, None) => true,
            (Some(m), Some(t)) => m.contains(t),
            (None, Some(_)) => false,
        })
    }
}

/// Append-only command buffer with position, bounds and time accounting.
#[derive(Debug, Clone, Default)]
pub struct MotionAccumulator {
    mapping: AxisMapping,
    commands: Vec<MotionCommand>,
    position: Position,
    bounds: MotionBounds,
    estimated_time: f64,
}

impl MotionAccumulator {
    pub fn new(mapping: AxisMapping) -> Self {
        Self {
            mapping,
            ..Self::default()
        }
    }

    pub fn mapping(&self) -> AxisMapping {
        self.mapping
    }

    pub fn rapid_move(&mut self, axes: Axes, feed: f64) {
        let axes = self.mapping.map(axes).with_feed(feed);
        self.append(MotionCommand::Rapid(axes));
    }

    pub fn feed_move(&mut self, axes: Axes, feed: f64) {
        let axes = self.mapping.map(axes).with_feed(feed);
        self.append(MotionCommand::Feed(axes));
    }

    pub fn spindle_on(&mut self, speed: Option<f64>) {
        self.append(MotionCommand::SpindleOn { speed });
    }

    pub fn spindle_off(&mut self) {
        self.append(MotionCommand::SpindleOff);
    }

    pub fn rapid_z(&mut self, z: f64, feed: f64) {
        self.rapid_move(
            Axes {
                z: Some(z),
                ..Axes::default()
            },
            feed,
        );
    }

    pub fn rapid_xy(&mut self, x: f64, y: f64, feed: f64) {
        self.rapid_move(
            Axes {
                x: Some(x),
                y: Some(y),
                ..Axes::default()
            },
            feed,
        );
    }

    /// Rapid to an absolute B angle in degrees, bypassing the X mapping.
    pub fn rapid_b(&mut self, b: f64, feed: f64) {
        self.append(MotionCommand::Rapid(Axes {
            b: Some(b),
            f: Some(feed),
            ..Axes::default()
        }));
    }

    pub fn feed_y(&mut self, y: f64, feed: f64) {
        self.feed_move(
            Axes {
                y: Some(y),
                ..Axes::default()
            },
            feed,
        );
    }

    pub fn feed_yz(&mut self, y: f64, z: f64, feed: f64) {
        self.feed_move(
            Axes {
                y: Some(y),
                z: Some(z),
                ..Axes::default()
            },
            feed,
        );
    }

    pub fn feed_xz(&mut self, x: f64, z: f64, feed: f64) {
        self.feed_move(
            Axes {
                x: Some(x),
                z: Some(z),
                ..Axes::default()
            },
            feed,
        );
    }

    /// Absolute mode, lift to `stop_height`, travel to the first cut, then
    /// drop to `safety_height`.
    pub fn safe_start(&mut self, x: f64, y: f64, stop_height: f64, safety_height: f64, jog_speed: f64) {
        self.append(MotionCommand::AbsolutePositioning);
        self.rapid_z(stop_height, jog_speed);
        self.rapid_xy(x, y, jog_speed);
        self.rapid_z(safety_height, jog_speed);
    }

    /// Record an already-mapped command.
    pub fn append(&mut self, command: MotionCommand) {
        if let Some(axes) = command.axes() {
            let target = Position {
                x: axes.x.unwrap_or(self.position.x),
                y: axes.y.unwrap_or(self.position.y),
                z: axes.z.unwrap_or(self.position.z),
                b: axes.b.unwrap_or(self.position.b),
            };
            if let Some(feed) = axes.f.filter(|f| *f > 0.0) {
                let travelled = self.distance(&self.position, &target);
                self.estimated_time += travelled / feed;
            }
            self.bounds.extend(axes);
            self.position = target;
        }
        self.commands.push(command);
    }

    fn distance(&self, from: &Position, to: &Position) -> f64 {
        let arc = match self.mapping {
            AxisMapping::Rotary { .. } => self.mapping.to_x(to.b - from.b),
            AxisMapping::Linear => 0.0,
        };
        ((to.x - from.x).powi(2) + (to.y - from.y).powi(2) + (to.z - from.z).powi(2) + arc.powi(2))
            .sqrt()
    }

    pub fn last_command(&self) -> Option<&MotionCommand> {
        self.commands.last()
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn bounding_box(&self) -> &MotionBounds {
        &self.bounds
    }

    pub fn estimated_time(&self) -> f64 {
        self.estimated_time
    }

    pub fn commands(&self) -> &[MotionCommand] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<MotionCommand> {
        self.commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    #[test]
    fn test_to_b_rounds_to_two_decimals() {
        let m = AxisMapping::Rotary { diameter: 40.0 };
        assert_eq!(m.to_b(20.0), 57.3);
        assert_abs_diff_eq!(m.to_x(360.0), 40.0 * PI, epsilon = 1e-9);
    }

    #[test]
    fn test_rotary_remaps_x_only() {
        let mut acc = MotionAccumulator::new(AxisMapping::Rotary { diameter: 40.0 });
        acc.feed_xz(20.0, -1.0, 100.0);
        let axes = acc.last_command().and_then(MotionCommand::axes).copied().unwrap();
        assert_eq!(axes.x, None);
        assert_eq!(axes.b, Some(57.3));
        assert_eq!(axes.z, Some(-1.0));
        assert!(acc.bounding_box().x.is_none());
        assert_eq!(acc.bounding_box().b.unwrap().max, 57.3);
    }

    #[test]
    fn test_safe_start_sequence() {
        let mut acc = MotionAccumulator::new(AxisMapping::Linear);
        acc.safe_start(-5.0, 5.0, 10.0, 3.0, 1500.0);
        let cmds = acc.commands();
        assert_eq!(cmds.len(), 4);
        assert_eq!(cmds[0], MotionCommand::AbsolutePositioning);
        assert_eq!(cmds[1].axes().unwrap().z, Some(10.0));
        assert_eq!(cmds[2].axes().unwrap().x, Some(-5.0));
        assert_eq!(cmds[2].axes().unwrap().y, Some(5.0));
        assert_eq!(cmds[3].axes().unwrap().z, Some(3.0));
        assert!(cmds[1..].iter().all(MotionCommand::is_rapid));
        assert_eq!(acc.position().z, 3.0);
    }

    #[test]
    fn test_time_is_distance_over_feed() {
        let mut acc = MotionAccumulator::new(AxisMapping::Linear);
        acc.feed_move(
            Axes {
                x: Some(3.0),
                y: Some(4.0),
                ..Axes::default()
            },
            10.0,
        );
        assert_abs_diff_eq!(acc.estimated_time(), 0.5, epsilon = 1e-12);
        acc.spindle_on(Some(12000.0));
        acc.spindle_off();
        assert_abs_diff_eq!(acc.estimated_time(), 0.5, epsilon = 1e-12);
        // non-positive feed contributes nothing
        acc.feed_y(100.0, 0.0);
        assert_abs_diff_eq!(acc.estimated_time(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_b_travel_is_arc_length() {
        let mut acc = MotionAccumulator::new(AxisMapping::Rotary { diameter: 10.0 });
        acc.rapid_b(360.0, PI);
        assert_abs_diff_eq!(acc.estimated_time(), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_append_tracks_raw_commands() {
        let mut face = MotionAccumulator::new(AxisMapping::Rotary { diameter: 20.0 });
        face.feed_xz(1.0, -2.0, 50.0);
        let mut outer = MotionAccumulator::new(AxisMapping::Rotary { diameter: 20.0 });
        for cmd in face.commands() {
            outer.append(*cmd);
        }
        assert_eq!(outer.commands(), face.commands());
        assert_eq!(outer.position(), face.position());
        assert_abs_diff_eq!(outer.estimated_time(), face.estimated_time(), epsilon = 1e-12);
    }

    #[test]
    fn test_command_json_shape() {
        let cmd = MotionCommand::Rapid(Axes {
            z: Some(5.0),
            f: Some(1500.0),
            ..Axes::default()
        });
        let json = serde_json::to_string(&cmd).unwrap();
        assert_eq!(json, r#"{"kind":"rapid","z":5.0,"f":1500.0}"#);
        let spindle = serde_json::to_string(&MotionCommand::SpindleOn { speed: None }).unwrap();
        assert_eq!(spindle, r#"{"kind":"spindle_on"}"#);
        let back: MotionCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cmd);
    }

    fn move_strategy() -> impl Strategy<Value = (bool, Axes)> {
        (
            any::<bool>(),
            proptest::option::of(-100.0f64..100.0),
            proptest::option::of(-100.0f64..100.0),
            proptest::option::of(-20.0f64..20.0),
            1.0f64..3000.0,
        )
            .prop_map(|(rapid, x, y, z, f)| {
                (
                    rapid,
                    Axes {
                        x,
                        y,
                        z,
                        b: None,
                        f: Some(f),
                    },
                )
            })
    }

    proptest! {
        #[test]
        fn prop_bounds_never_shrink(
            rotary in any::<bool>(),
            moves in proptest::collection::vec(move_strategy(), 1..40),
        ) {
            let mapping = if rotary {
                AxisMapping::Rotary { diameter: 30.0 }
            } else {
                AxisMapping::Linear
            };
            let mut acc = MotionAccumulator::new(mapping);
            for (rapid, axes) in moves {
                let before = *acc.bounding_box();
                let feed = axes.f.unwrap_or(1.0);
                if rapid {
                    acc.rapid_move(axes, feed);
                } else {
                    acc.feed_move(axes, feed);
                }
                prop_assert!(acc.bounding_box().contains(&before));
            }
        }

        #[test]
        fn prop_axis_round_trip(b in -720.0f64..720.0, diameter in 1.0f64..200.0) {
            let m = AxisMapping::Rotary { diameter };
            prop_assert!((m.to_b(m.to_x(b)) - b).abs() <= 0.005 + 1e-9);
        }
    }
}
