/// Relief generation strategies.
///
/// Swiss-cheese layer: **Strategy selection**
/// The machine setup picks exactly one strategy per request. Each turns a
/// source (raster or mesh) into constrained height grids and feeds them to
/// the shared path synthesis.
use crate::config::{JobConfig, SliceMode};
use crate::error::{ReliefError, Result};
use crate::geometry::{Vec2, Vec3};
use crate::grid::{GridGeometry, HeightGrid};
use crate::heightmap::PlanarHeightMapBuilder;
use crate::mesh::{Mesh, MeshFace};
use crate::motion::{AxisMapping, AxisRange, MotionAccumulator};
use crate::progress::{ProgressObserver, ScaledProgress};
use crate::radial::RadialSlicer;
use crate::raster::{RasterOptions, RasterSampler};
use crate::relief::{planar_view, rotary_view, CutProfile, DepthScale, ToolpathScanner};
use crate::smoothing::ReachabilitySmoother;
use crate::tool::ToolGeometry;
use image::GrayImage;
use std::f64::consts::PI;
use tracing::{debug, warn};

/// Input geometry for one request.
#[derive(Debug, Clone)]
pub enum ReliefSource {
    Raster(GrayImage),
    Mesh(Mesh),
}

impl ReliefSource {
    fn kind(&self) -> &'static str {
        match self {
            ReliefSource::Raster(_) => "raster",
            ReliefSource::Mesh(_) => "mesh",
        }
    }
}

/// A height grid together with everything needed to machine it.
#[derive(Debug, Clone)]
pub struct Surface {
    pub grid: HeightGrid,
    pub profile: CutProfile,
    pub scale: DepthScale,
    pub mapping: AxisMapping,
}

impl Surface {
    /// Apply the reachability constraint of the configured tool.
    fn constrain(&mut self, tool: &ToolGeometry) {
        let span = match self.scale {
            DepthScale::Linear => self.profile.target_depth,
            DepthScale::Radial { max_radius } => max_radius,
        };
        let smoother = ReachabilitySmoother::new(tool, span, self.grid.geometry().density);
        smoother.smooth(&mut self.grid);
    }

    fn scan(
        &self,
        spindle_speed: Option<f64>,
        progress: &mut dyn ProgressObserver,
    ) -> MotionAccumulator {
        let mut acc = MotionAccumulator::new(self.mapping);
        ToolpathScanner::new(self.profile, self.scale)
            .with_spindle_speed(spindle_speed)
            .scan(&self.grid, &mut acc, progress);
        acc
    }
}

/// Preview geometry, before world placement.
#[derive(Debug, Clone)]
pub struct ViewPaths {
    pub data: Vec<Vec<Vec2>>,
    /// Physical extent of the sampled grid.
    pub width: f64,
    pub height: f64,
    pub z: AxisRange,
}

/// Common contract of the planar and rotary strategies.
pub trait ReliefStrategy {
    fn name(&self) -> &'static str;

    /// Full motion program for `source`.
    fn generate(
        &self,
        source: &ReliefSource,
        progress: &mut dyn ProgressObserver,
    ) -> Result<MotionAccumulator>;

    /// Preview polylines for `source`.
    fn generate_view(&self, source: &ReliefSource) -> Result<ViewPaths>;
}

/// Pick the strategy for this machine setup.
pub fn select_strategy(config: &JobConfig) -> Box<dyn ReliefStrategy> {
    let config = config.clone();
    match (config.is_rotate, config.slice_mode) {
        (false, _) => Box::new(PlanarStrategy { config }),
        (true, SliceMode::Rotation) => Box::new(RotarySingleStrategy { config }),
        (true, SliceMode::MultiFace) => Box::new(RotaryMultiFaceStrategy { config }),
    }
}

/// Configured density, limited by the tool and the job size.
pub fn effective_density(config: &JobConfig) -> f64 {
    let limit = ToolGeometry::from_config(config).max_density(config.width, config.height);
    let density = config.density.min(limit);
    if density < config.density {
        debug!(requested = config.density, density, "density clamped");
    }
    density
}

fn raster_grid(image: &GrayImage, config: &JobConfig) -> Result<HeightGrid> {
    let geometry = GridGeometry::from_extent(config.width, config.height, effective_density(config));
    let options = RasterOptions {
        invert: config.invert,
        flip: config.flip,
        rotation_z: config.rotation_z,
    };
    RasterSampler::new(options).sample(image, geometry)
}

fn planar_mesh_grid(mesh: &Mesh, config: &JobConfig) -> Result<HeightGrid> {
    PlanarHeightMapBuilder::new(effective_density(config))
        .with_extension(config.extension_x, config.extension_y)
        .with_grey_range(config.min_grey, config.max_grey)
        .build(mesh)
}

/// Scale so the XY footprint spans `width × height`.
fn fit_footprint(mesh: &mut Mesh, width: f64, height: f64) {
    if let Some(len) = mesh.aabb().map(|b| b.length()) {
        let fx = if len.x > 0.0 { width / len.x } else { 1.0 };
        let fy = if len.y > 0.0 { height / len.y } else { 1.0 };
        mesh.resize(Vec3::new(fx, fy, fx));
    }
}

fn view_z(profile: &CutProfile) -> AxisRange {
    AxisRange {
        min: profile.final_depth,
        max: profile.initial_z,
    }
}

// ── Planar ───────────────────────────────────────────────────────────

/// 3-axis relief from a raster or the top of a mesh.
pub struct PlanarStrategy {
    config: JobConfig,
}

impl PlanarStrategy {
    fn surface(&self, source: &ReliefSource) -> Result<Surface> {
        let grid = match source {
            ReliefSource::Raster(image) => raster_grid(image, &self.config)?,
            ReliefSource::Mesh(mesh) => {
                let mut mesh = mesh.clone();
                fit_footprint(&mut mesh, self.config.width, self.config.height);
                mesh.offset_to_origin();
                planar_mesh_grid(&mesh, &self.config)?
            }
        };
        let mut surface = Surface {
            grid,
            profile: CutProfile::from_config(&self.config),
            scale: DepthScale::Linear,
            mapping: AxisMapping::Linear,
        };
        surface.constrain(&ToolGeometry::from_config(&self.config));
        Ok(surface)
    }
}

impl ReliefStrategy for PlanarStrategy {
    fn name(&self) -> &'static str {
        "planar"
    }

    fn generate(
        &self,
        source: &ReliefSource,
        progress: &mut dyn ProgressObserver,
    ) -> Result<MotionAccumulator> {
        let surface = self.surface(source)?;
        Ok(surface.scan(self.config.spindle_speed, progress))
    }

    fn generate_view(&self, source: &ReliefSource) -> Result<ViewPaths> {
        let s = self.surface(source)?;
        let geom = s.grid.geometry();
        Ok(ViewPaths {
            data: planar_view(&s.grid, &s.profile, s.scale),
            width: geom.width(),
            height: geom.height(),
            z: view_z(&s.profile),
        })
    }
}

// ── Rotary, single revolution ────────────────────────────────────────

/// One relief wrapped once around the stock: a raster laid around the
/// cylinder, or a mesh unwrapped about the rotation axis.
pub struct RotarySingleStrategy {
    config: JobConfig,
}

impl RotarySingleStrategy {
    fn surface(&self, source: &ReliefSource) -> Result<Surface> {
        let profile = CutProfile::from_config(&self.config);
        let mut surface = match source {
            ReliefSource::Raster(image) => Surface {
                grid: raster_grid(image, &self.config)?,
                profile,
                scale: DepthScale::Linear,
                mapping: AxisMapping::Rotary {
                    diameter: self.config.diameter,
                },
            },
            ReliefSource::Mesh(mesh) => {
                let radial = RadialSlicer::new(effective_density(&self.config)).unwrap(mesh.clone())?;
                let diameter = radial.grid.geometry().width() / PI;
                Surface {
                    grid: radial.grid,
                    profile,
                    scale: DepthScale::Radial {
                        max_radius: radial.max_radius,
                    },
                    mapping: AxisMapping::Rotary { diameter },
                }
            }
        };
        surface.constrain(&ToolGeometry::from_config(&self.config));
        Ok(surface)
    }

    /// Length of the unwrapped circumference the preview is binned over.
    fn circumference(&self, source: &ReliefSource, surface: &Surface) -> f64 {
        match source {
            ReliefSource::Raster(_) => self.config.diameter * PI,
            ReliefSource::Mesh(_) => surface.grid.geometry().width(),
        }
    }
}

impl ReliefStrategy for RotarySingleStrategy {
    fn name(&self) -> &'static str {
        "rotary_single"
    }

    fn generate(
        &self,
        source: &ReliefSource,
        progress: &mut dyn ProgressObserver,
    ) -> Result<MotionAccumulator> {
        let surface = self.surface(source)?;
        Ok(surface.scan(self.config.spindle_speed, progress))
    }

    fn generate_view(&self, source: &ReliefSource) -> Result<ViewPaths> {
        let s = self.surface(source)?;
        let geom = s.grid.geometry();
        let data = rotary_view(
            &s.grid,
            &s.profile,
            s.scale,
            self.circumference(source, &s),
            self.config.diameter / 2.0,
        );
        Ok(ViewPaths {
            data,
            width: geom.width(),
            height: geom.height(),
            z: view_z(&s.profile),
        })
    }
}

// ── Rotary, four faces ───────────────────────────────────────────────

/// Four planar reliefs of a mesh, a quarter turn of B apart.
pub struct RotaryMultiFaceStrategy {
    config: JobConfig,
}

impl RotaryMultiFaceStrategy {
    fn mesh<'a>(&self, source: &'a ReliefSource) -> Result<&'a Mesh> {
        match source {
            ReliefSource::Mesh(mesh) => Ok(mesh),
            other => Err(ReliefError::UnsupportedSource {
                strategy: self.name(),
                reason: format!("{} input has no faces to turn", other.kind()),
            }),
        }
    }

    /// Scale the part: its cross-section to `width`, its length along the
    /// rotation axis to `height`.
    fn fitted(&self, mesh: &Mesh) -> Mesh {
        let mut mesh = mesh.clone();
        if let Some(len) = mesh.aabb().map(|b| b.length()) {
            let across = if len.x > 0.0 {
                self.config.width / len.x
            } else {
                1.0
            };
            let along = if len.y > 0.0 {
                self.config.height / len.y
            } else {
                1.0
            };
            mesh.resize(Vec3::new(across, along, across));
        }
        mesh
    }

    fn face_surface(&self, base: &Mesh, face: MeshFace) -> Result<Surface> {
        let mut mesh = base.clone();
        mesh.set_coordinate_system(face);
        if let Some(b) = mesh.aabb().copied() {
            mesh.offset(Vec3::new(
                -b.min.x,
                -(b.min.y + b.max.y) / 2.0,
                -b.min.z,
            ));
        }
        let mut surface = Surface {
            grid: planar_mesh_grid(&mesh, &self.config)?,
            profile: CutProfile::new(&self.config, self.config.diameter / 2.0),
            scale: DepthScale::Linear,
            // the face is cut flat; only the turns between faces drive B
            mapping: AxisMapping::Linear,
        };
        surface.constrain(&ToolGeometry::from_config(&self.config));
        Ok(surface)
    }
}

impl ReliefStrategy for RotaryMultiFaceStrategy {
    fn name(&self) -> &'static str {
        "rotary_multi_face"
    }

    fn generate(
        &self,
        source: &ReliefSource,
        progress: &mut dyn ProgressObserver,
    ) -> Result<MotionAccumulator> {
        let base = self.fitted(self.mesh(source)?);
        let mut acc = MotionAccumulator::new(AxisMapping::Rotary {
            diameter: self.config.diameter,
        });
        let faces = MeshFace::ALL;
        let share = 1.0 / faces.len() as f64;
        for (k, face) in faces.into_iter().enumerate() {
            let surface = self.face_surface(&base, face)?;
            let mut scaled = ScaledProgress::new(progress, k as f64 * share, share);
            let face_acc = surface.scan(self.config.spindle_speed, &mut scaled);
            debug!(?face, commands = face_acc.commands().len(), "face toolpath");
            for command in face_acc.into_commands() {
                acc.append(command);
            }
            if k + 1 < faces.len() {
                acc.rapid_b((k + 1) as f64 * 90.0, self.config.jog_speed);
            }
        }
        Ok(acc)
    }

    /// Faces are previewed as the unwrapped part.
    fn generate_view(&self, source: &ReliefSource) -> Result<ViewPaths> {
        let mesh = self.fitted(self.mesh(source)?);
        warn!("multi-face preview shows the single-revolution unwrap");
        RotarySingleStrategy {
            config: self.config.clone(),
        }
        .generate_view(&ReliefSource::Mesh(mesh))
    }
}
