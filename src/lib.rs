//! ReliefCAM — relief toolpaths in WebAssembly.
//!
//! # Swiss Cheese Architecture
//!
//! The pipeline is composed of independent, swappable layers:
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  Input        │ ──▶ │  Height grid  │ ──▶ │  Strategy     │ ──▶ │  Output       │
//! │  (PNG / STL)  │     │  (raster,     │     │  (planar,     │     │  (motion      │
//! │               │     │   top view,   │     │   rotary,     │     │   commands,   │
//! │  🧀 hole:     │     │   unwrap)     │     │   4 faces)    │     │   preview)    │
//! │  add OBJ,3MF  │     │  🧀 hole:     │     │  🧀 hole:     │     │  🧀 hole:     │
//! │  16-bit PNG…  │     │  ball nose…   │     │  spiral, …    │     │  G-code, …    │
//! └──────────────┘     └──────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! Every grid passes through the reachability smoother before synthesis, so
//! no strategy can ask a V-bit for a slope it cannot cut.

pub mod config;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod heightmap;
pub mod mesh;
pub mod motion;
pub mod planner;
pub mod progress;
pub mod radial;
pub mod raster;
pub mod relief;
pub mod slicer;
pub mod smoothing;
pub mod stl;
pub mod tool;
pub mod toolpath;

use config::JobConfig;
use error::Result;
use planner::ReliefPathPlanner;
use progress::{NoProgress, ProgressObserver};
use toolpath::ReliefSource;
use wasm_bindgen::prelude::*;

// ── Request plumbing ─────────────────────────────────────────────────

fn image_source(data: &[u8]) -> Result<ReliefSource> {
    Ok(ReliefSource::Raster(raster::decode_greyscale(data)?))
}

fn stl_source(data: &[u8], config: &JobConfig) -> Result<ReliefSource> {
    Ok(ReliefSource::Mesh(stl::load_stl(data, config.plane)?))
}

fn planner_for(config_json: &str) -> Result<ReliefPathPlanner> {
    ReliefPathPlanner::new(JobConfig::from_json(config_json)?)
}

/// Toolpath JSON for an encoded greyscale image.
pub fn image_toolpath_json(
    data: &[u8],
    config_json: &str,
    progress: &mut dyn ProgressObserver,
) -> Result<String> {
    let planner = planner_for(config_json)?;
    let out = planner.generate_toolpath(&image_source(data)?, progress)?;
    Ok(serde_json::to_string(&out)?)
}

/// Toolpath JSON for an STL file.
pub fn stl_toolpath_json(
    data: &[u8],
    config_json: &str,
    progress: &mut dyn ProgressObserver,
) -> Result<String> {
    let planner = planner_for(config_json)?;
    let source = stl_source(data, planner.config())?;
    let out = planner.generate_toolpath(&source, progress)?;
    Ok(serde_json::to_string(&out)?)
}

pub fn image_view_json(data: &[u8], config_json: &str) -> Result<String> {
    let planner = planner_for(config_json)?;
    let out = planner.generate_view(&image_source(data)?)?;
    Ok(serde_json::to_string(&out)?)
}

pub fn stl_view_json(data: &[u8], config_json: &str) -> Result<String> {
    let planner = planner_for(config_json)?;
    let source = stl_source(data, planner.config())?;
    let out = planner.generate_view(&source)?;
    Ok(serde_json::to_string(&out)?)
}

// ── WASM entry points ────────────────────────────────────────────────

/// Forwards progress to a JS callback taking one number.
struct JsProgress(js_sys::Function);

impl ProgressObserver for JsProgress {
    fn on_progress(&mut self, fraction: f64) {
        // a throwing callback must not abort generation
        let _ = self.0.call1(&JsValue::NULL, &JsValue::from_f64(fraction));
    }
}

fn with_progress<T>(
    callback: Option<js_sys::Function>,
    run: impl FnOnce(&mut dyn ProgressObserver) -> Result<T>,
) -> std::result::Result<T, JsValue> {
    let result = match callback {
        Some(f) => run(&mut JsProgress(f)),
        None => run(&mut NoProgress),
    };
    result.map_err(|e| JsValue::from_str(&e.to_string()))
}

#[wasm_bindgen]
pub fn generate_image_toolpath(
    data: &[u8],
    config_json: &str,
    on_progress: Option<js_sys::Function>,
) -> std::result::Result<String, JsValue> {
    with_progress(on_progress, |p| image_toolpath_json(data, config_json, p))
}

#[wasm_bindgen]
pub fn generate_stl_toolpath(
    data: &[u8],
    config_json: &str,
    on_progress: Option<js_sys::Function>,
) -> std::result::Result<String, JsValue> {
    with_progress(on_progress, |p| stl_toolpath_json(data, config_json, p))
}

#[wasm_bindgen]
pub fn preview_image(data: &[u8], config_json: &str) -> std::result::Result<String, JsValue> {
    image_view_json(data, config_json).map_err(|e| JsValue::from_str(&e.to_string()))
}

#[wasm_bindgen]
pub fn preview_stl(data: &[u8], config_json: &str) -> std::result::Result<String, JsValue> {
    stl_view_json(data, config_json).map_err(|e| JsValue::from_str(&e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReliefError;

    fn cube_stl() -> String {
        let mut s = String::from("solid cube\n");
        let quads = [
            [[0., 0., 5.], [5., 0., 5.], [5., 5., 5.], [0., 5., 5.]],
            [[0., 0., 0.], [0., 5., 0.], [5., 5., 0.], [5., 0., 0.]],
            [[0., 0., 0.], [5., 0., 0.], [5., 0., 5.], [0., 0., 5.]],
            [[0., 5., 0.], [0., 5., 5.], [5., 5., 5.], [5., 5., 0.]],
            [[0., 0., 0.], [0., 0., 5.], [0., 5., 5.], [0., 5., 0.]],
            [[5., 0., 0.], [5., 5., 0.], [5., 5., 5.], [5., 0., 5.]],
        ];
        for q in quads {
            for tri in [[q[0], q[1], q[2]], [q[0], q[2], q[3]]] {
                s.push_str("facet normal 0 0 0\nouter loop\n");
                for v in tri {
                    s.push_str(&format!("vertex {} {} {}\n", v[0], v[1], v[2]));
                }
                s.push_str("endloop\nendfacet\n");
            }
        }
        s.push_str("endsolid cube\n");
        s
    }

    #[test]
    fn test_stl_toolpath_json() {
        let json = stl_toolpath_json(
            cube_stl().as_bytes(),
            r#"{"width": 5, "height": 5, "density": 2, "tool_diameter": 0.1}"#,
            &mut NoProgress,
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["head_type"], "cnc");
        assert!(value["data"].as_array().is_some_and(|d| !d.is_empty()));
    }

    #[test]
    fn test_stl_preview_json() {
        let json = stl_view_json(
            cube_stl().as_bytes(),
            r#"{"width": 5, "height": 5, "density": 2}"#,
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["is_rotate"], false);
        assert_eq!(value["data"].as_array().map(Vec::len), Some(10));
    }

    #[test]
    fn test_bad_config_json() {
        let err = stl_view_json(cube_stl().as_bytes(), "{not json").unwrap_err();
        assert!(matches!(err, ReliefError::Serialization(_)));
    }

    #[test]
    fn test_bad_image_bytes() {
        let err = image_view_json(b"\x89PNG broken", "{}").unwrap_err();
        assert!(matches!(err, ReliefError::ImageLoadFailed(_)));
    }
}
