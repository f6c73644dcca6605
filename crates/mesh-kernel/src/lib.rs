//! Triangle mesh kernel for level-of-detail generation.
//!
//! Scenes are loaded from GLB, OBJ or STL as a list of named parts, each an
//! indexed triangle mesh with node transforms already applied. The kernel
//! provides the geometric operations a LOD pipeline needs:
//!
//! - **I/O**: [`load_scene`] / [`save_scene`] by format
//! - **Validation**: [`manifold_defects`] and [`detect_self_intersections`]
//! - **Repair**: vertex welding, duplicate and interior face removal, hole filling
//! - **Simplification**: quadric error edge collapse ([`decimate_mesh`])
//! - **Hardening**: [`split_sharp_edges`]
//!
//! # Units and Winding
//!
//! Coordinates are unitless. The default weld distance (1e-4) suits scenes
//! modelled in meters. Faces wind counter-clockwise when viewed from outside.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use mesh_kernel::{DecimateParams, ExportOptions, MeshFormat, decimate_mesh, load_scene, save_scene};
//!
//! let mut scene = load_scene(Path::new("chair.glb")).unwrap();
//! for part in &mut scene.parts {
//!     part.mesh = decimate_mesh(&part.mesh, &DecimateParams::with_target_ratio(0.4)).mesh;
//! }
//! save_scene(&scene, Path::new("chair-40.glb"), MeshFormat::Glb, &ExportOptions::default()).unwrap();
//! ```
//!
//! # Logging
//!
//! Operations emit `tracing` events; see [`tracing_ext`] for the targets.

mod error;
mod glb;
pub mod tracing_ext;
mod types;

pub mod adjacency;
pub mod decimate;
pub mod harden;
pub mod holes;
pub mod intersect;
pub mod io;
pub mod repair;
pub mod validate;

pub use error::{ErrorCode, MeshError, MeshLocation, MeshResult, RecoverySuggestion};
pub use types::{Camera, Material, Mesh, MeshPart, Scene, Triangle, Vertex};

pub use adjacency::MeshAdjacency;

pub use decimate::{DecimateParams, DecimateResult, decimate_mesh};
pub use harden::split_sharp_edges;
pub use holes::{BoundaryLoop, HoleFillSummary, detect_holes, fill_holes};
pub use intersect::{IntersectionParams, SelfIntersectionResult, detect_self_intersections};
pub use io::{ExportOptions, MeshFormat, load_scene, save_scene};
pub use repair::{
    RepairMode, RepairParams, RepairSummary, remove_duplicate_faces, remove_interior_faces,
    remove_unreferenced_vertices, repair_mesh, weld_vertices,
};
pub use validate::{EdgeDefect, manifold_defects, validate_mesh_data};
