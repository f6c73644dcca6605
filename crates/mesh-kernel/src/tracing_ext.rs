//! Timing and state logging for kernel operations.
//!
//! Everything here logs through `tracing`; install a subscriber to see it.
//! Timing events use the `mesh_kernel::timing` target and mesh snapshots use
//! `mesh_kernel::mesh_state`, so either can be filtered on its own:
//!
//! ```text
//! RUST_LOG=mesh_kernel::timing=info,mesh_kernel=warn
//! ```

use std::time::Instant;
use tracing::{Span, debug, info};

use crate::Scene;

/// A timer that logs the operation's duration when dropped.
///
/// ```
/// use mesh_kernel::tracing_ext::OperationTimer;
///
/// let timer = OperationTimer::new("noop");
/// assert!(timer.elapsed_ms() >= 0.0);
/// ```
pub struct OperationTimer {
    name: &'static str,
    start: Instant,
    span: Span,
}

impl OperationTimer {
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!("kernel_operation", operation = name);
        debug!(target: "mesh_kernel::timing", operation = name, "Starting operation");
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    /// Create a timer that also records the input size.
    pub fn with_context(name: &'static str, face_count: usize, vertex_count: usize) -> Self {
        let span = tracing::info_span!(
            "kernel_operation",
            operation = name,
            faces = face_count,
            vertices = vertex_count
        );
        debug!(
            target: "mesh_kernel::timing",
            operation = name,
            faces = face_count,
            vertices = vertex_count,
            "Starting operation"
        );
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        info!(
            target: "mesh_kernel::timing",
            operation = self.name,
            elapsed_ms = format!("{:.2}", self.elapsed_ms()),
            "Operation completed"
        );
    }
}

/// Log scene part count and totals at debug level.
pub fn log_scene_stats(scene: &Scene, context: &str) {
    debug!(
        target: "mesh_kernel::mesh_state",
        context,
        parts = scene.parts.len(),
        vertices = scene.vertex_count(),
        faces = scene.face_count(),
        camera = scene.camera.is_some(),
        "Scene state"
    );
}
