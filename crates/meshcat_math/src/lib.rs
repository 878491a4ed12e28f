// Re-export glam for convenience
pub use glam::*;

// Meshcat math types
mod transform;
pub use transform::{compose, decompose, rotation_matrix_to_quat, Transform, SCALE_EPSILON};
