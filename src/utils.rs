mod sidecar_path;
pub use sidecar_path::sidecar_path;
