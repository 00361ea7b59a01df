pub mod detect;
pub mod orchestrator;
pub mod zones;

pub use detect::{BoundingBox, Detection, Detector, FrameDiffDetector};
pub use zones::Zone;
