pub mod measure;
pub mod pick_fastest;

pub use measure::{LatencyProbe, ProbeReport};
pub use pick_fastest::{pick_fastest, rank_fastest};
