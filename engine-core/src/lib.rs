pub mod flow;
pub mod math;
pub mod metrics;
pub mod model;
pub mod ports;

pub use flow::*;
pub use math::*;
pub use metrics::*;
pub use model::*;
pub use ports::*;
