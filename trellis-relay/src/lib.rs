mod registry;
mod ws;

pub use registry::*;
pub use ws::*;
