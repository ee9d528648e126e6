mod record;
mod wire;

pub use record::*;
pub use wire::*;
