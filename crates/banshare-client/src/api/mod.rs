//! API endpoint modules.

mod list;
mod push;
mod release;

pub use list::ListApi;
pub use push::PushApi;
pub use release::ReleaseApi;
