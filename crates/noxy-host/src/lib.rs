//! Host side of the bridge: the conversation it is attached to, the local
//! drivers it acts through, and the supervisor running one bridge per feature.

pub mod drivers;
pub mod stdio;
pub mod supervisor;

pub use drivers::Drivers;
pub use stdio::StdioSession;
pub use supervisor::{build, build_with, HostHandle};
