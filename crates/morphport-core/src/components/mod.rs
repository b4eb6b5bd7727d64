/// Per-node state owned by a dynamic node instance.
///
/// The tables here are plain data; the logic that keeps them consistent with
/// each other and with the host node lives in `crate::systems`.
pub mod controls;
pub mod ports;
pub mod session;
pub mod state;

pub use self::controls::*;
pub use self::ports::*;
pub use self::session::*;
pub use self::state::*;
