pub mod dispatch;
pub mod hub;
pub mod pump;
pub mod registry;

pub use hub::DeviceHub;
pub use pump::run_pump;
pub use registry::{Registry, SessionReceiver, SessionSender};
