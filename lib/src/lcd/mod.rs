//! The LCD driver actor and the serial panel it talks to.

pub mod device;
pub mod driver;
pub mod protocol;
pub mod render;

pub use device::{DevicePath, LcdClient, LcdDevice, MemoryDevice};
pub use driver::{DriverConfig, LcdDriver};
pub use protocol::{LcdCommand, ProtocolError};
