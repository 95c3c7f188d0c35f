pub mod device;
pub mod hub;
pub mod macros;
pub mod usage;

pub use device::*;
pub use hub::*;
pub use usage::*;
