pub mod address;
pub mod logging;

pub use address::{Address, AddressError};
pub use tracing;
