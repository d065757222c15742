pub mod config;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod handle;
pub mod metrics;
pub mod pool;
pub mod rx;
pub mod signal;
pub mod sim;
pub mod transport;
pub mod tx;
pub mod worker;

pub use config::*;
pub use device::*;
pub use dispatch::*;
pub use error::*;
pub use events::*;
pub use handle::*;
pub use metrics::*;
pub use pool::*;
pub use rx::*;
pub use signal::*;
pub use sim::*;
pub use transport::*;
pub use tx::*;
pub use worker::*;
