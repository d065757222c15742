pub mod direction;
pub mod error;
pub mod message;
pub mod wire_format;

pub use direction::*;
pub use error::*;
pub use message::*;
pub use wire_format::*;

pub use num_complex::Complex32;
