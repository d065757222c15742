//! Кодек IQ выборок
//!
//! Чистые функции конвертации между форматами транспорта (Int16, Int12
//! packed, Float32) и каноническим `Complex32`. Состояния нет, потоков нет.
//!
//! # Быстрый старт
//!
//! ```
//! use iqs_core::{decode, encode};
//! use iqs_types::{Complex32, WireFormat};
//!
//! let samples = vec![Complex32::new(0.5, -0.25); 4];
//! let wire = encode(&samples, WireFormat::Int16);
//! assert_eq!(wire.len(), 16);
//!
//! let back = decode(&wire, WireFormat::Int16)?;
//! assert_eq!(back, samples);
//! # Ok::<(), iqs_types::IqError>(())
//! ```

pub mod binary;
pub mod block;
pub mod codec;

pub use binary::*;
pub use block::*;
pub use codec::*;

/// Версия библиотеки.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
