use serde::{Deserialize, Serialize};

use crate::{IqError, IqResult};

/// Формат IQ выборок на границе с транспортом.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum WireFormat {
    /// 32-битные float (F32 I, F32 Q), little-endian
    Float32 = 0,
    /// 16-битные целые (I16, Q16), little-endian, шкала 1/32768
    Int16 = 1,
    /// 12-битные целые, упакованные по 3 байта на пару
    Int12 = 2,
}

impl WireFormat {
    pub fn from_u8(v: u8) -> IqResult<Self> {
        match v {
            0 => Ok(WireFormat::Float32),
            1 => Ok(WireFormat::Int16),
            2 => Ok(WireFormat::Int12),
            _ => Err(IqError::unknown_format(format!("code {v}"))),
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Размер одной IQ пары в байтах
    pub fn sample_size(&self) -> usize {
        match self {
            WireFormat::Float32 => 8, // 4 байта I + 4 байта Q
            WireFormat::Int16 => 4,   // 2 байта I + 2 байта Q
            WireFormat::Int12 => 3,   // 12 бит I + 12 бит Q
        }
    }

    /// Шаг квантования в нормированных единицах (0 для float).
    pub fn lsb(&self) -> f32 {
        match self {
            WireFormat::Float32 => 0.0,
            WireFormat::Int16 => 1.0 / 32_768.0,
            WireFormat::Int12 => 1.0 / 2_048.0,
        }
    }

    /// Сколько целых выборок помещается в `len` байт.
    ///
    /// Возвращает [`IqError::MalformedBlock`], если остаётся хвост.
    pub fn samples_in(
        &self,
        len: usize,
    ) -> IqResult<usize> {
        let size = self.sample_size();

        if len % size != 0 {
            return Err(IqError::malformed(*self, len));
        }

        Ok(len / size)
    }
}

impl std::fmt::Display for WireFormat {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            WireFormat::Float32 => write!(f, "float32"),
            WireFormat::Int16 => write!(f, "int16"),
            WireFormat::Int12 => write!(f, "int12"),
        }
    }
}

impl std::str::FromStr for WireFormat {
    type Err = IqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "float32" | "f32" | "fc32" => Ok(WireFormat::Float32),
            "int16" | "i16" | "sc16" => Ok(WireFormat::Int16),
            "int12" | "i12" | "sc12" => Ok(WireFormat::Int12),
            _ => Err(IqError::unknown_format(s)),
        }
    }
}
