use iqs_types::{Complex32, IqError, IqResult, WireFormat};

use crate::{
    binary::{read_f32_pair, read_i16_pair, unpack_i12_pair},
    codec::{encode_to_slice, i16_to_sample},
};

/// Рабочий буфер одного канала.
///
/// Вариант выбирается один раз при включении канала, поэтому в горячем цикле
/// воркера нет переключения по формату на каждую выборку. Буфер принадлежит
/// только своему воркеру.
#[derive(Debug, Clone)]
pub enum WireBlock {
    Float32 {
        bytes: Vec<u8>,
    },
    Int16 {
        bytes: Vec<u8>,
    },
    /// Int12 сначала распаковывается в `unpacked`, дальше путь Int16.
    Int12 {
        bytes: Vec<u8>,
        unpacked: Vec<i16>,
    },
}

impl WireBlock {
    /// Выделяет буфер на `capacity` IQ пар.
    pub fn new(
        format: WireFormat,
        capacity: usize,
    ) -> Self {
        let bytes = vec![0u8; capacity * format.sample_size()];

        match format {
            WireFormat::Float32 => WireBlock::Float32 { bytes },
            WireFormat::Int16 => WireBlock::Int16 { bytes },
            WireFormat::Int12 => WireBlock::Int12 {
                bytes,
                unpacked: vec![0i16; capacity * 2],
            },
        }
    }

    pub fn format(&self) -> WireFormat {
        match self {
            WireBlock::Float32 { .. } => WireFormat::Float32,
            WireBlock::Int16 { .. } => WireFormat::Int16,
            WireBlock::Int12 { .. } => WireFormat::Int12,
        }
    }

    /// Ёмкость в IQ парах.
    pub fn capacity(&self) -> usize {
        self.as_bytes().len() / self.format().sample_size()
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            WireBlock::Float32 { bytes }
            | WireBlock::Int16 { bytes }
            | WireBlock::Int12 { bytes, .. } => bytes,
        }
    }

    /// Весь буфер, куда транспорт пишет принятые данные.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        match self {
            WireBlock::Float32 { bytes }
            | WireBlock::Int16 { bytes }
            | WireBlock::Int12 { bytes, .. } => bytes,
        }
    }

    /// Декодирует первые `n` пар буфера в `out` (очищается).
    ///
    /// `n` больше ёмкости означает, что транспорт сообщил больше, чем мог
    /// записать: это `MalformedBlock`.
    pub fn decode_into(
        &mut self,
        n: usize,
        out: &mut Vec<Complex32>,
    ) -> IqResult<()> {
        out.clear();

        let format = self.format();

        if n > self.capacity() {
            return Err(IqError::MalformedBlock {
                format,
                len: n.saturating_mul(format.sample_size()),
                sample_size: format.sample_size(),
            });
        }

        let len = n * format.sample_size();

        out.reserve(n);

        match self {
            WireBlock::Float32 { bytes } => {
                out.extend(bytes[..len].chunks_exact(8).map(|b| {
                    let (i, q) = read_f32_pair(b);
                    Complex32::new(i, q)
                }));
            }
            WireBlock::Int16 { bytes } => {
                out.extend(bytes[..len].chunks_exact(4).map(|b| {
                    let (i, q) = read_i16_pair(b);
                    i16_to_sample(i, q)
                }));
            }
            WireBlock::Int12 { bytes, unpacked } => {
                for (b, pair) in bytes[..len]
                    .chunks_exact(3)
                    .zip(unpacked.chunks_exact_mut(2))
                {
                    let (i, q) = unpack_i12_pair(b);
                    pair[0] = i;
                    pair[1] = q;
                }

                out.extend(
                    unpacked[..n * 2]
                        .chunks_exact(2)
                        .map(|p| i16_to_sample(p[0], p[1])),
                );
            }
        }

        Ok(())
    }

    /// Кодирует `samples` в начало буфера и возвращает заполненную часть.
    ///
    /// Выборки сверх ёмкости не кодируются.
    pub fn encode_from(
        &mut self,
        samples: &[Complex32],
    ) -> &[u8] {
        let format = self.format();
        let n = samples.len().min(self.capacity());
        let len = n * format.sample_size();
        let dst = &mut self.as_bytes_mut()[..len];

        encode_to_slice(&samples[..n], format, dst);
        dst
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, encode};

    fn ramp(n: usize) -> Vec<Complex32> {
        (0..n)
            .map(|k| Complex32::new(k as f32 / n as f32, -(k as f32) / n as f32))
            .collect()
    }

    #[test]
    fn test_block_variant_follows_format() {
        for format in [WireFormat::Float32, WireFormat::Int16, WireFormat::Int12] {
            let block = WireBlock::new(format, 16);
            assert_eq!(block.format(), format);
            assert_eq!(block.capacity(), 16);
            assert_eq!(block.as_bytes().len(), 16 * format.sample_size());
        }
    }

    #[test]
    fn test_block_decode_matches_codec() {
        let samples = ramp(32);

        for format in [WireFormat::Float32, WireFormat::Int16, WireFormat::Int12] {
            let wire = encode(&samples, format);
            let mut block = WireBlock::new(format, 64);
            block.as_bytes_mut()[..wire.len()].copy_from_slice(&wire);

            let mut out = Vec::new();
            block.decode_into(32, &mut out).unwrap();
            assert_eq!(out, decode(&wire, format).unwrap(), "format {format}");
        }
    }

    #[test]
    fn test_block_decode_partial_count() {
        let mut block = WireBlock::new(WireFormat::Int16, 8);
        let wire = encode(&ramp(8), WireFormat::Int16);
        block.as_bytes_mut().copy_from_slice(&wire);

        let mut out = Vec::new();
        block.decode_into(3, &mut out).unwrap();
        assert_eq!(out.len(), 3);
        block.decode_into(0, &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_block_decode_over_capacity_rejected() {
        let mut block = WireBlock::new(WireFormat::Int12, 4);
        let mut out = vec![Complex32::new(0.0, 0.0)];

        let err = block.decode_into(5, &mut out).unwrap_err();
        assert!(matches!(err, IqError::MalformedBlock { len: 15, .. }));
        assert!(out.is_empty());
    }

    #[test]
    fn test_block_decode_absurd_count_rejected() {
        // привязка драйвера может превратить код ошибки -1 в usize::MAX
        for format in [WireFormat::Float32, WireFormat::Int16, WireFormat::Int12] {
            let mut block = WireBlock::new(format, 16);
            let mut out = Vec::new();

            let err = block.decode_into(usize::MAX, &mut out).unwrap_err();
            assert_eq!(
                err,
                IqError::MalformedBlock {
                    format,
                    len: usize::MAX,
                    sample_size: format.sample_size(),
                }
            );
            assert!(out.is_empty());

            // блок остаётся рабочим
            block.decode_into(16, &mut out).unwrap();
            assert_eq!(out.len(), 16);
        }
    }

    #[test]
    fn test_block_encode_matches_codec() {
        let samples = ramp(10);

        for format in [WireFormat::Float32, WireFormat::Int16, WireFormat::Int12] {
            let mut block = WireBlock::new(format, 10);
            let expected = encode(&samples, format);
            assert_eq!(block.encode_from(&samples), expected.as_slice());
        }
    }

    #[test]
    fn test_block_encode_truncates_to_capacity() {
        let mut block = WireBlock::new(WireFormat::Float32, 4);
        assert_eq!(block.encode_from(&ramp(10)).len(), 32);
    }
}
