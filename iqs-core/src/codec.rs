//! Конвертация блоков транспорта в `Complex32` и обратно.
//!
//! Все форматы little-endian. Целочисленные форматы нормируются делением на
//! 32768 (Int12 после распаковки идёт тем же путём). При кодировании значения
//! вне диапазона насыщаются, `NaN` превращается в 0.

use iqs_types::{Complex32, IqResult, WireFormat};

use crate::binary::{
    pack_i12_pair, read_f32_pair, read_i16_pair, unpack_i12_pair, write_f32_pair,
    write_i16_pair,
};

/// Шкала Int16 (и Int12 после сдвига).
pub const INT16_SCALE: f32 = 32_768.0;

/// Шкала Int12 до сдвига.
pub const INT12_SCALE: f32 = 2_048.0;

/// Декодирует блок транспорта в новый вектор выборок.
///
/// Если длина не кратна размеру пары, возвращает `MalformedBlock` и ничего
/// не выдаёт.
pub fn decode(
    bytes: &[u8],
    format: WireFormat,
) -> IqResult<Vec<Complex32>> {
    let mut out = Vec::new();
    decode_into(bytes, format, &mut out)?;
    Ok(out)
}

/// Декодирует блок в переданный буфер (буфер очищается).
///
/// Возвращает кол-во выборок. При ошибке `out` остаётся пустым.
pub fn decode_into(
    bytes: &[u8],
    format: WireFormat,
    out: &mut Vec<Complex32>,
) -> IqResult<usize> {
    out.clear();

    let n = format.samples_in(bytes.len())?;
    out.reserve(n);

    match format {
        WireFormat::Float32 => out.extend(bytes.chunks_exact(8).map(|b| {
            let (i, q) = read_f32_pair(b);
            Complex32::new(i, q)
        })),
        WireFormat::Int16 => out.extend(bytes.chunks_exact(4).map(|b| {
            let (i, q) = read_i16_pair(b);
            i16_to_sample(i, q)
        })),
        WireFormat::Int12 => out.extend(bytes.chunks_exact(3).map(|b| {
            let (i, q) = unpack_i12_pair(b);
            i16_to_sample(i, q)
        })),
    }

    Ok(n)
}

/// Кодирует выборки в новый блок транспорта.
pub fn encode(
    samples: &[Complex32],
    format: WireFormat,
) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(samples, format, &mut out);
    out
}

/// Кодирует выборки в переданный буфер (буфер очищается и растягивается до
/// `samples.len() * sample_size`).
pub fn encode_into(
    samples: &[Complex32],
    format: WireFormat,
    out: &mut Vec<u8>,
) {
    out.clear();
    out.resize(samples.len() * format.sample_size(), 0);
    encode_to_slice(samples, format, out);
}

/// Кодирует выборки в готовый срез.
///
/// Пишется `min(samples.len(), dst.len() / sample_size)` пар, хвост `dst`
/// не трогается.
pub fn encode_to_slice(
    samples: &[Complex32],
    format: WireFormat,
    dst: &mut [u8],
) {
    match format {
        WireFormat::Float32 => {
            for (b, s) in dst.chunks_exact_mut(8).zip(samples) {
                write_f32_pair(b, s.re, s.im);
            }
        }
        WireFormat::Int16 => {
            for (b, s) in dst.chunks_exact_mut(4).zip(samples) {
                write_i16_pair(b, saturate_i16(s.re), saturate_i16(s.im));
            }
        }
        WireFormat::Int12 => {
            for (b, s) in dst.chunks_exact_mut(3).zip(samples) {
                pack_i12_pair(b, saturate_i12(s.re), saturate_i12(s.im));
            }
        }
    }
}

/// Пара i16 → нормированная выборка.
#[inline]
pub fn i16_to_sample(
    i: i16,
    q: i16,
) -> Complex32 {
    Complex32::new(i as f32 / INT16_SCALE, q as f32 / INT16_SCALE)
}

/// Нормированное значение → i16 с насыщением.
#[inline]
pub fn saturate_i16(x: f32) -> i16 {
    // NaN после clamp остаётся NaN, а `as` переводит его в 0
    (x * INT16_SCALE)
        .round()
        .clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Нормированное значение → 12-битное целое `[-2048, 2047]` с насыщением.
#[inline]
pub fn saturate_i12(x: f32) -> i16 {
    (x * INT12_SCALE).round().clamp(-2_048.0, 2_047.0) as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use iqs_types::IqError;

    #[test]
    fn test_decode_int16_known_bytes() {
        let bytes = [0x00, 0x40, 0x00, 0xC0, 0xFF, 0x7F, 0x00, 0x80];
        let s = decode(&bytes, WireFormat::Int16).unwrap();

        assert_eq!(s.len(), 2);
        assert_eq!(s[0], Complex32::new(0.5, -0.5));
        assert_eq!(s[1], Complex32::new(32_767.0 / 32_768.0, -1.0));
    }

    #[test]
    fn test_decode_float32_count() {
        let samples: Vec<Complex32> = (0..100)
            .map(|k| Complex32::new(k as f32 * 0.01, -(k as f32) * 0.01))
            .collect();
        let wire = encode(&samples, WireFormat::Float32);

        assert_eq!(wire.len(), 800);
        let back = decode(&wire, WireFormat::Float32).unwrap();
        assert_eq!(back.len(), 100);
        assert_eq!(back, samples);
    }

    #[test]
    fn test_decode_rejects_partial_tail() {
        for (format, len) in [
            (WireFormat::Float32, 12),
            (WireFormat::Int16, 6),
            (WireFormat::Int12, 4),
        ] {
            let mut out = vec![Complex32::new(1.0, 1.0)];
            let err = decode_into(&vec![0u8; len], format, &mut out).unwrap_err();

            assert!(matches!(err, IqError::MalformedBlock { .. }));
            assert!(out.is_empty(), "no partial output for {format}");
        }
    }

    #[test]
    fn test_empty_block_is_valid() {
        assert!(decode(&[], WireFormat::Int16).unwrap().is_empty());
        assert!(encode(&[], WireFormat::Int12).is_empty());
    }

    #[test]
    fn test_int16_all_values_round_trip() {
        for v in i16::MIN..=i16::MAX {
            let x = v as f32 / INT16_SCALE;
            let wire = encode(&[Complex32::new(x, -x)], WireFormat::Int16);
            let back = decode(&wire, WireFormat::Int16).unwrap()[0];

            assert!((back.re - x).abs() <= 1.0 / INT16_SCALE, "v={v}");
            assert!((back.im + x).abs() <= 1.0 / INT16_SCALE, "v={v}");
        }
    }

    #[test]
    fn test_encode_saturates() {
        let samples = [
            Complex32::new(1.5, -2.0),
            Complex32::new(1.0, -1.0),
            Complex32::new(f32::NAN, f32::INFINITY),
        ];
        let wire = encode(&samples, WireFormat::Int16);

        assert_eq!(read_i16_pair(&wire[0..4]), (i16::MAX, i16::MIN));
        assert_eq!(read_i16_pair(&wire[4..8]), (i16::MAX, i16::MIN));
        assert_eq!(read_i16_pair(&wire[8..12]), (0, i16::MAX));

        let wire = encode(&samples[..1], WireFormat::Int12);
        assert_eq!(unpack_i12_pair(&wire), (2_047 << 4, -2_048 << 4));
    }

    #[test]
    fn test_int12_rounds_on_12_bit_grid() {
        // 1.6 и 2.4 шага сетки 1/2048: округление, а не отбрасывание
        assert_eq!(saturate_i12(1.6 / INT12_SCALE), 2);
        assert_eq!(saturate_i12(2.4 / INT12_SCALE), 2);
        assert_eq!(saturate_i12(-1.6 / INT12_SCALE), -2);
        assert_eq!(saturate_i12(2.0), 2_047);
        assert_eq!(saturate_i12(-2.0), -2_048);
        assert_eq!(saturate_i12(f32::NAN), 0);

        let sample = Complex32::new(1.6 / INT12_SCALE, -1.6 / INT12_SCALE);
        let wire = encode(&[sample], WireFormat::Int12);
        assert_eq!(unpack_i12_pair(&wire), (2 << 4, -2 << 4));
    }

    #[test]
    fn test_int12_round_trip_within_lsb() {
        let samples: Vec<Complex32> = (-100..=100)
            .map(|k| Complex32::new(k as f32 / 101.0, -(k as f32) / 137.0))
            .collect();
        let wire = encode(&samples, WireFormat::Int12);
        assert_eq!(wire.len(), samples.len() * 3);

        let back = decode(&wire, WireFormat::Int12).unwrap();
        for (a, b) in samples.iter().zip(&back) {
            assert!((a.re - b.re).abs() <= 1.0 / INT12_SCALE);
            assert!((a.im - b.im).abs() <= 1.0 / INT12_SCALE);
        }
    }

    #[test]
    fn test_neighbours_not_corrupted() {
        // saturating sample between two regular ones
        let samples = [
            Complex32::new(0.25, 0.25),
            Complex32::new(10.0, -10.0),
            Complex32::new(-0.25, -0.25),
        ];

        for format in [WireFormat::Int16, WireFormat::Int12] {
            let back = decode(&encode(&samples, format), format).unwrap();
            assert_eq!(back[0], Complex32::new(0.25, 0.25));
            assert_eq!(back[2], Complex32::new(-0.25, -0.25));
        }
    }
}
