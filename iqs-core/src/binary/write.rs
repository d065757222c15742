use byteorder::{ByteOrder, LittleEndian};

/// Записывает пару I16/Q16 в 4 байта little-endian.
#[inline]
pub fn write_i16_pair(
    dst: &mut [u8],
    i: i16,
    q: i16,
) {
    LittleEndian::write_i16(&mut dst[0..2], i);
    LittleEndian::write_i16(&mut dst[2..4], q);
}

/// Записывает пару F32/F32 в 8 байт little-endian.
#[inline]
pub fn write_f32_pair(
    dst: &mut [u8],
    i: f32,
    q: f32,
) {
    LittleEndian::write_f32(&mut dst[0..4], i);
    LittleEndian::write_f32(&mut dst[4..8], q);
}

/// Упаковывает 12-битную пару (значения в `[-2048, 2047]`) в 3 байта.
///
/// Старшие биты за пределами 12 отбрасываются, насыщение делает вызывающий.
#[inline]
pub fn pack_i12_pair(
    dst: &mut [u8],
    i: i16,
    q: i16,
) {
    let i = i as u16 & 0x0FFF;
    let q = q as u16 & 0x0FFF;

    dst[0] = (i & 0xFF) as u8;
    dst[1] = ((i >> 8) as u8) | (((q & 0x0F) as u8) << 4);
    dst[2] = (q >> 4) as u8;
}
