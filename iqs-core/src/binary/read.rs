use byteorder::{ByteOrder, LittleEndian};

/// Читает пару I16/Q16 из 4 байт little-endian.
#[inline]
pub fn read_i16_pair(b: &[u8]) -> (i16, i16) {
    (LittleEndian::read_i16(&b[0..2]), LittleEndian::read_i16(&b[2..4]))
}

/// Читает пару F32/F32 из 8 байт little-endian.
#[inline]
pub fn read_f32_pair(b: &[u8]) -> (f32, f32) {
    (LittleEndian::read_f32(&b[0..4]), LittleEndian::read_f32(&b[4..8]))
}

/// Распаковывает 12-битную пару из 3 байт и переносит её в диапазон i16.
///
/// Раскладка:
/// ```text
/// b0 = I[7:0]
/// b1 = Q[3:0] << 4 | I[11:8]
/// b2 = Q[11:4]
/// ```
/// Результат сдвинут на 4 бита влево, дальше данные идут путём Int16.
#[inline]
pub fn unpack_i12_pair(b: &[u8]) -> (i16, i16) {
    let i = (b[0] as u16) | ((b[1] as u16 & 0x0F) << 8);
    let q = ((b[1] as u16) >> 4) | ((b[2] as u16) << 4);

    // сдвиг в старшие биты даёт знаковое расширение бесплатно
    (((i << 4) as i16), ((q << 4) as i16))
}
