//! 헤더 필드 코덱
//!
//! 고정 폭 정수를 little-endian으로 쓰고 읽는다.
//! 폭은 호출하는 쪽의 타입으로 정해지므로 실패 경로가 없다.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// 고정 폭 헤더 필드
pub trait HeaderField: Sized + Copy {
    /// 바이트 폭
    const WIDTH: usize;

    /// little-endian으로 버퍼 뒤에 추가
    fn put_le<B: BufMut>(self, buf: &mut B);

    /// `bytes[offset..offset + WIDTH]`에서 읽기
    ///
    /// 범위 밖이면 panic. 길이 확인은 호출하는 쪽 책임.
    fn read_le(bytes: &[u8], offset: usize) -> Self;
}

impl HeaderField for u16 {
    const WIDTH: usize = 2;

    fn put_le<B: BufMut>(self, buf: &mut B) {
        buf.put_u16_le(self);
    }

    fn read_le(bytes: &[u8], offset: usize) -> Self {
        (&bytes[offset..offset + Self::WIDTH]).get_u16_le()
    }
}

impl HeaderField for u32 {
    const WIDTH: usize = 4;

    fn put_le<B: BufMut>(self, buf: &mut B) {
        buf.put_u32_le(self);
    }

    fn read_le(bytes: &[u8], offset: usize) -> Self {
        (&bytes[offset..offset + Self::WIDTH]).get_u32_le()
    }
}

/// 필드 하나를 정확히 `WIDTH` 바이트 문자열로 인코딩
pub fn put_header_field<T: HeaderField>(n: T) -> Bytes {
    let mut buf = BytesMut::with_capacity(T::WIDTH);
    n.put_le(&mut buf);
    buf.freeze()
}

/// 순차적으로 필드를 읽는 커서
///
/// 각 필드의 오프셋을 직접 계산하지 않도록 헤더 디코딩에서 사용
pub(crate) struct FieldReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    pub(crate) fn read<T: HeaderField>(&mut self) -> T {
        let value = T::read_le(self.bytes, self.offset);
        self.offset += T::WIDTH;
        value
    }

    pub(crate) fn position(&self) -> usize {
        self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_header_field_width_and_order() {
        assert_eq!(put_header_field(0x1234u16).as_ref(), &[0x34, 0x12]);
        assert_eq!(
            put_header_field(0xDEADBEEFu32).as_ref(),
            &[0xEF, 0xBE, 0xAD, 0xDE]
        );
    }

    #[test]
    fn test_read_at_offset() {
        let bytes = [0xFF, 0x07, 0x00, 0x2A, 0x00, 0x00, 0x00];
        assert_eq!(u16::read_le(&bytes, 1), 7);
        assert_eq!(u32::read_le(&bytes, 3), 42);
    }

    #[test]
    fn test_field_reader_sequence() {
        let mut buf = BytesMut::new();
        7u16.put_le(&mut buf);
        42u32.put_le(&mut buf);
        1u16.put_le(&mut buf);

        let mut rdr = FieldReader::new(&buf);
        assert_eq!(rdr.read::<u16>(), 7);
        assert_eq!(rdr.read::<u32>(), 42);
        assert_eq!(rdr.read::<u16>(), 1);
        assert_eq!(rdr.position(), 8);
    }

    #[test]
    #[should_panic]
    fn test_read_past_end_panics() {
        let bytes = [0x01, 0x02, 0x03];
        let _ = u32::read_le(&bytes, 0);
    }
}
