//! 패킷 (프레임 조각 하나를 싣는 데이터그램)
//!
//! 와이어 포맷 (모두 little-endian):
//!
//! ```text
//! connection_id(2) | frame_no(4) | fragment_no(2) | fragments_in_this_frame(2) | time_to_next(4) | payload
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::header::{FieldReader, HeaderField};
use crate::transport::Transport;
use crate::{Error, Result};

/// 패킷 헤더 길이 (바이트)
pub const HEADER_LEN: usize = 14;

/// 연결 ID (16비트)
pub type ConnectionId = u16;

/// 프레임 번호 (32비트)
pub type FrameNo = u32;

/// 프레임 내 조각 번호 (16비트, 0부터)
pub type FragmentNo = u16;

/// 조각 하나
///
/// `Packet::default()`는 조립 슬롯의 빈 자리를 나타내는 invalid 패킷이다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    valid: bool,
    connection_id: ConnectionId,
    frame_no: FrameNo,
    fragment_no: FragmentNo,
    fragments_in_this_frame: u16,
    time_to_next: u32,
    payload: Bytes,
}

impl Packet {
    /// 수신 버퍼에서 패킷 디코딩
    ///
    /// 신뢰할 수 없는 데이터가 들어오는 유일한 지점이다.
    pub fn from_bytes(bytes: Bytes) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::Truncated {
                expected: HEADER_LEN,
                got: bytes.len(),
            });
        }

        let mut rdr = FieldReader::new(&bytes);
        let connection_id = rdr.read::<u16>();
        let frame_no = rdr.read::<u32>();
        let fragment_no = rdr.read::<u16>();
        let fragments_in_this_frame = rdr.read::<u16>();
        let time_to_next = rdr.read::<u32>();
        debug_assert_eq!(rdr.position(), HEADER_LEN);

        if fragment_no >= fragments_in_this_frame {
            return Err(Error::FragmentOutOfRange {
                fragment_no,
                fragments_in_this_frame,
            });
        }

        let payload = bytes.slice(HEADER_LEN..);
        if payload.is_empty() {
            return Err(Error::EmptyPayload);
        }

        Ok(Self {
            valid: true,
            connection_id,
            frame_no,
            fragment_no,
            fragments_in_this_frame,
            time_to_next,
            payload,
        })
    }

    /// 전체 디코딩 전에 라우팅용 (connection_id, frame_no)만 읽기
    pub fn peek_route(bytes: &[u8]) -> Option<(ConnectionId, FrameNo)> {
        if bytes.len() < HEADER_LEN {
            return None;
        }
        Some((u16::read_le(bytes, 0), u32::read_le(bytes, 2)))
    }

    /// 바이트로 직렬화
    ///
    /// # Panics
    /// 조각 수가 정해지지 않은 패킷(빈 슬롯 포함)을 직렬화하면 panic
    pub fn to_bytes(&self) -> Bytes {
        assert!(
            self.fragments_in_this_frame > 0,
            "fragments_in_this_frame이 설정되지 않은 패킷 직렬화"
        );

        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        self.connection_id.put_le(&mut buf);
        self.frame_no.put_le(&mut buf);
        self.fragment_no.put_le(&mut buf);
        self.fragments_in_this_frame.put_le(&mut buf);
        self.time_to_next.put_le(&mut buf);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// 연결된 전송으로 송신
    pub async fn send<T: Transport>(&self, transport: &T) -> Result<()> {
        transport.send_datagram(&self.to_bytes()).await?;
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn frame_no(&self) -> FrameNo {
        self.frame_no
    }

    pub fn fragment_no(&self) -> FragmentNo {
        self.fragment_no
    }

    pub fn fragments_in_this_frame(&self) -> u16 {
        self.fragments_in_this_frame
    }

    /// 다음 프레임까지의 간격 힌트 (마지막 조각에서만 의미 있음)
    pub fn time_to_next(&self) -> u32 {
        self.time_to_next
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// 이 조각이 프레임의 마지막 조각인지
    pub fn is_last_fragment(&self) -> bool {
        self.valid && self.fragment_no + 1 == self.fragments_in_this_frame
    }
}

/// 송신측 조각 초안
///
/// 프레임 분할이 끝나기 전에는 총 조각 수를 알 수 없으므로,
/// 분할 중에는 초안으로 만들고 `finalize`에서 조각 수를 한 번만 채운다.
#[derive(Debug, Clone)]
pub struct PacketDraft {
    connection_id: ConnectionId,
    frame_no: FrameNo,
    fragment_no: FragmentNo,
    time_to_next: u32,
    payload: Bytes,
}

impl PacketDraft {
    /// 전체 프레임에서 `fragment_no`번째 조각 잘라내기
    ///
    /// `next_fragment_start`는 소비한 바이트 다음 위치로 이동한다.
    ///
    /// # Panics
    /// 프레임이 비었거나 조각 시작 위치가 프레임 밖이면 panic
    pub fn new(
        whole_frame: &Bytes,
        connection_id: ConnectionId,
        frame_no: FrameNo,
        fragment_no: FragmentNo,
        time_to_next: u32,
        next_fragment_start: &mut usize,
        max_payload: usize,
    ) -> Self {
        assert!(!whole_frame.is_empty(), "빈 프레임은 분할할 수 없음");

        let first_byte = max_payload * fragment_no as usize;
        assert!(
            first_byte < whole_frame.len(),
            "조각 시작 위치 {} 가 프레임 크기 {} 를 벗어남",
            first_byte,
            whole_frame.len()
        );

        let length = (whole_frame.len() - first_byte).min(max_payload);
        let payload = whole_frame.slice(first_byte..first_byte + length);

        *next_fragment_start = first_byte + length;

        Self {
            connection_id,
            frame_no,
            fragment_no,
            time_to_next,
            payload,
        }
    }

    pub fn set_time_to_next(&mut self, time_to_next: u32) {
        self.time_to_next = time_to_next;
    }

    pub fn fragment_no(&self) -> FragmentNo {
        self.fragment_no
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// 총 조각 수를 채워 송신 가능한 패킷으로 변환
    ///
    /// # Panics
    /// `fragment_no >= fragments_in_this_frame`이면 panic
    pub fn finalize(self, fragments_in_this_frame: u16) -> Packet {
        assert!(
            self.fragment_no < fragments_in_this_frame,
            "fragment_no {} >= fragments_in_this_frame {}",
            self.fragment_no,
            fragments_in_this_frame
        );

        Packet {
            valid: true,
            connection_id: self.connection_id,
            frame_no: self.frame_no,
            fragment_no: self.fragment_no,
            fragments_in_this_frame,
            time_to_next: self.time_to_next,
            payload: self.payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RecordingTransport;

    fn sample_packet() -> Packet {
        let frame = Bytes::from_static(b"hello, fragment");
        let mut cursor = 0;
        let mut draft = PacketDraft::new(&frame, 7, 42, 1, 0, &mut cursor, 4);
        draft.set_time_to_next(33_000);
        draft.finalize(4)
    }

    #[test]
    fn test_draft_slices_at_fragment_offset() {
        let frame = Bytes::from(vec![0x41, 0x42, 0x43, 0x45, 0x46]);
        let mut cursor = 0;

        let draft = PacketDraft::new(&frame, 1, 1, 0, 0, &mut cursor, 2);
        assert_eq!(draft.payload().as_ref(), &[0x41, 0x42]);
        assert_eq!(cursor, 2);

        let draft = PacketDraft::new(&frame, 1, 1, 2, 0, &mut cursor, 2);
        assert_eq!(draft.payload().as_ref(), &[0x46]);
        assert_eq!(cursor, 5);
    }

    #[test]
    #[should_panic]
    fn test_draft_past_end_panics() {
        let frame = Bytes::from_static(&[1, 2, 3, 4]);
        let mut cursor = 0;
        let _ = PacketDraft::new(&frame, 1, 1, 2, 0, &mut cursor, 2);
    }

    #[test]
    #[should_panic]
    fn test_finalize_with_too_small_total_panics() {
        let frame = Bytes::from_static(&[1, 2, 3, 4]);
        let mut cursor = 0;
        let draft = PacketDraft::new(&frame, 1, 1, 1, 0, &mut cursor, 2);
        let _ = draft.finalize(1);
    }

    #[test]
    fn test_packet_serialization() {
        let packet = sample_packet();
        let bytes = packet.to_bytes();

        assert_eq!(bytes.len(), HEADER_LEN + 4);
        assert_eq!(
            &bytes[..HEADER_LEN],
            &[
                0x07, 0x00, // connection_id
                0x2A, 0x00, 0x00, 0x00, // frame_no
                0x01, 0x00, // fragment_no
                0x04, 0x00, // fragments_in_this_frame
                0xE8, 0x80, 0x00, 0x00, // time_to_next = 33000
            ]
        );

        let restored = Packet::from_bytes(bytes).unwrap();
        assert_eq!(restored, packet);
        assert_eq!(restored.payload().as_ref(), b"o, f");
    }

    #[test]
    fn test_decode_rejects_fragment_out_of_range() {
        let mut buf = BytesMut::new();
        7u16.put_le(&mut buf);
        42u32.put_le(&mut buf);
        3u16.put_le(&mut buf);
        3u16.put_le(&mut buf);
        0u32.put_le(&mut buf);
        buf.put_slice(b"x");

        assert!(matches!(
            Packet::from_bytes(buf.freeze()),
            Err(Error::FragmentOutOfRange {
                fragment_no: 3,
                fragments_in_this_frame: 3
            })
        ));
    }

    #[test]
    fn test_decode_rejects_empty_payload() {
        let bytes = sample_packet().to_bytes().slice(..HEADER_LEN);
        assert!(matches!(Packet::from_bytes(bytes), Err(Error::EmptyPayload)));
    }

    #[test]
    fn test_decode_rejects_short_buffer() {
        let bytes = Bytes::from_static(&[0u8; 9]);
        assert!(matches!(
            Packet::from_bytes(bytes),
            Err(Error::Truncated { expected: HEADER_LEN, got: 9 })
        ));
    }

    #[test]
    fn test_peek_route() {
        let bytes = sample_packet().to_bytes();
        assert_eq!(Packet::peek_route(&bytes), Some((7, 42)));
        assert_eq!(Packet::peek_route(&bytes[..5]), None);
    }

    #[test]
    fn test_default_packet_is_invalid() {
        let packet = Packet::default();
        assert!(!packet.is_valid());
        assert!(packet.payload().is_empty());
        assert!(!packet.is_last_fragment());
    }

    #[test]
    #[should_panic]
    fn test_serialize_placeholder_panics() {
        let _ = Packet::default().to_bytes();
    }

    #[tokio::test]
    async fn test_send_writes_one_datagram() {
        let transport = RecordingTransport::default();
        let packet = sample_packet();

        packet.send(&transport).await.unwrap();

        assert_eq!(transport.datagrams(), vec![packet.to_bytes()]);
    }
}
