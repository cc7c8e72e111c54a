//! ACK 패킷
//!
//! 수신측이 조각 수신과 측정한 지연을 송신측에 알리는 고정 12바이트 레코드
//!
//! ```text
//! connection_id(2) | frame_no(4) | fragment_no(2) | avg_delay(4)
//! ```

use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};

use crate::header::{FieldReader, HeaderField};
use crate::packet::{ConnectionId, FragmentNo, FrameNo};
use crate::transport::Transport;
use crate::{Error, Result};

/// ACK 패킷 길이 (바이트)
pub const ACK_LEN: usize = 12;

/// 조각 하나에 대한 ACK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckPacket {
    pub connection_id: ConnectionId,
    pub frame_no: FrameNo,
    pub fragment_no: FragmentNo,

    /// 평균 지연 (마이크로초)
    pub avg_delay: u32,
}

impl AckPacket {
    pub fn new(
        connection_id: ConnectionId,
        frame_no: FrameNo,
        fragment_no: FragmentNo,
        avg_delay: u32,
    ) -> Self {
        Self {
            connection_id,
            frame_no,
            fragment_no,
            avg_delay,
        }
    }

    /// 바이트에서 역직렬화
    ///
    /// 12바이트 이상이면 어떤 비트 패턴이든 유효하다. 뒤에 붙은 바이트는 무시.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < ACK_LEN {
            return Err(Error::Truncated {
                expected: ACK_LEN,
                got: bytes.len(),
            });
        }

        let mut rdr = FieldReader::new(bytes);
        Ok(Self {
            connection_id: rdr.read(),
            frame_no: rdr.read(),
            fragment_no: rdr.read(),
            avg_delay: rdr.read(),
        })
    }

    /// 바이트로 직렬화
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(ACK_LEN);
        self.connection_id.put_le(&mut buf);
        self.frame_no.put_le(&mut buf);
        self.fragment_no.put_le(&mut buf);
        self.avg_delay.put_le(&mut buf);
        buf.freeze()
    }

    /// 지정 주소로 전송
    pub async fn send_to<T: Transport>(&self, transport: &T, addr: SocketAddr) -> Result<()> {
        transport.send_datagram_to(&self.to_bytes(), addr).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RecordingTransport;

    #[test]
    fn test_ack_wire_layout() {
        let ack = AckPacket::new(7, 42, 1, 1500);
        let bytes = ack.to_bytes();

        assert_eq!(
            bytes.as_ref(),
            &[0x07, 0x00, 0x2A, 0x00, 0x00, 0x00, 0x01, 0x00, 0xDC, 0x05, 0x00, 0x00]
        );
        assert_eq!(AckPacket::from_bytes(&bytes).unwrap(), ack);
    }

    #[test]
    fn test_ack_any_bit_pattern_decodes() {
        let ack = AckPacket::from_bytes(&[0xFF; ACK_LEN]).unwrap();
        assert_eq!(ack.connection_id, u16::MAX);
        assert_eq!(ack.frame_no, u32::MAX);
        assert_eq!(ack.fragment_no, u16::MAX);
        assert_eq!(ack.avg_delay, u32::MAX);
    }

    #[test]
    fn test_ack_short_buffer() {
        assert!(matches!(
            AckPacket::from_bytes(&[0u8; 11]),
            Err(Error::Truncated { expected: ACK_LEN, got: 11 })
        ));
    }

    #[tokio::test]
    async fn test_ack_send_to_address() {
        let transport = RecordingTransport::default();
        let addr: SocketAddr = "127.0.0.1:9100".parse().unwrap();
        let ack = AckPacket::new(1, 2, 3, 4);

        ack.send_to(&transport, addr).await.unwrap();

        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, Some(addr));
        assert_eq!(sent[0].1, ack.to_bytes());
    }
}
