//! 송신자
//!
//! - 프레임마다 FragmentedFrame을 만들어 조각 전송
//! - 수신측 ACK에서 지연 값 수집 (전송 정책은 호출하는 쪽 몫)

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::net::UdpSocket;
use tracing::{debug, info};

use crate::ack::{AckPacket, ACK_LEN};
use crate::frame::FragmentedFrame;
use crate::packet::{ConnectionId, FrameNo};
use crate::stats::SendStats;
use crate::{Config, Result};

/// 송신자
pub struct FrameSender {
    /// 설정
    config: Config,

    /// 연결 ID
    connection_id: ConnectionId,

    /// 수신자에 connect된 소켓
    socket: UdpSocket,

    /// 다음 프레임 번호
    next_frame_no: AtomicU32,

    /// 전송 통계
    stats: RwLock<SendStats>,
}

impl FrameSender {
    /// 소켓을 바인딩하고 수신자 주소로 connect
    pub async fn connect(
        config: Config,
        connection_id: ConnectionId,
        bind_addr: SocketAddr,
        peer_addr: SocketAddr,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(peer_addr).await?;

        info!(
            "VFP Sender started on {}, peer: {}, connection: {}",
            socket.local_addr()?,
            peer_addr,
            connection_id
        );

        Ok(Self::with_socket(config, connection_id, socket))
    }

    /// 이미 connect된 소켓으로 생성
    pub fn with_socket(config: Config, connection_id: ConnectionId, socket: UdpSocket) -> Self {
        Self {
            config,
            connection_id,
            socket,
            next_frame_no: AtomicU32::new(0),
            stats: RwLock::new(SendStats::new()),
        }
    }

    /// 프레임 하나 전송
    ///
    /// `time_to_next`는 마지막 조각에 실리는 다음 프레임까지의 간격 힌트.
    pub async fn send_frame(&self, data: Bytes, time_to_next: u32) -> Result<FrameNo> {
        let frame_no = self.next_frame_no.fetch_add(1, Ordering::SeqCst);
        let len = data.len();

        let frame = FragmentedFrame::split(
            self.connection_id,
            frame_no,
            time_to_next,
            data,
            self.config.max_payload_size,
        );
        frame.send(&self.socket).await?;

        {
            let mut stats = self.stats.write();
            stats.frames_sent += 1;
            stats.packets_sent += frame.fragments_in_this_frame() as u64;
            stats.bytes_sent += len as u64;
        }

        debug!(
            "프레임 {} 전송 완료: {} bytes, {} 조각",
            frame_no,
            len,
            frame.fragments_in_this_frame()
        );

        Ok(frame_no)
    }

    /// 다음 ACK 수신
    ///
    /// 다른 연결의 ACK나 짧은 데이터그램은 건너뛴다.
    pub async fn recv_ack(&self) -> Result<AckPacket> {
        let mut buf = [0u8; 64];

        loop {
            let len = self.socket.recv(&mut buf).await?;
            let ack = match AckPacket::from_bytes(&buf[..len]) {
                Ok(ack) => ack,
                Err(e) => {
                    debug!("ACK 디코딩 실패: {}", e);
                    continue;
                }
            };

            if ack.connection_id != self.connection_id {
                debug!(
                    "다른 연결의 ACK 무시: expected {}, got {}",
                    self.connection_id, ack.connection_id
                );
                continue;
            }

            if len != ACK_LEN {
                debug!("ACK 길이 {} bytes, 뒤쪽 무시", len);
            }

            {
                let mut stats = self.stats.write();
                stats.acks_received += 1;
                stats.last_avg_delay_us = Some(ack.avg_delay);
            }
            return Ok(ack);
        }
    }

    /// 다음에 보낼 프레임 번호
    pub fn next_frame_no(&self) -> FrameNo {
        self.next_frame_no.load(Ordering::SeqCst)
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// 통계 반환
    pub fn stats(&self) -> SendStats {
        self.stats.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Packet;

    #[tokio::test]
    async fn test_send_frame_emits_fragments() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = Config {
            max_payload_size: 100,
            ..Config::default()
        };
        let sender = FrameSender::connect(
            config,
            7,
            "127.0.0.1:0".parse().unwrap(),
            peer.local_addr().unwrap(),
        )
        .await
        .unwrap();

        let data = Bytes::from(vec![5u8; 250]);
        assert_eq!(sender.send_frame(data, 40).await.unwrap(), 0);
        assert_eq!(sender.next_frame_no(), 1);

        let mut buf = [0u8; 1500];
        let mut packets = Vec::new();
        for _ in 0..3 {
            let (len, _) = peer.recv_from(&mut buf).await.unwrap();
            packets.push(Packet::from_bytes(Bytes::copy_from_slice(&buf[..len])).unwrap());
        }

        let sizes: Vec<usize> = packets.iter().map(|p| p.payload().len()).collect();
        assert_eq!(sizes, vec![100, 100, 50]);
        assert!(packets.iter().all(|p| p.connection_id() == 7 && p.frame_no() == 0));
        assert_eq!(packets[2].time_to_next(), 40);

        let stats = sender.stats();
        assert_eq!(stats.frames_sent, 1);
        assert_eq!(stats.packets_sent, 3);
        assert_eq!(stats.bytes_sent, 250);
    }

    #[tokio::test]
    async fn test_recv_ack_skips_foreign_and_garbage() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sender = FrameSender::connect(
            Config::default(),
            7,
            "127.0.0.1:0".parse().unwrap(),
            peer.local_addr().unwrap(),
        )
        .await
        .unwrap();
        let sender_addr = sender.local_addr().unwrap();

        peer.send_to(&[1, 2, 3], sender_addr).await.unwrap();
        AckPacket::new(8, 0, 0, 10).send_to(&peer, sender_addr).await.unwrap();
        AckPacket::new(7, 3, 1, 250).send_to(&peer, sender_addr).await.unwrap();

        let ack = sender.recv_ack().await.unwrap();
        assert_eq!(ack, AckPacket::new(7, 3, 1, 250));
        assert_eq!(sender.stats().acks_received, 1);
        assert_eq!(sender.stats().last_avg_delay_us, Some(250));
    }
}
