//! 수신자
//!
//! - 연결별 FrameTable로 조각 조립
//! - 조각마다 ACK(평균 지연 포함) 회신
//! - 완료 프레임(또는 폐기 시 prefix)을 채널로 전달

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::packet::{ConnectionId, Packet};
use crate::reassembly::{FrameTable, PacketOutcome, ReceivedFrame};
use crate::stats::ReassemblyStats;
use crate::{Config, Result};

/// 완료 프레임 채널 수신기 타입
pub type FrameStream = mpsc::Receiver<ReceivedFrame>;

/// 내부 명령
enum ReceiverCmd {
    Datagram(Bytes, SocketAddr),
    Sweep,
    Stop,
}

/// 수신자 내부 상태 (단일 태스크에서만 접근)
struct ReceiverInner {
    config: Config,
    tables: HashMap<ConnectionId, FrameTable>,
    socket: Arc<UdpSocket>,
    frame_tx: mpsc::Sender<ReceivedFrame>,
}

impl ReceiverInner {
    fn new(config: Config, socket: Arc<UdpSocket>, frame_tx: mpsc::Sender<ReceivedFrame>) -> Self {
        Self {
            config,
            tables: HashMap::new(),
            socket,
            frame_tx,
        }
    }

    async fn handle_datagram(&mut self, datagram: Bytes, from: SocketAddr) {
        // 전체 디코딩 전에 연결 ID로 라우팅
        let Some((connection_id, frame_no)) = Packet::peek_route(&datagram) else {
            debug!("짧은 데이터그램 무시: {} bytes from {}", datagram.len(), from);
            return;
        };

        let now = Instant::now();
        let result = match self.tables.get_mut(&connection_id) {
            Some(table) => table.handle_datagram(datagram, now),
            None => self.admit(connection_id, datagram, from, now),
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!("데이터그램 거부 (connection {}, frame {}): {}", connection_id, frame_no, e);
                return;
            }
        };

        if self.config.ack_enabled {
            if let Err(e) = outcome.ack.send_to(&*self.socket, from).await {
                warn!("ACK 전송 실패: {}", e);
            }
        }

        for frame in outcome.evicted.into_iter().chain(outcome.completed) {
            self.deliver(frame).await;
        }
    }

    /// 처음 보는 연결: 패킷이 받아들여질 때만 테이블 생성
    fn admit(
        &mut self,
        connection_id: ConnectionId,
        datagram: Bytes,
        from: SocketAddr,
        now: Instant,
    ) -> Result<PacketOutcome> {
        let packet = Packet::from_bytes(datagram)?;
        let mut table = FrameTable::new(connection_id, self.config.clone());
        let outcome = table.handle_packet(packet, now)?;

        info!("새 연결 {} from {}", connection_id, from);
        self.tables.insert(connection_id, table);
        Ok(outcome)
    }

    async fn sweep(&mut self) {
        let now = Instant::now();
        let mut delivered = Vec::new();

        for table in self.tables.values_mut() {
            delivered.extend(table.evict_expired(now));
        }

        self.tables.retain(|&id, table| {
            if table.is_idle(now) {
                info!("연결 {} 정리: {}", id, table.stats().summary());
                return false;
            }
            true
        });

        for frame in delivered {
            self.deliver(frame).await;
        }
    }

    async fn deliver(&self, frame: ReceivedFrame) {
        debug!(
            "프레임 전달: connection={}, frame={}, {} bytes{}",
            frame.connection_id,
            frame.frame_no,
            frame.payload.len(),
            if frame.partial { " (partial)" } else { "" }
        );
        let _ = self.frame_tx.send(frame).await;
    }

    fn get_stats(&self) -> HashMap<ConnectionId, ReassemblyStats> {
        self.tables
            .iter()
            .map(|(&id, table)| (id, table.stats().clone()))
            .collect()
    }
}

/// 수신자 핸들 (외부에서 제어용)
pub struct FrameReceiver {
    cmd_tx: mpsc::Sender<ReceiverCmd>,
    stats: Arc<RwLock<HashMap<ConnectionId, ReassemblyStats>>>,
    running: Arc<AtomicBool>,
    local_addr: SocketAddr,
}

impl FrameReceiver {
    /// 새 수신자 생성 및 시작
    pub async fn start(config: Config, bind_addr: SocketAddr) -> Result<(Self, FrameStream)> {
        // 소켓 생성
        let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
        let local_addr = socket.local_addr()?;

        // 채널 생성
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<ReceiverCmd>(1000);
        let (frame_tx, frame_rx) = mpsc::channel::<ReceivedFrame>(config.frame_channel_capacity);

        // 공유 상태
        let stats = Arc::new(RwLock::new(HashMap::new()));
        let running = Arc::new(AtomicBool::new(true));

        info!("VFP Receiver started on {}", local_addr);

        let mut inner = ReceiverInner::new(config.clone(), socket.clone(), frame_tx);

        // 수신 태스크
        let socket_recv = socket.clone();
        let cmd_tx_recv = cmd_tx.clone();
        let running_recv = running.clone();
        let recv_buffer_size = config.recv_buffer_size;

        tokio::spawn(async move {
            let mut buf = vec![0u8; recv_buffer_size];

            while running_recv.load(Ordering::SeqCst) {
                match tokio::time::timeout(
                    Duration::from_millis(10),
                    socket_recv.recv_from(&mut buf),
                )
                .await
                {
                    Ok(Ok((len, addr))) => {
                        let datagram = Bytes::copy_from_slice(&buf[..len]);
                        let _ = cmd_tx_recv.send(ReceiverCmd::Datagram(datagram, addr)).await;
                    }
                    Ok(Err(e)) => {
                        warn!("수신 에러: {}", e);
                    }
                    Err(_) => {
                        // 타임아웃, 계속
                    }
                }
            }
        });

        // 정리 타이머 태스크
        let cmd_tx_sweep = cmd_tx.clone();
        let running_sweep = running.clone();
        let sweep_interval = config.sweep_interval_ms;

        tokio::spawn(async move {
            while running_sweep.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(sweep_interval)).await;
                let _ = cmd_tx_sweep.send(ReceiverCmd::Sweep).await;
            }
        });

        // 메인 처리 태스크
        let stats_main = stats.clone();
        let running_main = running.clone();

        tokio::spawn(async move {
            while let Some(cmd) = cmd_rx.recv().await {
                match cmd {
                    ReceiverCmd::Datagram(datagram, from) => {
                        inner.handle_datagram(datagram, from).await;
                    }
                    ReceiverCmd::Sweep => {
                        inner.sweep().await;
                    }
                    ReceiverCmd::Stop => {
                        break;
                    }
                }

                // 통계 업데이트
                *stats_main.write().await = inner.get_stats();
            }

            running_main.store(false, Ordering::SeqCst);
        });

        let receiver = Self {
            cmd_tx,
            stats,
            running,
            local_addr,
        };

        Ok((receiver, frame_rx))
    }

    /// 정지
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.cmd_tx.send(ReceiverCmd::Stop).await;
    }

    /// 연결별 통계 반환
    pub async fn stats(&self, connection_id: ConnectionId) -> Option<ReassemblyStats> {
        self.stats.read().await.get(&connection_id).cloned()
    }

    /// 바인드된 주소
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 실행 중 여부
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ack::AckPacket;
    use crate::sender::FrameSender;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn test_loopback_frame_and_acks() {
        let config = Config {
            max_payload_size: 1000,
            ..Config::default()
        };
        let (receiver, mut frames) = FrameReceiver::start(config.clone(), loopback())
            .await
            .unwrap();
        let sender = FrameSender::connect(config, 7, loopback(), receiver.local_addr())
            .await
            .unwrap();

        let data: Vec<u8> = (0..4500u32).map(|i| (i % 251) as u8).collect();
        let frame_no = sender.send_frame(Bytes::from(data.clone()), 33).await.unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(5), frames.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.connection_id, 7);
        assert_eq!(frame.frame_no, frame_no);
        assert_eq!(frame.payload.as_ref(), data.as_slice());
        assert_eq!(frame.time_to_next, Some(33));
        assert!(!frame.partial);

        let mut acked: Vec<u16> = Vec::new();
        for _ in 0..5 {
            let ack: AckPacket = tokio::time::timeout(Duration::from_secs(5), sender.recv_ack())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(ack.frame_no, frame_no);
            acked.push(ack.fragment_no);
        }
        acked.sort();
        assert_eq!(acked, vec![0, 1, 2, 3, 4]);

        receiver.stop().await;
    }

    #[tokio::test]
    async fn test_garbage_does_not_stop_receiver() {
        let (receiver, mut frames) = FrameReceiver::start(Config::default(), loopback())
            .await
            .unwrap();
        let noise = UdpSocket::bind(loopback()).await.unwrap();

        // 헤더만 있는 데이터그램 (connection 5, 빈 페이로드)
        let mut header_only = [0u8; 14];
        header_only[0] = 5;
        noise.send_to(&[0xFF; 5], receiver.local_addr()).await.unwrap();
        noise.send_to(&header_only, receiver.local_addr()).await.unwrap();

        let raw = UdpSocket::bind(loopback()).await.unwrap();
        raw.connect(receiver.local_addr()).await.unwrap();
        let sender = FrameSender::with_socket(Config::default(), 3, raw);
        sender.send_frame(Bytes::from_static(b"still alive"), 0).await.unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(5), frames.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.payload.as_ref(), b"still alive");
        assert!(receiver.is_running());

        // 이미 있는 연결로 온 쓰레기는 그 연결 통계에 잡힘
        let mut bad = [0u8; 14];
        bad[0] = 3;
        noise.send_to(&bad, receiver.local_addr()).await.unwrap();

        // 통계 스냅샷은 처리 태스크가 갱신
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(receiver.stats(5).await.is_none());
        let stats = receiver.stats(3).await.unwrap();
        assert_eq!(stats.rejected_packets, 1);
        assert_eq!(stats.completed_frames, 1);

        receiver.stop().await;
    }

    #[tokio::test]
    async fn test_idle_connection_is_dropped() {
        let config = Config {
            frame_timeout_ms: 50,
            sweep_interval_ms: 10,
            ..Config::default()
        };
        let (receiver, mut frames) = FrameReceiver::start(config.clone(), loopback())
            .await
            .unwrap();
        let sender = FrameSender::connect(config, 9, loopback(), receiver.local_addr())
            .await
            .unwrap();
        sender.send_frame(Bytes::from_static(b"once"), 0).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), frames.recv())
            .await
            .unwrap()
            .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(receiver.stats(9).await.is_none());

        receiver.stop().await;
    }
}
