//! 연결별 프레임 조립 테이블
//!
//! - frame_no마다 FragmentedFrame 하나 유지
//! - 첫 조각이 보이면 생성, 완료되면 꺼내서 전달
//! - 오래된/넘치는 미완성 프레임은 폐기 (선택적으로 prefix 전달)

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, warn};

use crate::ack::AckPacket;
use crate::frame::FragmentedFrame;
use crate::packet::{ConnectionId, FrameNo, Packet};
use crate::stats::ReassemblyStats;
use crate::{Config, Error, Result};

/// 하위 소비자(디코더 등)에게 넘기는 프레임
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFrame {
    pub connection_id: ConnectionId,
    pub frame_no: FrameNo,

    /// 완성 프레임 또는 연속 prefix
    pub payload: Bytes,

    /// 다음 프레임까지의 간격 힌트 (마지막 조각을 받은 경우)
    pub time_to_next: Option<u32>,

    /// prefix만 전달된 경우 true
    pub partial: bool,
}

impl ReceivedFrame {
    fn complete(frame: &FragmentedFrame) -> Self {
        Self {
            connection_id: frame.connection_id(),
            frame_no: frame.frame_no(),
            payload: frame.frame(),
            time_to_next: frame.time_to_next(),
            partial: false,
        }
    }

    fn partial(frame: &FragmentedFrame) -> Option<Self> {
        let payload = frame.partial_frame();
        if payload.is_empty() {
            return None;
        }
        Some(Self {
            connection_id: frame.connection_id(),
            frame_no: frame.frame_no(),
            payload,
            time_to_next: frame.time_to_next(),
            partial: true,
        })
    }
}

/// 패킷 하나를 처리한 결과
#[derive(Debug, Clone)]
pub struct PacketOutcome {
    /// 송신측에 돌려줄 ACK
    pub ack: AckPacket,

    /// 새 슬롯을 채웠는지 (중복이면 false)
    pub newly_stored: bool,

    /// 이 패킷으로 완성된 프레임
    pub completed: Option<ReceivedFrame>,

    /// 용량 초과로 폐기되며 전달되는 prefix
    pub evicted: Vec<ReceivedFrame>,
}

/// 조립 중인 프레임 상태
#[derive(Debug)]
struct FrameState {
    frame: FragmentedFrame,
    first_arrival: Instant,
}

/// 최근 완료된 프레임 기록
#[derive(Debug, Clone, Copy)]
struct CompletedFrame {
    frame_no: FrameNo,
    fragments_in_this_frame: u16,
    completed_at: Instant,
}

/// 연결 하나의 조립 테이블 (단일 태스크에서만 접근)
#[derive(Debug)]
pub struct FrameTable {
    connection_id: ConnectionId,
    config: Config,
    frames: HashMap<FrameNo, FrameState>,

    /// 최근 완료된 프레임 (완료 순, frame_timeout_ms 동안만 유지)
    /// 늦게 온 중복 조각이 같은 프레임을 다시 만들지 않도록
    recently_completed: VecDeque<CompletedFrame>,

    /// 마지막으로 받아들인 패킷 시각
    last_activity: Instant,

    stats: ReassemblyStats,
}

impl FrameTable {
    pub fn new(connection_id: ConnectionId, config: Config) -> Self {
        Self {
            connection_id,
            config,
            frames: HashMap::new(),
            recently_completed: VecDeque::new(),
            last_activity: Instant::now(),
            stats: ReassemblyStats::new(),
        }
    }

    /// 수신 데이터그램 처리
    ///
    /// 포맷 에러는 카운트만 하고 돌려준다. 테이블 상태는 바뀌지 않는다.
    pub fn handle_datagram(&mut self, datagram: Bytes, now: Instant) -> Result<PacketOutcome> {
        let packet = match Packet::from_bytes(datagram) {
            Ok(packet) => packet,
            Err(e) => {
                self.stats.rejected_packets += 1;
                return Err(e);
            }
        };

        self.handle_packet(packet, now)
    }

    /// 디코딩된 패킷 처리
    pub fn handle_packet(&mut self, packet: Packet, now: Instant) -> Result<PacketOutcome> {
        let result = self.route(packet, now);
        if let Err(e) = &result {
            self.stats.rejected_packets += 1;
            debug!("패킷 거부 (connection {}): {}", self.connection_id, e);
        }
        result
    }

    fn route(&mut self, packet: Packet, now: Instant) -> Result<PacketOutcome> {
        if packet.payload().len() > self.config.max_payload_size {
            return Err(Error::PayloadTooLarge {
                max_size: self.config.max_payload_size,
                got: packet.payload().len(),
            });
        }

        let frame_no = packet.frame_no();
        let fragment_no = packet.fragment_no();
        let payload_len = packet.payload().len();
        let mut evicted = Vec::new();

        self.forget_completed(now);
        if let Some(done) = self.completed(frame_no) {
            // 이미 전달한 프레임의 늦은 조각
            if packet.connection_id() != self.connection_id {
                return Err(Error::ConnectionIdMismatch {
                    expected: self.connection_id,
                    got: packet.connection_id(),
                });
            }
            if packet.fragments_in_this_frame() != done.fragments_in_this_frame {
                return Err(Error::FragmentCountMismatch {
                    expected: done.fragments_in_this_frame,
                    got: packet.fragments_in_this_frame(),
                });
            }
            self.last_activity = now;
            self.stats.total_packets += 1;
            self.stats.duplicate_packets += 1;
            return Ok(PacketOutcome {
                ack: self.ack_for(frame_no, fragment_no),
                newly_stored: false,
                completed: None,
                evicted,
            });
        }

        let newly_stored = match self.frames.get_mut(&frame_no) {
            Some(state) => {
                let stored = state.frame.merge(packet)?;
                self.stats.delay.record_since(state.first_arrival, now);
                stored
            }
            None => {
                let declared = packet.fragments_in_this_frame() as usize;
                if declared > self.config.max_fragments_per_frame() {
                    return Err(Error::FrameTooLarge {
                        max_size: self.config.max_frame_size,
                        declared: declared * self.config.max_payload_size,
                    });
                }

                let frame = FragmentedFrame::from_first_packet(self.connection_id, packet)?;
                // 도착하자마자 완성되는 프레임은 자리를 차지하지 않음
                if !frame.is_complete() && self.frames.len() >= self.config.max_inflight_frames {
                    evicted.extend(self.evict_oldest());
                }
                self.frames.insert(
                    frame_no,
                    FrameState {
                        frame,
                        first_arrival: now,
                    },
                );
                self.stats.total_frames += 1;
                self.stats.delay.record(Duration::ZERO);
                true
            }
        };

        self.last_activity = now;
        self.stats.total_packets += 1;
        if newly_stored {
            self.stats.total_bytes += payload_len as u64;
        } else {
            self.stats.duplicate_packets += 1;
        }

        let ack = self.ack_for(frame_no, fragment_no);
        let completed = self.take_if_complete(frame_no, now);

        Ok(PacketOutcome {
            ack,
            newly_stored,
            completed,
            evicted,
        })
    }

    fn ack_for(&self, frame_no: FrameNo, fragment_no: u16) -> AckPacket {
        AckPacket::new(
            self.connection_id,
            frame_no,
            fragment_no,
            self.stats.delay.avg_delay_us(),
        )
    }

    fn take_if_complete(&mut self, frame_no: FrameNo, now: Instant) -> Option<ReceivedFrame> {
        if !self.frames.get(&frame_no)?.frame.is_complete() {
            return None;
        }

        let state = self.frames.remove(&frame_no)?;
        self.remember_completed(&state.frame, now);
        self.stats.completed_frames += 1;

        debug!(
            "프레임 {} 완료: {} 조각, {:.2}ms",
            frame_no,
            state.frame.fragments_in_this_frame(),
            state.first_arrival.elapsed().as_secs_f64() * 1000.0
        );

        Some(ReceivedFrame::complete(&state.frame))
    }

    fn remember_completed(&mut self, frame: &FragmentedFrame, now: Instant) {
        let frame_no = frame.frame_no();
        self.recently_completed.retain(|c| c.frame_no != frame_no);

        let capacity = self.config.max_inflight_frames.max(1);
        while self.recently_completed.len() >= capacity {
            self.recently_completed.pop_front();
        }
        self.recently_completed.push_back(CompletedFrame {
            frame_no,
            fragments_in_this_frame: frame.fragments_in_this_frame(),
            completed_at: now,
        });
    }

    fn completed(&self, frame_no: FrameNo) -> Option<CompletedFrame> {
        self.recently_completed
            .iter()
            .find(|c| c.frame_no == frame_no)
            .copied()
    }

    /// frame_timeout_ms가 지난 완료 기록 삭제
    ///
    /// 같은 connection_id로 다시 시작한 스트림의 frame_no를 새 프레임으로 받기 위함
    fn forget_completed(&mut self, now: Instant) {
        let timeout = Duration::from_millis(self.config.frame_timeout_ms);
        self.recently_completed
            .retain(|c| now.saturating_duration_since(c.completed_at) <= timeout);
    }

    /// 가장 오래된 미완성 프레임 폐기
    fn evict_oldest(&mut self) -> Option<ReceivedFrame> {
        let oldest = self
            .frames
            .iter()
            .min_by_key(|(_, state)| state.first_arrival)
            .map(|(&frame_no, _)| frame_no)?;

        let state = self.frames.remove(&oldest)?;
        warn!(
            "프레임 {} 용량 초과로 폐기: {:.1}% 수신",
            oldest,
            state.frame.receive_ratio() * 100.0
        );
        self.discard(state)
    }

    /// 타임아웃된 미완성 프레임 정리
    pub fn evict_expired(&mut self, now: Instant) -> Vec<ReceivedFrame> {
        let timeout = Duration::from_millis(self.config.frame_timeout_ms);
        let expired: Vec<FrameNo> = self
            .frames
            .iter()
            .filter(|(_, state)| now.saturating_duration_since(state.first_arrival) > timeout)
            .map(|(&frame_no, _)| frame_no)
            .collect();

        let mut delivered = Vec::new();
        for frame_no in expired {
            if let Some(state) = self.frames.remove(&frame_no) {
                warn!(
                    "프레임 {} 타임아웃: {:.1}% 수신",
                    frame_no,
                    state.frame.receive_ratio() * 100.0
                );
                delivered.extend(self.discard(state));
            }
        }

        self.forget_completed(now);

        delivered.sort_by_key(|f| f.frame_no);
        delivered
    }

    /// 조립 중인 프레임이 없고 frame_timeout_ms 넘게 패킷이 없었는지
    pub fn is_idle(&self, now: Instant) -> bool {
        self.frames.is_empty()
            && now.saturating_duration_since(self.last_activity)
                > Duration::from_millis(self.config.frame_timeout_ms)
    }

    fn discard(&mut self, state: FrameState) -> Option<ReceivedFrame> {
        self.stats.evicted_frames += 1;
        if self.config.deliver_partial {
            ReceivedFrame::partial(&state.frame)
        } else {
            None
        }
    }

    /// 조립 중인 프레임의 현재 prefix
    pub fn partial_frame(&self, frame_no: FrameNo) -> Option<Bytes> {
        self.frames.get(&frame_no).map(|s| s.frame.partial_frame())
    }

    /// 조립 중인 프레임
    pub fn get(&self, frame_no: FrameNo) -> Option<&FragmentedFrame> {
        self.frames.get(&frame_no).map(|s| &s.frame)
    }

    /// 조립 중인 프레임 수
    pub fn inflight(&self) -> usize {
        self.frames.len()
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn stats(&self) -> &ReassemblyStats {
        &self.stats
    }
}
