//! 수신 통계와 지연 측정

use std::time::{Duration, Instant};

/// 조각 지연 EWMA
///
/// 프레임의 첫 조각이 도착한 뒤 각 조각이 도착하기까지 걸린 시간을 1/8 가중치로 평활.
/// ACK의 `avg_delay` 값으로 사용된다.
#[derive(Debug, Clone, Default)]
pub struct DelayEstimator {
    /// 평활 지연 (마이크로초)
    avg_delay_us: Option<f64>,

    /// 샘플 수
    samples: u64,
}

impl DelayEstimator {
    const GAIN: f64 = 0.125;

    pub fn new() -> Self {
        Self::default()
    }

    /// 지연 샘플 기록
    pub fn record(&mut self, delay: Duration) {
        let sample = delay.as_secs_f64() * 1_000_000.0;
        self.avg_delay_us = Some(match self.avg_delay_us {
            Some(avg) => avg + Self::GAIN * (sample - avg),
            None => sample,
        });
        self.samples += 1;
    }

    /// 프레임 첫 조각 도착 시각 기준 샘플 기록
    pub fn record_since(&mut self, first_arrival: Instant, now: Instant) {
        self.record(now.saturating_duration_since(first_arrival));
    }

    /// 평균 지연 (마이크로초, u32 범위로 포화)
    pub fn avg_delay_us(&self) -> u32 {
        self.avg_delay_us
            .map(|avg| avg.round().min(u32::MAX as f64) as u32)
            .unwrap_or(0)
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }
}

/// 연결 하나의 조립 통계
#[derive(Debug, Clone)]
pub struct ReassemblyStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 받아들인 패킷 수 (중복 포함)
    pub total_packets: u64,

    /// 중복 수신 패킷 수
    pub duplicate_packets: u64,

    /// 포맷 에러로 버린 데이터그램 수
    pub rejected_packets: u64,

    /// 조립 시작된 프레임 수
    pub total_frames: u64,

    /// 완료된 프레임 수
    pub completed_frames: u64,

    /// 타임아웃/용량 초과로 폐기된 프레임 수
    pub evicted_frames: u64,

    /// 새로 채운 조각의 페이로드 바이트
    pub total_bytes: u64,

    /// 조각 지연
    pub delay: DelayEstimator,
}

impl ReassemblyStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            total_packets: 0,
            duplicate_packets: 0,
            rejected_packets: 0,
            total_frames: 0,
            completed_frames: 0,
            evicted_frames: 0,
            total_bytes: 0,
            delay: DelayEstimator::new(),
        }
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.total_bytes as f64 / elapsed
    }

    /// 시작된 프레임 중 폐기 비율
    pub fn frame_loss_rate(&self) -> f64 {
        if self.total_frames == 0 {
            return 0.0;
        }
        self.evicted_frames as f64 / self.total_frames as f64
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Frames: {}/{} (evicted {}) | Packets: {} (dup {}, rejected {}) | Throughput: {:.2} MB/s | Delay: {}us",
            self.elapsed().as_secs_f64(),
            self.completed_frames,
            self.total_frames,
            self.evicted_frames,
            self.total_packets,
            self.duplicate_packets,
            self.rejected_packets,
            self.throughput() / 1_000_000.0,
            self.delay.avg_delay_us(),
        )
    }
}

impl Default for ReassemblyStats {
    fn default() -> Self {
        Self::new()
    }
}

/// 송신 통계
#[derive(Debug, Clone)]
pub struct SendStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 전송한 프레임 수
    pub frames_sent: u64,

    /// 전송한 조각 수
    pub packets_sent: u64,

    /// 전송한 페이로드 바이트
    pub bytes_sent: u64,

    /// 받은 ACK 수
    pub acks_received: u64,

    /// 마지막으로 보고된 평균 지연 (마이크로초)
    pub last_avg_delay_us: Option<u32>,
}

impl SendStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            frames_sent: 0,
            packets_sent: 0,
            bytes_sent: 0,
            acks_received: 0,
            last_avg_delay_us: None,
        }
    }

    /// 송신 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.bytes_sent as f64 / elapsed
    }
}

impl Default for SendStats {
    fn default() -> Self {
        Self::new()
    }
}
