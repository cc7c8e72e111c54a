//! 프로토콜 설정

use crate::DEFAULT_MAX_PAYLOAD;

/// VFP 프로토콜 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 조각당 최대 페이로드 크기 (바이트, 헤더 제외)
    pub max_payload_size: usize,

    /// 수신 프레임 하나의 최대 크기 (바이트)
    /// 첫 조각이 선언한 조각 수 × max_payload_size가 이보다 크면 거부
    pub max_frame_size: usize,

    /// 미완성 프레임 폐기 타임아웃 (밀리초)
    /// 완료 기록과 빈 연결도 이 시간이 지나면 정리
    pub frame_timeout_ms: u64,

    /// 연결당 동시에 조립 중인 최대 프레임 수
    /// 초과하면 가장 오래된 프레임부터 폐기
    pub max_inflight_frames: usize,

    /// 조각 수신마다 AckPacket 전송 여부
    pub ack_enabled: bool,

    /// 폐기되는 미완성 프레임의 연속 prefix를 전달할지 여부
    pub deliver_partial: bool,

    /// 오래된 프레임 정리 주기 (밀리초)
    pub sweep_interval_ms: u64,

    /// 수신 버퍼 크기
    pub recv_buffer_size: usize,

    /// 완료 프레임 채널 용량
    pub frame_channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            max_frame_size: 8 * 1024 * 1024,  // 8MB
            frame_timeout_ms: 1000,           // 1초
            max_inflight_frames: 64,
            ack_enabled: true,
            deliver_partial: false,
            sweep_interval_ms: 50,
            recv_buffer_size: 65535,
            frame_channel_capacity: 100,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 프레임 하나에 필요한 조각 수 계산
    pub fn fragments_for(&self, frame_len: usize) -> usize {
        frame_len.div_ceil(self.max_payload_size)
    }

    /// 수신 프레임이 선언할 수 있는 최대 조각 수
    pub fn max_fragments_per_frame(&self) -> usize {
        (self.max_frame_size / self.max_payload_size.max(1)).min(u16::MAX as usize)
    }

    /// 조각 하나의 최대 데이터그램 크기 (헤더 포함)
    pub fn max_datagram_size(&self) -> usize {
        crate::packet::HEADER_LEN + self.max_payload_size
    }

    /// 저지연 설정 (인터랙티브 영상)
    pub fn low_latency() -> Self {
        Self {
            max_payload_size: 1200,
            max_frame_size: 2 * 1024 * 1024,
            frame_timeout_ms: 200,
            max_inflight_frames: 8,
            ack_enabled: true,
            deliver_partial: true,            // 늦은 프레임은 prefix라도
            sweep_interval_ms: 10,
            recv_buffer_size: 65535,
            frame_channel_capacity: 16,
        }
    }

    /// 손실 많은 네트워크용 설정
    pub fn lossy_network() -> Self {
        Self {
            max_payload_size: 1000,           // 작은 조각
            max_frame_size: 8 * 1024 * 1024,
            frame_timeout_ms: 3000,
            max_inflight_frames: 256,
            ack_enabled: true,
            deliver_partial: true,
            sweep_interval_ms: 100,
            recv_buffer_size: 65535,
            frame_channel_capacity: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragments_for() {
        let config = Config::default();
        assert_eq!(config.fragments_for(1), 1);
        assert_eq!(config.fragments_for(1400), 1);
        assert_eq!(config.fragments_for(1401), 2);
        assert_eq!(config.max_datagram_size(), 1414);
        assert_eq!(config.max_fragments_per_frame(), 8 * 1024 * 1024 / 1400);
    }

    #[test]
    fn test_presets_are_usable() {
        for config in [Config::low_latency(), Config::lossy_network()] {
            assert!(config.max_payload_size > 0);
            assert!(config.max_inflight_frames > 0);
            assert!(config.max_datagram_size() <= 1500);
            assert!(config.max_fragments_per_frame() > 0);
        }
    }
}
