//! 에러 타입 정의
//!
//! 와이어에서 들어온 잘못된 데이터(포맷 에러)만 `Error`로 돌려준다.
//! 내부 계약 위반(직렬화 전 조각 수 미설정, 미완성 프레임 전송 등)은 panic.

use thiserror::Error;

/// VFP 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("패킷이 너무 짧음: 최소 {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("유효하지 않은 패킷: fragment_no {fragment_no} >= fragments_in_this_frame {fragments_in_this_frame}")]
    FragmentOutOfRange {
        fragment_no: u16,
        fragments_in_this_frame: u16,
    },

    #[error("유효하지 않은 패킷: 빈 페이로드")]
    EmptyPayload,

    #[error("페이로드 크기 초과: 최대 {max_size}, got {got}")]
    PayloadTooLarge { max_size: usize, got: usize },

    #[error("선언된 프레임 크기 초과: 최대 {max_size}, 선언 {declared}")]
    FrameTooLarge { max_size: usize, declared: usize },

    #[error("connection_id 불일치: expected {expected}, got {got}")]
    ConnectionIdMismatch { expected: u16, got: u16 },

    #[error("frame_no 불일치: expected {expected}, got {got}")]
    FrameNoMismatch { expected: u32, got: u32 },

    #[error("fragments_in_this_frame 불일치: expected {expected}, got {got}")]
    FragmentCountMismatch { expected: u16, got: u16 },
}

impl Error {
    /// 신뢰할 수 없는 입력 때문에 생긴 에러인지 (데이터그램 단위로 버리면 됨)
    pub fn is_format_error(&self) -> bool {
        !matches!(self, Error::Io(_))
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_io_is_not_a_format_error() {
        let io = Error::from(std::io::Error::from(std::io::ErrorKind::ConnectionReset));
        assert!(!io.is_format_error());

        assert!(Error::EmptyPayload.is_format_error());
        assert!(Error::FrameTooLarge { max_size: 10, declared: 20 }.is_format_error());
    }
}
