//! # VFP (Video Fragment Protocol)
//!
//! UDP 기반 프레임 분할/조립 프로토콜
//!
//! ## 핵심 특징
//! - **프레임 분할**: 인코딩된 프레임 하나를 최대 페이로드 크기 조각으로 분할
//! - **순서 무관 조립**: 중복/순서 뒤바뀜/일부 누락을 견디는 슬롯 조립
//! - **부분 프레임**: 끊김 없는 prefix만 먼저 전달 가능
//! - **ACK + 지연**: 조각별 수신 확인과 평균 지연 보고 (적응 로직은 상위 계층 몫)
//! - **고정 헤더**: 14바이트 little-endian 헤더, 12바이트 ACK

pub mod ack;
pub mod config;
pub mod error;
pub mod frame;
pub mod header;
pub mod packet;
pub mod reassembly;
pub mod receiver;
pub mod sender;
pub mod stats;
pub mod transport;

pub use ack::{AckPacket, ACK_LEN};
pub use config::Config;
pub use error::{Error, Result};
pub use frame::FragmentedFrame;
pub use packet::{ConnectionId, FragmentNo, FrameNo, Packet, PacketDraft, HEADER_LEN};
pub use reassembly::{FrameTable, PacketOutcome, ReceivedFrame};
pub use receiver::{FrameReceiver, FrameStream};
pub use sender::FrameSender;
pub use stats::{DelayEstimator, ReassemblyStats, SendStats};
pub use transport::Transport;

/// 기본 조각 페이로드 크기 (바이트)
///
/// 14바이트 헤더 + IP/UDP 헤더를 더해도 1500 MTU 안에 들어감
pub const DEFAULT_MAX_PAYLOAD: usize = 1400;
