//! 조각난 프레임 정의
//!
//! - 송신측: 프레임 하나를 최대 페이로드 크기의 Packet들로 분할
//! - 수신측: 순서 없이, 중복되어 도착하는 Packet들을 슬롯에 조립

use bytes::{Bytes, BytesMut};

use crate::packet::{ConnectionId, FragmentNo, FrameNo, Packet, PacketDraft};
use crate::transport::Transport;
use crate::{Error, Result};

/// (connection_id, frame_no) 하나에 대한 분할/조립 단위
#[derive(Debug, Clone)]
pub struct FragmentedFrame {
    connection_id: ConnectionId,
    frame_no: FrameNo,
    fragments_in_this_frame: u16,

    /// 조각 슬롯 (인덱스 = fragment_no, 빈 슬롯은 invalid 패킷)
    fragments: Vec<Packet>,

    /// 아직 도착하지 않은 조각 수
    remaining_fragments: u16,
}

impl FragmentedFrame {
    /// 송신용 프레임 생성 (분할)
    ///
    /// 마지막 조각만 `time_to_next_frame`을 싣는다.
    ///
    /// # Panics
    /// 빈 프레임, `max_payload == 0`, 조각 수가 `u16::MAX`를 넘는 프레임
    pub fn split(
        connection_id: ConnectionId,
        frame_no: FrameNo,
        time_to_next_frame: u32,
        whole_frame: Bytes,
        max_payload: usize,
    ) -> Self {
        assert!(max_payload > 0, "max_payload는 0보다 커야 함");
        assert!(!whole_frame.is_empty(), "빈 프레임은 분할할 수 없음");

        let mut drafts: Vec<PacketDraft> = Vec::new();
        let mut next_fragment_start = 0;

        while next_fragment_start < whole_frame.len() {
            let fragment_no =
                FragmentNo::try_from(drafts.len()).expect("프레임 조각 수가 u16 범위를 넘음");
            drafts.push(PacketDraft::new(
                &whole_frame,
                connection_id,
                frame_no,
                fragment_no,
                0,
                &mut next_fragment_start,
                max_payload,
            ));
        }

        if let Some(last) = drafts.last_mut() {
            last.set_time_to_next(time_to_next_frame);
        }

        // 조각 수는 분할이 끝나야 알 수 있음
        let fragments_in_this_frame =
            u16::try_from(drafts.len()).expect("프레임 조각 수가 u16 범위를 넘음");
        let fragments = drafts
            .into_iter()
            .map(|draft| draft.finalize(fragments_in_this_frame))
            .collect();

        Self {
            connection_id,
            frame_no,
            fragments_in_this_frame,
            fragments,
            remaining_fragments: 0,
        }
    }

    /// 첫 수신 패킷으로 수신용 프레임 생성
    ///
    /// 슬롯 수는 패킷이 선언한 `fragments_in_this_frame`으로 정해진다.
    pub fn from_first_packet(connection_id: ConnectionId, packet: Packet) -> Result<Self> {
        let total = packet.fragments_in_this_frame();
        let mut frame = Self {
            connection_id,
            frame_no: packet.frame_no(),
            fragments_in_this_frame: total,
            fragments: Vec::new(),
            remaining_fragments: total,
        };

        // 할당 전에 검사
        frame.sanity_check(&packet)?;
        frame.fragments = vec![Packet::default(); total as usize];
        frame.merge(packet)?;

        Ok(frame)
    }

    /// 이 프레임에 속하는 패킷인지 검사
    fn sanity_check(&self, packet: &Packet) -> Result<()> {
        if packet.connection_id() != self.connection_id {
            return Err(Error::ConnectionIdMismatch {
                expected: self.connection_id,
                got: packet.connection_id(),
            });
        }

        if packet.fragments_in_this_frame() != self.fragments_in_this_frame {
            return Err(Error::FragmentCountMismatch {
                expected: self.fragments_in_this_frame,
                got: packet.fragments_in_this_frame(),
            });
        }

        if packet.frame_no() != self.frame_no {
            return Err(Error::FrameNoMismatch {
                expected: self.frame_no,
                got: packet.frame_no(),
            });
        }

        if packet.fragment_no() >= self.fragments_in_this_frame {
            return Err(Error::FragmentOutOfRange {
                fragment_no: packet.fragment_no(),
                fragments_in_this_frame: self.fragments_in_this_frame,
            });
        }

        Ok(())
    }

    /// 패킷 병합
    ///
    /// 새로 채운 슬롯이면 `true`, 이미 받은 조각(중복)이면 `false`.
    /// 검사에 실패하면 상태를 바꾸지 않고 에러를 돌려준다.
    pub fn merge(&mut self, packet: Packet) -> Result<bool> {
        self.sanity_check(&packet)?;

        let slot = &mut self.fragments[packet.fragment_no() as usize];
        if slot.is_valid() {
            return Ok(false);
        }

        *slot = packet;
        self.remaining_fragments -= 1;
        Ok(true)
    }

    /// 완료 여부 확인
    pub fn is_complete(&self) -> bool {
        self.remaining_fragments == 0
    }

    /// 완성된 프레임 데이터
    ///
    /// # Panics
    /// 미완성 프레임에서 호출하면 panic
    pub fn frame(&self) -> Bytes {
        assert!(
            self.is_complete(),
            "미완성 FragmentedFrame에서 프레임 생성 시도 (frame_no={}, remaining={})",
            self.frame_no,
            self.remaining_fragments
        );

        concat(self.fragments.iter())
    }

    /// 0번부터 끊김 없이 도착한 조각들의 연결
    ///
    /// 뒤쪽 조각이 먼저 와 있어도 첫 빈 슬롯에서 멈춘다.
    pub fn partial_frame(&self) -> Bytes {
        concat(self.fragments.iter().take_while(|f| f.is_valid()))
    }

    /// 모든 조각을 순서대로 전송
    ///
    /// # Panics
    /// 분할/조립이 끝나지 않은 프레임이면 panic
    pub async fn send<T: Transport>(&self, transport: &T) -> Result<()> {
        assert!(
            self.fragments.len() == self.fragments_in_this_frame as usize && self.is_complete(),
            "미완성 FragmentedFrame 전송 시도 (frame_no={})",
            self.frame_no
        );

        for packet in &self.fragments {
            packet.send(transport).await?;
        }

        Ok(())
    }

    /// 누락된 조각 번호 목록
    pub fn missing_fragments(&self) -> Vec<FragmentNo> {
        self.fragments
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.is_valid())
            .map(|(idx, _)| idx as FragmentNo)
            .collect()
    }

    /// 수신률 계산
    pub fn receive_ratio(&self) -> f64 {
        if self.fragments_in_this_frame == 0 {
            return 0.0;
        }
        let received = self.fragments_in_this_frame - self.remaining_fragments;
        received as f64 / self.fragments_in_this_frame as f64
    }

    /// 마지막 조각이 실어 온 다음 프레임까지의 간격 힌트
    pub fn time_to_next(&self) -> Option<u32> {
        self.fragments
            .last()
            .filter(|f| f.is_valid())
            .map(|f| f.time_to_next())
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn frame_no(&self) -> FrameNo {
        self.frame_no
    }

    pub fn fragments_in_this_frame(&self) -> u16 {
        self.fragments_in_this_frame
    }

    pub fn remaining_fragments(&self) -> u16 {
        self.remaining_fragments
    }

    pub fn fragments(&self) -> &[Packet] {
        &self.fragments
    }
}

fn concat<'a>(fragments: impl Iterator<Item = &'a Packet> + Clone) -> Bytes {
    let len: usize = fragments.clone().map(|f| f.payload().len()).sum();
    let mut buf = BytesMut::with_capacity(len);
    for fragment in fragments {
        buf.extend_from_slice(fragment.payload());
    }
    buf.freeze()
}
