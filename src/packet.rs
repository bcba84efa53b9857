//! 데이터 패킷 정의
//!
//! 파트 소켓으로 오가는 전송 단위. 12바이트 big-endian 헤더
//! (part_index, sequence, checksum) 뒤에 페이로드가 붙으며,
//! 페이로드 길이는 데이터그램 크기에서 암묵적으로 결정된다.

use bytes::Bytes;

use crate::checksum::internet_checksum;
use crate::error::{Error, Result};
use crate::PACKET_HEADER_LEN;

/// 파트 인덱스 (파일 내 구간 번호)
pub type PartIndex = u32;

/// 시퀀스 번호 (파트 내 유닛 번호, 0부터 단조 증가)
pub type Sequence = u32;

/// 데이터 패킷
#[derive(Debug, Clone)]
pub struct Packet {
    /// 파트 인덱스
    pub part_index: PartIndex,

    /// 시퀀스 번호
    pub sequence: Sequence,

    /// 페이로드의 인터넷 체크섬 (wire에서는 u32be의 하위 16비트)
    pub checksum: u16,

    /// 실제 데이터
    pub payload: Bytes,
}

impl Packet {
    /// 새 패킷 생성 (체크섬 계산 포함)
    pub fn new(part_index: PartIndex, sequence: Sequence, payload: Bytes) -> Self {
        let checksum = internet_checksum(&payload);
        Self {
            part_index,
            sequence,
            checksum,
            payload,
        }
    }

    /// 패킷을 바이트로 직렬화
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(PACKET_HEADER_LEN + self.payload.len());
        buf.extend_from_slice(&self.part_index.to_be_bytes());
        buf.extend_from_slice(&self.sequence.to_be_bytes());
        buf.extend_from_slice(&u32::from(self.checksum).to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// 바이트에서 패킷 역직렬화
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PACKET_HEADER_LEN {
            return Err(Error::TruncatedPacket { len: bytes.len() });
        }

        let part_index = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let sequence = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let checksum = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as u16;
        let payload = Bytes::copy_from_slice(&bytes[PACKET_HEADER_LEN..]);

        Ok(Self {
            part_index,
            sequence,
            checksum,
            payload,
        })
    }

    /// 체크섬 검증
    pub fn verify_checksum(&self) -> bool {
        internet_checksum(&self.payload) == self.checksum
    }

    /// 기대 시퀀스에 대한 수락 가능 여부 검증
    ///
    /// 체크섬이 맞지 않거나 시퀀스가 기대값과 다르면 해당 에러를 돌려주고,
    /// 수신측은 이를 NAK 사유로만 사용한다 (로컬 복구, 상위 전파 없음).
    pub fn validate(&self, expected: Sequence) -> Result<()> {
        let computed = internet_checksum(&self.payload);
        if computed != self.checksum {
            return Err(Error::ChecksumMismatch {
                part_index: self.part_index,
                sequence: self.sequence,
                expected: self.checksum,
                got: computed,
            });
        }
        if self.sequence != expected {
            return Err(Error::SequenceMismatch {
                part_index: self.part_index,
                expected,
                got: self.sequence,
            });
        }
        Ok(())
    }
}
