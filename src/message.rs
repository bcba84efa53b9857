//! 컨트롤 메시지 정의
//!
//! 양 끝단이 공유하는 단일 태그드 코덱: 헤더(매직 + 버전 + 타입 + 길이)
//! 뒤에 타입별 페이로드가 붙는다. 카탈로그 요청/응답, 파트 요청,
//! ACK/NAK, not-found, 종료 알림이 전부 이 코덱을 거친다.

use serde::{Deserialize, Serialize};

use crate::catalog::CatalogEntry;
use crate::error::{Error, Result};
use crate::packet::{PartIndex, Sequence};
use crate::{MAGIC_NUMBER, PROTOCOL_VERSION};

/// 메시지 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// 파일 목록 요청
    FileListRequest = 1,

    /// 파일 목록 응답 (카탈로그)
    FileList = 2,

    /// 파트(바이트 구간) 요청
    PartRequest = 3,

    /// 수신 확인
    Ack = 4,

    /// 부정 확인 (재전송 요청)
    Nak = 5,

    /// 카탈로그에 없는 파일
    NotFound = 6,

    /// 서버 종료 알림
    Shutdown = 7,
}

/// 메시지 헤더
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageHeader {
    /// 매직 넘버
    pub magic: u32,

    /// 프로토콜 버전
    pub version: u8,

    /// 메시지 타입
    pub msg_type: MessageType,

    /// 페이로드 길이 (헤더 제외)
    pub payload_len: u32,
}

impl MessageHeader {
    pub fn new(msg_type: MessageType, payload_len: u32) -> Self {
        Self {
            magic: MAGIC_NUMBER,
            version: PROTOCOL_VERSION,
            msg_type,
            payload_len,
        }
    }
}

/// 파트 요청 (클라이언트 → 서버 컨트롤 소켓)
///
/// (file_name, part_index) 쌍이 요청의 고유 키
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartRequest {
    /// 파일 이름 (카탈로그 키)
    pub file_name: String,

    /// 파일 내 시작 오프셋 (바이트)
    pub offset: u64,

    /// 구간 길이 (바이트)
    pub length: u64,

    /// 파트 인덱스
    pub part_index: PartIndex,
}

/// ACK/NAK 공용 태그
///
/// ACK는 방금 수락한 시퀀스, NAK는 아직 기다리는 시퀀스를 담는다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyTag {
    pub part_index: PartIndex,
    pub sequence: Sequence,
}

impl ReplyTag {
    pub fn new(part_index: PartIndex, sequence: Sequence) -> Self {
        Self {
            part_index,
            sequence,
        }
    }

    /// 방금 보낸 패킷에 대한 응답인지 확인
    pub fn matches(&self, part_index: PartIndex, sequence: Sequence) -> bool {
        self.part_index == part_index && self.sequence == sequence
    }
}

/// 파일 목록 페이로드
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileListMessage {
    pub entries: Vec<CatalogEntry>,
}

/// not-found 페이로드
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotFoundMessage {
    pub file_name: String,
}

/// 통합 컨트롤 메시지
#[derive(Debug, Clone)]
pub enum ControlMessage {
    FileListRequest,
    FileList(FileListMessage),
    PartRequest(PartRequest),
    Ack(ReplyTag),
    Nak(ReplyTag),
    NotFound(NotFoundMessage),
    Shutdown,
}

impl ControlMessage {
    /// 메시지 타입 반환
    pub fn msg_type(&self) -> MessageType {
        match self {
            ControlMessage::FileListRequest => MessageType::FileListRequest,
            ControlMessage::FileList(_) => MessageType::FileList,
            ControlMessage::PartRequest(_) => MessageType::PartRequest,
            ControlMessage::Ack(_) => MessageType::Ack,
            ControlMessage::Nak(_) => MessageType::Nak,
            ControlMessage::NotFound(_) => MessageType::NotFound,
            ControlMessage::Shutdown => MessageType::Shutdown,
        }
    }

    /// 바이트로 직렬화
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload = match self {
            ControlMessage::FileList(msg) => bincode::serialize(msg)?,
            ControlMessage::PartRequest(msg) => bincode::serialize(msg)?,
            ControlMessage::Ack(tag) | ControlMessage::Nak(tag) => bincode::serialize(tag)?,
            ControlMessage::NotFound(msg) => bincode::serialize(msg)?,
            ControlMessage::FileListRequest | ControlMessage::Shutdown => Vec::new(),
        };

        let header = MessageHeader::new(self.msg_type(), payload.len() as u32);
        let header_bytes = bincode::serialize(&header)?;

        let mut buf = Vec::with_capacity(header_bytes.len() + payload.len());
        buf.extend_from_slice(&header_bytes);
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// 바이트에서 역직렬화
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header: MessageHeader = bincode::deserialize(bytes)?;

        if header.magic != MAGIC_NUMBER {
            return Err(Error::InvalidMagicNumber {
                expected: MAGIC_NUMBER,
                got: header.magic,
            });
        }
        if header.version != PROTOCOL_VERSION {
            return Err(Error::InvalidVersion {
                expected: PROTOCOL_VERSION,
                got: header.version,
            });
        }

        let header_size = bincode::serialized_size(&header)? as usize;
        if bytes.len() < header_size {
            return Err(Error::TruncatedPacket { len: bytes.len() });
        }
        let payload = &bytes[header_size..];

        Ok(match header.msg_type {
            MessageType::FileListRequest => ControlMessage::FileListRequest,
            MessageType::FileList => ControlMessage::FileList(bincode::deserialize(payload)?),
            MessageType::PartRequest => ControlMessage::PartRequest(bincode::deserialize(payload)?),
            MessageType::Ack => ControlMessage::Ack(bincode::deserialize(payload)?),
            MessageType::Nak => ControlMessage::Nak(bincode::deserialize(payload)?),
            MessageType::NotFound => ControlMessage::NotFound(bincode::deserialize(payload)?),
            MessageType::Shutdown => ControlMessage::Shutdown,
        })
    }
}

/// 데이터그램이 컨트롤 메시지인지 확인 (데이터 패킷과 구분)
///
/// bincode는 u32를 little-endian으로 기록하므로 선두 4바이트를 LE로
/// 읽어 매직과 비교한다. 데이터 패킷의 선두는 part_index(u32be, 작은 값)라
/// 매직과 충돌하지 않는다.
pub fn is_control(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) == MAGIC_NUMBER
}
