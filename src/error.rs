//! 에러 타입 정의

use thiserror::Error;

/// PFT 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("직렬화 에러: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("유효하지 않은 매직 넘버: expected {expected:08X}, got {got:08X}")]
    InvalidMagicNumber { expected: u32, got: u32 },

    #[error("유효하지 않은 프로토콜 버전: expected {expected}, got {got}")]
    InvalidVersion { expected: u8, got: u8 },

    #[error("잘린 패킷: {len} bytes")]
    TruncatedPacket { len: usize },

    #[error("체크섬 불일치: part={part_index}, seq={sequence}, expected {expected:04X}, got {got:04X}")]
    ChecksumMismatch {
        part_index: u32,
        sequence: u32,
        expected: u16,
        got: u16,
    },

    #[error("시퀀스 불일치: part={part_index}, expected {expected}, got {got}")]
    SequenceMismatch {
        part_index: u32,
        expected: u32,
        got: u32,
    },

    #[error("응답 타임아웃: {context}, attempts={attempts}")]
    Timeout { context: &'static str, attempts: u32 },

    #[error("재시도 한도 초과: part={part_index}, attempts={attempts}")]
    RetryExhausted { part_index: u32, attempts: u32 },

    #[error("카탈로그에 없는 파일: {name}")]
    FileNotFound { name: String },

    #[error("파트 불완전: part={part_index}, expected {expected} bytes, actual {actual} bytes")]
    IncompleteParts {
        part_index: u32,
        expected: u64,
        actual: u64,
    },

    #[error("서버 루트에 서비스할 파일 없음")]
    CatalogEmpty,

    #[error("파트 전송 실패: parts={parts:?}")]
    PartsFailed { parts: Vec<u32> },

    #[error("종료 진행 중")]
    ShuttingDown,

    #[error("연결 종료")]
    ConnectionClosed,
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
