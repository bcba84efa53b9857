//! 프로토콜 설정

use std::time::Duration;

use crate::{DEFAULT_PART_COUNT, DEFAULT_PAYLOAD_SIZE, DEFAULT_RETRY_LIMIT};

/// PFT 프로토콜 설정
///
/// 전역 상태 없이 생성 시점에 한 번 구성해서 각 컴포넌트에 전달한다.
#[derive(Debug, Clone)]
pub struct Config {
    /// 데이터그램당 페이로드 크기 (바이트)
    pub payload_size: usize,

    /// 다운로드당 파트 수 N
    pub part_count: u32,

    /// 패킷(유닛)당 재시도 한도
    pub retry_limit: u32,

    /// ACK/NAK 교환 타임아웃 (밀리초)
    pub ack_timeout_ms: u64,

    /// 컨트롤 요청(카탈로그, 파트 요청) 응답 타임아웃 (밀리초)
    pub request_timeout_ms: u64,

    /// 종료 시 워커 join 대기 한도 (밀리초)
    pub join_grace_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            payload_size: DEFAULT_PAYLOAD_SIZE,
            part_count: DEFAULT_PART_COUNT,
            retry_limit: DEFAULT_RETRY_LIMIT,
            ack_timeout_ms: 3000,
            request_timeout_ms: 5000,
            join_grace_ms: 5000,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 루프백/근거리용 설정
    pub fn local() -> Self {
        Self {
            payload_size: 1400,
            part_count: DEFAULT_PART_COUNT,
            retry_limit: DEFAULT_RETRY_LIMIT,
            ack_timeout_ms: 500,
            request_timeout_ms: 1000,
            join_grace_ms: 2000,
        }
    }

    /// 불안정한 네트워크용 설정
    pub fn lossy_network() -> Self {
        Self {
            payload_size: 512,               // 작은 유닛
            part_count: DEFAULT_PART_COUNT,
            retry_limit: 5,
            ack_timeout_ms: 7000,
            request_timeout_ms: 10000,
            join_grace_ms: 5000,
        }
    }

    /// ACK 교환 타임아웃
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// 컨트롤 요청 타임아웃
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// 종료 시 join 대기 한도
    pub fn join_grace(&self) -> Duration {
        Duration::from_millis(self.join_grace_ms)
    }

    /// 주어진 파트 길이를 전송하는 데 필요한 유닛 수
    pub fn units_for(&self, length: u64) -> u64 {
        if length == 0 {
            return 0;
        }
        (length + self.payload_size as u64 - 1) / self.payload_size as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units_for() {
        let config = Config {
            payload_size: 1024,
            ..Config::default()
        };

        assert_eq!(config.units_for(0), 0);
        assert_eq!(config.units_for(1), 1);
        assert_eq!(config.units_for(1024), 1);
        assert_eq!(config.units_for(1025), 2);
        assert_eq!(config.units_for(250003), 245);
    }
}
