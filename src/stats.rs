//! 전송 통계와 진행률 표시

use std::io::Write;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// 전체 전송 통계
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 수락된 패킷 수
    pub accepted_packets: u64,

    /// 수신 바이트 (중복 제외)
    pub total_bytes: u64,

    /// 중복 수신 패킷 수 (재-ACK만 하고 버린 것)
    pub duplicate_packets: u64,

    /// 체크섬 불일치 패킷 수
    pub checksum_failures: u64,

    /// 시퀀스 불일치 패킷 수
    pub sequence_failures: u64,

    /// 전송한 NAK 수
    pub naks_sent: u64,

    /// 수신 타임아웃 횟수
    pub timeouts: u64,
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            accepted_packets: 0,
            total_bytes: 0,
            duplicate_packets: 0,
            checksum_failures: 0,
            sequence_failures: 0,
            naks_sent: 0,
            timeouts: 0,
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

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Bytes: {} | Throughput: {:.2} MB/s | Dup: {} | BadSum: {} | NAKs: {} | Timeouts: {}",
            self.elapsed().as_secs_f64(),
            self.total_bytes,
            self.throughput() / 1_000_000.0,
            self.duplicate_packets,
            self.checksum_failures,
            self.naks_sent,
            self.timeouts,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}

/// 진행률 보드 내부 상태
#[derive(Debug)]
struct BoardInner {
    file_name: String,
    /// part_index → 진행률(%)
    parts: Vec<f64>,
    /// 화면에 그려진 줄 수 (0이면 아직 미출력)
    lines_drawn: usize,
}

/// 다운로드 1건의 파트별 진행률 보드
///
/// N개의 워커가 전부 갱신하고 같은 경로로 다시 그린다. 갱신과 출력이
/// 한 락 안에서 일어나므로 줄이 섞이거나 갱신이 유실되지 않는다.
#[derive(Debug)]
pub struct ProgressBoard {
    inner: Mutex<BoardInner>,
    /// 터미널 출력 여부 (테스트/라이브러리 사용 시 false)
    render: bool,
}

impl ProgressBoard {
    pub fn new(file_name: &str, part_count: u32, render: bool) -> Self {
        Self {
            inner: Mutex::new(BoardInner {
                file_name: file_name.to_string(),
                parts: vec![0.0; part_count as usize],
                lines_drawn: 0,
            }),
            render,
        }
    }

    /// 파트 진행률 갱신 (+ 필요 시 화면 갱신, 단일 락)
    pub fn update(&self, part_index: u32, percent: f64) {
        let mut inner = self.inner.lock();
        if let Some(slot) = inner.parts.get_mut(part_index as usize) {
            *slot = percent.clamp(0.0, 100.0);
        }
        if self.render {
            Self::render_locked(&mut inner);
        }
    }

    /// 진행률 스냅샷
    pub fn snapshot(&self) -> Vec<f64> {
        self.inner.lock().parts.clone()
    }

    /// 모든 파트가 100%인지 확인
    pub fn is_complete(&self) -> bool {
        self.inner.lock().parts.iter().all(|&p| p >= 100.0)
    }

    fn render_locked(inner: &mut BoardInner) {
        const BAR_LEN: usize = 20;

        let mut out = std::io::stdout().lock();
        if inner.lines_drawn > 0 {
            // 이전 출력 위로 커서 이동
            let _ = write!(out, "\x1b[{}F", inner.lines_drawn);
        }
        for (i, &percent) in inner.parts.iter().enumerate() {
            let filled = (BAR_LEN as f64 * percent / 100.0) as usize;
            let bar: String = "█".repeat(filled) + &" ".repeat(BAR_LEN - filled);
            let _ = writeln!(
                out,
                "\x1b[K{} - part {} [{}] {:3.0}%",
                inner.file_name,
                i + 1,
                bar,
                percent
            );
        }
        let _ = out.flush();
        inner.lines_drawn = inner.parts.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_board_update_and_snapshot() {
        let board = ProgressBoard::new("data.bin", 4, false);
        board.update(0, 25.0);
        board.update(3, 150.0); // 100으로 클램프
        board.update(7, 50.0); // 범위 밖 인덱스 무시

        assert_eq!(board.snapshot(), vec![25.0, 0.0, 0.0, 100.0]);
        assert!(!board.is_complete());

        for i in 0..4 {
            board.update(i, 100.0);
        }
        assert!(board.is_complete());
    }

    #[test]
    fn test_stats_summary() {
        let mut stats = TransferStats::new();
        stats.accepted_packets = 10;
        stats.total_bytes = 10240;
        stats.duplicate_packets = 2;

        let summary = stats.summary();
        assert!(summary.contains("Bytes: 10240"));
        assert!(summary.contains("Dup: 2"));
    }
}
