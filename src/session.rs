//! 전송 세션 오케스트레이터 (클라이언트측)
//!
//! - 파일 크기를 N개의 연속 구간으로 분할
//! - 구간마다 독립 소켓의 수신 워커를 하나씩 띄우고 전부 기다림
//! - 전원 성공 시에만 조립, 하나라도 실패하면 부분 파트 폐기 후 실패 보고

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::fs;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::assemble::assemble_parts;
use crate::catalog::CatalogEntry;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::message::{ControlMessage, PartRequest};
use crate::receiver::PartReceiver;
use crate::shutdown::Shutdown;
use crate::stats::{ProgressBoard, TransferStats};
use crate::MAX_DATAGRAM;

/// 파트 1개의 바이트 구간
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartRange {
    pub part_index: u32,
    pub offset: u64,
    pub length: u64,
}

/// 파일 크기를 N개의 연속·비중첩 구간으로 분할
///
/// i < N-1 구간은 floor(size/N) 바이트, 나머지는 전부 마지막 구간이 흡수한다.
/// 구간 길이의 합은 항상 전체 크기와 같다.
pub fn partition(total_size: u64, parts: u32) -> Vec<PartRange> {
    assert!(parts >= 1, "파트 수는 1 이상");

    let base = total_size / parts as u64;
    (0..parts)
        .map(|i| {
            let offset = i as u64 * base;
            let length = if i == parts - 1 {
                total_size - offset
            } else {
                base
            };
            PartRange {
                part_index: i,
                offset,
                length,
            }
        })
        .collect()
}

/// 다운로드 1건을 담당하는 세션
pub struct TransferSession {
    config: Config,
    server_addr: SocketAddr,
    staging_dir: PathBuf,
    output_dir: PathBuf,
    shutdown: Shutdown,
    render_progress: bool,
    stats: Arc<Mutex<TransferStats>>,
}

impl TransferSession {
    pub fn new(
        config: Config,
        server_addr: SocketAddr,
        staging_dir: &Path,
        output_dir: &Path,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            config,
            server_addr,
            staging_dir: staging_dir.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            shutdown,
            render_progress: false,
            stats: Arc::new(Mutex::new(TransferStats::new())),
        }
    }

    /// 터미널 진행률 바 출력 여부
    pub fn with_progress_render(mut self, render: bool) -> Self {
        self.render_progress = render;
        self
    }

    /// 지금까지의 전송 통계
    pub fn stats(&self) -> TransferStats {
        self.stats.lock().clone()
    }

    /// 파일 다운로드: 분할 → N 병렬 파트 수신 → 조립
    ///
    /// 실패 시 해당 파일의 부분 파트를 전부 폐기하고
    /// 실패한 파트 인덱스를 담아 돌려준다. 부분 이어받기는 없다.
    pub async fn download(&self, name: &str, total_size: u64) -> Result<PathBuf> {
        fs::create_dir_all(&self.staging_dir).await?;
        fs::create_dir_all(&self.output_dir).await?;

        let ranges = partition(total_size, self.config.part_count);
        let board = Arc::new(ProgressBoard::new(
            name,
            self.config.part_count,
            self.render_progress,
        ));

        info!(
            "다운로드 시작: {} ({} bytes, {} parts)",
            name,
            total_size,
            ranges.len()
        );

        let mut handles = Vec::with_capacity(ranges.len());
        for range in &ranges {
            let request = PartRequest {
                file_name: name.to_string(),
                offset: range.offset,
                length: range.length,
                part_index: range.part_index,
            };
            let part_path = self.part_path(name, range.part_index);
            let config = self.config.clone();
            let server_addr = self.server_addr;
            let shutdown = self.shutdown.clone();
            let board = board.clone();
            let stats = self.stats.clone();

            handles.push(tokio::spawn(async move {
                let receiver = PartReceiver::bind(config, server_addr, shutdown).await?;
                receiver.run(&request, &part_path, &board, &stats).await
            }));
        }

        let mut failed: Vec<u32> = Vec::new();
        for (i, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(Error::ShuttingDown)) => {
                    debug!("파트 {} 취소됨 (종료 진행 중)", i);
                    failed.push(i as u32);
                }
                Ok(Err(e)) => {
                    warn!("파트 {} 실패: {}", i, e);
                    failed.push(i as u32);
                }
                Err(e) => {
                    warn!("파트 {} 태스크 중단: {}", i, e);
                    failed.push(i as u32);
                }
            }
        }

        if !failed.is_empty() {
            // 전체 파일 재시도 전에 부분 파트부터 폐기
            self.discard_parts(name).await;
            return Err(Error::PartsFailed { parts: failed });
        }

        let part_files: Vec<(PathBuf, u64)> = ranges
            .iter()
            .map(|r| (self.part_path(name, r.part_index), r.length))
            .collect();
        let output_path = self.output_dir.join(name);
        assemble_parts(&part_files, &output_path).await?;

        info!("다운로드 완료: {} → {:?}", name, output_path);
        Ok(output_path)
    }

    /// 해당 파일의 파트 파일 전부 삭제 (없으면 무시)
    pub async fn discard_parts(&self, name: &str) {
        for i in 0..self.config.part_count {
            let path = self.part_path(name, i);
            match fs::remove_file(&path).await {
                Ok(()) => debug!("부분 파트 폐기: {:?}", path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("파트 파일 삭제 실패 {:?}: {}", path, e),
            }
        }
    }

    fn part_path(&self, name: &str, part_index: u32) -> PathBuf {
        self.staging_dir.join(format!("{}.part{}", name, part_index))
    }
}

/// 서버 카탈로그 조회 (컨트롤 소켓, 제한된 재시도)
pub async fn fetch_file_list(
    server_addr: SocketAddr,
    config: &Config,
) -> Result<Vec<CatalogEntry>> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    let request = ControlMessage::FileListRequest.to_bytes()?;
    let mut buf = vec![0u8; MAX_DATAGRAM];
    let mut attempts = 0u32;

    loop {
        socket.send_to(&request, server_addr).await?;

        match tokio::time::timeout(config.request_timeout(), socket.recv_from(&mut buf)).await {
            Ok(Ok((len, _))) => match ControlMessage::from_bytes(&buf[..len]) {
                Ok(ControlMessage::FileList(msg)) => return Ok(msg.entries),
                Ok(ControlMessage::Shutdown) => return Err(Error::ConnectionClosed),
                _ => {}
            },
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                attempts += 1;
                if attempts > config.retry_limit {
                    return Err(Error::Timeout {
                        context: "file list",
                        attempts,
                    });
                }
                debug!("카탈로그 응답 타임아웃, 재요청: attempt={}", attempts);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_even() {
        let ranges = partition(1000, 4);
        assert_eq!(ranges.len(), 4);
        for (i, range) in ranges.iter().enumerate() {
            assert_eq!(range.part_index, i as u32);
            assert_eq!(range.offset, i as u64 * 250);
            assert_eq!(range.length, 250);
        }
    }

    #[test]
    fn test_partition_remainder_into_last() {
        let ranges = partition(1_000_003, 4);
        assert_eq!(
            ranges
                .iter()
                .map(|r| (r.offset, r.length))
                .collect::<Vec<_>>(),
            vec![
                (0, 250_000),
                (250_000, 250_000),
                (500_000, 250_000),
                (750_000, 250_003),
            ]
        );
    }

    #[test]
    fn test_partition_invariants() {
        for (size, parts) in [(0u64, 1u32), (1, 1), (3, 4), (10, 3), (65537, 7)] {
            let ranges = partition(size, parts);
            assert_eq!(ranges.len(), parts as usize);

            // 연속·비중첩, 합은 전체 크기
            let mut cursor = 0u64;
            for (i, range) in ranges.iter().enumerate() {
                assert_eq!(range.part_index, i as u32);
                assert_eq!(range.offset, cursor);
                cursor += range.length;
            }
            assert_eq!(cursor, size);
        }
    }

    #[test]
    fn test_partition_single_part() {
        let ranges = partition(12345, 1);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].offset, 0);
        assert_eq!(ranges[0].length, 12345);
    }
}
