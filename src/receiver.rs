//! 파트 수신자 (클라이언트측)
//!
//! - 컨트롤 소켓으로 파트 요청을 보내고, 파트 전용 서버 소켓에서 오는
//!   데이터 패킷을 수신
//! - 체크섬/시퀀스가 맞는 패킷만 파트 파일에 덧붙이고 ACK
//! - 이미 수락한 (part, seq) 중복은 버리되 다시 ACK (송신측 ACK 유실 복구)
//! - 불일치 패킷은 기대 시퀀스로 NAK, 상태 변화 없음 (out-of-order 버퍼링 없음)

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;

use parking_lot::Mutex;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::message::{self, ControlMessage, PartRequest, ReplyTag};
use crate::packet::Packet;
use crate::shutdown::Shutdown;
use crate::stats::{ProgressBoard, TransferStats};
use crate::MAX_DATAGRAM;

/// 파트 1개를 내려받는 수신자
///
/// 워커(태스크)마다 하나씩, 독립 소켓을 소유한다.
pub struct PartReceiver {
    config: Config,
    socket: UdpSocket,
    server_addr: SocketAddr,
    shutdown: Shutdown,
}

impl PartReceiver {
    /// 새 소켓을 바인딩해서 수신자 생성
    pub async fn bind(config: Config, server_addr: SocketAddr, shutdown: Shutdown) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        Ok(Self {
            config,
            socket,
            server_addr,
            shutdown,
        })
    }

    /// 파트 다운로드. 누적 길이가 요청 길이에 도달하면 완료.
    pub async fn run(
        &self,
        request: &PartRequest,
        part_path: &Path,
        board: &ProgressBoard,
        stats: &Mutex<TransferStats>,
    ) -> Result<()> {
        let mut part_file = File::create(part_path).await?;

        let request_bytes = ControlMessage::PartRequest(request.clone()).to_bytes()?;
        self.socket
            .send_to(&request_bytes, self.server_addr)
            .await?;

        let mut expected = 0u32;
        let mut accepted: HashSet<(u32, u32)> = HashSet::new();
        let mut received = 0u64;
        let mut peer: Option<SocketAddr> = None;
        let mut consecutive_timeouts = 0u32;
        let mut recv_buf = vec![0u8; MAX_DATAGRAM];

        while received < request.length {
            if self.shutdown.is_requested() {
                return Err(Error::ShuttingDown);
            }

            match tokio::time::timeout(
                self.config.ack_timeout(),
                self.socket.recv_from(&mut recv_buf),
            )
            .await
            {
                Ok(Ok((len, addr))) => {
                    consecutive_timeouts = 0;
                    let datagram = &recv_buf[..len];

                    if message::is_control(datagram) {
                        match ControlMessage::from_bytes(datagram) {
                            Ok(ControlMessage::Shutdown) => {
                                warn!("서버 종료 알림 수신: part={}", request.part_index);
                                return Err(Error::ConnectionClosed);
                            }
                            Ok(ControlMessage::NotFound(msg)) => {
                                return Err(Error::FileNotFound {
                                    name: msg.file_name,
                                });
                            }
                            _ => {}
                        }
                        continue;
                    }

                    let packet = match Packet::from_bytes(datagram) {
                        Ok(packet) => packet,
                        Err(_) => continue,
                    };
                    if packet.part_index != request.part_index {
                        continue;
                    }
                    peer = Some(addr);

                    let key = (packet.part_index, packet.sequence);
                    if accepted.contains(&key) {
                        // 중복: 데이터는 버리고 ACK만 다시 보냄 (진행률 미반영)
                        stats.lock().duplicate_packets += 1;
                        self.reply(ControlMessage::Ack(ReplyTag::new(
                            packet.part_index,
                            packet.sequence,
                        )), addr)
                        .await?;
                        continue;
                    }

                    match packet.validate(expected) {
                        Ok(()) => {
                            part_file.write_all(&packet.payload).await?;
                            received += packet.payload.len() as u64;
                            accepted.insert(key);
                            expected += 1;

                            {
                                let mut stats = stats.lock();
                                stats.accepted_packets += 1;
                                stats.total_bytes += packet.payload.len() as u64;
                            }
                            self.reply(ControlMessage::Ack(ReplyTag::new(
                                packet.part_index,
                                packet.sequence,
                            )), addr)
                            .await?;

                            board.update(
                                request.part_index,
                                received as f64 / request.length as f64 * 100.0,
                            );
                        }
                        Err(reason) => {
                            {
                                let mut stats = stats.lock();
                                match reason {
                                    Error::ChecksumMismatch { .. } => stats.checksum_failures += 1,
                                    Error::SequenceMismatch { .. } => stats.sequence_failures += 1,
                                    _ => {}
                                }
                                stats.naks_sent += 1;
                            }
                            debug!("패킷 거부, NAK 전송: {}", reason);
                            self.reply(ControlMessage::Nak(ReplyTag::new(
                                request.part_index,
                                expected,
                            )), addr)
                            .await?;
                        }
                    }
                }
                Ok(Err(e)) => {
                    if self.shutdown.is_requested() {
                        debug!("종료 중 소켓 에러, 취소 처리: {}", e);
                        return Err(Error::ShuttingDown);
                    }
                    return Err(e.into());
                }
                Err(_) => {
                    if self.shutdown.is_requested() {
                        return Err(Error::ShuttingDown);
                    }
                    consecutive_timeouts += 1;
                    stats.lock().timeouts += 1;
                    if consecutive_timeouts > self.config.retry_limit {
                        warn!(
                            "재시도 한도 초과: part={}, expected seq={}",
                            request.part_index, expected
                        );
                        return Err(Error::RetryExhausted {
                            part_index: request.part_index,
                            attempts: consecutive_timeouts,
                        });
                    }
                    match peer {
                        // 송신자를 알면 기대 시퀀스로 NAK를 보내 재전송을 유도
                        Some(addr) => {
                            stats.lock().naks_sent += 1;
                            self.reply(ControlMessage::Nak(ReplyTag::new(
                                request.part_index,
                                expected,
                            )), addr)
                            .await?;
                        }
                        // 첫 패킷 전이면 파트 요청 자체가 유실됐을 수 있음
                        None => {
                            debug!(
                                "파트 요청 재전송: part={}, attempt={}",
                                request.part_index, consecutive_timeouts
                            );
                            self.socket
                                .send_to(&request_bytes, self.server_addr)
                                .await?;
                        }
                    }
                }
            }
        }

        // 길이 0 파트도 보드에는 완료로 반영
        board.update(request.part_index, 100.0);

        part_file.flush().await?;
        debug!(
            "파트 {} 수신 완료: {} bytes, {} units",
            request.part_index, received, expected
        );
        Ok(())
    }

    async fn reply(&self, message: ControlMessage, addr: SocketAddr) -> Result<()> {
        self.socket.send_to(&message.to_bytes()?, addr).await?;
        Ok(())
    }
}
