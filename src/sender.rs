//! 파트 송신자 (서버측)
//!
//! - 요청된 바이트 구간을 유닛으로 잘라 stop-and-wait으로 전송
//! - 방금 보낸 (part, seq)에 맞는 ACK만 수락, NAK/타임아웃이면 동일 유닛 재전송
//! - 어긋난 (part, seq) 응답은 무시 (stale/중복 ACK 방어)
//! - 재시도 한도 초과는 파트 실패로 상위 전파

use std::io::SeekFrom;
use std::net::SocketAddr;
use std::path::Path;

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::message::{ControlMessage, PartRequest};
use crate::packet::Packet;
use crate::shutdown::Shutdown;
use crate::MAX_DATAGRAM;

/// 파트 1개를 요청자에게 전송하는 송신자
///
/// 파트 요청마다 새 소켓에 바인딩되어 accept 루프와 독립적으로 동작한다.
pub struct PartSender {
    config: Config,
    socket: UdpSocket,
    peer: SocketAddr,
    shutdown: Shutdown,
}

impl PartSender {
    /// 새 소켓을 바인딩해서 요청자 전용 송신자 생성
    pub async fn bind(config: Config, peer: SocketAddr, shutdown: Shutdown) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        Ok(Self {
            config,
            socket,
            peer,
            shutdown,
        })
    }

    /// 파트 전체 전송. 마지막 유닛의 ACK까지 확인되면 완료.
    pub async fn run(&self, file_path: &Path, request: &PartRequest) -> Result<()> {
        let mut file = File::open(file_path).await?;
        file.seek(SeekFrom::Start(request.offset)).await?;

        let mut buf = vec![0u8; self.config.payload_size];
        let mut sequence = 0u32;
        let mut sent = 0u64;

        while sent < request.length {
            if self.shutdown.is_requested() {
                return Err(Error::ShuttingDown);
            }

            let unit_len = ((request.length - sent) as usize).min(self.config.payload_size);
            file.read_exact(&mut buf[..unit_len]).await?;

            let packet = Packet::new(
                request.part_index,
                sequence,
                Bytes::copy_from_slice(&buf[..unit_len]),
            );
            self.exchange(&packet).await?;

            sent += unit_len as u64;
            sequence += 1;
        }

        debug!(
            "파트 {} 전송 완료: {} bytes, {} units, peer={}",
            request.part_index, sent, sequence, self.peer
        );
        Ok(())
    }

    /// stop-and-wait 교환: 전송 후 일치하는 ACK가 올 때까지 대기
    async fn exchange(&self, packet: &Packet) -> Result<()> {
        let bytes = packet.to_bytes();
        let mut recv_buf = vec![0u8; MAX_DATAGRAM];
        let mut attempts = 0u32;

        self.socket.send_to(&bytes, self.peer).await?;

        loop {
            match tokio::time::timeout(
                self.config.ack_timeout(),
                self.socket.recv_from(&mut recv_buf),
            )
            .await
            {
                Ok(Ok((len, _addr))) => {
                    let reply = match ControlMessage::from_bytes(&recv_buf[..len]) {
                        Ok(reply) => reply,
                        Err(_) => continue,
                    };

                    match reply {
                        ControlMessage::Ack(tag)
                            if tag.matches(packet.part_index, packet.sequence) =>
                        {
                            return Ok(());
                        }
                        ControlMessage::Nak(tag)
                            if tag.matches(packet.part_index, packet.sequence) =>
                        {
                            attempts += 1;
                            if attempts > self.config.retry_limit {
                                warn!(
                                    "재시도 한도 초과 (NAK): part={}, seq={}",
                                    packet.part_index, packet.sequence
                                );
                                return Err(Error::RetryExhausted {
                                    part_index: packet.part_index,
                                    attempts,
                                });
                            }
                            debug!(
                                "NAK 수신, 재전송: part={}, seq={}, attempt={}",
                                packet.part_index, packet.sequence, attempts
                            );
                            self.socket.send_to(&bytes, self.peer).await?;
                        }
                        // 어긋난 (part, seq) 응답은 무시하고 계속 대기
                        _ => {}
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
                    attempts += 1;
                    if attempts > self.config.retry_limit {
                        warn!(
                            "재시도 한도 초과 (타임아웃): part={}, seq={}",
                            packet.part_index, packet.sequence
                        );
                        return Err(Error::RetryExhausted {
                            part_index: packet.part_index,
                            attempts,
                        });
                    }
                    debug!(
                        "응답 타임아웃, 재전송: part={}, seq={}, attempt={}",
                        packet.part_index, packet.sequence, attempts
                    );
                    self.socket.send_to(&bytes, self.peer).await?;
                }
            }
        }
    }
}
