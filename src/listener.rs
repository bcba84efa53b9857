//! 컨트롤 리스너 (서버측)
//!
//! 컨트롤 소켓 하나로 들어오는 요청을 분기한다:
//! - 파일 목록 요청 → 카탈로그 응답 후 다시 대기
//! - 파트 요청 → 새 소켓의 송신 태스크를 띄우고 즉시 다시 대기 (accept 루프 비차단)
//!
//! 종료 시 새 요청 수락을 멈추고, 접촉한 피어들에게 종료를 알린 뒤
//! 떠 있는 송신 워커를 제한 시간 안에서 join한다.

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashSet;
use tokio::net::UdpSocket;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::catalog::FileCatalog;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::message::{ControlMessage, FileListMessage, NotFoundMessage, PartRequest};
use crate::sender::PartSender;
use crate::shutdown::Shutdown;
use crate::MAX_DATAGRAM;

/// 컨트롤 리스너
pub struct Listener {
    catalog: Arc<FileCatalog>,
    config: Config,
    shutdown: Shutdown,
    /// 요청을 보낸 피어 주소 (종료 알림 대상)
    clients: DashSet<SocketAddr>,
}

impl Listener {
    pub fn new(catalog: Arc<FileCatalog>, config: Config, shutdown: Shutdown) -> Self {
        Self {
            catalog,
            config,
            shutdown,
            clients: DashSet::new(),
        }
    }

    /// accept 루프 실행. 종료 요청이 올 때까지 돌아간다.
    pub async fn run(&self, socket: UdpSocket) -> Result<()> {
        let socket = Arc::new(socket);
        let mut workers: JoinSet<()> = JoinSet::new();
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("종료 요청 수신, 새 요청 수락 중단");
                    break;
                }
                result = socket.recv_from(&mut buf) => {
                    let (len, addr) = match result {
                        Ok(pair) => pair,
                        Err(e) => {
                            if self.shutdown.is_requested() {
                                debug!("종료 중 소켓 에러, 취소 처리: {}", e);
                                break;
                            }
                            warn!("수신 에러: {}", e);
                            continue;
                        }
                    };

                    // 끝난 워커 정리 (비차단)
                    while workers.try_join_next().is_some() {}

                    let message = match ControlMessage::from_bytes(&buf[..len]) {
                        Ok(message) => message,
                        Err(e) => {
                            debug!("해석 불가 데이터그램 무시 ({}): {}", addr, e);
                            continue;
                        }
                    };

                    match message {
                        ControlMessage::FileListRequest => {
                            self.clients.insert(addr);
                            let reply = ControlMessage::FileList(FileListMessage {
                                entries: self.catalog.entries(),
                            });
                            socket.send_to(&reply.to_bytes()?, addr).await?;
                            info!("파일 목록 전송: {} ({} 항목)", addr, self.catalog.len());
                        }
                        ControlMessage::PartRequest(request) => {
                            self.clients.insert(addr);
                            self.dispatch(&mut workers, request, addr, &socket).await?;
                        }
                        other => {
                            debug!("컨트롤 소켓에서 예상 밖 메시지 무시: {:?}", other.msg_type());
                        }
                    }
                }
            }
        }

        self.notify_clients(&socket).await;
        self.join_workers(workers).await;
        Ok(())
    }

    /// 파트 요청을 검증하고 전용 송신 태스크를 띄움
    async fn dispatch(
        &self,
        workers: &mut JoinSet<()>,
        request: PartRequest,
        addr: SocketAddr,
        socket: &UdpSocket,
    ) -> Result<()> {
        let entry = self.catalog.lookup(&request.file_name);

        let path = match entry {
            Some((size, path))
                if request
                    .offset
                    .checked_add(request.length)
                    .map_or(false, |end| end <= size) =>
            {
                path.to_path_buf()
            }
            Some(_) => {
                warn!(
                    "서비스 불가 구간 요청: {} [{}..+{}] ({})",
                    request.file_name, request.offset, request.length, addr
                );
                let reply = ControlMessage::NotFound(NotFoundMessage {
                    file_name: request.file_name.clone(),
                });
                socket.send_to(&reply.to_bytes()?, addr).await?;
                return Ok(());
            }
            None => {
                warn!(
                    "카탈로그에 없는 파일 요청: {} ({})",
                    request.file_name, addr
                );
                let reply = ControlMessage::NotFound(NotFoundMessage {
                    file_name: request.file_name.clone(),
                });
                socket.send_to(&reply.to_bytes()?, addr).await?;
                return Ok(());
            }
        };

        info!(
            "파트 요청 수락: {} part {} ({} bytes) ← {}",
            request.file_name, request.part_index, request.length, addr
        );

        let config = self.config.clone();
        let shutdown = self.shutdown.clone();
        workers.spawn(async move {
            let sender = match PartSender::bind(config, addr, shutdown).await {
                Ok(sender) => sender,
                Err(e) => {
                    warn!("송신 소켓 바인딩 실패: {}", e);
                    return;
                }
            };
            match sender.run(&path, &request).await {
                Ok(()) => {}
                Err(Error::ShuttingDown) => {
                    debug!("파트 {} 전송 취소 (종료 진행 중)", request.part_index);
                }
                Err(e) => warn!("파트 {} 전송 실패: {}", request.part_index, e),
            }
        });

        Ok(())
    }

    /// 접촉한 피어 전원에게 종료 알림 전송
    async fn notify_clients(&self, socket: &UdpSocket) {
        let notice = match ControlMessage::Shutdown.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("종료 알림 직렬화 실패: {}", e);
                return;
            }
        };
        let peers: Vec<SocketAddr> = self.clients.iter().map(|addr| *addr).collect();
        let peer_count = peers.len();
        for addr in peers {
            if let Err(e) = socket.send_to(&notice, addr).await {
                debug!("종료 알림 전송 실패 {}: {}", addr, e);
            }
        }
        info!("종료 알림 전송: {} 피어", peer_count);
    }

    /// 떠 있는 송신 워커들을 제한 시간 안에서 join
    async fn join_workers(&self, mut workers: JoinSet<()>) {
        let deadline = tokio::time::Instant::now() + self.config.join_grace();
        while !workers.is_empty() {
            match tokio::time::timeout_at(deadline, workers.join_next()).await {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(_) => {
                    warn!("워커 join 한도 초과, {}개 중단", workers.len());
                    workers.abort_all();
                    break;
                }
            }
        }
    }
}
