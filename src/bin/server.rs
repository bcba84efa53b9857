//! PFT 서버 - Parallel File Transfer
//!
//! stop-and-wait ARQ 병렬 파일 전송 프로토콜 서버
//! - 기동 시 서버 루트를 1회 스캔해서 카탈로그 구성 (빈 루트는 기동 실패)
//! - 파트 요청마다 전용 소켓의 송신 태스크 분기
//!
//! 사용법:
//!   cargo run --release --bin pft-server -- [OPTIONS]
//!
//! 예시:
//!   # 기본 실행
//!   cargo run --release --bin pft-server -- --bind 0.0.0.0:6264 --root files
//!
//!   # 불안정한 네트워크 프로파일
//!   cargo run --release --bin pft-server -- -r files --lossy

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use pft::{Config, FileCatalog, Listener, Shutdown};

/// 서버 설정
struct ServerArgs {
    bind_addr: SocketAddr,
    root: PathBuf,
    manifest: PathBuf,
    config: Config,
}

impl Default for ServerArgs {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:6264".parse().unwrap(),
            root: PathBuf::from("files"),
            manifest: PathBuf::from("manifest.txt"),
            config: Config::default(),
        }
    }
}

fn parse_args() -> ServerArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut server_args = ServerArgs::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    server_args.bind_addr = args[i + 1].parse().expect("유효한 주소 필요");
                    i += 1;
                }
            }
            "--root" | "-r" => {
                if i + 1 < args.len() {
                    server_args.root = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--manifest" => {
                if i + 1 < args.len() {
                    server_args.manifest = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--payload-size" => {
                if i + 1 < args.len() {
                    server_args.config.payload_size =
                        args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--retries" => {
                if i + 1 < args.len() {
                    server_args.config.retry_limit = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--timeout" => {
                if i + 1 < args.len() {
                    server_args.config.ack_timeout_ms =
                        args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--lossy" => {
                server_args.config = Config::lossy_network();
            }
            "--help" | "-h" => {
                println!(
                    r#"PFT Server - Parallel File Transfer 서버

stop-and-wait ARQ 병렬 파일 전송 프로토콜 서버
- 서버 루트 1회 스캔으로 카탈로그 구성, 이름→크기 목록 제공
- 파트 요청마다 전용 소켓의 송신 태스크 분기

사용법:
  cargo run --release --bin pft-server -- [OPTIONS]

옵션:
  -b, --bind <ADDR>       바인드 주소 (기본: 0.0.0.0:6264)
  -r, --root <DIR>        서비스할 파일 루트 (기본: files)
  --manifest <PATH>       사람이 읽을 목록 파일 경로 (기본: manifest.txt)
  --payload-size <SIZE>   데이터그램 페이로드 크기 바이트 (기본: 1024)
  --retries <N>           유닛당 재시도 한도 (기본: 3)
  --timeout <MS>          ACK 대기 타임아웃 밀리초 (기본: 3000)
  --lossy                 불안정한 네트워크 프로파일 사용
  -h, --help              이 도움말 출력

예시:
  # 파일 서비스
  cargo run --release --bin pft-server -- --root /srv/files

  # 큰 타임아웃 + 재시도 5회
  cargo run --release --bin pft-server -- -r files --timeout 7000 --retries 5
"#
                );
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    server_args
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = parse_args();

    info!("PFT Server starting...");
    info!("Bind address: {}", args.bind_addr);
    info!("Serve root: {:?}", args.root);
    info!("Payload size: {} bytes", args.config.payload_size);
    info!("Retry limit: {}", args.config.retry_limit);
    info!("Ack timeout: {} ms", args.config.ack_timeout_ms);

    // 카탈로그 스캔 (빈 루트는 기동 실패)
    let catalog = match FileCatalog::scan(&args.root, Some(&args.manifest)) {
        Ok(catalog) => Arc::new(catalog),
        Err(e) => {
            error!("카탈로그 스캔 실패: {}", e);
            return Err(e.into());
        }
    };
    info!("Serving {} files, manifest: {:?}", catalog.len(), args.manifest);

    let shutdown = Shutdown::new();

    // 시그널 핸들러는 종료 요청만 기록, 정리는 리스너가 수행
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("SIGINT 수신, 종료 요청");
            signal_shutdown.request();
        }
    });

    let socket = UdpSocket::bind(args.bind_addr).await?;
    info!("Server listening on {}", socket.local_addr()?);

    let listener = Listener::new(catalog, args.config, shutdown);
    listener.run(socket).await?;

    info!("서버 종료 완료");
    Ok(())
}
