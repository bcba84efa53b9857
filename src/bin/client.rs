//! PFT 클라이언트 - Parallel File Transfer
//!
//! stop-and-wait ARQ 병렬 파일 전송 프로토콜 클라이언트
//! - 서버 카탈로그 조회 후 파일을 N개 파트로 병렬 수신, 순서대로 병합
//! - 요청 목록 파일을 주기적으로 읽는 watch 모드 지원
//!
//! 사용법:
//!   cargo run --release --bin pft-client -- [OPTIONS] [FILES...]
//!
//! 예시:
//!   # 목록 조회
//!   cargo run --release --bin pft-client -- --server 127.0.0.1:6264 --list
//!
//!   # 파일 2개 다운로드
//!   cargo run --release --bin pft-client -- -s 127.0.0.1:6264 data.bin video.mp4

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use pft::catalog::format_size;
use pft::{fetch_file_list, Config, Shutdown, TransferSession};

/// 클라이언트 설정
struct ClientArgs {
    server_addr: SocketAddr,
    staging_dir: PathBuf,
    output_dir: PathBuf,
    list_only: bool,
    watch: Option<PathBuf>,
    files: Vec<String>,
    config: Config,
}

impl Default for ClientArgs {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:6264".parse().unwrap(),
            staging_dir: PathBuf::from("parts"),
            output_dir: PathBuf::from("downloads"),
            list_only: false,
            watch: None,
            files: Vec::new(),
            config: Config::default(),
        }
    }
}

fn parse_args() -> ClientArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut client_args = ClientArgs::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--server" | "-s" => {
                if i + 1 < args.len() {
                    client_args.server_addr = args[i + 1].parse().expect("유효한 주소 필요");
                    i += 1;
                }
            }
            "--staging" => {
                if i + 1 < args.len() {
                    client_args.staging_dir = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--output" | "-o" => {
                if i + 1 < args.len() {
                    client_args.output_dir = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--parts" | "-n" => {
                if i + 1 < args.len() {
                    client_args.config.part_count = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--payload-size" => {
                if i + 1 < args.len() {
                    client_args.config.payload_size =
                        args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--retries" => {
                if i + 1 < args.len() {
                    client_args.config.retry_limit = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--timeout" => {
                if i + 1 < args.len() {
                    client_args.config.ack_timeout_ms =
                        args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--list" | "-l" => client_args.list_only = true,
            "--watch" | "-w" => {
                if i + 1 < args.len() {
                    client_args.watch = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!(
                    r#"PFT Client - Parallel File Transfer 클라이언트

stop-and-wait ARQ 병렬 파일 전송 프로토콜 클라이언트
- 파일을 N개 파트로 병렬 수신, 파트 인덱스 순서대로 병합
- 요청 목록 파일을 주기적으로 읽는 watch 모드 지원

사용법:
  cargo run --release --bin pft-client -- [OPTIONS] [FILES...]

옵션:
  -s, --server <ADDR>     서버 주소 (기본: 127.0.0.1:6264)
  --staging <DIR>         파트 파일 저장 디렉토리 (기본: parts)
  -o, --output <DIR>      병합된 파일 저장 디렉토리 (기본: downloads)
  -n, --parts <N>         파트 수 (기본: 4)
  --payload-size <SIZE>   데이터그램 페이로드 크기 바이트 (기본: 1024)
  --retries <N>           재시도 한도 (기본: 3)
  --timeout <MS>          패킷 대기 타임아웃 밀리초 (기본: 3000)
  -l, --list              파일 목록만 출력하고 종료
  -w, --watch <PATH>      요청 목록 파일을 5초마다 읽어 다운로드
  -h, --help              이 도움말 출력

예시:
  # 목록 조회
  cargo run --release --bin pft-client -- -s 192.168.1.10:6264 --list

  # 8개 파트로 다운로드
  cargo run --release --bin pft-client -- -s 192.168.1.10:6264 -n 8 data.bin

  # watch 모드
  cargo run --release --bin pft-client -- -s 192.168.1.10:6264 --watch input.txt
"#
                );
                std::process::exit(0);
            }
            name => client_args.files.push(name.to_string()),
        }
        i += 1;
    }

    client_args
}

/// 서버 카탈로그 출력
fn print_available_files(available: &[(String, u64)]) {
    println!("Available files on the server:");
    for (name, size_bytes) in available {
        println!("  {}: {}", name, format_size(*size_bytes));
    }
    println!("{}", "-".repeat(30));
}

/// 파일 1개 다운로드 (카탈로그에 없으면 파트 요청 없이 보고만)
async fn download_one(
    session: &TransferSession,
    available: &HashMap<String, u64>,
    name: &str,
    downloaded: &mut HashSet<String>,
) {
    if downloaded.contains(name) {
        return;
    }

    let Some(&size) = available.get(name) else {
        // 전송 에러와 구분되는 별도 보고
        error!("파일이 서버 카탈로그에 없음: {}", name);
        println!("Error: {} does not exist on the server.", name);
        return;
    };

    println!("\nDownloading {} ({}) ...", name, format_size(size));
    match session.download(name, size).await {
        Ok(path) => {
            downloaded.insert(name.to_string());
            println!("File {} has been downloaded to {:?}.", name, path);
        }
        Err(e) => {
            error!("다운로드 실패 {}: {}", name, e);
            println!("Error: failed to download {}: {}", name, e);
        }
    }
}

/// watch 모드: 요청 목록 파일을 주기적으로 읽어 새 파일만 다운로드
async fn watch_loop(
    session: &TransferSession,
    available: &HashMap<String, u64>,
    watch_path: &std::path::Path,
    downloaded: &mut HashSet<String>,
    shutdown: &Shutdown,
) {
    info!("watch 모드 시작: {:?}", watch_path);

    while !shutdown.is_requested() {
        match tokio::fs::read_to_string(watch_path).await {
            Ok(content) => {
                let content = content.trim();
                if content.is_empty() {
                    warn!("요청 목록이 비어 있음: {:?}", watch_path);
                } else {
                    for name in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
                        if shutdown.is_requested() {
                            break;
                        }
                        download_one(session, available, name, downloaded).await;
                    }
                }
            }
            Err(e) => {
                error!("요청 목록 읽기 실패 {:?}: {}", watch_path, e);
                break;
            }
        }

        tokio::select! {
            _ = shutdown.notified() => break,
            _ = tokio::time::sleep(Duration::from_secs(5)) => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = parse_args();

    info!("PFT Client starting...");
    info!("Server address: {}", args.server_addr);
    info!("Part count: {}", args.config.part_count);

    // 카탈로그 조회
    let entries = fetch_file_list(args.server_addr, &args.config).await?;
    let listing: Vec<(String, u64)> = entries
        .iter()
        .map(|e| (e.name.clone(), e.size_bytes))
        .collect();
    print_available_files(&listing);

    if args.list_only {
        return Ok(());
    }

    let available: HashMap<String, u64> = listing.into_iter().collect();

    let shutdown = Shutdown::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("SIGINT 수신, 종료 요청");
            signal_shutdown.request();
        }
    });

    let session = TransferSession::new(
        args.config.clone(),
        args.server_addr,
        &args.staging_dir,
        &args.output_dir,
        shutdown.clone(),
    )
    .with_progress_render(true);

    let mut downloaded: HashSet<String> = HashSet::new();

    for name in &args.files {
        if shutdown.is_requested() {
            break;
        }
        download_one(&session, &available, name, &mut downloaded).await;
    }

    if let Some(watch_path) = &args.watch {
        watch_loop(&session, &available, watch_path, &mut downloaded, &shutdown).await;
    }

    info!("{}", session.stats().summary());
    Ok(())
}
