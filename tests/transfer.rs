//! 루프백 통합 테스트: 실제 UDP 소켓으로 서버-클라이언트 왕복을 검증한다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::net::UdpSocket;

use pft::message::{ControlMessage, NotFoundMessage, PartRequest, ReplyTag};
use pft::{
    Config, Error, FileCatalog, Listener, Packet, PartReceiver, PartSender, ProgressBoard,
    Shutdown, TransferSession, TransferStats,
};

/// 루프백용 설정 (유효 경로는 넉넉한 타임아웃)
fn test_config() -> Config {
    Config {
        payload_size: 1024,
        part_count: 4,
        retry_limit: 3,
        ack_timeout_ms: 2000,
        request_timeout_ms: 2000,
        join_grace_ms: 1000,
    }
}

/// 스크립트된 서버 소켓에서 컨트롤 응답 하나 수신
async fn recv_reply(server: &UdpSocket) -> ControlMessage {
    let mut reply_buf = vec![0u8; 2048];
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), server.recv_from(&mut reply_buf))
        .await
        .expect("응답 없음")
        .unwrap();
    ControlMessage::from_bytes(&reply_buf[..len]).unwrap()
}

/// 결정적 테스트 패턴 생성
fn pattern_data(size: usize) -> Vec<u8> {
    let mut data = vec![0u8; size];
    for (i, byte) in data.iter_mut().enumerate() {
        *byte = (i % 251) as u8;
    }
    data
}

/// 카탈로그 루트에 리스너를 띄우고 (서버 주소, 종료 토큰, 핸들) 반환
async fn spawn_server(
    root: &std::path::Path,
    config: Config,
) -> (SocketAddr, Shutdown, tokio::task::JoinHandle<pft::Result<()>>) {
    let catalog = Arc::new(FileCatalog::scan(root, None).unwrap());
    let shutdown = Shutdown::new();
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    let listener = Listener::new(catalog, config, shutdown.clone());
    let handle = tokio::spawn(async move { listener.run(socket).await });

    (addr, shutdown, handle)
}

#[tokio::test(flavor = "multi_thread")]
async fn round_trip_uneven_size() {
    // 1,000,003 bytes / 4 parts → {250000, 250000, 250000, 250003}
    let server_dir = tempfile::tempdir().unwrap();
    let data = pattern_data(1_000_003);
    std::fs::write(server_dir.path().join("data.bin"), &data).unwrap();

    let config = test_config();
    let (server_addr, shutdown, server_handle) = spawn_server(server_dir.path(), config.clone()).await;

    let client_dir = tempfile::tempdir().unwrap();
    let staging = client_dir.path().join("parts");
    let output = client_dir.path().join("downloads");

    let entries = pft::fetch_file_list(server_addr, &config).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "data.bin");
    assert_eq!(entries[0].size_bytes, 1_000_003);

    let session = TransferSession::new(config, server_addr, &staging, &output, shutdown.clone());
    let output_path = session.download("data.bin", 1_000_003).await.unwrap();

    let merged = std::fs::read(&output_path).unwrap();
    assert_eq!(merged.len(), data.len());
    assert_eq!(merged, data, "병합 결과가 원본과 달라짐");

    // 병합 후 파트 파일은 남지 않음
    for i in 0..4 {
        assert!(!staging.join(format!("data.bin.part{}", i)).exists());
    }

    shutdown.request();
    server_handle.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn round_trip_tiny_file_more_parts_than_bytes() {
    // 크기 3, 파트 4 → 앞 3개 파트는 길이 0
    let server_dir = tempfile::tempdir().unwrap();
    std::fs::write(server_dir.path().join("tiny.bin"), b"abc").unwrap();

    let config = test_config();
    let (server_addr, shutdown, server_handle) = spawn_server(server_dir.path(), config.clone()).await;

    let client_dir = tempfile::tempdir().unwrap();
    let session = TransferSession::new(
        config,
        server_addr,
        &client_dir.path().join("parts"),
        &client_dir.path().join("out"),
        shutdown.clone(),
    );

    let output_path = session.download("tiny.bin", 3).await.unwrap();
    assert_eq!(std::fs::read(&output_path).unwrap(), b"abc");

    shutdown.request();
    server_handle.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_name_gets_not_found_reply() {
    let server_dir = tempfile::tempdir().unwrap();
    std::fs::write(server_dir.path().join("real.bin"), b"data").unwrap();

    let config = test_config();
    let (server_addr, shutdown, server_handle) = spawn_server(server_dir.path(), config.clone()).await;

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let request = ControlMessage::PartRequest(PartRequest {
        file_name: "missing.bin".into(),
        offset: 0,
        length: 16,
        part_index: 0,
    });
    socket
        .send_to(&request.to_bytes().unwrap(), server_addr)
        .await
        .unwrap();

    let mut buf = vec![0u8; 2048];
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .expect("NotFound 응답 없음")
        .unwrap();

    match ControlMessage::from_bytes(&buf[..len]).unwrap() {
        ControlMessage::NotFound(NotFoundMessage { file_name }) => {
            assert_eq!(file_name, "missing.bin");
        }
        other => panic!("unexpected reply: {:?}", other.msg_type()),
    }

    shutdown.request();
    server_handle.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn download_of_unknown_file_fails_and_cleans_up() {
    let server_dir = tempfile::tempdir().unwrap();
    std::fs::write(server_dir.path().join("real.bin"), b"data").unwrap();

    let config = test_config();
    let (server_addr, shutdown, server_handle) = spawn_server(server_dir.path(), config.clone()).await;

    let client_dir = tempfile::tempdir().unwrap();
    let staging = client_dir.path().join("parts");
    let session = TransferSession::new(
        config,
        server_addr,
        &staging,
        &client_dir.path().join("out"),
        shutdown.clone(),
    );

    let err = session.download("missing.bin", 4096).await.unwrap_err();
    match err {
        Error::PartsFailed { parts } => assert_eq!(parts, vec![0, 1, 2, 3]),
        other => panic!("unexpected error: {}", other),
    }

    // 실패한 다운로드의 부분 파트는 폐기됨
    for i in 0..4 {
        assert!(!staging.join(format!("missing.bin.part{}", i)).exists());
    }

    shutdown.request();
    server_handle.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_packet_acked_but_appended_once() {
    // 스크립트된 서버로 수신자의 중복/거부 동작 검증
    let config = Config {
        payload_size: 4,
        part_count: 1,
        retry_limit: 5,
        ack_timeout_ms: 2000,
        request_timeout_ms: 2000,
        join_grace_ms: 1000,
    };

    let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server_addr = server.local_addr().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let part_path = dir.path().join("scripted.part0");

    let request = PartRequest {
        file_name: "scripted".into(),
        offset: 0,
        length: 8,
        part_index: 0,
    };

    let shutdown = Shutdown::new();
    let board = Arc::new(ProgressBoard::new("scripted", 1, false));
    let stats = Arc::new(Mutex::new(TransferStats::new()));

    let receiver = PartReceiver::bind(config, server_addr, shutdown)
        .await
        .unwrap();
    let run_request = request.clone();
    let run_path = part_path.clone();
    let run_board = board.clone();
    let run_stats = stats.clone();
    let handle = tokio::spawn(async move {
        receiver
            .run(&run_request, &run_path, &run_board, &run_stats)
            .await
    });

    let mut buf = vec![0u8; 2048];

    // 파트 요청 수신
    let (len, client_addr) = server.recv_from(&mut buf).await.unwrap();
    assert!(matches!(
        ControlMessage::from_bytes(&buf[..len]).unwrap(),
        ControlMessage::PartRequest(_)
    ));

    // seq 0 전송 → ACK(0,0)
    let packet0 = Packet::new(0, 0, Bytes::from_static(b"aaaa"));
    server
        .send_to(&packet0.to_bytes(), client_addr)
        .await
        .unwrap();
    match recv_reply(&server).await {
        ControlMessage::Ack(tag) => assert_eq!(tag, ReplyTag::new(0, 0)),
        other => panic!("expected Ack, got {:?}", other.msg_type()),
    }

    // seq 0 중복 재전송 → 다시 ACK(0,0), 데이터는 한 번만 기록되어야 함
    server
        .send_to(&packet0.to_bytes(), client_addr)
        .await
        .unwrap();
    match recv_reply(&server).await {
        ControlMessage::Ack(tag) => assert_eq!(tag, ReplyTag::new(0, 0)),
        other => panic!("expected duplicate Ack, got {:?}", other.msg_type()),
    }

    // 체크섬이 깨진 seq 1 → NAK(0,1), 상태 전진 없음
    let mut corrupted = Packet::new(0, 1, Bytes::from_static(b"bbbb")).to_bytes();
    let last = corrupted.len() - 1;
    corrupted[last] ^= 0xFF;
    server.send_to(&corrupted, client_addr).await.unwrap();
    match recv_reply(&server).await {
        ControlMessage::Nak(tag) => assert_eq!(tag, ReplyTag::new(0, 1)),
        other => panic!("expected Nak, got {:?}", other.msg_type()),
    }

    // 정상 seq 1 → ACK(0,1), 파트 완료
    let packet1 = Packet::new(0, 1, Bytes::from_static(b"bbbb"));
    server
        .send_to(&packet1.to_bytes(), client_addr)
        .await
        .unwrap();
    match recv_reply(&server).await {
        ControlMessage::Ack(tag) => assert_eq!(tag, ReplyTag::new(0, 1)),
        other => panic!("expected Ack, got {:?}", other.msg_type()),
    }

    handle.await.unwrap().unwrap();

    // 중복분은 덧붙지 않음
    assert_eq!(std::fs::read(&part_path).unwrap(), b"aaaabbbb");

    let stats = stats.lock().clone();
    assert_eq!(stats.accepted_packets, 2);
    assert_eq!(stats.duplicate_packets, 1);
    assert_eq!(stats.checksum_failures, 1);
    assert_eq!(stats.naks_sent, 1);
    assert!(board.is_complete());
}

#[tokio::test(flavor = "multi_thread")]
async fn receiver_gives_up_after_retry_limit() {
    // 응답 없는 서버 → 재시도 한도 초과로 파트 실패
    let config = Config {
        payload_size: 1024,
        part_count: 1,
        retry_limit: 2,
        ack_timeout_ms: 100,
        request_timeout_ms: 100,
        join_grace_ms: 500,
    };

    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let silent_addr = silent.local_addr().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let board = ProgressBoard::new("never", 1, false);
    let stats = Mutex::new(TransferStats::new());

    let receiver = PartReceiver::bind(config, silent_addr, Shutdown::new())
        .await
        .unwrap();
    let request = PartRequest {
        file_name: "never".into(),
        offset: 0,
        length: 4096,
        part_index: 0,
    };

    let err = receiver
        .run(&request, &dir.path().join("never.part0"), &board, &stats)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::RetryExhausted {
            part_index: 0,
            attempts: 3,
        }
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn sender_gives_up_after_retry_limit() {
    // ACK를 전혀 보내지 않는 피어 → 송신측 재시도 한도 초과
    let config = Config {
        payload_size: 64,
        part_count: 1,
        retry_limit: 2,
        ack_timeout_ms: 100,
        request_timeout_ms: 100,
        join_grace_ms: 500,
    };

    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let silent_addr = silent.local_addr().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("src.bin");
    std::fs::write(&file_path, pattern_data(128)).unwrap();

    let sender = PartSender::bind(config, silent_addr, Shutdown::new())
        .await
        .unwrap();
    let request = PartRequest {
        file_name: "src.bin".into(),
        offset: 0,
        length: 128,
        part_index: 0,
    };

    let err = sender.run(&file_path, &request).await.unwrap_err();
    assert!(matches!(
        err,
        Error::RetryExhausted {
            part_index: 0,
            attempts: 3,
        }
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_notice_aborts_inflight_receiver() {
    let config = test_config();

    let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server_addr = server.local_addr().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let board = Arc::new(ProgressBoard::new("doomed", 1, false));
    let stats = Arc::new(Mutex::new(TransferStats::new()));

    let receiver = PartReceiver::bind(config, server_addr, Shutdown::new())
        .await
        .unwrap();
    let request = PartRequest {
        file_name: "doomed".into(),
        offset: 0,
        length: 4096,
        part_index: 0,
    };
    let part_path = dir.path().join("doomed.part0");
    let run_board = board.clone();
    let run_stats = stats.clone();
    let handle = tokio::spawn(async move {
        receiver
            .run(&request, &part_path, &run_board, &run_stats)
            .await
    });

    // 파트 요청을 받고 종료 알림으로 응답
    let mut buf = vec![0u8; 2048];
    let (_, client_addr) = server.recv_from(&mut buf).await.unwrap();
    server
        .send_to(
            &ControlMessage::Shutdown.to_bytes().unwrap(),
            client_addr,
        )
        .await
        .unwrap();

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed));
}

#[tokio::test(flavor = "multi_thread")]
async fn listener_notifies_peers_on_shutdown() {
    let server_dir = tempfile::tempdir().unwrap();
    std::fs::write(server_dir.path().join("a.bin"), b"abcd").unwrap();

    let config = test_config();
    let (server_addr, shutdown, server_handle) = spawn_server(server_dir.path(), config).await;

    // 목록을 한 번 요청해서 피어로 등록
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket
        .send_to(
            &ControlMessage::FileListRequest.to_bytes().unwrap(),
            server_addr,
        )
        .await
        .unwrap();

    let mut buf = vec![0u8; 65535];
    let (len, _) = socket.recv_from(&mut buf).await.unwrap();
    assert!(matches!(
        ControlMessage::from_bytes(&buf[..len]).unwrap(),
        ControlMessage::FileList(_)
    ));

    shutdown.request();

    // 종료 알림 수신
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .expect("종료 알림 없음")
        .unwrap();
    assert!(matches!(
        ControlMessage::from_bytes(&buf[..len]).unwrap(),
        ControlMessage::Shutdown
    ));

    server_handle.await.unwrap().unwrap();
}
