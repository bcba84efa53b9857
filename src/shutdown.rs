//! 종료 토큰
//!
//! 시그널 핸들러는 `request()`로 플래그만 세우고, 실제 정리는
//! `notified()`를 기다리던 수퍼바이저가 수행한다. 모든 워커는 루프마다
//! `is_requested()`를 확인하고, 종료 중 발생한 소켓 에러를 취소로 취급한다.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// 프로세스 전역 종료 토큰 (clone으로 워커에 전달)
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    requested: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// 종료 요청 (시그널 핸들러에서 호출해도 안전: I/O 없음)
    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// 종료 요청 여부
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// 종료 요청까지 대기
    pub async fn notified(&self) {
        // 등록 후 플래그 확인: 등록 전에 도착한 request()를 놓치지 않는다
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_requested() {
            return;
        }
        notified.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_wakes_waiter() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_requested());

        let waiter = shutdown.clone();
        let handle = tokio::spawn(async move {
            waiter.notified().await;
            waiter.is_requested()
        });

        tokio::task::yield_now().await;
        shutdown.request();

        assert!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn test_notified_after_request_returns_immediately() {
        let shutdown = Shutdown::new();
        shutdown.request();
        shutdown.notified().await;
        assert!(shutdown.is_requested());
    }
}
