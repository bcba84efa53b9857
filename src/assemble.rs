//! 파트 조립기
//!
//! 완료된 파트 파일들을 인덱스 순서(0..N-1) 그대로 출력 파일로 이어 붙인다.
//! 재배열은 하지 않는다. 조립 정합성은 분할 규칙과 이 순서 불변식에만 의존한다.

use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{Error, Result};

/// 파트 파일들을 출력 파일로 병합하고 파트 파일을 삭제
///
/// `parts`는 인덱스 순서의 (경로, 기대 길이) 목록. 한 바이트라도 쓰기 전에
/// 모든 파트의 존재와 정확한 길이를 검증하고, 누락/부족 파트가 있으면
/// `IncompleteParts`로 실패한다.
pub async fn assemble_parts(parts: &[(PathBuf, u64)], output: &Path) -> Result<()> {
    for (i, (path, expected)) in parts.iter().enumerate() {
        let actual = match fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };
        if actual != *expected {
            return Err(Error::IncompleteParts {
                part_index: i as u32,
                expected: *expected,
                actual,
            });
        }
    }

    let mut out = File::create(output).await?;
    for (path, _) in parts {
        let mut input = File::open(path).await?;
        tokio::io::copy(&mut input, &mut out).await?;
    }
    out.flush().await?;

    for (path, _) in parts {
        fs::remove_file(path).await?;
    }

    debug!("{} 파트 병합 완료: {:?}", parts.len(), output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_assemble_in_index_order() {
        let dir = tempfile::tempdir().unwrap();
        let parts: Vec<(PathBuf, u64)> = (0..3)
            .map(|i| (dir.path().join(format!("data.bin.part{}", i)), 4u64))
            .collect();

        fs::write(&parts[0].0, b"aaaa").await.unwrap();
        fs::write(&parts[1].0, b"bbbb").await.unwrap();
        fs::write(&parts[2].0, b"cccc").await.unwrap();

        let output = dir.path().join("data.bin");
        assemble_parts(&parts, &output).await.unwrap();

        assert_eq!(fs::read(&output).await.unwrap(), b"aaaabbbbcccc");
        // 병합 후 파트 파일은 삭제됨
        for (path, _) in &parts {
            assert!(fs::metadata(path).await.is_err());
        }
    }

    #[tokio::test]
    async fn test_short_part_refused() {
        let dir = tempfile::tempdir().unwrap();
        let parts = vec![
            (dir.path().join("f.part0"), 4u64),
            (dir.path().join("f.part1"), 4u64),
        ];
        fs::write(&parts[0].0, b"aaaa").await.unwrap();
        fs::write(&parts[1].0, b"bb").await.unwrap();

        let output = dir.path().join("f");
        let err = assemble_parts(&parts, &output).await.unwrap_err();
        assert!(matches!(
            err,
            Error::IncompleteParts {
                part_index: 1,
                expected: 4,
                actual: 2,
            }
        ));

        // 출력 파일은 만들어지지 않고 파트도 남아 있음
        assert!(fs::metadata(&output).await.is_err());
        assert!(fs::metadata(&parts[0].0).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_part_refused() {
        let dir = tempfile::tempdir().unwrap();
        let parts = vec![
            (dir.path().join("g.part0"), 4u64),
            (dir.path().join("g.part1"), 4u64),
        ];
        fs::write(&parts[0].0, b"aaaa").await.unwrap();

        let err = assemble_parts(&parts, &dir.path().join("g"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::IncompleteParts {
                part_index: 1,
                expected: 4,
                actual: 0,
            }
        ));
    }
}
