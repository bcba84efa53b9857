//! 파일 카탈로그 (서버측)
//!
//! 서버 루트 바로 아래의 일반 파일을 기동 시 1회 스캔해서
//! 이름→(크기, 경로) 매핑을 만든다. 스캔 이후에는 읽기 전용이므로
//! 락 없이 공유한다. 서비스 중 재스캔은 지원하지 않는다.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// 카탈로그 항목 (생성 후 불변)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// 파일 이름 (고유 키)
    pub name: String,

    /// 파일 크기 (바이트)
    pub size_bytes: u64,
}

/// 파일 카탈로그
#[derive(Debug)]
pub struct FileCatalog {
    /// 이름 → (크기, 경로)
    files: BTreeMap<String, (u64, PathBuf)>,
}

impl FileCatalog {
    /// 서버 루트 스캔 및 카탈로그 생성
    ///
    /// 서비스할 파일이 하나도 없으면 `CatalogEmpty` (서버 기동 실패).
    /// `manifest`가 주어지면 사람이 읽을 수 있는 목록 파일을 함께 기록한다.
    pub fn scan(root: &Path, manifest: Option<&Path>) -> Result<Self> {
        let mut files = BTreeMap::new();

        for entry in fs::read_dir(root)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => {
                    warn!("UTF-8이 아닌 파일 이름 건너뜀: {:?}", path);
                    continue;
                }
            };

            let size_bytes = entry.metadata()?.len();
            files.insert(name, (size_bytes, path));
        }

        if files.is_empty() {
            return Err(Error::CatalogEmpty);
        }

        if let Some(manifest_path) = manifest {
            let mut out = fs::File::create(manifest_path)?;
            for (name, (size_bytes, _)) in &files {
                writeln!(out, "{}: {}", name, format_size(*size_bytes))?;
            }
        }

        info!("카탈로그 스캔 완료: {} 파일", files.len());

        Ok(Self { files })
    }

    /// 이름으로 조회
    pub fn lookup(&self, name: &str) -> Option<(u64, &Path)> {
        self.files
            .get(name)
            .map(|(size, path)| (*size, path.as_path()))
    }

    /// 전체 항목 (이름순)
    pub fn entries(&self) -> Vec<CatalogEntry> {
        self.files
            .iter()
            .map(|(name, (size_bytes, _))| CatalogEntry {
                name: name.clone(),
                size_bytes: *size_bytes,
            })
            .collect()
    }

    /// 항목 수
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// 바이트 크기를 KB/MB/GB/TB 단위 문자열로 변환
pub fn format_size(size_bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let size = size_bytes as f64;

    if size >= KIB.powi(4) {
        format!("{:.2}TB", size / KIB.powi(4))
    } else if size >= KIB.powi(3) {
        format!("{:.2}GB", size / KIB.powi(3))
    } else if size >= KIB.powi(2) {
        format!("{:.2}MB", size / KIB.powi(2))
    } else if size >= KIB {
        format!("{:.2}KB", size / KIB)
    } else {
        format!("{}B", size_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("alpha.bin"), vec![0u8; 1500]).unwrap();
        fs::write(dir.path().join("beta.bin"), b"hello").unwrap();
        fs::create_dir(dir.path().join("subdir")).unwrap();

        let manifest = dir.path().join("manifest.txt");
        let catalog = FileCatalog::scan(dir.path(), Some(&manifest)).unwrap();

        // 하위 디렉토리는 제외, manifest 자신은 스캔 이후 생성되므로 미포함
        assert_eq!(catalog.len(), 2);

        let (size, path) = catalog.lookup("alpha.bin").unwrap();
        assert_eq!(size, 1500);
        assert!(path.ends_with("alpha.bin"));
        assert!(catalog.lookup("missing.bin").is_none());

        let entries = catalog.entries();
        assert_eq!(entries[0].name, "alpha.bin");
        assert_eq!(entries[1].name, "beta.bin");

        let written = fs::read_to_string(&manifest).unwrap();
        assert!(written.contains("alpha.bin: 1.46KB"));
        assert!(written.contains("beta.bin: 5B"));
    }

    #[test]
    fn test_empty_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            FileCatalog::scan(dir.path(), None),
            Err(Error::CatalogEmpty)
        ));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512B");
        assert_eq!(format_size(1024), "1.00KB");
        assert_eq!(format_size(1536), "1.50KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.00GB");
    }
}
