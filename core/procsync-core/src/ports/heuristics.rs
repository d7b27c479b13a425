//! Low-confidence guesses from server entry points.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

use super::{parse_port, read_evidence};
use crate::fs::ProjectFs;
use crate::types::{Confidence, PortOrigin, PortSource};

const SOURCE_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "ts", "mts", "cts", "jsx", "tsx"];
const MAX_FILES: usize = 64;
const SRC_DEPTH: usize = 3;

static LISTEN_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.listen\(\s*(\d{1,5})\b").expect("valid listen regex"));

static PORT_FALLBACK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bPORT\s*(?:\|\||\?\?)\s*(\d{1,5})\b").expect("valid fallback regex")
});

pub(super) async fn scan(fs: &dyn ProjectFs, root: &Path) -> Vec<PortSource> {
    let mut sources = Vec::new();
    for file in candidate_files(fs, root).await {
        let Some(content) = read_evidence(fs, &file).await else {
            continue;
        };
        let mut seen = Vec::new();
        for port in source_ports(&content) {
            if seen.contains(&port) {
                continue;
            }
            seen.push(port);
            sources.push(PortSource {
                origin: PortOrigin::SourceHeuristic,
                port,
                file: file.clone(),
                confidence: Confidence::Low,
            });
        }
    }
    sources
}

async fn candidate_files(fs: &dyn ProjectFs, root: &Path) -> Vec<PathBuf> {
    let mut files = fs.list_files(root, 1, SOURCE_EXTENSIONS).await;
    let src = root.join("src");
    if fs.exists(&src).await {
        for file in fs.list_files(&src, SRC_DEPTH, SOURCE_EXTENSIONS).await {
            if !files.contains(&file) {
                files.push(file);
            }
        }
    }
    files.truncate(MAX_FILES);
    files
}

pub(crate) fn source_ports(content: &str) -> Vec<u16> {
    LISTEN_CALL
        .captures_iter(content)
        .chain(PORT_FALLBACK.captures_iter(content))
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| parse_port(m.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryFs;

    #[test]
    fn matches_listen_and_fallback_patterns() {
        assert_eq!(source_ports("app.listen(3000, () => {})"), vec![3000]);
        assert_eq!(source_ports("server.listen( 8080 )"), vec![8080]);
        assert_eq!(
            source_ports("const port = process.env.PORT || 4000;"),
            vec![4000]
        );
        assert_eq!(source_ports("const port = env.PORT ?? 4500"), vec![4500]);
        assert!(source_ports("app.listen(port)").is_empty());
    }

    #[tokio::test]
    async fn scans_root_and_src_but_not_dependencies() {
        let fs = MemoryFs::new()
            .with_file("/p/api/server.js", "app.listen(3000)")
            .with_file("/p/api/src/lib/http/boot.ts", "server.listen(3100)")
            .with_file("/p/api/src/a/b/c/deep.ts", "server.listen(3200)")
            .with_file("/p/api/scripts/tool.js", "server.listen(3300)")
            .with_file("/p/api/node_modules/x/index.js", "server.listen(3400)");

        let sources = scan(&fs, Path::new("/p/api")).await;
        let ports: Vec<u16> = sources.iter().map(|s| s.port).collect();
        assert_eq!(ports, vec![3000, 3100]);
        assert!(sources.iter().all(|s| s.confidence == Confidence::Low));
    }
}
