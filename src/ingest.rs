//! Ingesta de un proyecto (repositorio de GitHub o carpeta local) en una
//! lista ordenada de `FileRecord` lista para el almacén de contexto.
//!
//! Sólo se conservan ficheros de texto con extensión permitida y como mucho
//! `MAX_FILES` de ellos, en el orden en que se descubren.

use std::{
    fs,
    future::Future,
    path::Path,
    sync::{Arc, Mutex},
};

use futures::{stream, StreamExt};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::{
    app_state::Status,
    error::IngestError,
    github::{GithubClient, RepoRef, TreeEntry},
    models::FileRecord,
};

/// Límite duro de ficheros por ingesta (cuenta ficheros, no bytes).
pub const MAX_FILES: usize = 50;

/// Extensiones de texto que merece la pena indexar.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "js", "jsx", "json", "py", "md", "html", "css", "go", "rs", "java", "c", "cpp",
    "h",
];

/// Carpetas de dependencias o de artefactos de compilación.
const VENDOR_DIRS: &[&str] = &["node_modules", "target", "dist", "build", "vendor", "__pycache__"];

/// `true` para carpetas ocultas (`.git`, `.venv`...) o de dependencias, que la
/// ingesta local no recorre.
pub fn is_ignored_dir(name: &str) -> bool {
    name.starts_with('.') || VENDOR_DIRS.contains(&name)
}

/// `true` si la extensión (lo que sigue al último `.`, sin distinguir
/// mayúsculas) está en la lista permitida.
pub fn is_indexable(path: &str) -> bool {
    path.rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
}

/// Resumen de los resultados de una operación de ingesta.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestionSummary {
    pub files_scanned: u32,
    pub files_ingested: u32,
    pub files_skipped: u32,
}

/// Implementa cómo se mostrará el resumen como texto.
impl std::fmt::Display for IngestionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Resumen: {} ficheros procesados, {} indexados, {} omitidos.",
            self.files_scanned, self.files_ingested, self.files_skipped
        )
    }
}

/// Filtra las entradas del árbol (sólo ficheros con extensión permitida) y
/// aplica el límite de `MAX_FILES`.
pub fn select_candidates(entries: Vec<TreeEntry>) -> Vec<TreeEntry> {
    entries
        .into_iter()
        .filter(|e| e.is_blob() && is_indexable(&e.path))
        .take(MAX_FILES)
        .collect()
}

/// Descarga el contenido de cada candidato. Cada descarga es independiente:
/// si una falla se registra y se omite, el resto continúa. El resultado
/// respeta el orden de `candidates`.
pub async fn fetch_contents<F, Fut>(
    candidates: Vec<TreeEntry>,
    concurrency: usize,
    status_arc: &Arc<Mutex<Status>>,
    fetch: F,
) -> (Vec<FileRecord>, IngestionSummary)
where
    F: Fn(TreeEntry) -> Fut,
    Fut: Future<Output = anyhow::Result<String>>,
{
    let total = candidates.len().max(1) as f32;

    stream::iter(candidates)
        .map(|entry| {
            let pending = fetch(entry.clone());
            async move { (entry, pending.await) }
        })
        .buffered(concurrency.max(1))
        .fold(
            (Vec::new(), IngestionSummary::default()),
            |(mut files, mut summary), (entry, result)| async move {
                summary.files_scanned += 1;
                match result {
                    Ok(content) => {
                        summary.files_ingested += 1;
                        files.push(FileRecord {
                            size: entry.size.unwrap_or(content.len() as u64),
                            path: entry.path,
                            content,
                        });
                    }
                    Err(err) => {
                        summary.files_skipped += 1;
                        warn!("No se pudo descargar {}: {err}", entry.path);
                    }
                }
                Status::update(
                    status_arc,
                    format!("[{}/{}] Leyendo ficheros del proyecto...", summary.files_scanned, total as u32),
                    summary.files_scanned as f32 / total,
                );
                (files, summary)
            },
        )
        .await
}

/// Ingesta un repositorio de GitHub: lista el árbol de `branch`, filtra y
/// descarga el contenido de cada fichero por el espejo de contenido bruto.
///
/// Un fallo del listado aborta con error tipado; un fallo de un fichero no.
pub async fn ingest_github(
    github: &GithubClient,
    repo: &RepoRef,
    branch: &str,
    concurrency: usize,
    status_arc: &Arc<Mutex<Status>>,
) -> Result<(Vec<FileRecord>, IngestionSummary), IngestError> {
    let tree = github.list_tree(repo, branch).await?;
    let candidates = select_candidates(tree);
    info!(
        "{}/{}: {} ficheros seleccionados para indexar",
        repo.owner,
        repo.repo,
        candidates.len()
    );

    let result = fetch_contents(candidates, concurrency, status_arc, move |entry: TreeEntry| async move {
        github.fetch_raw(repo, branch, &entry.path).await
    })
    .await;

    info!("Ingesta de {}/{} terminada. {}", repo.owner, repo.repo, result.1);
    Ok(result)
}

/// Ingesta una carpeta local. Mismo filtro y límite que la ingesta remota;
/// los ficheros ilegibles o no UTF-8 se omiten.
pub fn ingest_directory(root: &Path) -> Result<(Vec<FileRecord>, IngestionSummary), IngestError> {
    if !root.is_dir() {
        return Err(IngestError::NotADirectory(root.to_path_buf()));
    }

    let candidates: Vec<(String, std::path::PathBuf)> = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0 || !(e.file_type().is_dir() && is_ignored_dir(&e.file_name().to_string_lossy()))
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let relative = relative_path(root, e.path())?;
            Some((relative, e.into_path()))
        })
        .filter(|(relative, _)| is_indexable(relative))
        .take(MAX_FILES)
        .collect();

    let mut summary = IngestionSummary::default();
    let mut files = Vec::with_capacity(candidates.len());

    for (relative, path) in candidates {
        summary.files_scanned += 1;
        match fs::read_to_string(&path) {
            Ok(content) => {
                summary.files_ingested += 1;
                files.push(FileRecord::new(relative, content));
            }
            Err(err) => {
                summary.files_skipped += 1;
                warn!("Saltando fichero ilegible o no-UTF8 {}: {err}", path.display());
            }
        }
    }

    info!("Ingesta de {} terminada. {summary}", root.display());
    Ok((files, summary))
}

/// Ruta relativa a `root` con `/` como separador.
fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn blob(path: &str) -> TreeEntry {
        TreeEntry {
            path: path.to_string(),
            kind: "blob".to_string(),
            size: None,
        }
    }

    fn status() -> Arc<Mutex<Status>> {
        Arc::new(Mutex::new(Status::default()))
    }

    #[test]
    fn extension_filter() {
        assert!(is_indexable("src/main.rs"));
        assert!(is_indexable("README.MD"));
        assert!(is_indexable("web/app.component.tsx"));
        assert!(!is_indexable("Makefile"));
        assert!(!is_indexable("rs"));
        assert!(!is_indexable("assets/logo.png"));
        assert!(!is_indexable(".gitignore"));
        assert!(!is_indexable("build.rs.bak"));
    }

    #[test]
    fn candidates_drop_directories_and_unknown_extensions() {
        let entries = vec![
            TreeEntry {
                path: "src.rs".to_string(),
                kind: "tree".to_string(),
                size: None,
            },
            blob("b.ts"),
            blob("a.py"),
            blob("c.bin"),
        ];
        let selected: Vec<String> = select_candidates(entries).into_iter().map(|e| e.path).collect();
        assert_eq!(selected, vec!["b.ts", "a.py"]);
    }

    #[test]
    fn candidates_are_capped_in_discovery_order() {
        let entries: Vec<TreeEntry> = (0..500).map(|i| blob(&format!("f{i:03}.js"))).collect();
        let selected = select_candidates(entries);
        assert_eq!(selected.len(), MAX_FILES);
        assert_eq!(selected[0].path, "f000.js");
        assert_eq!(selected[MAX_FILES - 1].path, "f049.js");
    }

    #[tokio::test]
    async fn single_fetch_failure_is_skipped() {
        let candidates = vec![blob("a.rs"), blob("b.rs"), blob("c.rs")];
        let fetch = |fail: Option<&'static str>| {
            move |entry: TreeEntry| async move {
                if Some(entry.path.as_str()) == fail {
                    Err(anyhow!("boom"))
                } else {
                    Ok(format!("// {}", entry.path))
                }
            }
        };

        let (all, _) = fetch_contents(candidates.clone(), 4, &status(), fetch(None)).await;
        let (partial, summary) = fetch_contents(candidates, 4, &status(), fetch(Some("b.rs"))).await;

        assert_eq!(partial.len(), 2);
        assert_eq!(partial[0], all[0]);
        assert_eq!(partial[1], all[2]);
        assert_eq!(
            summary,
            IngestionSummary {
                files_scanned: 3,
                files_ingested: 2,
                files_skipped: 1,
            }
        );
    }

    #[tokio::test]
    async fn fetch_order_does_not_depend_on_completion_order() {
        let candidates: Vec<TreeEntry> = (0..6).map(|i| blob(&format!("f{i}.md"))).collect();
        let status_arc = status();
        let (files, _) = fetch_contents(candidates, 6, &status_arc, |entry: TreeEntry| async move {
            // Los primeros tardan más en completarse.
            let delay = 30 - entry.path[1..2].parse::<u64>().unwrap_or(0) * 5;
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            Ok::<_, anyhow::Error>(entry.path.clone())
        })
        .await;

        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["f0.md", "f1.md", "f2.md", "f3.md", "f4.md", "f5.md"]);
        assert_eq!(status_arc.lock().unwrap().progress, 1.0);
    }

    #[tokio::test]
    async fn github_ingestion_skips_failed_files() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/git/trees/main"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tree": [
                    {"path": "src", "type": "tree"},
                    {"path": "src/lib.rs", "type": "blob", "size": 3},
                    {"path": "logo.png", "type": "blob", "size": 900},
                    {"path": "README.md", "type": "blob", "size": 5},
                    {"path": "web/index.html", "type": "blob", "size": 6}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/acme/widgets/main/src/lib.rs"))
            .respond_with(ResponseTemplate::new(200).set_body_string("lib"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/acme/widgets/main/README.md"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/acme/widgets/main/web/index.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let github = GithubClient::new(&server.uri(), &server.uri(), None).unwrap();
        let repo = RepoRef::parse("https://github.com/acme/widgets").unwrap();
        let (files, summary) = ingest_github(&github, &repo, "main", 2, &status()).await.unwrap();

        assert_eq!(files.len(), 2);
        assert_eq!(files[0], FileRecord { path: "src/lib.rs".into(), content: "lib".into(), size: 3 });
        assert_eq!(files[1].path, "web/index.html");
        assert_eq!(summary.files_skipped, 1);
    }

    #[tokio::test]
    async fn github_ingestion_fails_when_listing_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/git/trees/main"))
            .respond_with(ResponseTemplate::new(403).insert_header("x-ratelimit-reset", "1700000000"))
            .mount(&server)
            .await;

        let github = GithubClient::new(&server.uri(), &server.uri(), None).unwrap();
        let repo = RepoRef::parse("https://github.com/acme/widgets").unwrap();
        let err = ingest_github(&github, &repo, "main", 2, &status()).await.unwrap_err();
        assert!(matches!(err, IngestError::RateLimited { .. }));
    }

    #[test]
    fn directory_ingestion_filters_and_relativizes() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        fs::write(dir.path().join("src/nested/util.py"), "print(1)").unwrap();
        fs::write(dir.path().join("src/app.ts"), "export {}").unwrap();
        fs::write(dir.path().join("data.bin"), [0u8, 1, 2]).unwrap();
        fs::write(dir.path().join("broken.md"), [0xffu8, 0xfe, 0x00]).unwrap();

        let (files, summary) = ingest_directory(dir.path()).unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();

        assert_eq!(paths, vec!["src/app.ts", "src/nested/util.py"]);
        assert_eq!(files[1].size, 8);
        assert_eq!(summary.files_skipped, 1);
    }

    #[test]
    fn directory_ingestion_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..120 {
            fs::write(dir.path().join(format!("m{i:03}.go")), "package main").unwrap();
        }
        let (files, _) = ingest_directory(dir.path()).unwrap();
        assert_eq!(files.len(), MAX_FILES);
        assert_eq!(files[0].path, "m000.go");
    }

    #[test]
    fn directory_ingestion_skips_hidden_and_vendor_dirs() {
        let dir = tempfile::tempdir().unwrap();
        for sub in ["node_modules/left-pad", ".git", "target/debug", "src"] {
            fs::create_dir_all(dir.path().join(sub)).unwrap();
        }
        for i in 0..60 {
            fs::write(dir.path().join(format!("node_modules/left-pad/i{i:02}.js")), "module.exports = 1").unwrap();
        }
        fs::write(dir.path().join(".git/description.md"), "repo").unwrap();
        fs::write(dir.path().join("target/debug/build.json"), "{}").unwrap();
        fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();
        fs::write(dir.path().join(".eslintrc.json"), "{}").unwrap();

        let (files, _) = ingest_directory(dir.path()).unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec![".eslintrc.json", "src/main.rs"]);

        assert!(is_ignored_dir(".venv"));
        assert!(is_ignored_dir("__pycache__"));
        assert!(!is_ignored_dir("src"));
    }

    #[test]
    fn directory_ingestion_rejects_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("single.rs");
        fs::write(&file, "fn main() {}").unwrap();
        assert!(matches!(ingest_directory(&file), Err(IngestError::NotADirectory(_))));
    }
}
