//! Almacén de contexto por proyecto.
//!
//! Guarda en memoria la última lista de ficheros ingerida para cada proyecto y
//! la renderiza como un único bloque de texto para el prompt del LLM. No hay
//! persistencia: tras reiniciar el proceso hay que volver a ingerir.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tracing::debug;

use crate::{ingest::is_indexable, models::FileRecord};

/// Texto devuelto cuando un proyecto no tiene nada indexado.
pub const NO_CONTEXT: &str = "No hay contenido de ficheros indexado.";

/// Cabecera del bloque de contexto.
pub const CONTEXT_HEADER: &str = "BASE DE CONOCIMIENTO DEL CÓDIGO:";

#[derive(Debug, Default)]
pub struct ContextStore {
    projects: RwLock<HashMap<String, Vec<FileRecord>>>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sustituye por completo la entrada de `project_id` (la última escritura gana).
    /// Vuelve a aplicar el filtro de extensiones a lo que reciba.
    pub fn index(&self, project_id: &str, files: Vec<FileRecord>) {
        let text_files: Vec<FileRecord> = files
            .into_iter()
            .filter(|f| is_indexable(&f.path))
            .collect();
        debug!("Indexados {} ficheros para el proyecto {project_id}", text_files.len());

        self.projects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(project_id.to_string(), text_files);
    }

    /// Renderiza el contexto del proyecto, ordenado por ruta para que sea
    /// reproducible con independencia del orden de ingesta.
    pub fn context_for(&self, project_id: &str) -> String {
        let projects = self.projects.read().unwrap_or_else(PoisonError::into_inner);
        let Some(files) = projects.get(project_id).filter(|files| !files.is_empty()) else {
            return NO_CONTEXT.to_string();
        };

        let mut sorted: Vec<&FileRecord> = files.iter().collect();
        sorted.sort_by(|a, b| a.path.cmp(&b.path));

        let mut context = format!("{CONTEXT_HEADER}\n\n");
        for file in sorted {
            context.push_str(&format!("--- FICHERO: {} ---\n{}\n\n", file.path, file.content));
        }
        context
    }

    pub fn file_count(&self, project_id: &str) -> usize {
        self.projects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(project_id)
            .map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, content: &str) -> FileRecord {
        FileRecord::new(path, content)
    }

    #[test]
    fn scenario_filters_sorts_and_counts() {
        let store = ContextStore::new();
        store.index(
            "p1",
            vec![file("b.ts", "B"), file("a.py", "A"), file("c.bin", "X")],
        );

        assert_eq!(store.file_count("p1"), 2);
        let context = store.context_for("p1");
        assert!(context.starts_with(CONTEXT_HEADER));
        assert!(!context.contains("c.bin"));
        let a = context.find("--- FICHERO: a.py ---\nA\n").unwrap();
        let b = context.find("--- FICHERO: b.ts ---\nB\n").unwrap();
        assert!(a < b);
    }

    #[test]
    fn unknown_project_yields_sentinel() {
        let store = ContextStore::new();
        assert_eq!(store.context_for("missing"), NO_CONTEXT);
        assert_eq!(store.file_count("missing"), 0);
    }

    #[test]
    fn empty_index_yields_sentinel() {
        let store = ContextStore::new();
        store.index("p1", vec![file("image.png", "binary")]);
        assert_eq!(store.context_for("p1"), NO_CONTEXT);
        assert_eq!(store.file_count("p1"), 0);
    }

    #[test]
    fn every_file_appears_once_in_path_order() {
        let store = ContextStore::new();
        let paths = ["src/z.rs", "README.md", "src/a/b.go", "lib/x.js", "Main.java"];
        store.index(
            "p",
            paths.iter().rev().map(|p| file(p, &format!("content of {p}"))).collect(),
        );

        let context = store.context_for("p");
        let mut expected: Vec<&str> = paths.to_vec();
        expected.sort();

        let mut last = 0;
        for path in expected {
            let header = format!("--- FICHERO: {path} ---");
            assert_eq!(context.matches(&header).count(), 1, "{path}");
            assert_eq!(context.matches(&format!("content of {path}\n")).count(), 1);
            let pos = context.find(&header).unwrap();
            assert!(pos >= last);
            last = pos;
        }
    }

    #[test]
    fn reindex_replaces_previous_files() {
        let store = ContextStore::new();
        store.index("p", vec![file("old.rs", "old"), file("shared.md", "v1")]);
        store.index("p", vec![file("new.rs", "new"), file("shared.md", "v2")]);

        let context = store.context_for("p");
        assert!(!context.contains("old.rs"));
        assert!(!context.contains("v1"));
        assert!(context.contains("new.rs"));
        assert_eq!(store.file_count("p"), 2);
    }

    #[test]
    fn filtering_is_idempotent() {
        let superset = vec![
            file("a.rs", "1"),
            file("b.exe", "2"),
            file("docs/c.MD", "3"),
            file("Makefile", "4"),
        ];
        let filtered: Vec<FileRecord> =
            superset.iter().filter(|f| is_indexable(&f.path)).cloned().collect();

        let store = ContextStore::new();
        store.index("full", superset);
        store.index("filtered", filtered);

        assert_eq!(store.context_for("full"), store.context_for("filtered"));
        assert_eq!(store.file_count("full"), 2);
    }

    #[test]
    fn projects_are_isolated() {
        let store = ContextStore::new();
        store.index("one", vec![file("one.py", "1")]);
        store.index("two", vec![file("two.py", "2")]);
        assert!(!store.context_for("one").contains("two.py"));
        assert_eq!(store.file_count("two"), 1);
    }
}
