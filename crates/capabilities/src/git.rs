//! The git clone tool.

use regex::Regex;
use runtime::{ParamKind, ParamSpec, Tool, ToolFailure, ToolSchema};
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const TOOL_NAME: &str = "clonar_repositorio_git";

const VERSION_TIMEOUT: Duration = Duration::from_secs(5);
const CLONE_TIMEOUT: Duration = Duration::from_secs(120);

static GIT_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://|git@)[\w\-.]+[:/][\w\-./]+").expect("valid regex")
});

/// Directory values models emit when they mean "no directory".
const PLACEHOLDER_DIRS: &[&str] = &["none", "null", "/path/donde/quieres/clonarlo"];

/// Why `git clone` failed, read from its stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneFailure {
    AlreadyExists,
    NotFound,
    AuthDenied,
    Other,
}

pub fn classify_clone_error(stderr: &str) -> CloneFailure {
    let stderr = stderr.to_lowercase();
    if stderr.contains("already exists") {
        CloneFailure::AlreadyExists
    } else if stderr.contains("not found") || stderr.contains("404") {
        CloneFailure::NotFound
    } else if stderr.contains("authentication") || stderr.contains("permission denied") {
        CloneFailure::AuthDenied
    } else {
        CloneFailure::Other
    }
}

/// Strip the trailing slash and check the URL looks like a git remote.
pub fn normalize_url(url: &str) -> Option<&str> {
    let url = url.trim().trim_end_matches('/');
    GIT_URL.is_match(url).then_some(url)
}

/// Last path segment of the URL without `.git`.
fn repo_name(url: &str) -> &str {
    let last = url.rsplit(['/', ':']).next().unwrap_or(url);
    last.strip_suffix(".git").unwrap_or(last)
}

fn is_placeholder(dir: &str) -> bool {
    let dir = dir.trim();
    dir.is_empty() || PLACEHOLDER_DIRS.iter().any(|p| dir.eq_ignore_ascii_case(p))
}

/// File count and total size of a checkout, ignoring `.git`.
fn checkout_stats(path: &Path) -> (usize, u64) {
    WalkDir::new(path)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .fold((0, 0), |(files, bytes), e| {
            let len = e.metadata().map(|m| m.len()).unwrap_or(0);
            (files + 1, bytes + len)
        })
}

/// Absolute path, file count and size of a fresh checkout, off the async workers.
async fn inspect_checkout(destination: PathBuf) -> Result<(PathBuf, usize, u64), ToolFailure> {
    tokio::task::spawn_blocking(move || {
        let path = std::fs::canonicalize(&destination).unwrap_or(destination);
        let (files, bytes) = checkout_stats(&path);
        (path, files, bytes)
    })
    .await
    .map_err(|e| ToolFailure::Execution(format!("checkout inspection failed: {e}")))
}

#[derive(Debug, Deserialize)]
pub struct CloneArgs {
    pub url: String,
    #[serde(default)]
    pub directorio: Option<String>,
}

/// Clones repositories into a working directory.
pub struct GitCloneTool {
    workdir: PathBuf,
    program: PathBuf,
}

impl GitCloneTool {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            program: PathBuf::from("git"),
        }
    }

    /// Use a specific git executable.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Run `git --version`, returning the version line.
    pub async fn git_version(&self) -> Result<String, ToolFailure> {
        let output = tokio::time::timeout(
            VERSION_TIMEOUT,
            Command::new(&self.program)
                .arg("--version")
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| ToolFailure::Timeout(VERSION_TIMEOUT.as_secs()))?
        .map_err(|e| {
            ToolFailure::Unavailable(format!(
                "git is not installed or not runnable ({}): {e}",
                self.program.display()
            ))
        })?;
        if !output.status.success() {
            return Err(ToolFailure::Unavailable(
                "git --version failed, check the installation".into(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn destination(&self, url: &str, dir: Option<&str>) -> Result<PathBuf, ToolFailure> {
        let relative = match dir.filter(|d| !is_placeholder(d)) {
            Some(dir) => {
                let path = Path::new(dir.trim());
                if !path
                    .components()
                    .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
                {
                    return Err(ToolFailure::InvalidInput(format!(
                        "directory '{dir}' must be relative to the working directory"
                    )));
                }
                path.to_path_buf()
            }
            None => {
                let name = repo_name(url);
                let mut components = Path::new(name).components();
                match (components.next(), components.next()) {
                    (Some(Component::Normal(_)), None) => PathBuf::from(name),
                    _ => {
                        return Err(ToolFailure::InvalidInput(format!(
                            "cannot derive a directory name from '{url}', pass 'directorio'"
                        )));
                    }
                }
            }
        };
        Ok(self.workdir.join(relative))
    }
}

impl Tool for GitCloneTool {
    type Args = CloneArgs;

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            TOOL_NAME,
            "Clona un repositorio Git (GitHub, GitLab, Bitbucket...) en el directorio de trabajo.",
        )
        .param(ParamSpec::required(
            "url",
            ParamKind::String,
            "URL del repositorio, con o sin .git (ej: https://github.com/usuario/repositorio)",
        ))
        .param(ParamSpec::optional(
            "directorio",
            ParamKind::String,
            "Directorio destino OPCIONAL. Si no se indica se usa el nombre del repositorio.",
        ))
    }

    async fn call(&self, args: CloneArgs) -> Result<String, ToolFailure> {
        let url = normalize_url(&args.url).ok_or_else(|| {
            ToolFailure::InvalidInput(format!(
                "'{}' is not a git URL (e.g. https://github.com/usuario/repositorio)",
                args.url.trim()
            ))
        })?;
        let destination = self.destination(url, args.directorio.as_deref())?;

        let version = self.git_version().await?;
        debug!(%version, "git available");

        tokio::fs::create_dir_all(&self.workdir)
            .await
            .map_err(|e| ToolFailure::Execution(format!("cannot create working directory: {e}")))?;

        info!(url, destination = %destination.display(), "cloning");
        let output = tokio::time::timeout(
            CLONE_TIMEOUT,
            Command::new(&self.program)
                .arg("clone")
                .arg("--")
                .arg(url)
                .arg(&destination)
                .current_dir(&self.workdir)
                .env("GIT_TERMINAL_PROMPT", "0")
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| ToolFailure::Timeout(CLONE_TIMEOUT.as_secs()))?
        .map_err(|e| ToolFailure::Unavailable(format!("cannot run git: {e}")))?;

        if output.status.success() {
            let (path, files, bytes) = inspect_checkout(destination).await?;
            return Ok(format!(
                "Repositorio clonado correctamente.\n\
                 - Ubicación: {}\n\
                 - Archivos: {files}\n\
                 - Tamaño: {:.2} MB",
                path.display(),
                bytes as f64 / (1024.0 * 1024.0)
            ));
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(status = %output.status, "git clone failed");
        match classify_clone_error(&stderr) {
            CloneFailure::AlreadyExists => Ok(format!(
                "El directorio '{}' ya existe. Indica otro directorio o borra el existente.",
                destination.display()
            )),
            CloneFailure::NotFound => Ok(format!(
                "Repositorio no encontrado: {url}. Verifica que la URL es correcta y el repositorio es público."
            )),
            CloneFailure::AuthDenied => Ok(format!(
                "Error de autenticación al clonar {url}. El repositorio puede ser privado; \
                 configura credenciales o una clave SSH."
            )),
            CloneFailure::Other => Err(ToolFailure::Execution(format!(
                "git clone exited with {}: {}",
                output.status,
                stderr.trim()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    #[test]
    fn urls() {
        assert_eq!(
            normalize_url(" https://github.com/usuario/repo/ "),
            Some("https://github.com/usuario/repo")
        );
        assert!(normalize_url("git@github.com:usuario/repo.git").is_some());
        assert!(normalize_url("ftp://example.com/repo").is_none());
        assert!(normalize_url("repo").is_none());
    }

    #[test]
    fn repo_names() {
        assert_eq!(repo_name("https://github.com/usuario/repo.git"), "repo");
        assert_eq!(repo_name("git@github.com:usuario/otro"), "otro");
    }

    #[test]
    fn classifies_stderr() {
        assert_eq!(
            classify_clone_error("fatal: destination path 'repo' already exists and is not an empty directory."),
            CloneFailure::AlreadyExists
        );
        assert_eq!(
            classify_clone_error("remote: Repository not found.\nfatal: repository 'x' not found"),
            CloneFailure::NotFound
        );
        assert_eq!(
            classify_clone_error("fatal: unable to access: The requested URL returned error: 404"),
            CloneFailure::NotFound
        );
        assert_eq!(
            classify_clone_error("git@github.com: Permission denied (publickey)."),
            CloneFailure::AuthDenied
        );
        assert_eq!(classify_clone_error("fatal: early EOF"), CloneFailure::Other);
    }

    #[test]
    fn placeholder_directories_fall_back_to_repo_name() {
        let tool = GitCloneTool::new("/tmp/trabajo");
        let url = "https://github.com/usuario/repo.git";
        for dir in [None, Some("None"), Some(""), Some("/path/donde/quieres/clonarlo")] {
            assert_eq!(
                tool.destination(url, dir).unwrap(),
                Path::new("/tmp/trabajo/repo")
            );
        }
        assert_eq!(
            tool.destination(url, Some("mio")).unwrap(),
            Path::new("/tmp/trabajo/mio")
        );
        assert!(tool.destination(url, Some("../fuera")).is_err());
        assert!(tool.destination(url, Some("/etc")).is_err());
    }

    #[test]
    fn url_derived_names_stay_inside_workdir() {
        let tool = GitCloneTool::new("/tmp/trabajo");
        for url in [
            "https://github.com/usuario/..",
            "https://github.com/usuario/.git",
            "https://github.com/usuario/.",
        ] {
            let url = normalize_url(url).unwrap();
            let err = tool.destination(url, None).unwrap_err();
            assert!(matches!(err, ToolFailure::InvalidInput(_)), "{url}");
        }
        let url = normalize_url("https://github.com/usuario/..").unwrap();
        assert_eq!(
            tool.destination(url, Some("copia")).unwrap(),
            Path::new("/tmp/trabajo/copia")
        );
    }

    #[tokio::test]
    async fn inspects_checkout_without_git_metadata() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git/objects")).unwrap();
        std::fs::write(dir.path().join(".git/objects/pack"), vec![0u8; 4096]).unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("README.md"), "hola").unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();

        let (path, files, bytes) = inspect_checkout(dir.path().to_path_buf()).await.unwrap();
        assert!(path.is_absolute());
        assert_eq!(files, 2);
        assert_eq!(bytes, 4 + 12);
    }

    #[tokio::test]
    async fn invalid_url_is_rejected_before_running_git() {
        let tool = GitCloneTool::new("/nonexistent").with_program("/nonexistent/git");
        let err = tool
            .call(CloneArgs {
                url: "no es una url".into(),
                directorio: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ToolFailure::InvalidInput(_)));
    }

    #[tokio::test]
    async fn missing_git_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let tool = GitCloneTool::new(dir.path()).with_program("/nonexistent/git");
        let err = tool
            .call(CloneArgs {
                url: "https://github.com/usuario/repo".into(),
                directorio: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ToolFailure::Unavailable(_)));
    }

    #[tokio::test]
    async fn clones_local_repository() {
        if !git_available() {
            return;
        }
        let source = tempfile::tempdir().unwrap();
        let status = std::process::Command::new("git")
            .arg("init")
            .arg("--quiet")
            .arg(source.path())
            .status()
            .unwrap();
        assert!(status.success());

        // The URL pattern only admits remote-looking URLs, so exercise the
        // clone path through `destination` and the raw command instead.
        let work = tempfile::tempdir().unwrap();
        let tool = GitCloneTool::new(work.path());
        assert!(tool.git_version().await.unwrap().starts_with("git version"));

        let dest = tool.destination("https://example.com/x/copia.git", None).unwrap();
        let first = std::process::Command::new("git")
            .arg("clone")
            .arg(source.path())
            .arg(&dest)
            .output()
            .unwrap();
        assert!(first.status.success());
        assert_eq!(checkout_stats(&dest), (0, 0));

        let second = std::process::Command::new("git")
            .arg("clone")
            .arg(source.path())
            .arg(&dest)
            .output()
            .unwrap();
        assert_eq!(
            classify_clone_error(&String::from_utf8_lossy(&second.stderr)),
            CloneFailure::AlreadyExists
        );
    }
}
