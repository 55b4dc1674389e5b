use axum::http::{header, HeaderValue};
use axum::Router;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use url::Url;

use crate::{PreviewError, Result};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

struct RunningServer {
    root: PathBuf,
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

/// At most one listener per instance; [`PreviewServer::start`] is a no-op
/// while it is bound.
#[derive(Default)]
pub struct PreviewServer {
    running: Option<RunningServer>,
}

impl PreviewServer {
    pub fn new() -> Self {
        Self { running: None }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|server| !server.task.is_finished())
    }

    pub fn address(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|server| server.addr)
    }

    pub fn root(&self) -> Option<&Path> {
        self.running.as_ref().map(|server| server.root.as_path())
    }

    /// Bind on `port` serving `root` unless a listener is already up, and
    /// return the URL of `document` (or of the root when `None`).
    pub async fn start(&mut self, root: &Path, port: u16, document: Option<&Path>) -> Result<String> {
        if self.is_running() {
            log::debug!("Live preview already running, reusing listener");
            return self.url_for(document);
        }
        // A finished task means the listener died; forget it and bind again.
        self.running = None;

        if !root.is_dir() {
            return Err(PreviewError::RootNotDirectory(root.to_path_buf()));
        }
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());

        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))
            .await
            .map_err(|e| bind_error(port, e))?;
        let addr = listener.local_addr().map_err(|e| bind_error(port, e))?;

        let app = Router::new()
            .fallback_service(ServeDir::new(&root).append_index_html_on_directories(true))
            .layer(SetResponseHeaderLayer::overriding(
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-store"),
            ));

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                log::error!("Live preview server stopped: {}", e);
            }
        });

        log::info!("Live preview serving {} on {}", root.display(), addr);
        self.running = Some(RunningServer {
            root,
            addr,
            shutdown: Some(shutdown_tx),
            task,
        });

        self.url_for(document)
    }

    /// URL of `document` on the running server. Relative paths are taken
    /// from the served root; a document the server cannot reach is an error.
    pub fn url_for(&self, document: Option<&Path>) -> Result<String> {
        let server = self.running.as_ref().ok_or(PreviewError::NotRunning)?;
        let mut url = Url::parse(&format!("http://localhost:{}/", server.addr.port()))
            .map_err(|_| PreviewError::NotRunning)?;
        if let Some(document) = document {
            let segments = url_segments(&server.root, document)?;
            if let Ok(mut path) = url.path_segments_mut() {
                path.pop_if_empty().extend(segments);
            }
        }
        Ok(url.into())
    }

    /// Whether the next request for `document` will reflect its saved
    /// contents. Nothing needs refreshing since every request hits the disk.
    pub fn notify_document_saved(&self, document: &Path, is_markup: bool) -> bool {
        let served = is_markup
            && self.is_running()
            && self.root().is_some_and(|root| {
                document.is_relative()
                    || document
                        .canonicalize()
                        .unwrap_or_else(|_| document.to_path_buf())
                        .starts_with(root)
            });
        if served {
            log::debug!("Preview will pick up saved {}", document.display());
        }
        served
    }

    /// Shut the listener down and release the socket.
    pub async fn stop(&mut self) {
        let Some(mut server) = self.running.take() else {
            return;
        };
        if let Some(tx) = server.shutdown.take() {
            let _ = tx.send(());
        }
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut server.task)
            .await
            .is_err()
        {
            log::warn!("Live preview did not drain in time, aborting");
            server.task.abort();
            let _ = server.task.await;
        }
        log::info!("Live preview on {} stopped", server.addr);
    }
}

impl Drop for PreviewServer {
    fn drop(&mut self) {
        if let Some(mut server) = self.running.take() {
            if let Some(tx) = server.shutdown.take() {
                let _ = tx.send(());
            }
            server.task.abort();
        }
    }
}

fn bind_error(port: u16, source: io::Error) -> PreviewError {
    if source.kind() == io::ErrorKind::AddrInUse {
        PreviewError::PortInUse { port }
    } else {
        PreviewError::Bind { port, source }
    }
}

/// Path segments of `document` below `root`, unencoded.
fn url_segments(root: &Path, document: &Path) -> Result<Vec<String>> {
    let relative = if document.is_relative() {
        document.to_path_buf()
    } else {
        let document = document
            .canonicalize()
            .unwrap_or_else(|_| document.to_path_buf());
        match document.strip_prefix(root) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => {
                log::warn!(
                    "{} is not under the served folder {}",
                    document.display(),
                    root.display()
                );
                return Err(PreviewError::OutsideRoot {
                    document,
                    root: root.to_path_buf(),
                });
            }
        }
    };
    Ok(relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            path
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_serves_saved_content_without_caching() {
        let root = TempDir::new().unwrap();
        let page = root.path().join("index.html");
        std::fs::write(&page, "<p>first</p>").unwrap();

        let mut server = PreviewServer::new();
        let url = server.start(root.path(), 0, Some(&page)).await.unwrap();
        let addr = server.address().unwrap();
        assert_eq!(url, format!("http://localhost:{}/index.html", addr.port()));

        let response = get(addr, "/index.html").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.to_lowercase().contains("cache-control: no-store"));
        assert!(response.contains("<p>first</p>"));

        std::fs::write(&page, "<p>second</p>").unwrap();
        assert!(server.notify_document_saved(&page, true));
        let response = get(addr, "/index.html").await;
        assert!(response.contains("<p>second</p>"));

        server.stop().await;
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_start_twice_reuses_listener() {
        let root = TempDir::new().unwrap();
        let page = root.path().join("a.html");
        std::fs::write(&page, "a").unwrap();

        let mut server = PreviewServer::new();
        let first = server.start(root.path(), 0, Some(&page)).await.unwrap();
        let addr = server.address().unwrap();

        // Port 0 would yield a fresh port if a second bind happened.
        let second = server.start(root.path(), 0, Some(&page)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(server.address(), Some(addr));

        server.stop().await;
    }

    #[tokio::test]
    async fn test_rejects_traversal_outside_root() {
        let outer = TempDir::new().unwrap();
        std::fs::write(outer.path().join("secret.txt"), "top secret").unwrap();
        let root = outer.path().join("site");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(root.join("index.html"), "hello").unwrap();

        let mut server = PreviewServer::new();
        server.start(&root, 0, None).await.unwrap();
        let addr = server.address().unwrap();

        let response = get(addr, "/../secret.txt").await;
        assert!(!response.starts_with("HTTP/1.1 200"));
        assert!(!response.contains("top secret"));

        let response = get(addr, "/%2e%2e/secret.txt").await;
        assert!(!response.contains("top secret"));

        server.stop().await;
    }

    #[tokio::test]
    async fn test_port_in_use_is_reported() {
        let blocker = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = blocker.local_addr().unwrap().port();
        let root = TempDir::new().unwrap();

        let mut server = PreviewServer::new();
        let err = server.start(root.path(), port, None).await.unwrap_err();
        assert!(matches!(err, PreviewError::PortInUse { port: p } if p == port));
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_stop_releases_socket() {
        let root = TempDir::new().unwrap();
        let mut server = PreviewServer::new();
        server.start(root.path(), 0, None).await.unwrap();
        let port = server.address().unwrap().port();

        server.stop().await;
        let rebound = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, port));
        assert!(rebound.is_ok());
    }

    #[tokio::test]
    async fn test_root_must_be_directory() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("plain.txt");
        std::fs::write(&file, "x").unwrap();

        let mut server = PreviewServer::new();
        let err = server.start(&file, 0, None).await.unwrap_err();
        assert!(matches!(err, PreviewError::RootNotDirectory(_)));
    }

    #[test]
    fn test_url_segments_for_nested_and_outside_documents() {
        let root = Path::new("/srv/site");
        assert_eq!(
            url_segments(root, Path::new("/srv/site/docs/my page.html")).unwrap(),
            vec!["docs", "my page.html"]
        );
        assert_eq!(
            url_segments(root, Path::new("pages/a.html")).unwrap(),
            vec!["pages", "a.html"]
        );
        assert!(matches!(
            url_segments(root, Path::new("/elsewhere/x.html")),
            Err(PreviewError::OutsideRoot { .. })
        ));
    }

    #[tokio::test]
    async fn test_url_escapes_reserved_characters() {
        let root = TempDir::new().unwrap();
        let docs = root.path().join("my docs");
        std::fs::create_dir(&docs).unwrap();
        let page = docs.join("50% #1?.html");
        std::fs::write(&page, "<p>odd</p>").unwrap();

        let mut server = PreviewServer::new();
        let url = server.start(root.path(), 0, Some(&page)).await.unwrap();
        let addr = server.address().unwrap();
        let path = url
            .strip_prefix(&format!("http://localhost:{}", addr.port()))
            .unwrap();
        assert_eq!(path, "/my%20docs/50%25%20%231%3F.html");

        let response = get(addr, path).await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("<p>odd</p>"));

        server.stop().await;
    }

    #[tokio::test]
    async fn test_running_server_rejects_document_outside_root() {
        let root = TempDir::new().unwrap();
        let elsewhere = TempDir::new().unwrap();
        let page = elsewhere.path().join("away.html");
        std::fs::write(&page, "away").unwrap();

        let mut server = PreviewServer::new();
        server.start(root.path(), 0, None).await.unwrap();
        let addr = server.address();

        let err = server.start(elsewhere.path(), 0, Some(&page)).await.unwrap_err();
        assert!(matches!(err, PreviewError::OutsideRoot { .. }));
        assert!(server.is_running());
        assert_eq!(server.address(), addr);

        server.stop().await;
    }

    #[test]
    fn test_url_requires_running_server() {
        let server = PreviewServer::new();
        assert!(matches!(server.url_for(None), Err(PreviewError::NotRunning)));
    }
}
