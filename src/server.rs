use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use axum::{
    Router,
    body::Body,
    extract::{Request, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
};
use tokio::{fs::File, net::TcpListener, sync::mpsc, task::JoinHandle};
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::UploaderError;

#[derive(Clone)]
struct ServeState {
    route_path: Arc<str>,
    image_file: Arc<PathBuf>,
    failures: mpsc::UnboundedSender<UploaderError>,
}

/// A bound, not yet serving, single-file HTTP server.
///
/// Binding happens up front so that callers know the socket is accepting
/// connections before they hand its URL to anyone.
pub struct FileServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    app: Router,
    failures: mpsc::UnboundedReceiver<UploaderError>,
    failures_tx: mpsc::UnboundedSender<UploaderError>,
}

impl FileServer {
    pub async fn bind(
        addr: &str,
        route_path: &str,
        image_file: PathBuf,
    ) -> Result<Self, UploaderError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| UploaderError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| UploaderError::Bind {
            addr: addr.to_string(),
            source,
        })?;

        let (failures_tx, failures) = mpsc::unbounded_channel();

        let state = ServeState {
            route_path: Arc::from(route_path),
            image_file: Arc::new(image_file),
            failures: failures_tx.clone(),
        };

        // The route is compared verbatim rather than registered with the
        // router, so file names never go through its path syntax.
        let app = Router::new()
            .fallback(serve_image)
            .with_state(state)
            .layer(TraceLayer::new_for_http());

        Ok(Self {
            listener,
            local_addr,
            app,
            failures,
            failures_tx,
        })
    }

    pub fn spawn(self) -> RunningServer {
        let FileServer {
            listener,
            local_addr,
            app,
            failures,
            failures_tx,
        } = self;

        info!("Serving image on {}", local_addr);

        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                let _ = failures_tx.send(UploaderError::Server(e.to_string()));
            }
        });

        RunningServer {
            local_addr,
            failures,
            task,
        }
    }
}

/// Handle to the background serving task. Dropping it stops the server.
pub struct RunningServer {
    local_addr: SocketAddr,
    failures: mpsc::UnboundedReceiver<UploaderError>,
    task: JoinHandle<()>,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Resolves with the first fatal error the server runs into.
    pub async fn failed(&mut self) -> UploaderError {
        self.failures
            .recv()
            .await
            .unwrap_or_else(|| UploaderError::Server("server task exited".to_string()))
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_image(State(state): State<ServeState>, request: Request) -> Response {
    if request.uri().path() != &*state.route_path
        || !matches!(*request.method(), Method::GET | Method::HEAD)
    {
        return StatusCode::NOT_FOUND.into_response();
    }

    match File::open(state.image_file.as_ref()).await {
        Ok(file) => Body::from_stream(ReaderStream::new(file)).into_response(),
        Err(source) => {
            error!(
                "Unable to open image file {}: {}",
                state.image_file.display(),
                source
            );
            let _ = state.failures.send(UploaderError::FileOpen {
                path: state.image_file.as_ref().clone(),
                source,
            });
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
