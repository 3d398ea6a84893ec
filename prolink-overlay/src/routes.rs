use std::{sync::Arc, time::Duration};

use log::{error, warn};
use tide::{
    http::{
        headers::{CONNECTION, CONTENT_TYPE},
        Method,
    },
    utils::After,
    Request, Response, StatusCode,
};
use tokio::{
    runtime::Handle,
    sync::{watch, Semaphore},
};

use crate::{
    players::{PlayersAggregator, PlayersView},
    render::Renderer,
    OverlayError, Result,
};

pub const NOT_FOUND_BODY: &str = "<p>Page not found.</p>";
pub const STOPPED_BODY: &str = "overlay server stopped";

/// Snapshots still running on the blocking pool, timed out or not. Past
/// this many, page requests fail right away instead of queueing more.
pub const MAX_PENDING_SNAPSHOTS: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Route {
    Page,
    Stylesheet,
    NotFound,
}

impl Route {
    /// Only `GET` on the two fixed paths is served. Everything else,
    /// including other methods on those paths, is not found.
    pub fn resolve(method: Method, path: &str) -> Route {
        match (method, path) {
            (Method::Get, "/") => Route::Page,
            (Method::Get, "/styles.css") => Route::Stylesheet,
            _ => Route::NotFound,
        }
    }
}

/// Shared, read-only state handed to every request.
#[derive(Clone)]
pub struct OverlayState {
    aggregator: PlayersAggregator,
    page: Arc<Renderer>,
    stylesheet: Arc<Renderer>,
    runtime: Handle,
    upstream_timeout: Duration,
    snapshots: Arc<Semaphore>,
    stopped: watch::Receiver<bool>,
}

impl OverlayState {
    /// Must be called from within a tokio runtime; upstream snapshots are
    /// taken on that runtime's blocking pool. Once `stopped` reads `true`
    /// every request is refused and its connection closed.
    pub fn new(
        aggregator: PlayersAggregator,
        page: Renderer,
        stylesheet: Renderer,
        upstream_timeout: Duration,
        stopped: watch::Receiver<bool>,
    ) -> OverlayState {
        OverlayState {
            aggregator,
            page: Arc::new(page),
            stylesheet: Arc::new(stylesheet),
            runtime: Handle::current(),
            upstream_timeout,
            snapshots: Arc::new(Semaphore::new(MAX_PENDING_SNAPSHOTS)),
            stopped,
        }
    }

    fn is_stopped(&self) -> bool {
        *self.stopped.borrow()
    }

    async fn players_view(&self) -> Result<PlayersView> {
        let timeout = self.upstream_timeout;
        // The permit is released when the blocking call returns, not when
        // the request gives up on it.
        let permit = match self.snapshots.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!("{} upstream snapshots still pending", MAX_PENDING_SNAPSHOTS);
                return Err(OverlayError::UpstreamTimeout(timeout));
            }
        };

        let aggregator = self.aggregator.clone();
        let snapshot = self.runtime.spawn(async move {
            tokio::time::timeout(
                timeout,
                tokio::task::spawn_blocking(move || {
                    let view = aggregator.build_players_view();
                    drop(permit);
                    view
                }),
            )
            .await
        });

        match snapshot.await {
            Ok(Ok(Ok(view))) => Ok(view),
            Ok(Ok(Err(e))) | Err(e) => Err(anyhow::anyhow!("snapshot task failed: {}", e).into()),
            Ok(Err(_)) => Err(OverlayError::UpstreamTimeout(timeout)),
        }
    }

    async fn render_page(&self) -> Result<String> {
        let view = self.players_view().await?;
        self.page.render_players(&view)
    }
}

pub fn not_found() -> Response {
    let mut res = Response::new(StatusCode::NotFound);
    res.set_body(NOT_FOUND_BODY);
    res.insert_header(CONTENT_TYPE, "text/html");
    res
}

fn stopped() -> Response {
    let mut res = Response::new(StatusCode::ServiceUnavailable);
    res.set_body(STOPPED_BODY);
    res.insert_header(CONTENT_TYPE, "text/plain; charset=utf-8");
    res.insert_header(CONNECTION, "close");
    res
}

fn rendered(result: Result<String>, content_type: &str, route: Route) -> Response {
    match result {
        Ok(body) => {
            let mut res = Response::new(StatusCode::Ok);
            res.set_body(body);
            res.insert_header(CONTENT_TYPE, content_type);
            res
        }
        Err(e) => {
            if e.is_render_error() {
                error!("failed to render {:?}: {}", route, e);
            } else {
                warn!("failed to serve {:?}: {}", route, e);
            }
            let mut res = Response::new(StatusCode::InternalServerError);
            res.set_body(e.to_string());
            res.insert_header(CONTENT_TYPE, "text/plain; charset=utf-8");
            res
        }
    }
}

async fn dispatch(req: Request<OverlayState>) -> tide::Result {
    let route = Route::resolve(req.method(), req.url().path());
    let state = req.state();
    if state.is_stopped() {
        return Ok(stopped());
    }
    let res = match route {
        Route::Page => rendered(
            state.render_page().await,
            state.page.content_type(),
            route,
        ),
        Route::Stylesheet => rendered(
            state.stylesheet.render_empty(),
            state.stylesheet.content_type(),
            route,
        ),
        Route::NotFound => not_found(),
    };
    Ok(res)
}

/// Builds the tide application serving the overlay routes.
pub fn build_app(state: OverlayState) -> tide::Server<OverlayState> {
    let stopped_rx = state.stopped.clone();
    let mut app = tide::with_state(state);
    app.with(After(move |res: Response| {
        let is_stopped = *stopped_rx.borrow();
        async move {
            if is_stopped {
                return Ok(stopped());
            }
            match res.status() {
                StatusCode::NotFound | StatusCode::MethodNotAllowed => Ok(not_found()),
                _ => Ok(res),
            }
        }
    }));
    app.at("/").all(dispatch);
    app.at("/styles.css").all(dispatch);
    app
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        net::{IpAddr, Ipv4Addr},
        path::PathBuf,
        sync::atomic::{AtomicUsize, Ordering},
        thread,
    };

    use tide::http::{Request as HttpRequest, Response as HttpResponse, Url};

    use super::*;
    use crate::{
        message::{DeviceAnnouncement, TrackMetadata},
        resource::{BundledResource, ResourceRef},
        upstream::{DeviceRegistry, MetadataCache},
        SnapshotSource,
    };

    #[derive(Default)]
    struct SlowRegistry {
        calls: AtomicUsize,
    }

    impl DeviceRegistry for SlowRegistry {
        fn current_devices(&self) -> Result<Vec<DeviceAnnouncement>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(1000));
            Ok(Vec::new())
        }
    }

    impl MetadataCache for SlowRegistry {
        fn latest_metadata_for(&self, _device: u8) -> Result<Option<TrackMetadata>> {
            Ok(None)
        }
    }

    fn state_with(source: Arc<SnapshotSource>, page: ResourceRef) -> OverlayState {
        let (_, stopped) = watch::channel(false);
        OverlayState::new(
            PlayersAggregator::new(source.clone(), source),
            Renderer::page(page),
            Renderer::stylesheet(ResourceRef::Bundled(BundledResource::Stylesheet)),
            Duration::from_secs(2),
            stopped,
        )
    }

    fn slow_state(slow: Arc<SlowRegistry>) -> OverlayState {
        let (_, stopped) = watch::channel(false);
        OverlayState::new(
            PlayersAggregator::new(slow.clone(), slow),
            Renderer::page(ResourceRef::Bundled(BundledResource::OverlayTemplate)),
            Renderer::stylesheet(ResourceRef::Bundled(BundledResource::Stylesheet)),
            Duration::from_millis(50),
            stopped,
        )
    }

    fn bundled_state(source: Arc<SnapshotSource>) -> OverlayState {
        state_with(
            source,
            ResourceRef::Bundled(BundledResource::OverlayTemplate),
        )
    }

    async fn respond(
        app: &tide::Server<OverlayState>,
        method: Method,
        path: &str,
    ) -> HttpResponse {
        let url = Url::parse("http://localhost").unwrap().join(path).unwrap();
        app.respond(HttpRequest::new(method, url)).await.unwrap()
    }

    async fn request(
        app: &tide::Server<OverlayState>,
        method: Method,
        path: &str,
    ) -> (StatusCode, String, String) {
        let mut res = respond(app, method, path).await;
        let content_type = res
            .header(CONTENT_TYPE)
            .map(|v| v.as_str().to_string())
            .unwrap_or_default();
        let body = res.body_string().await.unwrap();
        (res.status(), content_type, body)
    }

    #[test]
    fn test_route_table() {
        let test_cases = [
            (Method::Get, "/", Route::Page),
            (Method::Get, "/styles.css", Route::Stylesheet),
            (Method::Post, "/", Route::NotFound),
            (Method::Head, "/", Route::NotFound),
            (Method::Delete, "/styles.css", Route::NotFound),
            (Method::Get, "/index.html", Route::NotFound),
            (Method::Get, "/styles.css/", Route::NotFound),
            (Method::Get, "", Route::NotFound),
        ];
        for (method, path, route) in test_cases {
            assert_eq!(Route::resolve(method, path), route, "{} {}", method, path);
        }
    }

    #[tokio::test]
    async fn test_page_and_stylesheet() {
        let source = Arc::new(SnapshotSource::new());
        let app = build_app(bundled_state(source.clone()));

        let (status, content_type, body) = request(&app, Method::Get, "/").await;
        assert_eq!(status, StatusCode::Ok);
        assert_eq!(content_type, "text/html; charset=utf-8");
        assert!(body.contains("class=\"players\""));

        source
            .insert_device(DeviceAnnouncement {
                number: 3,
                name: "XDJ-XZ".to_string(),
                address: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 3)),
            })
            .unwrap();
        let (_, _, body) = request(&app, Method::Get, "/").await;
        assert!(body.contains("XDJ-XZ"));

        let (status, content_type, body) = request(&app, Method::Get, "/styles.css").await;
        assert_eq!(status, StatusCode::Ok);
        assert_eq!(content_type, "text/css");
        assert!(body.contains(".player"));
    }

    #[tokio::test]
    async fn test_not_found() {
        let app = build_app(bundled_state(Arc::new(SnapshotSource::new())));
        for (method, path) in [
            (Method::Get, "/nope"),
            (Method::Get, "/art/1.jpg"),
            (Method::Post, "/"),
            (Method::Put, "/styles.css"),
        ] {
            let (status, content_type, body) = request(&app, method, path).await;
            assert_eq!(status, StatusCode::NotFound, "{} {}", method, path);
            assert_eq!(content_type, "text/html");
            assert_eq!(body, NOT_FOUND_BODY);
        }
    }

    #[tokio::test]
    async fn test_broken_template_keeps_serving() {
        let path: PathBuf = std::env::temp_dir().join(format!(
            "prolink_overlay_routes_{}_broken.html",
            std::process::id()
        ));
        fs::write(&path, "{{ players ").unwrap();
        let app = build_app(state_with(
            Arc::new(SnapshotSource::new()),
            ResourceRef::File(path.clone()),
        ));

        let (status, _, body) = request(&app, Method::Get, "/").await;
        assert_eq!(status, StatusCode::InternalServerError);
        assert!(body.starts_with("template error"));

        fs::remove_file(&path).unwrap();
        let (status, _, body) = request(&app, Method::Get, "/").await;
        assert_eq!(status, StatusCode::InternalServerError);
        assert!(body.starts_with("missing resource"));

        let (status, _, _) = request(&app, Method::Get, "/styles.css").await;
        assert_eq!(status, StatusCode::Ok);
    }

    #[tokio::test]
    async fn test_upstream_timeout() {
        let app = build_app(slow_state(Arc::new(SlowRegistry::default())));

        let (status, _, body) = request(&app, Method::Get, "/").await;
        assert_eq!(status, StatusCode::InternalServerError);
        assert!(body.starts_with("upstream timeout"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pending_snapshots_are_bounded() {
        let slow = Arc::new(SlowRegistry::default());
        let app = build_app(slow_state(slow.clone()));

        // Each request times out after 50ms while its snapshot keeps a
        // blocking thread busy for a second.
        for _ in 0..MAX_PENDING_SNAPSHOTS + 3 {
            let (status, _, body) = request(&app, Method::Get, "/").await;
            assert_eq!(status, StatusCode::InternalServerError);
            assert!(body.starts_with("upstream timeout"));
        }
        assert_eq!(slow.calls.load(Ordering::SeqCst), MAX_PENDING_SNAPSHOTS);

        // The stylesheet never waits on upstream.
        let (status, _, _) = request(&app, Method::Get, "/styles.css").await;
        assert_eq!(status, StatusCode::Ok);

        // Finished snapshots hand their slot back.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let (status, _, _) = request(&app, Method::Get, "/").await;
        assert_eq!(status, StatusCode::InternalServerError);
        assert_eq!(slow.calls.load(Ordering::SeqCst), MAX_PENDING_SNAPSHOTS + 1);
    }

    #[tokio::test]
    async fn test_stopped_state_refuses_requests() {
        let (stop_tx, stopped) = watch::channel(false);
        let source = Arc::new(SnapshotSource::new());
        let app = build_app(OverlayState::new(
            PlayersAggregator::new(source.clone(), source),
            Renderer::page(ResourceRef::Bundled(BundledResource::OverlayTemplate)),
            Renderer::stylesheet(ResourceRef::Bundled(BundledResource::Stylesheet)),
            Duration::from_secs(2),
            stopped,
        ));
        assert_eq!(request(&app, Method::Get, "/").await.0, StatusCode::Ok);

        stop_tx.send(true).unwrap();
        for path in ["/", "/styles.css", "/nope"] {
            let mut res = respond(&app, Method::Get, path).await;
            assert_eq!(res.status(), StatusCode::ServiceUnavailable, "{}", path);
            assert_eq!(res.header(CONNECTION).unwrap().as_str(), "close");
            assert_eq!(res.body_string().await.unwrap(), STOPPED_BODY);
        }
    }
}
