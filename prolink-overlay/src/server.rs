use std::{
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    process::Command,
    sync::Arc,
    thread,
    time::Duration,
};

use log::{error, info, warn};
use tide::listener::Listener;
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    players::PlayersAggregator,
    render::Renderer,
    resource::{resolve, BundledResource, ResourceRef},
    routes::{build_app, OverlayState},
    upstream::{DeviceRegistry, MetadataCache},
    OverlayError, Result,
};

pub const DEFAULT_PORT: u16 = 17081;
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(2);

/// What the embedding application asks for when starting the server.
#[derive(Clone, Debug)]
pub struct ServerOptions {
    pub port: u16,
    pub template: Option<PathBuf>,
    pub css: Option<PathBuf>,
    pub show: bool,
    pub upstream_timeout: Duration,
}

impl Default for ServerOptions {
    fn default() -> ServerOptions {
        ServerOptions {
            port: DEFAULT_PORT,
            template: None,
            css: None,
            show: false,
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
        }
    }
}

impl ServerOptions {
    pub fn new(port: u16) -> ServerOptions {
        ServerOptions {
            port,
            ..Default::default()
        }
    }

    pub fn template(mut self, path: impl Into<PathBuf>) -> ServerOptions {
        self.template = Some(path.into());
        self
    }

    pub fn css(mut self, path: impl Into<PathBuf>) -> ServerOptions {
        self.css = Some(path.into());
        self
    }

    pub fn show(mut self, show: bool) -> ServerOptions {
        self.show = show;
        self
    }

    pub fn upstream_timeout(mut self, timeout: Duration) -> ServerOptions {
        self.upstream_timeout = timeout;
        self
    }

    /// Resolves the template overrides. Fails if an override is not a
    /// readable file.
    pub fn resolve(&self) -> Result<ServerConfig> {
        Ok(ServerConfig {
            port: self.port,
            template: resolve(self.template.as_deref(), BundledResource::OverlayTemplate)?,
            stylesheet: resolve(self.css.as_deref(), BundledResource::Stylesheet)?,
            upstream_timeout: self.upstream_timeout,
        })
    }
}

/// Settings of a running server. Fixed once the server has started.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
    pub template: ResourceRef,
    pub stylesheet: ResourceRef,
    pub upstream_timeout: Duration,
}

impl ServerConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), self.port)
    }

    pub fn url(&self) -> String {
        format!("http://{}/", self.addr())
    }
}

/// A running overlay server. Pass it to [`stop`] to shut the server down.
pub struct ServerHandle {
    config: ServerConfig,
    task: JoinHandle<()>,
    stop_tx: watch::Sender<bool>,
}

impl ServerHandle {
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn url(&self) -> String {
        self.config.url()
    }
}

/// Starts serving the overlay on `127.0.0.1:<port>`.
///
/// Returns once the port is bound. Overrides are checked before anything
/// is bound, so a bad override never leaves a socket open. Must be called
/// from within a tokio runtime.
pub async fn start(
    options: ServerOptions,
    registry: Arc<dyn DeviceRegistry>,
    cache: Arc<dyn MetadataCache>,
) -> Result<ServerHandle> {
    let config = options.resolve()?;
    let addr = config.addr();
    if config.port == 0 {
        return Err(OverlayError::Bind {
            addr,
            source: io::Error::new(io::ErrorKind::InvalidInput, "port 0 is not a valid port"),
        });
    }

    let (stop_tx, stopped) = watch::channel(false);
    let state = OverlayState::new(
        PlayersAggregator::new(registry, cache),
        Renderer::page(config.template.clone()),
        Renderer::stylesheet(config.stylesheet.clone()),
        config.upstream_timeout,
        stopped,
    );
    let mut listener = build_app(state)
        .bind(addr)
        .await
        .map_err(|source| OverlayError::Bind { addr, source })?;

    let task = tokio::spawn(async move {
        if let Err(e) = listener.accept().await {
            error!(target: "prolink-overlay", "overlay listener error: {}", e);
        }
    });

    let handle = ServerHandle {
        config,
        task,
        stop_tx,
    };
    info!(target: "prolink-overlay", "overlay server running at {}", handle.url());

    if options.show {
        if let Err(e) = open_browser(&handle.url()) {
            warn!(target: "prolink-overlay", "unable to open browser: {}", e);
        }
    }

    Ok(handle)
}

/// Stops the server and releases its port. The port is free when this
/// returns. Connections that are already open get a 503 on their next
/// request and are then closed.
pub async fn stop(handle: ServerHandle) {
    let url = handle.url();
    let _ = handle.stop_tx.send(true);
    handle.task.abort();
    let _ = handle.task.await;
    info!(target: "prolink-overlay", "overlay server at {} stopped", url);
}

/// Opens `url` in the default browser without waiting for it.
pub fn open_browser(url: &str) -> io::Result<()> {
    let mut cmd = browser_command(url)?;
    let mut child = cmd.spawn()?;
    // Reap the opener so it doesn't linger as a zombie.
    thread::spawn(move || {
        let _ = child.wait();
    });
    Ok(())
}

#[cfg(target_os = "windows")]
fn browser_command(url: &str) -> io::Result<Command> {
    let mut cmd = Command::new("cmd");
    cmd.args(&["/C", "start", "", url]);
    Ok(cmd)
}

#[cfg(target_os = "macos")]
fn browser_command(url: &str) -> io::Result<Command> {
    let mut cmd = Command::new("open");
    cmd.arg(url);
    Ok(cmd)
}

#[cfg(all(unix, not(target_os = "macos")))]
fn browser_command(url: &str) -> io::Result<Command> {
    let mut cmd = Command::new("xdg-open");
    cmd.arg(url);
    Ok(cmd)
}

#[cfg(not(any(unix, target_os = "windows")))]
fn browser_command(_url: &str) -> io::Result<Command> {
    Err(io::Error::new(
        io::ErrorKind::Other,
        "opening a browser is unsupported on this platform",
    ))
}
