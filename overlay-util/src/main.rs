use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use log::info;
use prolink_overlay::{start, stop, ServerOptions, SnapshotSource};
use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(about = "serves the current player state as an HTML overlay")]
struct Opt {
    /// Port to listen on.
    #[structopt(short, long, default_value = "17081")]
    port: u16,

    /// Template to render instead of the bundled overlay page.
    #[structopt(long, parse(from_os_str))]
    template: Option<PathBuf>,

    /// Stylesheet template to render instead of the bundled one.
    #[structopt(long, parse(from_os_str))]
    css: Option<PathBuf>,

    /// Open the overlay in a browser once the server is up.
    #[structopt(long)]
    show: bool,

    /// JSON file with the devices and tracks to serve.
    #[structopt(long, parse(from_os_str))]
    snapshot: Option<PathBuf>,

    /// Upper bound on taking a player snapshot, in milliseconds.
    #[structopt(long, default_value = "2000")]
    timeout_ms: u64,
}

impl Opt {
    fn server_options(&self) -> ServerOptions {
        let mut options = ServerOptions::new(self.port)
            .show(self.show)
            .upstream_timeout(Duration::from_millis(self.timeout_ms));
        if let Some(template) = &self.template {
            options = options.template(template);
        }
        if let Some(css) = &self.css {
            options = options.css(css);
        }
        options
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let opt = Opt::from_args();

    let source = match &opt.snapshot {
        Some(path) => Arc::new(SnapshotSource::load(path)?),
        None => Arc::new(SnapshotSource::new()),
    };

    let handle = start(opt.server_options(), source.clone(), source).await?;
    println!("overlay running at {}", handle.url());

    tokio::signal::ctrl_c().await?;
    info!("terminating");
    stop(handle).await;

    Ok(())
}
