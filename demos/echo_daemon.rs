//! A TCP echo daemon assembled from one registered component.
//!
//! This example shows how to:
//! - Register a component type with a typed keyword model
//! - Register a hot-reloadable configuration key
//! - Launch from a descriptor in the dev-mode template layout
//! - Stop cleanly on SIGINT/SIGTERM
//!
//! Run with: cargo run --example echo_daemon
//!
//! Then edit `demos/configs/template/routes.json` while connected with
//! `nc 127.0.0.1 9000`; the greeting changes without a restart.

use async_trait::async_trait;
use hotswap_daemon::launch::FrameSettings;
use hotswap_daemon::prelude::*;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
struct EchoArgs {
    server_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Routes {
    greeting: String,
}

#[derive(Default)]
struct Echo {
    addr: String,
    routes: Option<TypedConfig<Routes>>,
    server: Option<JoinHandle<()>>,
}

#[async_trait]
impl Component for Echo {
    async fn initialize(&mut self, ctx: &InitContext<'_>, kw: KeywordArgs) -> Result<()> {
        let args = kw.downcast::<EchoArgs>()?;
        self.addr = args.server_addr;
        self.routes = ctx.configs.typed::<Routes>("routes");

        ctx.configs
            .register_callback("routes", CallbackType::Update, || {
                info!("routes reloaded");
            })?;
        info!(component = %ctx.id, addr = %self.addr, "echo initialized");
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        let listener = TcpListener::bind(&self.addr).await?;
        let routes = self.routes.clone();
        self.server = Some(tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        info!(%peer, "accepted connection");
                        tokio::spawn(serve(stream, routes.clone()));
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                }
            }
        }));
        info!(addr = %self.addr, "echo listening");
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(server) = self.server.take() {
            server.abort();
        }
        Ok(())
    }
}

async fn serve(stream: TcpStream, routes: Option<TypedConfig<Routes>>) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let greeting = routes
            .as_ref()
            .and_then(|r| r.get())
            .map(|r| r.greeting.clone())
            .unwrap_or_default();
        if writer
            .write_all(format!("{}{}\n", greeting, line).as_bytes())
            .await
            .is_err()
        {
            break;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let log = init_logging("info")?;

    let mut settings = FrameSettings::load(None)?;
    if settings.work_dir == std::path::Path::new(".") {
        settings.work_dir = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos");
        settings.dev_mode = true;
    }

    let context = FrameContext::builder()
        .register_component::<EchoArgs, _>(ComponentPriority::General, "Echo", || {
            Box::new(Echo::default())
        })
        .register_config(
            ConfigRegistration::new("routes", TypedConfig::<Routes>::json()).with_suffix("json"),
        )
        .build();

    let report = Launcher::new(&context, settings.into_launch_options()?)
        .with_log_handle(log)
        .prepare()
        .await?
        .wait_and_stop()
        .await?;

    info!(
        reason = %report.reason,
        component_failures = report.component_failures,
        "echo daemon exited"
    );
    Ok(())
}
