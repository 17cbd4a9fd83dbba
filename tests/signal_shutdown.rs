//! A real SIGTERM drives the same stop path as a programmatic shutdown.
#![cfg(unix)]

use async_trait::async_trait;
use hotswap_daemon::core::{
    Component, ComponentPriority, FrameContext, InitContext, KeywordArgs, NoKeywordArgs,
    ShutdownReason,
};
use hotswap_daemon::error::Result;
use hotswap_daemon::launch::{LaunchOptions, Launcher};
use hotswap_daemon::watch::MemoryWatcherFactory;
use std::fs;
use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tempfile::TempDir;

struct Flagged {
    stopped: Arc<AtomicBool>,
}

#[async_trait]
impl Component for Flagged {
    async fn initialize(&mut self, _ctx: &InitContext<'_>, _kw: KeywordArgs) -> Result<()> {
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_sigterm_stops_components() {
    let temp_dir = TempDir::new().unwrap();
    let descriptor = temp_dir.path().join("launch.json");
    fs::write(
        &descriptor,
        r#"{"app_id":"signal-test","components":[{"component_type":"Flagged"}]}"#,
    )
    .unwrap();

    let stopped = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stopped);
    let context = FrameContext::builder()
        .register_component::<NoKeywordArgs, _>(ComponentPriority::High, "Flagged", move || {
            Box::new(Flagged {
                stopped: Arc::clone(&flag),
            })
        })
        .with_watcher_factory(MemoryWatcherFactory::new())
        .build();

    let daemon = Launcher::new(&context, LaunchOptions::new(&descriptor))
        .prepare()
        .await
        .unwrap();
    assert!(!stopped.load(Ordering::SeqCst));

    let status = Command::new("kill")
        .args(["-TERM", &std::process::id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());

    let report = tokio::time::timeout(Duration::from_secs(5), daemon.wait_and_stop())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.reason, ShutdownReason::Terminate);
    assert_eq!(report.component_failures, 0);
    assert!(stopped.load(Ordering::SeqCst));
}
