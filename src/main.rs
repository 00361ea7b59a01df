//! Overwatch: multi-camera surveillance loop with bufferless frame reads

use std::path::Path;
use std::sync::Arc;

use chrono::Local;
use color_eyre::Result;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use overwatch::capture::{FrameSource, SessionRegistry, V4l2Source};
use overwatch::notify::telegram::TelegramNotifier;
use overwatch::notify::{LogNotifier, Notice, Notifier, NotifierHandle};
use overwatch::pipeline::{orchestrator, FrameDiffDetector};
use overwatch::Config;

/// Log to stdout and to a timestamped file under the configured logs dir.
fn init_logging(logs_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(logs_dir)?;
    let stamp = Local::now().format("%Y_%m_%d___%H_%M_%S");
    let file = std::fs::File::create(logs_dir.join(format!("run_{stamp}.log")))?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("overwatch=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(file)),
        )
        .init();
    Ok(())
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "overwatch.toml".into());
    let config = Config::load(Path::new(&config_path))?;
    init_logging(&config.parameters.logs_dir)?;
    info!(config = %config_path, cameras = config.cameras.len(), "loaded configuration");

    let backend: Box<dyn Notifier> = if config.notify.token.is_empty() {
        info!("no bot token configured, notices go to the log only");
        Box::new(LogNotifier)
    } else {
        Box::new(TelegramNotifier::new(
            &config.notify.token,
            &config.notify.chat_id,
        ))
    };
    let notifier = NotifierHandle::spawn(backend, config.notify.verbose_level)?;
    notifier.send(Notice::Text {
        text: "Starting overwatch".into(),
        level: 3,
    });

    for camera in &config.cameras {
        if camera.show_window {
            warn!(camera = %camera.name, "window display is not built in; ignoring show_window");
        }
    }

    let mut registry = SessionRegistry::open(&config.cameras, config.read_timeout(), |camera| {
        Ok(Box::new(V4l2Source::open(&camera.address)?) as Box<dyn FrameSource>)
    })?;

    let mut detector = FrameDiffDetector::new(
        config.model.cell_size,
        config.model.diff_threshold,
        config.model.min_cells,
    );

    let result = orchestrator::run(&config, &mut registry, &mut detector, &notifier);

    notifier.send(Notice::Text {
        text: "Finishing overwatch".into(),
        level: 3,
    });
    registry.shutdown();
    notifier.shutdown();
    info!("overwatch finished");
    result
}
