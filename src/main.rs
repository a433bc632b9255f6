//! post-editor-fs daemon entry point

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use post_editor_fs::config::{login_form, Config, MountConfig};
use post_editor_fs::connector;
use post_editor_fs::mount::MountManager;
use post_editor_fs::Result;

fn print_usage() {
    eprintln!("Usage: post-editor-fs <config.yaml>");
    eprintln!("       post-editor-fs --login-form");
    eprintln!();
    eprintln!("post-editor-fs - Edit a MySQL posts table as a mounted filesystem");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  config.yaml     Path to configuration file");
    eprintln!("  --login-form    Print the connection form fields as JSON and exit");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  post-editor-fs /etc/post-editor-fs/config.yaml");
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        print_usage();
        std::process::exit(1);
    }

    if args[1] == "--login-form" {
        println!("{}", serde_json::to_string_pretty(&login_form())?);
        return Ok(());
    }

    let config_path = PathBuf::from(&args[1]);

    let config = match Config::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    }

    init_logging(&config.logging.level);

    info!("post-editor-fs starting");
    info!("Loaded configuration from {:?}", config_path);

    let handle = tokio::runtime::Handle::current();
    let manager = Arc::new(MountManager::new(handle));

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    let m = manager.clone();

    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
        m.unmount_all();
    })?;

    for mount_config in &config.mounts {
        if let Err(e) = mount_posts(&manager, mount_config).await {
            error!("Failed to mount {:?}: {}", mount_config.path, e);
        }
    }

    if manager.count() == 0 {
        error!("No filesystems were mounted successfully");
        std::process::exit(1);
    }

    info!("{} filesystem(s) mounted successfully", manager.count());
    info!("Press Ctrl+C to unmount and exit");

    while running.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
    }

    info!("Shutting down");
    manager.close_all().await;
    info!("All filesystems unmounted, exiting");

    Ok(())
}

/// `RUST_LOG` wins over the configured level
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Connect one configured mount and attach it to the manager.
///
/// The connector is closed again if the mount cannot be set up.
async fn mount_posts(manager: &MountManager, mount_config: &MountConfig) -> Result<()> {
    info!(
        "Setting up {} mount at {:?}",
        mount_config.connector.name(),
        mount_config.path
    );

    let posts = connector::create(&mount_config.connector, mount_config.read_only).await?;

    let mounted = prepare_mount_point(&mount_config.path).and_then(|()| {
        manager.mount(
            mount_config.path.clone(),
            posts.clone(),
            mount_config.read_only,
        )
    });

    if mounted.is_err() {
        if let Err(e) = posts.close().await {
            debug!("Closing unused connector failed: {}", e);
        }
    }
    mounted
}

fn prepare_mount_point(path: &Path) -> Result<()> {
    if !path.exists() {
        debug!("Creating mount point directory {:?}", path);
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
