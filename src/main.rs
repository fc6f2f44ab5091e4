use log::{error, info, warn};
use std::cell::RefCell;
use std::io::BufRead;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Instant;
use tado_sync::client::{RefreshTokenSource, TadoApi, TadoClient};
use tado_sync::config::{Config, load_env_file};
use tado_sync::device::capabilities::DeviceKind;
use tado_sync::device::pairing::discover_devices;
use tado_sync::host::StaticWebhookChannel;
use tado_sync::models::tado::HomeId;
use tado_sync::sync::engine::SyncEngine;
use tado_sync::sync::runtime::{self, Command};
use tado_sync::sync::scheduler::Scheduler;

const ALL_KINDS: [DeviceKind; 3] = [DeviceKind::Thermostat, DeviceKind::Valve, DeviceKind::AirConditioning];

#[derive(Debug)]
struct LoadedEnvFile {
    path: PathBuf,
    explicit: bool,
}

pub fn run() -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (poll_interval={}s, register_debounce={}ms, webhooks={}, webhook_stdin={}, homes={})",
        cfg.poll_interval.as_secs(),
        cfg.register_debounce.as_millis(),
        cfg.webhook_callback_url.as_deref().unwrap_or("-"),
        cfg.webhook_stdin,
        if cfg.home_ids.is_empty() {
            "all".to_string()
        } else {
            cfg.home_ids.iter().map(|h| h.0.to_string()).collect::<Vec<_>>().join(",")
        }
    );

    // 2) Init Tado client
    let tokens = RefreshTokenSource::new(
        cfg.tado_refresh_token.clone(),
        Some(cfg.tado_refresh_token_file.clone()),
    );
    let client = TadoClient::new(tokens);
    let me = client
        .get_me()
        .map_err(|e| format!("Tado auth failed (refresh token invalid/expired?): {}", e))?;
    info!("Authenticated to Tado API");

    // 3) Discover homes
    let mut homes: Vec<HomeId> = me
        .homes
        .as_deref()
        .unwrap_or(&[])
        .iter()
        .filter_map(|hb| hb.id)
        .filter(|id| cfg.home_ids.is_empty() || cfg.home_ids.contains(id))
        .collect();
    homes.sort_unstable();
    homes.dedup();
    if homes.is_empty() {
        return Err("No homes found; ensure the account has homes and HOME_IDS matches them".into());
    }
    info!("Discovered {} home(s)", homes.len());

    // 4) Discover devices
    let mut paired = Vec::new();
    for home_id in &homes {
        let devices = discover_devices(&client, *home_id, &ALL_KINDS)
            .map_err(|e| format!("Device discovery failed for home {}: {}", home_id.0, e))?;
        info!("Home {}: {} device(s)", home_id.0, devices.len());
        paired.extend(devices);
    }

    // 5) Build the engine and register every device
    let mut engine = SyncEngine::new(client, Scheduler::new(cfg.register_debounce, cfg.poll_interval));
    if let Some(url) = cfg.webhook_callback_url.as_ref() {
        engine = engine.with_webhook_channel(Box::new(StaticWebhookChannel::new(url.clone())));
    }
    for device in paired {
        let name = device.name.clone();
        let device = device
            .into_device()
            .map_err(|e| format!("Creating device {} failed: {}", name, e))?;
        let records = device.records();
        engine.subscribe(Rc::new(RefCell::new(device)));
        for record in records {
            engine.register_device(record, Instant::now());
        }
    }
    info!("Registered {} zone record(s)", engine.registry().len());

    // 6) Inbound webhook deliveries
    let (handle, commands) = runtime::channel();
    if cfg.webhook_stdin {
        let stdin_handle = handle.clone();
        std::thread::spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) if line.trim().is_empty() => {}
                    Ok(line) => {
                        if stdin_handle.send(Command::Webhook(line)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Reading webhook deliveries from stdin failed: {}", e);
                        break;
                    }
                }
            }
            info!("Webhook stdin closed");
        });
    }

    // 7) Sync loop
    runtime::run(&mut engine, commands);
    drop(handle);
    Ok(())
}

fn configure_env_from_cli() -> Result<Option<LoadedEnvFile>, String> {
    let mut args = std::env::args_os();
    args.next(); // skip program name

    let mut env_file: Option<PathBuf> = None;
    while let Some(arg) = args.next() {
        let path = match arg.to_str() {
            Some("--env-file") => args
                .next()
                .map(PathBuf::from)
                .ok_or_else(|| "`--env-file` requires a path argument".to_string())?,
            Some(s) if s.starts_with("--env-file=") => match &s["--env-file=".len()..] {
                "" => return Err("`--env-file` requires a path argument".to_string()),
                p => PathBuf::from(p),
            },
            Some("--") => break,
            Some(other) => return Err(format!("unrecognised argument: {}", other)),
            None => return Err("argument contains invalid UTF-8".to_string()),
        };
        if env_file.replace(path).is_some() {
            return Err("`--env-file` provided more than once".to_string());
        }
    }

    match env_file {
        Some(path) => {
            if !path.is_file() {
                return Err(format!("env file not found: {}", path.display()));
            }
            load_env_file(&path)?;
            Ok(Some(LoadedEnvFile { path, explicit: true }))
        }
        None => {
            let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
            let path = cwd.join(".env");
            if !path.is_file() {
                return Ok(None);
            }
            load_env_file(&path)?;
            Ok(Some(LoadedEnvFile { path, explicit: false }))
        }
    }
}

fn main() {
    let loaded_env = match configure_env_from_cli() {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, info.path.display());
    }

    info!(
        "tado-sync {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run() {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
