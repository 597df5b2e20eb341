//! `vitsync` - CLI for vitalsync
//!
//! This binary attaches to a sensor host's streaming endpoints and keeps a
//! bounded live view of frames, point clouds, and vital signs, printing a
//! one-line summary as the state evolves.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::time::Duration;

use clap::Parser;
use tracing::{debug, trace};

use vitalsync::cli::{Cli, Command, ConfigCommand, MonitorCommand};
use vitalsync::registry::{endpoint_url, ChannelName, ChannelRegistry};
use vitalsync::store::{LiveStateStore, StateSnapshot};
use vitalsync::telemetry::{kinds, DeviceStatus, LogEntry, PointBatch, RadarFrame, VitalsSample};
use vitalsync::{init_logging, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone())?;

    // Execute the command
    match cli.command {
        Command::Monitor(monitor_cmd) => handle_monitor(&config, &monitor_cmd).await,
        Command::Status(status_cmd) => handle_status(&config, status_cmd.json),
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
    }
}

/// Bind the store's reducers to the streams they consume.
fn wire_store(registry: &ChannelRegistry, store: &LiveStateStore) {
    let telemetry = registry.channel(ChannelName::Telemetry);

    let s = store.clone();
    telemetry.subscribe(kinds::FRAME, move |envelope| {
        match RadarFrame::from_payload(&envelope.payload) {
            Some(frame) => s.apply_frame(frame),
            None => debug!("frame payload did not deserialize"),
        }
    });

    let s = store.clone();
    telemetry.subscribe(kinds::POINTS, move |envelope| {
        match PointBatch::from_payload(&envelope.payload) {
            Some(batch) => s.apply_points(batch.points),
            None => debug!("point batch payload did not deserialize"),
        }
    });

    let s = store.clone();
    telemetry.subscribe(kinds::VITALS, move |envelope| {
        match VitalsSample::from_payload(&envelope.payload) {
            Some(sample) => s.apply_vitals(sample),
            None => debug!("vitals payload did not deserialize"),
        }
    });

    let s = store.clone();
    telemetry.subscribe(kinds::STATUS, move |envelope| {
        match DeviceStatus::from_payload(&envelope.payload) {
            Some(status) => s.apply_device_status(status),
            None => debug!("status payload did not deserialize"),
        }
    });

    telemetry.subscribe_all(|envelope| {
        trace!(kind = %envelope.kind, timestamp = envelope.timestamp, "envelope received");
    });

    let s = store.clone();
    telemetry.on_connectivity(move |connected| s.set_connected(connected));

    let logs = registry.channel(ChannelName::Logs);
    let s = store.clone();
    logs.subscribe(kinds::LOG, move |envelope| {
        match LogEntry::from_payload(&envelope.payload) {
            Some(entry) => s.apply_log(entry),
            None => debug!("log payload did not deserialize"),
        }
    });
}

fn print_snapshot_line(snapshot: &StateSnapshot) {
    let vitals = snapshot.vitals.latest().map_or_else(
        || "hr  --.- rr --.-".to_string(),
        |sample| {
            format!(
                "hr {:5.1} rr {:4.1}",
                sample.heart_rate, sample.respiration_rate
            )
        },
    );
    println!(
        "[{}] frames {:>3} seq {:>6} | points {:>3} | {} | logs {:>4}{}",
        if snapshot.connected { "online " } else { "offline" },
        snapshot.frames.len(),
        snapshot.frames.latest().map_or(0, |frame| frame.sequence),
        snapshot.points.len(),
        vitals,
        snapshot.logs.len(),
        if snapshot.paused { " | paused" } else { "" },
    );
}

async fn handle_monitor(
    config: &Config,
    cmd: &MonitorCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = LiveStateStore::new(&config.store_limits());
    let registry = ChannelRegistry::new(
        &config.endpoint.host,
        config.endpoint.secure,
        &config.reconnect_policy(),
    );

    if let Some(window) = cmd.window {
        store.set_time_window(Duration::from_secs(window));
    }

    wire_store(&registry, &store);

    let selected = cmd.selected_channels();
    for name in &selected {
        registry.connect(*name);
    }
    println!(
        "Attached to {} channel(s) on {}; press ctrl-c to stop.",
        selected.len(),
        config.endpoint.host
    );

    let deadline = cmd
        .duration
        .map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs));
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    loop {
        let stop_at = async {
            match deadline {
                Some(instant) => tokio::time::sleep_until(instant).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            () = stop_at => break,
            _ = ticker.tick() => print_snapshot_line(&store.snapshot()),
        }
    }

    registry.disconnect_all();
    Ok(())
}

fn handle_status(config: &Config, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        let endpoints: Vec<serde_json::Value> = ChannelName::ALL
            .iter()
            .map(|name| {
                serde_json::json!({
                    "channel": name.wire_name(),
                    "url": endpoint_url(&config.endpoint.host, config.endpoint.secure, *name),
                })
            })
            .collect();
        let status = serde_json::json!({
            "host": config.endpoint.host,
            "secure": config.endpoint.secure,
            "endpoints": endpoints,
            "reconnect": {
                "base_delay_ms": config.reconnect.base_delay_ms,
                "cap_delay_ms": config.reconnect.cap_delay_ms,
                "max_attempts": config.reconnect.max_attempts,
            },
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("vitsync status");
        println!("--------------");
        println!("Host:          {}", config.endpoint.host);
        println!("Secure:        {}", config.endpoint.secure);
        println!();
        println!("Endpoints:");
        for name in ChannelName::ALL {
            println!(
                "  {:<10} {}",
                name.wire_name(),
                endpoint_url(&config.endpoint.host, config.endpoint.secure, name)
            );
        }
        println!();
        println!(
            "Reconnect:     base {} ms, cap {} ms, up to {} attempts",
            config.reconnect.base_delay_ms,
            config.reconnect.cap_delay_ms,
            config.reconnect.max_attempts
        );
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Endpoint]");
                println!("  Host:               {}", config.endpoint.host);
                println!("  Secure:             {}", config.endpoint.secure);
                println!();
                println!("[Reconnect]");
                println!("  Base delay (ms):    {}", config.reconnect.base_delay_ms);
                println!("  Cap delay (ms):     {}", config.reconnect.cap_delay_ms);
                println!("  Max attempts:       {}", config.reconnect.max_attempts);
                println!();
                println!("[Limits]");
                println!("  Frame capacity:     {}", config.limits.frame_capacity);
                println!("  Point capacity:     {}", config.limits.point_capacity);
                println!("  Point max age:      {}", config.limits.point_max_age);
                println!(
                    "  Vitals retention:   {} s",
                    config.limits.vitals_retention_secs
                );
                println!("  Log capacity:       {}", config.limits.log_capacity);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
