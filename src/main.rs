mod cli;

use loopcast::{config, server, streaming};
use loopcast_av::{FfmpegInvoker, ToolRegistry, TranscodeInvoker};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::sync::Arc;

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&std::path::Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config::validate_config(&config)?;

    tracing::info!("Starting loopcast server");

    let tools = ToolRegistry::discover(&config.tools.tool_paths());
    let invoker = FfmpegInvoker::new(&tools, config.tools.timeouts())
        .context("ffmpeg and ffprobe are required; run `loopcast check-tools`")?;

    let settings = config.stream_settings();
    tracing::info!(
        mode = ?settings.mode,
        segment_secs = settings.segment_duration.as_secs_f64(),
        window = settings.window_size,
        work_dir = %settings.work_dir.display(),
        "Stream settings"
    );

    let sessions = streaming::LiveSessionManager::new(
        Arc::new(invoker),
        Arc::new(streaming::ProcessMemory::new()),
        settings,
    );

    server::start_server(config, sessions).await
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "loopcast=trace,loopcast_av=trace,loopcast_media=debug,tower_http=debug".to_string()
        } else {
            "loopcast=debug,loopcast_av=debug,loopcast_media=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Probe { source, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_source(&source, json, cli.config.as_deref()))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("loopcast {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn probe_source(
    source: &str,
    json: bool,
    config_path: Option<&std::path::Path>,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let tools = ToolRegistry::discover(&config.tools.tool_paths());
    let invoker = FfmpegInvoker::new(&tools, config.tools.timeouts())?;

    let duration = invoker
        .probe_duration(source)
        .await
        .with_context(|| format!("Failed to probe {source}"))?;

    let segment = config.stream_settings().segment_duration;
    let loopable = duration >= segment;

    if json {
        let out = serde_json::json!({
            "source": source,
            "duration_secs": duration.as_secs_f64(),
            "loopable": loopable,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        let secs = duration.as_secs();
        println!("Source: {}", source);
        println!(
            "Duration: {:02}:{:02}:{:02}.{:03}",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60,
            duration.subsec_millis()
        );
        if loopable {
            println!("✓ Long enough to loop with {:.1}s segments", segment.as_secs_f64());
        } else {
            println!("✗ Shorter than one {:.1}s segment", segment.as_secs_f64());
        }
    }

    Ok(())
}

fn check_tools(config_path: Option<&std::path::Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = config::load_config_or_default(config_path)?;
    let tools = ToolRegistry::discover(&config.tools.tool_paths()).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install ffmpeg to enable streaming.");
    }

    Ok(())
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    let settings = config.stream_settings();
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Mode: {:?}", settings.mode);
    println!("  Segment duration: {:.3}s", settings.segment_duration.as_secs_f64());
    println!("  Window size: {}", settings.window_size);
    println!("  Refresh interval: {:.3}s", settings.refresh_interval.as_secs_f64());
    println!("  Conflict policy: {:?}", settings.conflict_policy);
    println!("  Retention: {:?}", settings.retention);
    println!("  Work dir: {}", settings.work_dir.display());

    Ok(())
}
