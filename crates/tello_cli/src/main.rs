use std::process;

use tello::{ConfigStore, Session, SessionConfig, TelloError};

const DEFAULT_ROUTINE: &[&str] = &["takeoff", "up 150", "flip f", "flip r", "land"];

struct Args {
    config: Option<String>,
    local: Option<String>,
    remote: Option<String>,
    timeout_ms: Option<u64>,
    commands: Vec<String>,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args();
    let config = resolve_config(&args).unwrap_or_else(|e| fatal(&e.to_string()));

    let commands = if args.commands.is_empty() {
        DEFAULT_ROUTINE.iter().map(|c| c.to_string()).collect()
    } else {
        args.commands
    };

    log::info!(
        "Flying {} command(s) against {}",
        commands.len(),
        config.remote_addr
    );

    let result = Session::new(config)
        .scoped(|session| async move {
            let mut rejected = 0usize;

            for command in &commands {
                let response = session.send_command(command).await?;

                if response.accepted {
                    log::info!("{command}: ok");
                } else {
                    rejected += 1;
                    log::warn!("{command}: rejected ({})", response.raw_response);
                }
            }

            Ok::<_, TelloError>(rejected)
        })
        .await;

    match result {
        Ok(0) => log::info!("Routine complete"),
        Ok(rejected) => log::warn!("Routine complete, {rejected} command(s) rejected"),
        Err(e) => fatal(&format!("Routine aborted: {e}")),
    }
}

fn resolve_config(args: &Args) -> Result<SessionConfig, TelloError> {
    let store = match &args.config {
        Some(path) => ConfigStore::from_path(path),
        None => ConfigStore::new()?,
    };

    log::debug!("Loading config from {}", store.path().display());
    let mut config = store.load()?;

    if let Some(local) = &args.local {
        config.local_addr = local.clone();
    }
    if let Some(remote) = &args.remote {
        config.remote_addr = remote.clone();
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.command_timeout_ms = timeout_ms;
    }

    Ok(config)
}

fn parse_args() -> Args {
    let mut args = std::env::args().skip(1);
    let mut parsed = Args {
        config: None,
        local: None,
        remote: None,
        timeout_ms: None,
        commands: Vec::new(),
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => parsed.config = Some(required_value(&mut args, "--config")),
            "--local" => parsed.local = Some(required_value(&mut args, "--local")),
            "--remote" => parsed.remote = Some(required_value(&mut args, "--remote")),
            "--timeout-ms" => {
                let value = required_value(&mut args, "--timeout-ms");
                parsed.timeout_ms = Some(
                    value
                        .parse()
                        .unwrap_or_else(|_| fatal(&format!("Invalid --timeout-ms: {value}"))),
                );
            }
            "--help" | "-h" => {
                eprintln!("Usage: tello-fly [options] [COMMAND...]");
                eprintln!();
                eprintln!("Options:");
                eprintln!("  --config <path>      Config file (default: <config dir>/tello/config.json)");
                eprintln!("  --local <addr>       Local bind address (default: 0.0.0.0:8889)");
                eprintln!("  --remote <addr>      Drone address (default: 192.168.10.1:8889)");
                eprintln!("  --timeout-ms <n>     Per-command response timeout");
                eprintln!();
                eprintln!("Without commands, flies: {}", DEFAULT_ROUTINE.join(", "));
                process::exit(0);
            }
            other if other.starts_with("--") => fatal(&format!("Unknown argument: {other}")),
            command => parsed.commands.push(command.to_string()),
        }
    }

    parsed
}

fn required_value(args: &mut impl Iterator<Item = String>, flag: &str) -> String {
    args.next()
        .unwrap_or_else(|| fatal(&format!("{flag} requires a value")))
}

fn fatal(message: &str) -> ! {
    eprintln!("Error: {message}");
    process::exit(1)
}
