use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use tether_core::Config;
use tether_core::EventJournal;
use tether_core::JournaledEvent;
use tether_core::SchemaRegistry;
use tether_core::SessionEvent;
use tether_core::SessionMirror;
use tether_core::StepKindRegistry;
use tether_stream::ConsumerExit;
use tether_stream::StreamConsumer;
use tether_stream::TraceTransport;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "TETHER_LOG";

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        print_help();
        return Ok(());
    };

    match command.as_str() {
        "--help" | "-h" | "help" => {
            print_help();
            Ok(())
        }
        "--version" | "-V" | "version" => {
            println!("tether {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "replay" => {
            init_logging();
            let args = ReplayArgs::parse(args.collect::<Vec<_>>())?;
            replay(args)
        }
        "schema" => {
            let schema = parse_schema_arg(args.collect::<Vec<_>>())?;
            print_schema(schema.as_deref())
        }
        "kinds" => {
            for spec in StepKindRegistry::list() {
                println!("{:<36} {:<12} {}", spec.case, spec.category.label(), spec.title);
            }
            Ok(())
        }
        _ => {
            print_help();
            Err(format!("unknown command: {command}").into())
        }
    }
}

#[derive(Debug, Default)]
struct ReplayArgs {
    trace: Option<PathBuf>,
    session: Option<String>,
    journal: Option<PathBuf>,
    config: Option<PathBuf>,
    schema: Option<PathBuf>,
    delay_ms: Option<u64>,
    hydrate: bool,
    approve: bool,
    json: bool,
}

impl ReplayArgs {
    fn parse(args: Vec<String>) -> Result<Self, Box<dyn std::error::Error>> {
        let mut parsed = Self::default();
        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_str();
            match flag {
                "--hydrate" => parsed.hydrate = true,
                "--approve" => parsed.approve = true,
                "--json" => parsed.json = true,
                "--trace" | "--session" | "--journal" | "--config" | "--schema" | "--delay-ms" => {
                    let Some(value) = args.get(i + 1) else {
                        return Err(format!("{flag} requires a value").into());
                    };
                    match flag {
                        "--trace" => parsed.trace = Some(PathBuf::from(value)),
                        "--session" => parsed.session = Some(value.clone()),
                        "--journal" => parsed.journal = Some(PathBuf::from(value)),
                        "--config" => parsed.config = Some(PathBuf::from(value)),
                        "--schema" => parsed.schema = Some(PathBuf::from(value)),
                        _ => {
                            let delay = value
                                .parse::<u64>()
                                .map_err(|err| format!("--delay-ms: {err}"))?;
                            parsed.delay_ms = Some(delay);
                        }
                    }
                    i += 1;
                }
                other => {
                    return Err(format!("unsupported argument: {other}").into());
                }
            }
            i += 1;
        }
        if parsed.trace.is_none() {
            return Err("replay requires --trace PATH".into());
        }
        Ok(parsed)
    }
}

fn parse_schema_arg(args: Vec<String>) -> Result<Option<PathBuf>, Box<dyn std::error::Error>> {
    match args.as_slice() {
        [] => Ok(None),
        [flag, path] if flag == "--schema" => Ok(Some(PathBuf::from(path))),
        [other, ..] => Err(format!("unsupported argument: {other}").into()),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(explicit: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match dirs::config_dir() {
            Some(dir) => dir.join("tether").join("config.toml"),
            None => return Ok(Config::default()),
        },
    };
    if !path.exists() {
        if explicit.is_some() {
            return Err(format!("config file not found: {}", path.display()).into());
        }
        return Ok(Config::default());
    }
    let raw = fs::read_to_string(&path)?;
    let config = toml::from_str::<Config>(&raw)
        .map_err(|err| format!("{}: {err}", path.display()))?;
    Ok(config)
}

fn load_registry(path: Option<&Path>) -> Result<SchemaRegistry, Box<dyn std::error::Error>> {
    let registry = match path {
        Some(path) => SchemaRegistry::from_yaml_str(&fs::read_to_string(path)?)?,
        None => SchemaRegistry::builtin()?,
    };
    Ok(registry)
}

fn replay(args: ReplayArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(delay_ms) = args.delay_ms {
        config.stream.reconnect_delay_ms = delay_ms;
    }
    if args.hydrate {
        config.stream.hydrate_on_start = true;
    }
    let schema_path = args.schema.clone().or_else(|| config.schema_path.clone());
    let journal_path = args.journal.clone().or_else(|| config.journal.path.clone());
    let session_id = args.session.clone().unwrap_or_else(|| "replay".to_string());
    let trace_path = args.trace.clone().ok_or("replay requires --trace PATH")?;

    let registry = Arc::new(load_registry(schema_path.as_deref())?);
    let transport = Arc::new(TraceTransport::open(&trace_path)?);
    let mirror = SessionMirror::new(session_id.clone(), registry, transport.clone());
    let consumer = StreamConsumer::new(transport.clone(), mirror, config.stream.clone());
    let mut journal = journal_path.map(EventJournal::open).transpose()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(stream_events(
        consumer,
        transport,
        journal.as_mut(),
        &session_id,
        &trace_path,
        &args,
    ))
}

async fn stream_events(
    consumer: StreamConsumer,
    transport: Arc<TraceTransport>,
    mut journal: Option<&mut EventJournal>,
    session_id: &str,
    trace_path: &Path,
    args: &ReplayArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let cancel = consumer.cancellation_token();
    let exhausted = transport.exhausted();
    tokio::spawn(async move {
        tokio::select! {
            _ = exhausted.cancelled() => {}
            _ = tokio::signal::ctrl_c() => {}
        }
        cancel.cancel();
    });

    info!(
        session_id,
        trace = %trace_path.display(),
        "replaying trace"
    );
    let mut handle = consumer.spawn();
    let mut approved = 0usize;
    while let Some(event) = handle.recv().await {
        print_event(&event, args.json)?;
        if let Some(journal) = journal.as_deref_mut() {
            journal.append(session_id, &event)?;
        }
        if let SessionEvent::ApprovalNeeded(request) = &event {
            if args.approve {
                request.approve(None).await?;
                approved += 1;
            } else {
                request.deny();
            }
        }
    }

    let report = handle.join().await?;
    info!(
        subscriptions = report.subscriptions,
        messages = report.messages,
        events = report.events,
        apply_warnings = report.apply_warnings,
        approved,
        "replay finished"
    );
    match report.exit {
        ConsumerExit::Terminal(err) => Err(format!("session stream failed: {err}").into()),
        ConsumerExit::Cancelled | ConsumerExit::ReceiverClosed => Ok(()),
    }
}

fn print_event(event: &SessionEvent, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string(&JournaledEvent::from(event))?);
        return Ok(());
    }
    let line = match event {
        SessionEvent::StepNew { step } => format!(
            "step:new #{} {} {}",
            step.index,
            step.status.label(),
            step.title()
        ),
        SessionEvent::StepUpdate {
            step,
            previous_status,
        } => format!(
            "step:update #{} {} -> {}",
            step.index,
            previous_status.label(),
            step.status.label()
        ),
        SessionEvent::TextDelta {
            delta, step_index, ..
        } => format!("text:delta #{step_index} {delta:?}"),
        SessionEvent::ThinkingDelta {
            delta, step_index, ..
        } => format!("thinking:delta #{step_index} {delta:?}"),
        SessionEvent::CommandOutput {
            delta,
            output_type,
            step_index,
            ..
        } => format!("command_output #{step_index} {output_type:?} {delta:?}"),
        SessionEvent::StatusChange {
            status,
            previous_status,
        } => format!("status_change {} -> {}", previous_status.label(), status.label()),
        SessionEvent::ApprovalNeeded(request) => format!(
            "approval:needed #{} {}",
            request.step_index(),
            request.description()
        ),
        SessionEvent::Done => "done".to_string(),
        SessionEvent::Error { cause } => format!("error {cause}"),
    };
    println!("{line}");
    Ok(())
}

fn print_schema(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let registry = load_registry(path)?;
    println!("root: {}", registry.root().name());
    for name in registry.names() {
        let Some(schema) = registry.get(name) else {
            continue;
        };
        println!("{name}");
        for field in schema.fields() {
            let mut notes = Vec::new();
            if field.repeated {
                notes.push("repeated".to_string());
            }
            if let Some(group) = field.oneof_group.as_deref() {
                notes.push(format!("oneof {group}"));
            }
            if let Some(element) = field.element_schema.as_deref() {
                notes.push(format!("-> {element}"));
            }
            println!(
                "  {:>3} {:<28} {:?} {}",
                field.number,
                field.local_name,
                field.kind,
                notes.join(", ")
            );
        }
    }
    Ok(())
}

fn print_help() {
    println!("tether {}", env!("CARGO_PKG_VERSION"));
    println!("Usage:");
    println!("  tether replay --trace PATH [--session ID] [--journal PATH] [--config PATH]");
    println!("                [--schema PATH] [--delay-ms N] [--hydrate] [--approve] [--json]");
    println!("  tether schema [--schema PATH]");
    println!("  tether kinds");
    println!("  tether --help");
    println!("  tether --version");
    println!();
    println!("Logging is controlled by {LOG_ENV} (default: info).");
}
