//! pathtrigger operator shell
//!
//! An interactive line shell over a [`TriggerSession`]: connects to the
//! instrumented service on a forwarded port and exposes the analysis
//! commands an operator drives by hand.

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use pathtrigger::channel::{Command, ControlLink, QueryCategory};
use pathtrigger::device::{AdbDevice, DeviceControl};
use pathtrigger::session::{SessionConfig, TriggerSession};
use pathtrigger::transport::TcpTransport;

/// Shell configuration
struct Config {
    /// Address of the forwarded service socket
    connect: String,
    /// Port forwarded to the device
    port: u16,
    /// adb executable
    adb: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connect: "127.0.0.1:12348".to_string(),
            port: 12348,
            adb: "adb".to_string(),
        }
    }
}

const COMMANDS: &[(&str, &str)] = &[
    ("HELP", "Print this command summary"),
    ("INSTALL <apk>", "Install an application package"),
    ("START <dir>", "Load an analysis directory and start the app"),
    ("TRIGGER <pathId>", "Trigger one analyzed path"),
    ("INFO <category> <id>", "Query live state from the service"),
    ("EXECUTE <raw...>", "Send a raw line to the service"),
    ("CLOSE", "End the analysis session and exit"),
    ("KILL", "End the session and kill the emulator"),
];

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--connect" | "-c" => {
                if i + 1 < args.len() {
                    config.connect = args[i + 1].clone();
                    config.port = config
                        .connect
                        .rsplit(':')
                        .next()
                        .and_then(|p| p.parse().ok())
                        .unwrap_or_else(|| {
                            eprintln!("error: invalid address: {}", args[i + 1]);
                            std::process::exit(1);
                        });
                    i += 2;
                } else {
                    eprintln!("error: --connect requires a value");
                    std::process::exit(1);
                }
            }
            "--adb" => {
                if i + 1 < args.len() {
                    config.adb = args[i + 1].clone();
                    i += 2;
                } else {
                    eprintln!("error: --adb requires a value");
                    std::process::exit(1);
                }
            }
            "--help" | "-h" => {
                println!("pathtrigger-shell - interactive trigger console");
                println!();
                println!("USAGE:");
                println!("    pathtrigger-shell [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -c, --connect <ADDR>      Service address [default: 127.0.0.1:12348]");
                println!("        --adb <PATH>          adb executable [default: adb]");
                println!("    -h, --help                Print help information");
                std::process::exit(0);
            }
            other => {
                eprintln!("error: unknown argument: {other}");
                std::process::exit(1);
            }
        }
    }

    config
}

fn print_help() {
    for (name, description) in COMMANDS {
        println!("{name:<22} {description}");
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = parse_args();
    let device = Arc::new(AdbDevice::new(config.adb.clone()));

    println!("Looking for Android device and trigger service...");
    if let Err(e) = device.wait_for_boot() {
        eprintln!("error: device did not come up: {e}");
        std::process::exit(1);
    }
    if let Err(e) = device.forward_port(config.port, config.port) {
        eprintln!("error: port forward failed: {e}");
        std::process::exit(1);
    }

    let transport = match TcpTransport::connect(config.connect.as_str()) {
        Ok(t) => Arc::new(t),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    let link = Arc::new(ControlLink::new(transport));
    link.on_message(Box::new(|line| {
        println!("\n>>> Received: {line}");
    }));

    let mut session = TriggerSession::new(
        Arc::clone(&link),
        Arc::clone(&device) as Arc<dyn DeviceControl>,
        SessionConfig::default(),
    );
    println!("Connected to trigger service");

    let stdin = io::stdin();
    loop {
        print!("> ");
        let _ = io::stdout().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        let inputs: Vec<&str> = line.split_whitespace().collect();
        let Some((&command, args)) = inputs.split_first() else {
            continue;
        };

        match command {
            "HELP" => print_help(),
            "INSTALL" => match args.first() {
                Some(apk) => {
                    if let Err(e) = device.install_application(Path::new(apk)) {
                        eprintln!("install failed: {e}");
                    }
                }
                None => eprintln!("usage: INSTALL <apk>"),
            },
            "START" => match args.first() {
                Some(dir) => {
                    if let Err(e) = session.load_application(Path::new(dir)) {
                        eprintln!("start failed: {e}");
                    }
                }
                None => eprintln!("usage: START <dir>"),
            },
            "TRIGGER" => match args.first() {
                Some(path_id) => match session.trigger_path(path_id) {
                    Ok(report) => {
                        println!(
                            "path {}: {}/{} constraints fired",
                            report.path_id(),
                            report.triggered(),
                            report.outcomes().len()
                        );
                    }
                    Err(e) => eprintln!("trigger failed: {e}"),
                },
                None => eprintln!("usage: TRIGGER <pathId>"),
            },
            "INFO" => match args {
                [raw_category, id, ..] => {
                    let Some(category) = parse_category(raw_category) else {
                        eprintln!("unknown INFO category: {raw_category}");
                        continue;
                    };
                    // Fire-and-forget; the reply is printed by the
                    // passthrough handler.
                    if let Err(e) = session.link().send(&Command::Info {
                        category,
                        id: Some((*id).to_string()),
                    }) {
                        eprintln!("info failed: {e}");
                    }
                }
                _ => eprintln!("usage: INFO <category> <id>"),
            },
            "EXECUTE" => {
                if args.is_empty() {
                    eprintln!("usage: EXECUTE <raw...>");
                } else if let Err(e) = session.execute_raw(&args.join(" ")) {
                    eprintln!("execute failed: {e}");
                }
            }
            "CLOSE" => {
                session.close();
                break;
            }
            "KILL" => {
                session.close();
                if let Err(e) = device.kill_emulator() {
                    eprintln!("emulator kill failed: {e}");
                }
                break;
            }
            other => eprintln!("unknown command: {other} (try HELP)"),
        }
    }
}

fn parse_category(raw: &str) -> Option<QueryCategory> {
    match raw {
        "location" => Some(QueryCategory::Location),
        "alarm" => Some(QueryCategory::Alarm),
        "time" => Some(QueryCategory::Time),
        _ => None,
    }
}
