use clap::ArgMatches;
use conclave_runtime::config::Config;

pub async fn run(matches: &ArgMatches) {
    println!("📊 Conclave Runtime Status\n");

    let config = match load_config(matches) {
        Ok(c) => c,
        Err(e) => {
            println!("✗ Configuration: {e}");
            return;
        }
    };

    println!("Configuration");
    match config.validate() {
        Ok(()) => println!("  ✓ valid"),
        Err(e) => println!("  ✗ invalid: {e}"),
    }

    println!("\n💾 Storage");
    report_db_file("bus", &config.bus.database_path);
    report_db_file("state graph", &config.state_graph.database_path);

    println!("\n📋 Policy");
    match &config.policy.policy_file {
        Some(path) if path.exists() => {
            println!("  ✓ {}", path.display())
        }
        Some(path) => println!("  ✗ {} (configured but missing)", path.display()),
        None => println!("  ○ none configured (default-deny ruleset in effect)"),
    }

    println!("\n🔌 Review relay");
    let review_port = config.api.port;
    if is_port_listening(&config.api.host, review_port) {
        println!("  ✓ listening on {}:{review_port}", config.api.host);
    } else {
        println!("  ✗ not listening on {}:{review_port}", config.api.host);
    }

    println!();
}

fn load_config(matches: &ArgMatches) -> Result<Config, conclave_runtime::config::ConfigError> {
    match matches.get_one::<String>("config") {
        Some(path) => Config::from_file(path),
        None => Config::from_env(),
    }
}

fn report_db_file(label: &str, path: &std::path::Path) {
    let display = path.display();
    if path.exists() {
        let size_kb = std::fs::metadata(path).map(|m| m.len() / 1024).unwrap_or(0);
        println!("  ✓ {label}: {display} ({size_kb} KiB)");
    } else {
        println!("  ○ {label}: {display} (not yet created)");
    }
}

fn is_port_listening(host: &str, port: u16) -> bool {
    std::net::TcpStream::connect(format!("{host}:{port}"))
        .map(|_| true)
        .unwrap_or(false)
}
