use clap::ArgMatches;
use conclave_runtime::config::Config;

pub async fn run(matches: &ArgMatches) {
    println!("🔍 Checking runtime health...\n");

    let mut all_ok = true;

    print!("• Loading configuration... ");
    let config = match matches.get_one::<String>("config") {
        Some(path) => Config::from_file(path),
        None => Config::from_env(),
    };
    let config = match config {
        Ok(c) => {
            println!("✓ loaded");
            c
        }
        Err(e) => {
            println!("✗ {e}");
            std::process::exit(1);
        }
    };

    print!("• Validating configuration... ");
    if let Err(e) = config.validate() {
        println!("✗ {e}");
        all_ok = false;
    } else {
        println!("✓ valid");
    }

    print!("• Checking bus database path... ");
    if check_writable_parent(&config.bus.database_path) {
        println!("✓ {} is writable", config.bus.database_path.display());
    } else {
        println!("✗ {} is not writable", config.bus.database_path.display());
        all_ok = false;
    }

    print!("• Checking state graph database path... ");
    if check_writable_parent(&config.state_graph.database_path) {
        println!(
            "✓ {} is writable",
            config.state_graph.database_path.display()
        );
    } else {
        println!(
            "✗ {} is not writable",
            config.state_graph.database_path.display()
        );
        all_ok = false;
    }

    print!("• Checking policy file (optional)... ");
    match &config.policy.policy_file {
        Some(path) if path.exists() => println!("✓ found {}", path.display()),
        Some(path) => {
            println!("✗ configured but missing: {}", path.display());
            all_ok = false;
        }
        None => println!("○ none configured, default-deny ruleset applies"),
    }

    print!("• Checking review relay auth token... ");
    match config.get_api_auth_token() {
        Ok(_) => println!("✓ configured"),
        Err(e) => {
            println!("○ {e}");
        }
    }

    println!();
    if all_ok {
        println!("✅ All checks passed! You're ready to run: conclave run");
    } else {
        println!("⚠️  Some checks failed. Fix the issues above before running conclave run");
        std::process::exit(1);
    }
}

fn check_writable_parent(path: &std::path::Path) -> bool {
    if path.exists() {
        return true;
    }
    let parent = path.parent().unwrap_or_else(|| std::path::Path::new("."));
    if !parent.exists() {
        return std::fs::create_dir_all(parent).is_ok();
    }
    let probe = parent.join(".conclave-doctor-probe");
    let writable = std::fs::write(&probe, b"").is_ok();
    let _ = std::fs::remove_file(&probe);
    writable
}
