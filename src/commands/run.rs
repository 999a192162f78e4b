use std::sync::Arc;

use clap::ArgMatches;
use conclave_runtime::agent_loop::{AgentLoop, ShutdownSignal};
use conclave_runtime::roles::ROLES;
use conclave_runtime::types::AgentId;
use conclave_runtime::Runtime;

pub async fn run(matches: &ArgMatches) {
    let config_path = matches.get_one::<String>("config");

    let config = match config_path {
        Some(path) => conclave_runtime::config::Config::from_file(path),
        None => conclave_runtime::config::Config::from_env(),
    };
    let config = match config {
        Ok(c) => c,
        Err(e) => {
            eprintln!("✗ failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = config.validate() {
        eprintln!("✗ invalid configuration: {e}");
        std::process::exit(1);
    }

    let runtime = match Runtime::in_memory() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("✗ failed to start runtime: {e}");
            std::process::exit(1);
        }
    };
    let runtime = Arc::new(runtime);
    // The bus is held behind `dyn EventBus`, so role loops poll the
    // 500ms fallback in `AgentLoop::run` rather than a publisher-side
    // wakeup; fine for the in-memory single-process runtime.
    let bus_notify = Arc::new(tokio::sync::Notify::new());
    let shutdown = ShutdownSignal::new();

    println!("✓ conclave runtime started ({} roles)", ROLES.len());

    let mut handles = Vec::new();
    for role in ROLES {
        let runtime = runtime.clone();
        let bus_notify = bus_notify.clone();
        let shutdown = shutdown.clone();
        let subject = format!("swarm.events.{}", role.name);
        let role_name = role.name.to_string();

        handles.push(tokio::spawn(async move {
            let agent_loop = AgentLoop::new(role_name.clone(), subject, AgentId::new());
            let mut memory = Default::default();
            println!("  → role '{role_name}' listening");
            agent_loop
                .run(
                    runtime.bus.as_ref(),
                    bus_notify,
                    runtime.authorizer.as_ref(),
                    &mut memory,
                    shutdown,
                )
                .await;
            println!("  ← role '{role_name}' stopped");
        }));
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("✗ failed to listen for shutdown signal: {e}");
    }
    println!("✓ shutdown requested, draining role loops");
    shutdown.trigger();

    for handle in handles {
        let _ = handle.await;
    }
    println!("✓ conclave runtime stopped");
}
