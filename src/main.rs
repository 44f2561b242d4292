use anyhow::Context;
use clap::Parser;
use fanout_sync::app::{build_local_engine, last_sync_times, LocalSyncEngine};
use fanout_sync::config::{Cli, Command, DomainConfig, SyncConfig};
use fanout_sync::utils::error::{ErrorSeverity, SyncError};
use fanout_sync::utils::logger;
use fanout_sync::SyncResult;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 初始化日誌
    logger::init_logger(cli.verbose, cli.json_logs);

    tracing::info!("🚀 Starting fanout-sync");
    tracing::info!("📁 Loading configuration from: {}", cli.config);

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => exit_with(&e),
    };

    if cli.monitor {
        tracing::info!("🔍 System monitoring enabled");
    }

    match cli.command {
        Command::Validate => {
            print_config_summary(&config);
            Ok(())
        }
        Command::Sync { domains } => {
            let selected = match select_domains(&config, &domains) {
                Ok(selected) => selected,
                Err(e) => exit_with(&e),
            };
            let engine = build_local_engine(&config, cli.monitor).context("failed to build sync engine")?;
            let results = engine.run_domains(selected).await;
            print_results(&results);

            if results.iter().any(|r| !r.is_success()) {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Cleanup { retention_days } => {
            let days = retention_days.unwrap_or_else(|| config.retention_days());
            let engine = build_local_engine(&config, cli.monitor).context("failed to build sync engine")?;
            match engine.run_cleanup(days).await {
                Ok(deleted) => {
                    println!("🧹 Removed {} log entries older than {} days", deleted, days);
                    Ok(())
                }
                Err(e) => exit_with(&e),
            }
        }
        Command::LastSync { domains } => {
            let names: Vec<String> = if domains.is_empty() {
                config.domains.iter().map(|d| d.name.clone()).collect()
            } else {
                domains
            };
            let engine = build_local_engine(&config, false).context("failed to build sync engine")?;
            let times = last_sync_times(engine.orchestrator().store(), &names)
                .await
                .context("failed to read sync state")?;

            for (name, time) in times {
                println!("{:<24} {}", name, time.as_deref().unwrap_or("never"));
            }
            Ok(())
        }
        Command::Schedule {
            every_minutes,
            cleanup_every_runs,
        } => {
            let engine = build_local_engine(&config, cli.monitor).context("failed to build sync engine")?;
            run_schedule(&engine, &config, every_minutes, cleanup_every_runs).await;
            Ok(())
        }
    }
}

fn load_config(path: &str) -> fanout_sync::Result<SyncConfig> {
    let config = SyncConfig::from_file(path)?;
    config.validate_config()?;
    tracing::info!("✅ Configuration loaded and validated successfully");
    Ok(config)
}

fn select_domains<'a>(config: &'a SyncConfig, names: &[String]) -> fanout_sync::Result<Vec<&'a DomainConfig>> {
    if names.is_empty() {
        return Ok(config.enabled_domains());
    }

    names
        .iter()
        .map(|name| {
            config.domain(name).ok_or_else(|| SyncError::InvalidConfigValueError {
                field: "--domain".to_string(),
                value: name.clone(),
                reason: "no domain with this name in the configuration".to_string(),
            })
        })
        .collect()
}

async fn run_schedule(engine: &LocalSyncEngine, config: &SyncConfig, every_minutes: u64, cleanup_every_runs: u64) {
    let period = Duration::from_secs(every_minutes.max(1) * 60);
    let mut interval = tokio::time::interval(period);
    let mut runs: u64 = 0;

    tracing::info!("⏰ Scheduling sync every {} minutes (Ctrl-C to stop)", every_minutes.max(1));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                runs += 1;
                tracing::info!("🔄 Scheduled run #{}", runs);
                let results = engine.run_domains(config.enabled_domains()).await;
                print_results(&results);

                if cleanup_every_runs > 0 && runs % cleanup_every_runs == 0 {
                    if let Err(e) = engine.run_cleanup(config.retention_days()).await {
                        tracing::error!("❌ Log cleanup failed: {}", e);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("🛑 Stopping scheduler");
                if let Err(e) = engine.flush_logs().await {
                    tracing::error!("❌ Final log flush failed: {}", e);
                }
                break;
            }
        }
    }
}

fn print_results(results: &[SyncResult]) {
    for result in results {
        if result.is_success() {
            println!("✅ {}: {}", result.domain, result.summary());
        } else {
            println!("❌ {}: {}", result.domain, result.summary());
        }
    }
}

fn print_config_summary(config: &SyncConfig) {
    println!("📋 Configuration: {}", config.sync.name);
    println!("   Principal: {}", config.principal());
    println!("   Output: {}", config.output_path());
    println!(
        "   Log table: {} (retention {} days)",
        config.log_table(),
        config.retention_days()
    );

    for domain in &config.domains {
        let state = if domain.is_enabled() { "enabled" } else { "disabled" };
        println!(
            "   • {} [{}] pacing {:?}: {}",
            domain.name,
            state,
            domain.pacing_policy(config.sync.pacing_policy()),
            domain.categories().join(", ")
        );
    }
}

/// 依錯誤嚴重程度決定退出碼
fn exit_with(e: &SyncError) -> ! {
    tracing::error!(
        "❌ {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());

    let exit_code = match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    };
    std::process::exit(exit_code)
}
