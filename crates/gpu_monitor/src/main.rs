//! # GPU Monitor
//!
//! Monitora GPUs NVIDIA via NVML e loga as leituras a cada intervalo.
//!
//! ## Uso
//! ```bash
//! gpu_monitor                      # Loop contínuo
//! gpu_monitor --once               # Um ciclo, imprime os snapshots em TOML
//! gpu_monitor --report             # Imprime o relatório de cada GPU e sai
//! gpu_monitor --config outro.toml  # Config alternativa
//! ```

mod monitor;

use gpu_telemetry::config::AppConfig;
use monitor::{GpuMonitor, snapshots_toml};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Flags de linha de comando.
#[derive(Debug, Default)]
struct Args {
    report: bool,
    once: bool,
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = Args::default();
        let mut iter = std::env::args().skip(1);
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--report" => args.report = true,
                "--once" => args.once = true,
                "--config" => args.config = iter.next().map(PathBuf::from),
                other => eprintln!("Argumento ignorado: {other}"),
            }
        }
        args
    }
}

fn main() {
    let args = Args::parse();

    // ── Carregar config ──
    let explicit = args.config.is_some();
    let config_path = args.config.clone().unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load(&config_path);

    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.monitor.log_level.as_str().into()),
        )
        .init();
    info!("Config: {}", config_path.display());

    // Salva config padrão se não existir
    if !explicit && !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    for problem in config.validate() {
        warn!("Config: {problem}");
    }

    let interval = Duration::from_secs_f64(config.monitor.interval_secs.clamp(0.1, 60.0));

    // ── GPU Monitor ──
    let mut gpus = GpuMonitor::new(&config);

    if args.report || config.monitor.report_on_start {
        for report in gpus.reports() {
            println!("{report}");
        }
        if args.report {
            gpus.close();
            return;
        }
    }

    if args.once {
        let snapshots = gpus.collect();
        match snapshots_toml(&snapshots) {
            Ok(text) => println!("{text}"),
            Err(e) => error!("Erro ao serializar snapshots: {e}"),
        }
        gpus.close();
        return;
    }

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   ⚡ GPU MONITOR – ATIVO (NVML)");
    println!("══════════════════════════════════════════════");
    println!("  GPUs:      {}", gpus.gpus().iter().filter(|g| g.is_enabled()).count());
    println!("  Sensores:  {}", gpus.board().len());
    println!("  Intervalo: {:.1}s", interval.as_secs_f64());
    if config.monitor.cycles > 0 {
        println!("  Ciclos:    {}", config.monitor.cycles);
    }
    println!("══════════════════════════════════════════════");
    println!();

    // ── Loop principal ──
    let mut cycle = 0u64;
    loop {
        let cycle_start = Instant::now();

        for gpu in gpus.collect() {
            info!(
                "{} {} | {} {} | {} {} | VRAM {}",
                gpu.id,
                gpu.name,
                show(gpu.load_core, "%"),
                show(gpu.temp, "°C"),
                show(gpu.clock_core, "MHz"),
                show(gpu.power, "W"),
                show(gpu.mem_percent, "%"),
            );
        }

        cycle += 1;
        if config.monitor.cycles > 0 && cycle >= config.monitor.cycles {
            break;
        }

        // Dormir pelo tempo restante do intervalo
        let elapsed = cycle_start.elapsed();
        if elapsed < interval {
            std::thread::sleep(interval - elapsed);
        }
    }

    gpus.close();
    info!("Monitor encerrado após {cycle} ciclos");
}

/// Valor com unidade, ou "--" se nunca lido.
fn show(value: Option<f32>, unit: &str) -> String {
    match value {
        Some(v) => format!("{v:.1}{unit}"),
        None => "--".into(),
    }
}
