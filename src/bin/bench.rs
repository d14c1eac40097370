//! Repeated selection cycles against a live network.
//!
//! NETWORK_ID (default 100), ITERS (default 12), CYCLES (refresh threshold, default 4),
//! TIMEOUT_MS (default 3000). Prints a JSON line and writes a markdown report
//! under `benchmarks/results`.

use std::{fs, path::Path, sync::Arc, time::Instant};

use chrono::Utc;
use fastest_rpc::{HandlerConfig, LogLevel, MemoryStore, RpcHandler};
use serde::Serialize;

#[derive(Serialize, Clone)]
struct Sample { ms: f64, ok: bool, counter: u32, probed: usize, winner: Option<String> }

fn now_ms(start: Instant) -> f64 { start.elapsed().as_secs_f64() * 1000.0 }

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn stats(samples: &[Sample]) -> serde_json::Value {
    let count = samples.len();
    let success = samples.iter().filter(|s| s.ok).count();
    let mut ok_vals: Vec<f64> = samples.iter().filter(|s| s.ok).map(|s| s.ms).collect();
    if ok_vals.is_empty() {
        return serde_json::json!({"mean": null, "median": null, "p95": null, "count": count, "success": success});
    }
    ok_vals.sort_by(f64::total_cmp);
    let mean = ok_vals.iter().sum::<f64>() / ok_vals.len() as f64;
    let median = if ok_vals.len() % 2 == 1 {
        ok_vals[ok_vals.len() / 2]
    } else {
        (ok_vals[ok_vals.len() / 2 - 1] + ok_vals[ok_vals.len() / 2]) / 2.0
    };
    let p95 = ok_vals[(((ok_vals.len() as f64) * 0.95).floor() as usize).min(ok_vals.len() - 1)];
    serde_json::json!({"mean": mean, "median": median, "p95": p95, "count": count, "success": success})
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    let network_id: u64 = env_or("NETWORK_ID", 100);
    let iterations: usize = env_or("ITERS", 12);
    let cycles: u32 = env_or("CYCLES", 4);
    let timeout_ms: u64 = env_or("TIMEOUT_MS", 3000);

    println!("[bench] network={network_id} iterations={iterations} refresh_cycles={cycles}");

    let config = HandlerConfig::new(network_id)
        .with_cache_refresh_cycles(cycles)
        .with_rpc_timeout_ms(timeout_ms)
        .with_auto_storage(true)
        .with_log_level(LogLevel::Warn);

    let handler = RpcHandler::builder(config).store(Arc::new(MemoryStore::new())).build().await?;

    let mut samples = Vec::with_capacity(iterations);
    for i in 0..iterations {
        let t0 = Instant::now();
        let result = if i == 0 {
            handler.get_fastest_rpc_provider().await
        } else {
            handler.test_rpc_performance().await
        };
        let ms = now_ms(t0);

        let counter = handler.refresh_counter().await;
        let probed = handler.runtime_rpcs().await.len();
        match result {
            Ok(provider) => samples.push(Sample { ms, ok: true, counter, probed, winner: Some(provider.url) }),
            Err(e) => {
                eprintln!("cycle {i} failed: {e}");
                samples.push(Sample { ms, ok: false, counter, probed, winner: None });
            }
        }
    }

    // Full cycles probe the whole candidate set; everything else is partial.
    let full: Vec<Sample> = samples.iter().filter(|s| s.counter == 0).cloned().collect();
    let partial: Vec<Sample> = samples.iter().filter(|s| s.counter > 0).cloned().collect();

    let out = serde_json::json!({
        "network_id": network_id,
        "network_name": handler.network_name(),
        "candidates": handler.network_rpcs().len(),
        "iterations": iterations,
        "all": stats(&samples),
        "full": stats(&full),
        "partial": stats(&partial),
        "samples": samples,
    });

    println!("JSON_RESULT {}", serde_json::to_string(&out)?);

    let results_dir = Path::new("benchmarks/results");
    fs::create_dir_all(results_dir)?;
    let ts = Utc::now().to_rfc3339();
    let fpath = results_dir.join(format!("bench-{}-{}iter-{}.md", network_id, iterations, ts.replace(':', "-")));

    let mut md = String::new();
    md.push_str(&format!("# Selection benchmark: {} ({})\n\n", handler.network_name(), network_id));
    md.push_str(&format!("Generated {ts}, {} candidates, refresh every {cycles} cycles.\n\n", handler.network_rpcs().len()));
    md.push_str("| cycle | ms | counter | probed | winner |\n|---|---|---|---|---|\n");
    for (i, s) in samples.iter().enumerate() {
        md.push_str(&format!(
            "| {} | {:.1} | {} | {} | {} |\n",
            i,
            s.ms,
            s.counter,
            s.probed,
            s.winner.as_deref().unwrap_or("-")
        ));
    }
    md.push_str(&format!("\n```json\n{}\n```\n", serde_json::to_string_pretty(&out)?));
    fs::write(&fpath, md)?;
    println!("[bench] wrote {}", fpath.display());

    handler.close().await?;
    Ok(())
}
