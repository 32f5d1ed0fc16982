//! Standalone candump inspector
//!
//! Replays a candump log through the dispatch table frame by frame and shows
//! which identifiers were applied, ignored or rejected, then prints the
//! assembled objects and lanes.
//!
//! Usage:
//!   inspect_candump <camera.dbc> <capture.log> [--limit <count>]

use anyhow::{bail, Context, Result};
use mobileye_aggregator::{
    Aggregator, AggregatorConfig, CandumpSource, Clock, FrameSource, Outcome, SourceError,
};
use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Default)]
struct IdStats {
    applied: usize,
    ignored: usize,
    rejected: usize,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        bail!("Usage: {} <camera.dbc> <capture.log> [--limit <count>]", args[0]);
    }
    let dbc = PathBuf::from(&args[1]);
    let log_file = PathBuf::from(&args[2]);
    let limit = match args.iter().position(|a| a == "--limit") {
        Some(i) => Some(
            args.get(i + 1)
                .context("--limit needs a value")?
                .parse::<usize>()
                .context("--limit must be a number")?,
        ),
        None => None,
    };

    let aggregator = Aggregator::from_dbc(&dbc, AggregatorConfig::new())?;
    let stats = aggregator.decoder().stats();
    println!(
        "Catalog: {} messages, {} signals; dispatch table: {} identifiers",
        stats.num_messages,
        stats.num_signals,
        aggregator.table().len()
    );

    let mut source = CandumpSource::open(&log_file)?;
    let mut per_id: BTreeMap<u32, IdStats> = BTreeMap::new();
    let mut frames = 0;

    while limit.map_or(true, |max| frames < max) {
        let frame = match source.receive(Duration::ZERO) {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(SourceError::Parse { line, reason }) => {
                println!("line {}: {}", line, reason);
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        frames += 1;

        let entry = per_id.entry(frame.can_id).or_default();
        match aggregator.process_frame(&frame, Clock::FrameTimestamp.now(&frame)) {
            Ok(Outcome::Applied { .. }) => entry.applied += 1,
            Ok(Outcome::Ignored) => entry.ignored += 1,
            Err(e) => {
                entry.rejected += 1;
                if entry.rejected == 1 {
                    println!("{}", e);
                }
            }
        }
    }

    println!("\n=== {} frames ===", frames);
    println!("{:>10} {:>8} {:>8} {:>8}  target", "CAN ID", "applied", "ignored", "rejected");
    for (can_id, stats) in &per_id {
        let target = aggregator
            .table()
            .get(*can_id)
            .map(|entry| format!("{} ({})", entry.slot(), entry.group()))
            .unwrap_or_default();
        println!(
            "{:>#10X} {:>8} {:>8} {:>8}  {}",
            can_id, stats.applied, stats.ignored, stats.rejected, target
        );
    }

    let snapshot = aggregator.snapshot();
    println!("\n=== Objects ===");
    for (index, object) in snapshot.updated_objects() {
        println!(
            "{:>2}: {} id={} long={:.2} m lat={:.2} m motion={} age={}",
            index,
            object.class,
            object.id,
            object.longitudinal_distance,
            object.lateral_distance,
            object.motion_status,
            object.age
        );
    }

    println!("\n=== Lanes ===");
    for (name, lane) in [("left", &snapshot.left_lane), ("right", &snapshot.right_lane)] {
        if !lane.has_update() {
            println!("{}: never seen", name);
            continue;
        }
        let ahead = lane.sample(50.0, 6);
        let offsets: Vec<String> = ahead.iter().map(|(x, y)| format!("{:.0}m:{:.2}", x, y)).collect();
        println!("{}: quality {} | {}", name, lane.quality, offsets.join(" "));
    }

    Ok(())
}
