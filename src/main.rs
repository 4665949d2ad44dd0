// src/main.rs
//
// Deterministic replay driver: feeds recorded detection frames (JSON
// Lines, one frame per line) through a fresh pipeline per capture file
// and reports the incidents they produce. Live ingestion, persistence
// and alerting are external collaborators; replay is enough to exercise
// the whole core from a fixed frame sequence.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use incident_detection::{
    Config, Detection, FramePipeline, Incident, IdentityResolver, UpstreamIdentity,
};

/// One line of a capture file.
#[derive(Debug, Deserialize)]
struct FrameRecord {
    timestamp: f64,
    detections: Vec<Detection>,
}

fn main() -> Result<()> {
    let config_path =
        std::env::var("INCIDENT_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = Config::load(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(format!("incident_detection={}", config.logging.level))
        .init();

    info!("incident detection replay starting");
    info!(
        zones = config.zones.len(),
        min_hits = config.tracker.min_hits,
        loitering_secs = config.rules.loitering_threshold_secs,
        "configuration loaded from {config_path}"
    );

    let capture_files = find_capture_files(&config.replay.input_dir)?;
    if capture_files.is_empty() {
        error!("no .jsonl capture files found in {}", config.replay.input_dir);
        return Ok(());
    }
    info!("found {} capture file(s) to replay", capture_files.len());

    for (idx, path) in capture_files.iter().enumerate() {
        info!(
            "replaying capture {}/{}: {}",
            idx + 1,
            capture_files.len(),
            path.display()
        );
        match replay_capture(path, &config) {
            Ok(closed) => {
                info!(
                    "capture done: {} incident(s) closed in {}",
                    closed.len(),
                    path.display()
                );
            }
            Err(e) => {
                error!("failed to replay {}: {e:#}", path.display());
            }
        }
    }

    Ok(())
}

fn find_capture_files(input_dir: &str) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = WalkDir::new(input_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().map(|ext| ext == "jsonl").unwrap_or(false))
        .collect();
    files.sort();
    Ok(files)
}

fn replay_capture(path: &Path, config: &Config) -> Result<Vec<Incident>> {
    // Fresh pipeline per capture: streams never share mutable state
    let mut pipeline = FramePipeline::new(config)?;
    // Identity continuity comes from upstream; the resolver is the seam
    // where an alternate association strategy would plug in
    let mut resolver = UpstreamIdentity;

    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut all_closed = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: FrameRecord = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                warn!("{}:{}: skipping malformed frame: {e}", path.display(), line_no + 1);
                continue;
            }
        };

        let detections = resolver.resolve(record.detections, record.timestamp);
        let out = pipeline.process_frame(&detections, record.timestamp);
        for incident in &out.opened {
            info!(
                incident_id = incident.incident_id,
                track_id = incident.track_id,
                reason = %incident.reason,
                "incident opened"
            );
        }
        for incident in &out.closed {
            info!(
                incident_id = incident.incident_id,
                track_id = incident.track_id,
                duration_secs = incident.duration_seconds,
                "incident closed"
            );
        }
        all_closed.extend(out.closed);
    }

    if !config.replay.output_dir.is_empty() {
        write_incidents(path, &config.replay.output_dir, &all_closed)?;
    }

    let summary = pipeline.metrics.summary();
    info!("replay summary: {}", serde_json::to_string(&summary)?);

    Ok(all_closed)
}

fn write_incidents(capture: &Path, output_dir: &str, incidents: &[Incident]) -> Result<()> {
    std::fs::create_dir_all(output_dir)?;
    let stem = capture
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("capture");
    let out_path = Path::new(output_dir).join(format!("{stem}.incidents.jsonl"));
    let file = File::create(&out_path)
        .with_context(|| format!("creating {}", out_path.display()))?;
    let mut writer = BufWriter::new(file);
    for incident in incidents {
        serde_json::to_writer(&mut writer, incident)?;
        writer.write_all(b"\n")?;
    }
    info!(
        "wrote {} incident(s) to {}",
        incidents.len(),
        out_path.display()
    );
    Ok(())
}
