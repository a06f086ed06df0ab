//! Output formatting for command results.
//!
//! Every command builds a serializable result and hands it to
//! [`OutputFormat::emit`], which prints either pretty JSON or the text
//! rendering given by the command.

use std::fmt::Write as _;

use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;

use wayfinder_lib::freshness::DownloadEstimate;
use wayfinder_lib::{
    format_bytes, Directions, DownloadOutcome, DownloadStatus, Movement, OfflineStats, Severity,
    Staleness, SyncOutcome, SyncState, VerificationReport,
};

use crate::terminal::ColorPalette;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn emit<T, F>(self, value: &T, text: F) -> Result<()>
    where
        T: Serialize,
        F: FnOnce(&T, &ColorPalette) -> String,
    {
        match self {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
            OutputFormat::Text => print!("{}", text(value, &ColorPalette::detect())),
        }
        Ok(())
    }
}

/// Result of the `freshness` command.
#[derive(Debug, Clone, Serialize)]
pub struct FreshnessReport {
    pub staleness: Staleness,
    pub node_count: usize,
    pub estimate: DownloadEstimate,
    pub available_bytes: Option<u64>,
    pub has_headroom: Option<bool>,
}

pub fn format_directions(directions: &Directions, palette: &ColorPalette) -> String {
    let mut out = String::new();
    let path = &directions.path;
    let (Some(first), Some(last)) = (path.steps.first(), path.steps.last()) else {
        return out;
    };

    let _ = writeln!(
        out,
        "Route from {bold}{}{reset} to {bold}{}{reset} ({} hops, {:.0} m{}):",
        first.node.name,
        last.node.name,
        path.hop_count(),
        path.total_distance,
        if path.avoid_stairs { ", avoiding stairs" } else { "" },
        bold = palette.white_bold,
        reset = palette.reset,
    );

    if directions.instructions.is_empty() {
        let _ = writeln!(out, "  You are already at {}.", first.node.name);
        return out;
    }

    for (index, instruction) in directions.instructions.iter().enumerate() {
        let marker = match instruction.movement {
            Movement::Walk => palette.green,
            Movement::Stairs | Movement::Elevator => palette.yellow,
        };
        let _ = writeln!(
            out,
            "  {marker}{:>2}.{reset} {} {gray}[{} -> {}]{reset}",
            index + 1,
            instruction.text,
            instruction.from_code,
            instruction.to_code,
            reset = palette.reset,
            gray = palette.gray,
        );
    }
    out
}

pub fn format_download(outcome: &DownloadOutcome, palette: &ColorPalette) -> String {
    let mut out = String::new();
    let status = match outcome.status {
        DownloadStatus::Completed => format!("{}Download complete{}", palette.green, palette.reset),
        DownloadStatus::Cancelled => format!("{}Download cancelled{}", palette.yellow, palette.reset),
    };
    let _ = writeln!(out, "{status}");
    let _ = writeln!(
        out,
        "  Dataset: {} nodes, {} edges ({})",
        outcome.node_count,
        outcome.edge_count,
        if outcome.dataset_changed { "updated" } else { "unchanged" }
    );
    let _ = writeln!(
        out,
        "  Images: {} downloaded, {} already cached, {} failed",
        outcome.images_succeeded, outcome.images_skipped, outcome.images_failed
    );
    for failure in &outcome.failures {
        let _ = writeln!(
            out,
            "    {}{}{}: {}",
            palette.red, failure.key, palette.reset, failure.message
        );
    }
    out
}

pub fn format_stats(stats: &OfflineStats, _palette: &ColorPalette) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Offline data:");
    let _ = writeln!(out, "  Nodes:         {}", stats.node_count);
    let _ = writeln!(out, "  Edges:         {}", stats.edge_count);
    let _ = writeln!(out, "  Cached images: {}", stats.cached_images);
    let _ = writeln!(out, "  Disk usage:    {}", format_bytes(stats.disk_bytes));
    let last_sync = stats
        .last_sync
        .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "never".to_string());
    let _ = writeln!(out, "  Last sync:     {last_sync}");
    out
}

pub fn format_verification(report: &VerificationReport, palette: &ColorPalette) -> String {
    let mut out = String::new();
    let (color, verdict) = if report.passed {
        (palette.green, "PASS")
    } else {
        (palette.red, "FAIL")
    };
    let _ = writeln!(out, "{color}{verdict}{}: {}", palette.reset, report.message);
    let _ = writeln!(
        out,
        "  {} nodes, {} edges, {} arcs, {} dangling edges",
        report.nodes, report.edges, report.arcs, report.dangling_edges
    );
    if let Some(probe) = &report.probe {
        let _ = writeln!(
            out,
            "  Probe {} -> {}: {} hops, {:.0} m",
            probe.from, probe.to, probe.hops, probe.distance
        );
    }
    out
}

pub fn format_freshness(report: &FreshnessReport, palette: &ColorPalette) -> String {
    let mut out = String::new();
    let color = match report.staleness.severity {
        Severity::None => palette.green,
        Severity::Low | Severity::Medium => palette.yellow,
        Severity::High => palette.red,
    };
    let _ = writeln!(out, "{color}{}{}", report.staleness.message, palette.reset);
    let _ = writeln!(
        out,
        "  Full download: ~{} ({} images for {} nodes)",
        format_bytes(report.estimate.total_bytes),
        report.estimate.images,
        report.node_count
    );
    if let (Some(available), Some(headroom)) = (report.available_bytes, report.has_headroom) {
        let verdict = if headroom {
            "enough space"
        } else {
            "not enough space"
        };
        let _ = writeln!(out, "  Available: {} ({verdict})", format_bytes(available));
    }
    out
}

pub fn format_sync(outcome: &SyncOutcome, _palette: &ColorPalette) -> String {
    let line = match outcome {
        SyncOutcome::Completed { changed: true } => "Sync complete: campus data updated".to_string(),
        SyncOutcome::Completed { changed: false } => {
            "Sync complete: campus data already up to date".to_string()
        }
        SyncOutcome::InProgress => "A sync is already in progress".to_string(),
        SyncOutcome::Cancelled => "Sync cancelled".to_string(),
        SyncOutcome::Failed { message } => format!("Sync failed: {message}"),
        SyncOutcome::Ignored { reason } => format!("Sync skipped: {reason:?}"),
    };
    format!("{line}\n")
}

pub fn format_settings(state: &SyncState, _palette: &ColorPalette) -> String {
    let on_off = |flag: bool| if flag { "on" } else { "off" };
    format!(
        "Auto-sync: {}\nWiFi only: {}\n",
        on_off(state.auto_sync),
        on_off(state.wifi_only)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfinder_lib::{GraphModel, Node, NodeKind, Router, RouterConfig};

    fn node(id: i64, code: &str, floor: i32) -> Node {
        Node {
            id,
            code: code.to_string(),
            name: code.to_string(),
            building: "Main".to_string(),
            floor_level: floor,
            kind: NodeKind::Hallway,
            position: None,
            image: None,
        }
    }

    #[test]
    fn directions_render_numbered_steps() {
        let nodes = vec![node(1, "ENT", 0), node(2, "HALL", 0)];
        let edges = vec![wayfinder_lib::Edge {
            id: 1,
            from: 1,
            to: 2,
            distance: 12.0,
            bearing: 0.0,
            is_staircase: false,
            is_active: true,
        }];
        assert_eq!(GraphModel::build(&nodes, &edges).arc_count(), 2);

        let router = Router::new(RouterConfig::default());
        router.load(&nodes, &edges);
        let directions = router.get_directions("ENT", "HALL", false).expect("route");

        let text = format_directions(&directions, &ColorPalette::plain());
        assert!(text.contains("Route from ENT to HALL (1 hops, 12 m)"));
        assert!(text.contains(" 1. Head north for 12 m to HALL [ENT -> HALL]"));
    }

    #[test]
    fn settings_render_flags() {
        let state = SyncState {
            auto_sync: true,
            wifi_only: false,
            last_sync: None,
        };
        assert_eq!(
            format_settings(&state, &ColorPalette::plain()),
            "Auto-sync: on\nWiFi only: off\n"
        );
    }
}
