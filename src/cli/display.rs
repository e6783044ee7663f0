//! Display formatting for CLI output
//!
//! SBIO pattern: Pure functions that format data for display

use chrono::{DateTime, Utc};

use crate::discovery::DiscoveryOutcome;
use crate::kubeconfig::KubeconfigSummary;
use crate::record::Cluster;
use crate::tester::{ConnectionReport, ProbeEnrichment};

// ============================================================================
// Table formatting helpers
// ============================================================================

/// Format a simple table with headers and rows
pub fn format_table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    if rows.is_empty() {
        return "No clusters registered.\n".to_string();
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let mut output = String::new();
    push_row(&mut output, headers.iter().map(|h| h.to_uppercase()), &widths);
    for row in rows {
        push_row(&mut output, row.into_iter(), &widths);
    }
    output
}

fn push_row(output: &mut String, cells: impl Iterator<Item = String>, widths: &[usize]) {
    let mut line = String::new();
    for (i, cell) in cells.enumerate() {
        if i > 0 {
            line.push_str("   ");
        }
        match widths.get(i) {
            Some(width) => line.push_str(&format!("{:width$}", cell, width = *width)),
            None => line.push_str(&cell),
        }
    }
    output.push_str(line.trim_end());
    output.push('\n');
}

fn format_time(time: Option<&DateTime<Utc>>) -> String {
    time.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

// ============================================================================
// Cluster display
// ============================================================================

/// Format the cluster list for display
pub fn format_cluster_list(clusters: &[Cluster]) -> String {
    let headers = &["ID", "NAME", "STATUS", "KUBECONFIG", "LAST CHECKED", "TAGS"];
    let rows: Vec<Vec<String>> = clusters
        .iter()
        .map(|c| {
            vec![
                c.record.id.clone(),
                c.record.name.clone(),
                c.record.status.to_string(),
                if c.has_kubeconfig { "yes" } else { "missing" }.to_string(),
                format_time(c.record.last_checked.as_ref()),
                c.record.tags.join(","),
            ]
        })
        .collect();

    format_table(headers, rows)
}

/// Format one cluster as `key: value` lines
pub fn format_cluster_detail(cluster: &Cluster) -> String {
    let record = &cluster.record;
    let mut output = String::new();
    output.push_str(&format!("ID:            {}\n", record.id));
    output.push_str(&format!("Name:          {}\n", record.name));
    if !record.description.is_empty() {
        output.push_str(&format!("Description:   {}\n", record.description));
    }
    if !record.tags.is_empty() {
        output.push_str(&format!("Tags:          {}\n", record.tags.join(", ")));
    }
    output.push_str(&format!("Status:        {}\n", record.status));
    output.push_str(&format!(
        "Kubeconfig:    {}\n",
        if cluster.has_kubeconfig { "present" } else { "missing" }
    ));
    output.push_str(&format!("Created:       {}\n", format_time(Some(&record.created_at))));
    output.push_str(&format!("Updated:       {}\n", format_time(Some(&record.updated_at))));
    output.push_str(&format!(
        "Last checked:  {}\n",
        format_time(record.last_checked.as_ref())
    ));
    output
}

// ============================================================================
// Connection and discovery display
// ============================================================================

pub fn format_report(cluster_id: &str, report: &ConnectionReport) -> String {
    let mut output = if report.connected {
        format!("Cluster {}: {}\n", cluster_id, report.status)
    } else {
        format!("Cluster {}: connection failed\n", cluster_id)
    };

    if report.connected {
        output.push_str(&format!("  {}\n", report.message));
    }
    if let Some(ref warning) = report.warning {
        output.push_str(&format!("  Warning: {}\n", warning));
    }
    if let Some(ref error) = report.error {
        match report.http_status {
            Some(status) => output.push_str(&format!("  Error ({}): {}\n", status, error)),
            None => output.push_str(&format!("  Error: {}\n", error)),
        }
    }
    match report.enrichment {
        Some(ProbeEnrichment::Counted(n)) => {
            output.push_str(&format!("  Namespaces: {}\n", n));
        }
        Some(ProbeEnrichment::Denied(ref reason)) => {
            output.push_str(&format!("  Namespace listing denied: {}\n", reason));
        }
        Some(ProbeEnrichment::Unavailable(_)) | None => {}
    }

    output
}

pub fn format_discovery(outcome: &DiscoveryOutcome) -> String {
    match outcome.cluster_id() {
        Some(id) => format!("{} ({})\n", outcome.message(), id),
        None => format!("{}\n", outcome.message()),
    }
}

pub fn format_validation(summary: &KubeconfigSummary) -> String {
    format!(
        "Kubeconfig is valid: {} cluster(s), {} context(s), {} user(s)\n",
        summary.clusters, summary.contexts, summary.users
    )
}
