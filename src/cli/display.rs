//! Display formatting for CLI output
//!
//! SBIO pattern: Pure functions that format data for display

use super::commands::{AddServicesReport, CatalogSummary, LayoutReport};
use crate::cluster::Node;
use crate::planner::Stage;

// ============================================================================
// Table formatting helpers
// ============================================================================

/// Left-aligned columns separated by three spaces; headers upper-cased
pub fn format_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    if rows.is_empty() {
        return "Nothing to show.\n".to_string();
    }

    let widths: Vec<usize> = (0..headers.len())
        .map(|col| {
            rows.iter()
                .filter_map(|row| row.get(col))
                .map(String::len)
                .chain(std::iter::once(headers[col].len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let render = |cells: Vec<String>| -> String {
        let line = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| match widths.get(i) {
                Some(w) => format!("{:<w$}", cell, w = *w),
                None => cell.clone(),
            })
            .collect::<Vec<_>>()
            .join("   ");
        format!("{}\n", line.trim_end())
    };

    let mut output = render(headers.iter().map(|h| h.to_uppercase()).collect());
    for row in rows {
        output.push_str(&render(row.clone()));
    }
    output
}

fn list(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}

// ============================================================================
// Catalog
// ============================================================================

pub fn format_catalog_summary(summary: &CatalogSummary, path: &str) -> String {
    let mut output = format!("✓ {} is valid\n\n", path);
    output.push_str(&format!("  Services:       {}\n", list(&summary.services)));
    output.push_str(&format!("  Hardware types: {}\n", list(&summary.hardware_types)));
    output.push_str(&format!("  Image types:    {}\n", list(&summary.image_types)));
    output.push_str(&format!("  Templates:      {}\n", list(&summary.templates)));
    output
}

// ============================================================================
// Layouts
// ============================================================================

pub fn format_layout(report: &LayoutReport) -> String {
    let mut output = format!(
        "Cluster {} ({} nodes, template {}",
        report.cluster, report.total_nodes, report.template
    );
    if let Some(provider) = &report.provider {
        output.push_str(&format!(", provider {}", provider));
    }
    output.push_str(")\n\n");

    let rows: Vec<Vec<String>> = report
        .rows
        .iter()
        .map(|r| {
            vec![
                r.count.to_string(),
                r.hardware_type.clone(),
                r.image_type.clone(),
                list(&r.services),
            ]
        })
        .collect();
    output.push_str(&format_table(&["count", "hardware", "image", "services"], &rows));
    output
}

pub fn format_nodes(nodes: &[Node]) -> String {
    let rows: Vec<Vec<String>> = nodes
        .iter()
        .map(|n| {
            vec![
                n.id.clone(),
                n.hardware_type.clone(),
                n.image_type.clone(),
                n.properties.flavor.clone().unwrap_or_else(|| "-".to_string()),
                list(&n.services.iter().cloned().collect::<Vec<_>>()),
            ]
        })
        .collect();
    format_table(&["id", "hardware", "image", "flavor", "services"], &rows)
}

pub fn format_add_services(report: &AddServicesReport) -> String {
    let mut output = String::new();
    for (service, count) in &report.added {
        output.push_str(&format!("+ {} on {} node(s)\n", service, count));
    }
    output.push('\n');
    output.push_str(&format_nodes(&report.cluster.nodes));
    output
}

// ============================================================================
// Plans
// ============================================================================

/// One block per stage, tasks in stage order
pub fn format_stages(stages: &[Stage]) -> String {
    if stages.is_empty() {
        return "No tasks.\n".to_string();
    }

    let mut output = String::new();
    for (i, stage) in stages.iter().enumerate() {
        output.push_str(&format!("Stage {} ({} tasks)\n", i + 1, stage.len()));
        for task in stage {
            output.push_str(&format!("  {}\n", task));
        }
    }
    output
}
