//! Table rendering for CLI output using comfy-table.
//!
//! | Command | Table Function |
//! |---------|----------------|
//! | `docvec search` | `render_results_table()` |
//! | `docvec benchmark` | `render_benchmark_table()` |
//! | `docvec backends` | `render_backends_table()` |

use comfy_table::presets::NOTHING;
use comfy_table::{Cell, CellAlignment, ColumnConstraint, Table, Width};
use docvec_core::{BackendBenchmark, BackendKind, BenchmarkReport, SearchResult};

use super::format::{format_metadata, format_secs, preview, truncate_str};

/// Render search hits in rank order.
///
/// # Example Output
///
/// ```text
/// #  ID     SCORE   METADATA  CONTENT
/// 1  a      1.0000  tag=x     alpha
/// 2  c      0.7071  tag=x     alpha beta
/// ```
pub fn render_results_table(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return String::new();
    }

    let mut table = Table::new();
    table.load_preset(NOTHING);

    table.set_header(vec![
        Cell::new("#").set_alignment(CellAlignment::Right),
        Cell::new("ID"),
        Cell::new("SCORE").set_alignment(CellAlignment::Right),
        Cell::new("METADATA"),
        Cell::new("CONTENT"),
    ]);

    table.set_constraints(vec![
        ColumnConstraint::LowerBoundary(Width::Fixed(2)),  // #
        ColumnConstraint::LowerBoundary(Width::Fixed(6)),  // ID
        ColumnConstraint::LowerBoundary(Width::Fixed(6)),  // SCORE
        ColumnConstraint::LowerBoundary(Width::Fixed(8)),  // METADATA
        ColumnConstraint::LowerBoundary(Width::Fixed(10)), // CONTENT
    ]);

    for (rank, result) in results.iter().enumerate() {
        table.add_row(vec![
            Cell::new(rank + 1).set_alignment(CellAlignment::Right),
            Cell::new(truncate_str(&result.id, 24)),
            Cell::new(format!("{:.4}", result.score)).set_alignment(CellAlignment::Right),
            Cell::new(truncate_str(&format_metadata(&result.metadata), 32)),
            Cell::new(preview(&result.content, 60)),
        ]);
    }

    table.trim_fmt().to_string()
}

/// Render one row per backend in a benchmark report.
pub fn render_benchmark_table(report: &BenchmarkReport) -> String {
    if report.is_empty() {
        return String::new();
    }

    let mut table = Table::new();
    table.load_preset(NOTHING);

    table.set_header(vec![
        Cell::new("BACKEND"),
        Cell::new("STATUS"),
        Cell::new("DOCS").set_alignment(CellAlignment::Right),
        Cell::new("INSERT").set_alignment(CellAlignment::Right),
        Cell::new("QUERIES").set_alignment(CellAlignment::Right),
        Cell::new("AVG SEARCH").set_alignment(CellAlignment::Right),
    ]);

    for (kind, result) in &report.results {
        let row = match result {
            BackendBenchmark::Completed {
                insert_secs,
                avg_search_secs,
                total_documents,
                queries,
            } => vec![
                Cell::new(kind.as_str()),
                Cell::new("completed"),
                Cell::new(total_documents).set_alignment(CellAlignment::Right),
                Cell::new(format_secs(*insert_secs)).set_alignment(CellAlignment::Right),
                Cell::new(queries).set_alignment(CellAlignment::Right),
                Cell::new(format_secs(*avg_search_secs)).set_alignment(CellAlignment::Right),
            ],
            BackendBenchmark::Failed { error } => vec![
                Cell::new(kind.as_str()),
                Cell::new(format!("failed: {}", truncate_str(error, 48))),
                Cell::new("-").set_alignment(CellAlignment::Right),
                Cell::new("-").set_alignment(CellAlignment::Right),
                Cell::new("-").set_alignment(CellAlignment::Right),
                Cell::new("-").set_alignment(CellAlignment::Right),
            ],
        };
        table.add_row(row);
    }

    table.trim_fmt().to_string()
}

/// Render every backend kind with whether this build includes it and
/// which one is active.
pub fn render_backends_table(available: &[BackendKind], active: Option<BackendKind>) -> String {
    let mut table = Table::new();
    table.load_preset(NOTHING);

    table.set_header(vec![
        Cell::new("BACKEND"),
        Cell::new("AVAILABLE"),
        Cell::new("ACTIVE"),
    ]);

    for kind in BackendKind::ALL {
        let is_available = available.contains(&kind);
        let is_active = active == Some(kind);
        table.add_row(vec![
            Cell::new(kind.as_str()),
            Cell::new(if is_available { "yes" } else { "no" }),
            Cell::new(if is_active { "*" } else { "" }),
        ]);
    }

    table.trim_fmt().to_string()
}
