//! Human-readable rendering of diagnostics

use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use jobscope_connection::{ConnectionOutcome, ConnectionStatus};
use jobscope_core::TableColumnInfo;

pub fn render_status(status: &ConnectionStatus) -> String {
    let mut lines = Vec::new();
    match status.outcome {
        ConnectionOutcome::Connected => lines.push(format!("Connected to {}", status.descriptor)),
        ConnectionOutcome::Failed => {
            lines.push(format!("Could not connect to {}", status.descriptor))
        }
    }

    if let Some(version) = &status.server_version {
        lines.push(format!("  server:  {version}"));
    }
    if let Some(count) = status.table_count {
        lines.push(format!("  tables:  {count}"));
    }
    if let (Some(latency), Some(health)) = (status.latency_ms, status.health) {
        lines.push(format!("  latency: {latency} ms ({})", health.as_str()));
    }
    if let Some(error) = &status.error {
        lines.push(format!("  error:   {error}"));
    }
    lines.join("\n")
}

pub fn render_tables(columns: &[TableColumnInfo]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Table", "#", "Column", "Type", "Nullable", "Default"]);

    for column in columns {
        table.add_row(vec![
            column.table_name.clone(),
            column.ordinal.to_string(),
            column.column_name.clone(),
            column.data_type.clone(),
            if column.nullable { "yes" } else { "no" }.to_string(),
            column.default_value.clone().unwrap_or_default(),
        ]);
    }
    table
}
