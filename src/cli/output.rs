//! Output formatting for CLI

use serde::Serialize;

use crate::cli::error::CliError;
use crate::pipeline::RunRecord;

/// Print a value as pretty JSON on stdout
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Human-readable summary of a run record
pub fn format_run_record(record: &RunRecord) -> String {
    let mut output = String::new();

    output.push_str("Pipeline Status\n");
    output.push_str("===============\n\n");
    output.push_str(&format!("Run ID:   {}\n", record.run_id));
    output.push_str(&format!("Status:   {}\n", record.status));
    output.push_str(&format!(
        "Started:  {}\n",
        record.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    output.push_str(&format!(
        "Updated:  {}\n",
        record.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    output.push_str(&format!(
        "Elapsed:  {}s\n",
        record.duration().num_milliseconds() as f64 / 1000.0
    ));

    output.push_str("\nCompleted Stages:\n");
    for stage in &record.completed_stages {
        match record.get_stage_output(*stage) {
            Some(stage_output) => {
                let mut line = format!("  - {}: {}ms", stage.name(), stage_output.duration_ms);
                if let Some(inserted) = stage_output.count("inserted") {
                    line.push_str(&format!(", {inserted} inserted"));
                }
                if let Some(dropped) = stage_output.count("rows_dropped").filter(|d| *d > 0) {
                    line.push_str(&format!(", {dropped} dropped"));
                }
                output.push_str(&line);
                output.push('\n');
            }
            None => output.push_str(&format!("  - {}\n", stage.name())),
        }
    }

    if let Some(stage) = &record.current_stage {
        output.push_str(&format!("\nCurrent Stage: {}\n", stage.name()));
    }
    if let Some(error) = &record.error {
        output.push_str(&format!("\nError: {error}\n"));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PipelineStage, StageOutput};

    #[test]
    fn test_format_run_record() {
        let mut record = RunRecord::new("run-7", "hash");
        record.complete_stage(
            PipelineStage::LoadOrders,
            StageOutput::success()
                .with_rows(10, 2)
                .with_metadata("inserted", serde_json::json!(8)),
        );
        record.start_stage(PipelineStage::LoadOrderItems);
        record.fail("Database error: deadlock detected");

        let text = format_run_record(&record);
        assert!(text.contains("Run ID:   run-7"));
        assert!(text.contains("Status:   failed"));
        assert!(text.contains("Elapsed:  "));
        assert!(text.contains("load-orders: 0ms, 8 inserted, 2 dropped"));
        assert!(text.contains("Current Stage: load-order-items"));
        assert!(text.contains("Error: Database error: deadlock detected"));
    }
}
