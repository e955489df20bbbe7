use conveyor_core::run::RunStatus;
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let header_row: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
        .collect();
    println!("{}", header_row.join("  "));

    let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", sep.join("  "));

    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", cell, width = w)
            })
            .collect();
        println!("{}", cells.join("  "));
    }
}

pub fn print_status(status: &RunStatus) {
    println!("thread:    {}", status.thread_id);
    println!("stage:     {}", status.current_stage);
    println!(
        "approval:  {}",
        if status.pending_approval {
            "pending"
        } else {
            "-"
        }
    );

    if !status.stages.is_empty() {
        println!();
        let rows = status
            .stages
            .iter()
            .map(|s| {
                vec![
                    s.stage.to_string(),
                    s.attempt.to_string(),
                    if s.ok { "ok" } else { "failed" }.to_string(),
                    s.gate_decision.to_string(),
                    s.timestamp.to_rfc3339(),
                ]
            })
            .collect();
        print_table(&["STAGE", "ATTEMPT", "RESULT", "GATE", "AT"], rows);
    }

    if !status.errors.is_empty() {
        println!();
        println!("errors:");
        for error in &status.errors {
            let stage = error
                .stage
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("  [{}] {} ({})", error.kind, error.message, stage);
        }
    }
}
