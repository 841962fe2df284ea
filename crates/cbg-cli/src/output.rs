use cbg_core::fabricator::{BatchOutcome, BatchReport, CreatedProduct};
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let line = |cells: Vec<String>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, &w)| format!("{c:w$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    println!("{}", line(headers.iter().map(|h| h.to_string()).collect()));
    println!("{}", line(widths.iter().map(|&w| "-".repeat(w)).collect()));
    for row in rows {
        println!("{}", line(row));
    }
}

pub fn print_created(product: &CreatedProduct) {
    println!("Created {} ({})", product.id, product.title);
    println!("  layers swapped: {}", product.swapped_layers);
    println!("  {}", product.admin_url);
}

pub fn print_report(report: &BatchReport) {
    let rows = report
        .outcomes
        .iter()
        .map(|o| match o {
            BatchOutcome::Created { source, product } => vec![
                source.clone(),
                "created".to_string(),
                format!("{} {}", product.id, product.title),
            ],
            BatchOutcome::Skipped { source, reason } => {
                vec![source.clone(), "skipped".to_string(), reason.clone()]
            }
            BatchOutcome::Failed { source, error } => {
                vec![source.clone(), "failed".to_string(), error.clone()]
            }
        })
        .collect();
    print_table(&["SOURCE", "STATUS", "DETAIL"], rows);
    println!(
        "\n{} created, {} skipped, {} failed",
        report.created(),
        report.skipped(),
        report.failed()
    );
}
