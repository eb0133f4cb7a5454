//! Delimited tabular (CSV) extraction.
//!
//! Emits a column list, a bounded pipe-delimited sample of data rows, then
//! the true totals, which are counted by scanning past the sample.

use super::TableFragment;

/// Maximum data rows rendered in the preview
const SAMPLE_ROWS: usize = 100;

pub(super) struct TabularExtraction {
    pub text: String,
    pub total_rows: usize,
    pub total_columns: usize,
    pub tables: Vec<TableFragment>,
}

pub(super) fn extract(bytes: &[u8]) -> Result<TabularExtraction, String> {
    let content = String::from_utf8_lossy(bytes);
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());

    let header_line = lines.next().ok_or_else(|| "CSV file is empty".to_string())?;
    let columns = parse_csv_line(header_line);
    let total_columns = columns.len();

    let mut text = String::new();
    text.push_str(&format!("Columns: {}\n\n", columns.join(" | ")));

    let mut sample: Vec<Vec<String>> = Vec::new();
    let mut total_rows = 0usize;

    for line in lines {
        total_rows += 1;
        // Keep scanning past the sample so the totals stay truthful
        if sample.len() < SAMPLE_ROWS {
            sample.push(parse_csv_line(line));
        }
    }

    for row in &sample {
        text.push_str(&row.join(" | "));
        text.push('\n');
    }

    if total_rows > sample.len() {
        text.push_str(&format!("... ({} more rows)\n", total_rows - sample.len()));
    }

    text.push_str(&format!(
        "\nTotal rows: {total_rows}, columns: {total_columns}\n"
    ));

    let mut table_rows = vec![columns];
    table_rows.extend(sample);

    Ok(TabularExtraction {
        text,
        total_rows,
        total_columns,
        tables: vec![TableFragment {
            page: None,
            rows: table_rows,
        }],
    })
}

/// Split one CSV line into fields, honoring double-quoted fields with
/// escaped quotes ("")
fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            c => current.push(c),
        }
    }
    fields.push(current.trim().to_string());

    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_and_preview() {
        let csv = "name,amount,date\nwidget,12.50,2024-01-02\ngadget,3.99,2024-01-03\n";
        let extraction = extract(csv.as_bytes()).unwrap();

        assert_eq!(extraction.total_columns, 3);
        assert_eq!(extraction.total_rows, 2);
        assert!(extraction.text.starts_with("Columns: name | amount | date"));
        assert!(extraction.text.contains("widget | 12.50 | 2024-01-02"));
        assert!(extraction.text.contains("Total rows: 2, columns: 3"));
    }

    #[test]
    fn counts_continue_past_sample() {
        let mut csv = String::from("id,value\n");
        for i in 0..250 {
            csv.push_str(&format!("{i},{}\n", i * 2));
        }
        let extraction = extract(csv.as_bytes()).unwrap();

        assert_eq!(extraction.total_rows, 250);
        // Preview is capped but totals keep counting
        assert!(extraction.text.contains("... (150 more rows)"));
        assert!(extraction.text.contains("Total rows: 250, columns: 2"));
        // header + 100 sampled rows
        assert_eq!(extraction.tables[0].rows.len(), 1 + 100);
    }

    #[test]
    fn quoted_fields() {
        assert_eq!(
            parse_csv_line(r#"plain,"with, comma","escaped ""quote""""#),
            vec!["plain", "with, comma", r#"escaped "quote""#]
        );
    }

    #[test]
    fn empty_file_is_an_error() {
        assert!(extract(b"").is_err());
        assert!(extract(b"  \n \n").is_err());
    }
}
