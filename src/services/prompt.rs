use crate::error::AppError;
use crate::models::Sheet;

pub const DEFAULT_SAMPLE_ROWS: usize = 20;

/// Starter questions offered next to the question box.
pub const SUGGESTED_QUESTIONS: [&str; 4] = [
    "Summarize this dataset in 3 key points.",
    "What are the most interesting patterns or outliers?",
    "Calculate the average of the most relevant numerical column.",
    "Suggest a good chart to visualize this data.",
];

/// Builds the single prompt sent to the analysis model.
///
/// Only the first `sample_rows` rows are embedded; the total row count is stated separately
/// so the model knows how much it is not seeing.
pub fn compose_analysis_prompt(
    sheet: &Sheet,
    question: &str,
    sample_rows: usize,
) -> Result<String, AppError> {
    let sample = &sheet.rows[..sheet.rows.len().min(sample_rows)];
    let sample_json = serde_json::to_string_pretty(sample)?;

    let columns = if sheet.headers.is_empty() {
        "No headers found".to_string()
    } else {
        sheet.headers.join(", ")
    };

    Ok(format!(
        r#"You are an expert data analyst. Analyze the dataset below to answer the user's request.

The data comes from the sheet "{sheet_name}" and has the following columns: {columns}.
Here is a sample of the data in JSON format (up to {sample_rows} rows):
```json
{sample_json}
```
The full dataset contains {total_rows} rows.

User's request: "{question}"

Based on this data, give a concise, insightful answer grounded in the values shown. If the user asks for a calculation, perform it. If they ask for a summary, provide one. If the data sample is insufficient to answer, say so explicitly and explain what information would be needed."#,
        sheet_name = sheet.name,
        columns = columns,
        sample_rows = sample_rows,
        sample_json = sample_json,
        total_rows = sheet.row_count(),
        question = question,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CellValue, Row};

    fn numbered_sheet(count: usize) -> Sheet {
        Sheet {
            name: "orders".to_string(),
            headers: vec!["order_id".to_string(), "amount".to_string()],
            rows: (0..count)
                .map(|i| {
                    Row::from([
                        ("order_id".to_string(), CellValue::Text(format!("ord-{:04}", i))),
                        ("amount".to_string(), CellValue::Number(i as f64)),
                    ])
                })
                .collect(),
        }
    }

    #[test]
    fn large_sheet_embeds_only_the_sample_but_states_total() {
        let sheet = numbered_sheet(1000);
        let prompt = compose_analysis_prompt(&sheet, "What is the total amount?", DEFAULT_SAMPLE_ROWS)
            .unwrap();

        assert!(prompt.contains("\"ord-0000\""));
        assert!(prompt.contains("\"ord-0019\""));
        assert!(!prompt.contains("\"ord-0020\""));
        assert_eq!(prompt.matches("\"order_id\":").count(), 20);
        assert!(prompt.contains("The full dataset contains 1000 rows."));
        assert!(prompt.contains("columns: order_id, amount."));
        assert!(prompt.contains("User's request: \"What is the total amount?\""));
        assert!(prompt.contains("insufficient"));
    }

    #[test]
    fn small_sheet_is_embedded_whole() {
        let sheet = numbered_sheet(3);
        let prompt = compose_analysis_prompt(&sheet, "Summarize", DEFAULT_SAMPLE_ROWS).unwrap();
        assert_eq!(prompt.matches("\"order_id\":").count(), 3);
        assert!(prompt.contains("The full dataset contains 3 rows."));
    }

    #[test]
    fn prompt_is_deterministic() {
        let sheet = numbered_sheet(50);
        let a = compose_analysis_prompt(&sheet, "Trends?", 5).unwrap();
        let b = compose_analysis_prompt(&sheet, "Trends?", 5).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.matches("\"order_id\":").count(), 5);
    }

    #[test]
    fn missing_headers_are_called_out() {
        let sheet = Sheet { name: "bare".to_string(), headers: vec![], rows: vec![] };
        let prompt = compose_analysis_prompt(&sheet, "Anything?", DEFAULT_SAMPLE_ROWS).unwrap();
        assert!(prompt.contains("No headers found"));
        assert!(prompt.contains("The full dataset contains 0 rows."));
    }
}
