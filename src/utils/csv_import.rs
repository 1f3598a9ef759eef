// src/utils/csv_import.rs

use serde::Serialize;

use crate::{
    config::{CSV_MAX_CHOICES, TITLE_MAX_CHARS},
    error::AppError,
    models::question::derive_title,
};

/// A question parsed from one CSV row, answer key already resolved to choice indexes.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedQuestion {
    pub row: usize,
    pub title: String,
    pub prompt: String,
    pub choices: Vec<String>,
    pub correct: Vec<usize>,
    pub is_multiple_answer: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SkippedRow {
    /// 1-based data row, the header not counted.
    pub row: usize,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ParsedImport {
    pub questions: Vec<ImportedQuestion>,
    pub skipped: Vec<SkippedRow>,
}

/// Column positions resolved from the header line.
struct Columns {
    question: usize,
    choices: Vec<usize>,
    answer: usize,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, AppError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };

        let question = find("question")
            .ok_or_else(|| AppError::BadRequest("CSV is missing the 'question' column".to_string()))?;
        let answer = find("answer")
            .ok_or_else(|| AppError::BadRequest("CSV is missing the 'answer' column".to_string()))?;
        let choices: Vec<usize> = (1..=CSV_MAX_CHOICES)
            .filter_map(|i| find(&format!("choice{}", i)))
            .collect();

        if choices.is_empty() {
            return Err(AppError::BadRequest(
                "CSV needs at least one 'choiceN' column".to_string(),
            ));
        }

        Ok(Self { question, choices, answer })
    }
}

/// Parses an upload with columns `question, choice1..choice5, answer`.
///
/// `answer` holds one choice text or a comma-separated list of them. Rows
/// that cannot become a valid question are reported in `skipped` instead of
/// failing the whole file; a malformed header does fail it.
pub fn parse_question_csv(content: &[u8]) -> Result<ParsedImport, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(content);

    let headers = reader
        .headers()
        .map_err(|e| AppError::BadRequest(format!("Failed to read CSV header: {}", e)))?
        .clone();
    let columns = Columns::from_headers(&headers)?;

    let mut parsed = ParsedImport::default();

    for (idx, record) in reader.records().enumerate() {
        let row = idx + 1;
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                parsed.skipped.push(SkippedRow {
                    row,
                    reason: format!("Unreadable row: {}", e),
                });
                continue;
            }
        };

        match parse_row(row, &record, &columns) {
            Ok(question) => parsed.questions.push(question),
            Err(reason) => parsed.skipped.push(SkippedRow { row, reason }),
        }
    }

    Ok(parsed)
}

fn parse_row(row: usize, record: &csv::StringRecord, columns: &Columns) -> Result<ImportedQuestion, String> {
    let prompt = record.get(columns.question).unwrap_or_default().to_string();
    if prompt.is_empty() {
        return Err("Question text is empty".to_string());
    }

    let choices: Vec<String> = columns
        .choices
        .iter()
        .filter_map(|&i| record.get(i))
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .collect();
    if choices.is_empty() {
        return Err("Row has no choices".to_string());
    }

    let answer = record.get(columns.answer).unwrap_or_default();
    let mut correct: Vec<usize> = Vec::new();
    for text in answer.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let idx = choices
            .iter()
            .position(|c| c == text)
            .ok_or_else(|| format!("Answer '{}' does not match any choice", text))?;
        if !correct.contains(&idx) {
            correct.push(idx);
        }
    }
    if correct.is_empty() {
        return Err("Answer is empty".to_string());
    }

    Ok(ImportedQuestion {
        row,
        title: derive_title(&prompt, TITLE_MAX_CHARS),
        is_multiple_answer: correct.len() > 1,
        prompt,
        choices,
        correct,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_and_multi_answer_rows() {
        let csv = "question,choice1,choice2,choice3,choice4,choice5,answer\n\
                   Which valve?,Mitral,Aortic,Tricuspid,,,Mitral\n\
                   \"Which are chambers?\",Atrium,Ventricle,Valve,,,\"Atrium, Ventricle\"\n";
        let parsed = parse_question_csv(csv.as_bytes()).unwrap();

        assert!(parsed.skipped.is_empty());
        assert_eq!(parsed.questions.len(), 2);

        let first = &parsed.questions[0];
        assert_eq!(first.choices, vec!["Mitral", "Aortic", "Tricuspid"]);
        assert_eq!(first.correct, vec![0]);
        assert!(!first.is_multiple_answer);

        let second = &parsed.questions[1];
        assert_eq!(second.correct, vec![0, 1]);
        assert!(second.is_multiple_answer);
        assert_eq!(second.row, 2);
    }

    #[test]
    fn skips_rows_with_unknown_answers() {
        let csv = "question,choice1,choice2,answer\n\
                   Good row,A,B,A\n\
                   Bad row,A,B,C\n\
                   ,A,B,A\n";
        let parsed = parse_question_csv(csv.as_bytes()).unwrap();

        assert_eq!(parsed.questions.len(), 1);
        assert_eq!(parsed.skipped.len(), 2);
        assert_eq!(parsed.skipped[0].row, 2);
        assert!(parsed.skipped[0].reason.contains("'C'"));
        assert_eq!(parsed.skipped[1].row, 3);
    }

    #[test]
    fn title_is_truncated_prompt() {
        let long = "x".repeat(80);
        let csv = format!("question,choice1,answer\n{},Yes,Yes\n", long);
        let parsed = parse_question_csv(csv.as_bytes()).unwrap();
        assert_eq!(parsed.questions[0].title.len(), 50);
        assert_eq!(parsed.questions[0].prompt.len(), 80);
    }

    #[test]
    fn missing_answer_column_fails_the_file() {
        let csv = "question,choice1,choice2\nQ,A,B\n";
        assert!(matches!(parse_question_csv(csv.as_bytes()), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn duplicate_answers_are_collapsed() {
        let csv = "question,choice1,choice2,answer\nQ,A,B,\"A,A\"\n";
        let parsed = parse_question_csv(csv.as_bytes()).unwrap();
        assert_eq!(parsed.questions[0].correct, vec![0]);
        assert!(!parsed.questions[0].is_multiple_answer);
    }
}
