//! CSV 入出力

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::bulk::BulkOutcome;
use crate::error::ScraperError;
use crate::types::{FailureRecord, SelectionResult};

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_ERROR: &str = "error";

/// 出力CSVの1行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRow {
    pub status: String,
    pub url: String,
    pub product_name: String,
    pub selected_image_url: String,
    pub strategy: String,
    pub score: Option<f64>,
    pub candidate_count: Option<usize>,
    pub reasoning: String,
    pub error: String,
    pub timestamp: String,
}

impl From<&SelectionResult> for OutputRow {
    fn from(result: &SelectionResult) -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            url: result.source_url.clone(),
            product_name: result.product_name.clone(),
            selected_image_url: result.selected_image_url.clone(),
            strategy: result.strategy.as_str().to_string(),
            score: result.selected().map(|s| s.score),
            candidate_count: Some(result.scored_images.len()),
            reasoning: result.reasoning.clone(),
            // フォールバックした理由も残す
            error: result.fallback_error.clone().unwrap_or_default(),
            timestamp: result.timestamp.to_rfc3339(),
        }
    }
}

impl From<&FailureRecord> for OutputRow {
    fn from(failure: &FailureRecord) -> Self {
        Self {
            status: STATUS_ERROR.to_string(),
            url: failure.source_url.clone(),
            product_name: String::new(),
            selected_image_url: String::new(),
            strategy: String::new(),
            score: None,
            candidate_count: None,
            reasoning: String::new(),
            error: failure.error.clone(),
            timestamp: failure.timestamp.to_rfc3339(),
        }
    }
}

/// 成功行の後に失敗行を並べる
pub fn to_rows(outcome: &BulkOutcome) -> Vec<OutputRow> {
    outcome
        .successes
        .iter()
        .map(OutputRow::from)
        .chain(outcome.failures.iter().map(OutputRow::from))
        .collect()
}

pub fn write_csv<W: Write>(writer: W, rows: &[OutputRow]) -> Result<(), ScraperError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// BulkOutcome をCSV文字列に変換
pub fn outcome_to_csv(outcome: &BulkOutcome) -> Result<String, ScraperError> {
    let mut buf = Vec::new();
    write_csv(&mut buf, &to_rows(outcome))?;
    String::from_utf8(buf).map_err(|e| ScraperError::Extraction(format!("CSVの文字コード不正: {}", e)))
}

/// URL一覧を読み込む
///
/// 先頭行に `url` 列があればその列を、なければ1列目を使う。空行と `#` 始まりの行は無視する。
pub fn read_urls<R: Read>(reader: R) -> Result<Vec<String>, ScraperError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut column = 0;
    let mut urls = Vec::new();

    for (i, record) in rdr.records().enumerate() {
        let record = record?;
        if i == 0 {
            if let Some(idx) = record.iter().position(|f| f.eq_ignore_ascii_case("url")) {
                column = idx;
                continue;
            }
        }
        if let Some(url) = record.get(column) {
            if !url.is_empty() {
                urls.push(url.to_string());
            }
        }
    }

    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::select_heuristic;
    use crate::types::CandidateImage;

    fn outcome(successes: usize, failures: usize) -> BulkOutcome {
        let candidates = vec![
            CandidateImage::new("https://cdn.example/a.jpg", "custom design", 0).with_size(Some(900), None),
            CandidateImage::new("https://cdn.example/b.jpg", "close up detail", 1).with_size(Some(100), None),
        ];
        BulkOutcome {
            successes: (0..successes)
                .map(|i| select_heuristic(&format!("https://shop.example/ok/{}", i), "Mug", &candidates).unwrap())
                .collect(),
            failures: (0..failures)
                .map(|i| FailureRecord::new(format!("https://shop.example/ng/{}", i), "timeout"))
                .collect(),
        }
    }

    #[test]
    fn test_rows_total_and_status() {
        let rows = to_rows(&outcome(3, 2));

        assert_eq!(rows.len(), 5);
        assert!(rows
            .iter()
            .all(|r| r.status == STATUS_SUCCESS || r.status == STATUS_ERROR));
        assert_eq!(rows.iter().filter(|r| r.status == STATUS_SUCCESS).count(), 3);
        assert_eq!(rows[0].score, Some(95.0));
        assert_eq!(rows[0].selected_image_url, "https://cdn.example/a.jpg");
        assert_eq!(rows[4].error, "timeout");
        assert_eq!(rows[4].score, None);
    }

    #[test]
    fn test_csv_output_can_be_read_back() {
        let csv_text = outcome_to_csv(&outcome(2, 1)).unwrap();

        let mut rdr = csv::Reader::from_reader(csv_text.as_bytes());
        let headers = rdr.headers().unwrap().clone();
        assert_eq!(&headers[0], "status");
        assert_eq!(&headers[3], "selected_image_url");

        let rows: Vec<OutputRow> = rdr.deserialize().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].status, "error");
        assert_eq!(rows[2].url, "https://shop.example/ng/0");
    }

    #[test]
    fn test_read_urls_with_header() {
        let input = "name,url\nMug,https://shop.example/p/1\n\nShirt, https://shop.example/p/2 \n";
        let urls = read_urls(input.as_bytes()).unwrap();
        assert_eq!(urls, vec!["https://shop.example/p/1", "https://shop.example/p/2"]);
    }

    #[test]
    fn test_read_urls_plain_list() {
        let input = "# products\nhttps://shop.example/p/1\nhttps://shop.example/p/2\n";
        let urls = read_urls(input.as_bytes()).unwrap();
        assert_eq!(urls, vec!["https://shop.example/p/1", "https://shop.example/p/2"]);
    }
}
