//! 심볼별 CSV 데이터셋 저장소.
//!
//! 파일 형식은 `Date,Open,High,Low,Close,Volume` 헤더를 가진 일반 CSV입니다.
//! 읽을 때는 헤더 이름으로 열을 찾으므로 추가 열(예: `Adj Close`)이 있어도 됩니다.

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim, Writer};
use forecast_core::{symbol_file_stem, PriceBar, DATE_FORMAT};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{DataError, Result};

/// CSV 헤더.
pub const CSV_HEADER: &str = "Date,Open,High,Low,Close,Volume";

const COLUMNS: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];

/// CSV 한 행. 헤더는 소문자로 맞춘 뒤 이름으로 대응시킵니다.
///
/// 빈 숫자 칸은 `None`으로 읽혀 결측값(NaN)이 됩니다.
#[derive(Debug, Deserialize)]
struct CsvRow {
    date: String,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
}

impl CsvRow {
    fn into_bar(self, line: u64) -> Result<PriceBar> {
        // 시간대가 붙은 타임스탬프도 앞의 날짜 부분만 사용
        let date_part = self.date.get(..10).unwrap_or(&self.date);
        let date = NaiveDate::parse_from_str(date_part, DATE_FORMAT).map_err(|e| {
            DataError::ParseError(format!("line {}: bad date '{}': {}", line, self.date, e))
        })?;
        let value = |v: Option<f64>| v.unwrap_or(f64::NAN);
        Ok(PriceBar::new(
            date,
            value(self.open),
            value(self.high),
            value(self.low),
            value(self.close),
            value(self.volume),
        ))
    }
}

/// 디렉토리 하나에 심볼별 CSV 파일을 보관하는 저장소.
#[derive(Debug, Clone)]
pub struct DatasetStore {
    dir: PathBuf,
}

impl DatasetStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 심볼의 CSV 파일 경로.
    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", symbol_file_stem(symbol)))
    }

    pub fn exists(&self, symbol: &str) -> bool {
        self.path_for(symbol).is_file()
    }

    /// 가격 바를 CSV로 저장합니다. 기존 파일은 교체됩니다.
    ///
    /// 저장마다 고유한 임시 파일에 쓴 뒤 제자리로 옮기므로,
    /// 같은 심볼을 동시에 저장해도 읽는 쪽은 완성된 파일만 봅니다.
    pub fn save(&self, symbol: &str, bars: &[PriceBar]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(symbol);

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = Writer::from_writer(tmp.as_file_mut());
            writer.write_record(CSV_HEADER.split(','))?;
            for bar in bars {
                writer.write_record([
                    bar.date.format(DATE_FORMAT).to_string(),
                    bar.open.to_string(),
                    bar.high.to_string(),
                    bar.low.to_string(),
                    bar.close.to_string(),
                    bar.volume.to_string(),
                ])?;
            }
            writer.flush()?;
        }
        tmp.persist(&path).map_err(|e| e.error)?;

        info!(symbol, rows = bars.len(), path = %path.display(), "Dataset saved");
        Ok(path)
    }

    /// 저장된 CSV를 읽습니다.
    pub fn load(&self, symbol: &str) -> Result<Vec<PriceBar>> {
        let path = self.path_for(symbol);
        if !path.is_file() {
            return Err(DataError::NotFound(format!(
                "dataset for {} ({})",
                symbol,
                path.display()
            )));
        }
        let content = fs::read_to_string(&path)?;
        let bars = parse_csv(&content)?;
        debug!(symbol, rows = bars.len(), "Dataset loaded");
        Ok(bars)
    }
}

/// CSV 본문을 가격 바 목록으로 파싱합니다.
///
/// 열은 헤더 이름(대소문자 무시)으로 찾으므로 추가 열(예: `Adj Close`)이나
/// 순서가 다른 파일도 읽을 수 있습니다. 따옴표로 감싼 칸도 허용합니다.
pub fn parse_csv(content: &str) -> Result<Vec<PriceBar>> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .from_reader(content.as_bytes());

    let headers: StringRecord = reader
        .headers()?
        .iter()
        .map(|h| h.to_lowercase())
        .collect();
    if headers.iter().all(str::is_empty) {
        return Err(DataError::ParseError("empty CSV".to_string()));
    }
    if let Some(missing) = COLUMNS.iter().find(|c| !headers.iter().any(|h| h == **c)) {
        return Err(DataError::ParseError(format!(
            "missing column '{}' in header",
            missing
        )));
    }

    let mut bars = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let row: CsvRow = record
            .deserialize(Some(&headers))
            .map_err(|e| DataError::ParseError(format!("line {}: {}", line, e)))?;
        bars.push(row.into_bar(line)?);
    }

    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bars() -> Vec<PriceBar> {
        let d = |day| NaiveDate::from_ymd_opt(2024, 3, day).unwrap();
        vec![
            PriceBar::new(d(1), 100.0, 110.0, 95.0, 105.5, 1234.0),
            PriceBar::new(d(2), 105.5, 112.0, 101.0, 108.25, 987.0),
        ]
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = DatasetStore::new(dir.path());

        assert!(!store.exists("BTC-USD"));
        let path = store.save("BTC-USD", &sample_bars()).unwrap();
        assert!(path.ends_with("BTC-USD.csv"));
        assert!(store.exists("btc-usd"));

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(CSV_HEADER));

        let loaded = store.load("BTC-USD").unwrap();
        assert_eq!(loaded, sample_bars());
    }

    #[test]
    fn test_load_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = DatasetStore::new(dir.path());
        let err = store.load("ETH-USD").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_path_sanitizes_symbol() {
        let store = DatasetStore::new("data");
        assert_eq!(store.path_for("../evil"), PathBuf::from("data/.._EVIL.csv"));
    }

    #[test]
    fn test_parse_with_extra_columns_and_timestamps() {
        let csv = "Date,Adj Close,Close,High,Low,Open,Volume\n\
                   2024-01-01 00:00:00+00:00,1,42000.5,43000,41000,41500,100\n\
                   \n\
                   2024-01-02,1,42100,43100,41100,42000.5,\n";
        let bars = parse_csv(csv).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 42000.5);
        assert_eq!(bars[0].open, 41500.0);
        // 빈 거래량은 결측값
        assert!(bars[1].volume.is_nan());
        assert!(!bars[1].is_complete());
    }

    #[test]
    fn test_parse_reports_line_number() {
        let csv = "Date,Open,High,Low,Close,Volume\n2024-01-01,1,2,3,abc,5\n";
        let err = parse_csv(csv).unwrap_err().to_string();
        assert!(err.contains("line 2"), "{}", err);
    }

    #[test]
    fn test_parse_quoted_fields() {
        let csv = "Date,Open,High,Low,Close,Volume\n\
                   \"2024-01-01\",\"100.5\",\"110\",\"95\",\"105\",\"1200\"\n";
        let bars = parse_csv(csv).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].open, 100.5);
        assert_eq!(bars[0].volume, 1200.0);

        // 따옴표 안의 쉼표는 칸을 나누지 않음
        let csv = "Date,Open,High,Low,Close,Volume\n\
                   2024-01-01,100,110,95,105,10\n\
                   2024-01-02,100,110,95,\"1,234.5\",10\n";
        let err = parse_csv(csv).unwrap_err().to_string();
        assert!(err.contains("line 3"), "{}", err);
    }

    #[test]
    fn test_parse_short_row_reports_line() {
        let csv = "Date,Open,High,Low,Close,Volume\n2024-01-01,1,2,3,4,5\n2024-01-02,1,2\n";
        let err = parse_csv(csv).unwrap_err().to_string();
        assert!(err.contains("line 3"), "{}", err);
    }

    #[test]
    fn test_concurrent_saves_leave_complete_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = DatasetStore::new(dir.path());
        let bars = sample_bars();

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..25 {
                        store.save("BTC-USD", &bars).unwrap();
                        assert_eq!(store.load("BTC-USD").unwrap(), bars);
                    }
                });
            }
        });

        // 임시 파일이 남지 않음
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_parse_missing_column() {
        let csv = "Date,Open,High,Low,Volume\n";
        let err = parse_csv(csv).unwrap_err().to_string();
        assert!(err.contains("close"), "{}", err);
        assert!(parse_csv("").is_err());
    }
}
