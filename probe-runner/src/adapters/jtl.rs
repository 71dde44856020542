//! Load-test result file parsing
//!
//! Result files come in two shapes: XML (`<httpSample t=".." ts=".." s=".."/>`
//! elements, possibly nested) or CSV with a header row naming `elapsed`,
//! `success` and `timeStamp` columns. XML is tried first for content that looks
//! like markup; CSV is the fallback.

use probe_core::domain::outcome::PerformanceMetrics;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;
use tracing::debug;

/// One recorded request
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Response time in milliseconds
    pub elapsed_ms: f64,
    /// Epoch milliseconds the sample started, when recorded
    pub timestamp_ms: Option<f64>,
    pub success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultFormat {
    Xml,
    Csv,
}

impl ResultFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultFormat::Xml => "xml",
            ResultFormat::Csv => "csv",
        }
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("invalid {field} value '{value}'")]
    InvalidNumber { field: &'static str, value: String },
}

/// Parses a result file, detecting its format
pub fn parse_result_file(content: &str) -> Result<(ResultFormat, Vec<Sample>), ParseError> {
    let mut xml_error = None;

    if content.trim_start().starts_with('<') {
        match parse_xml(content) {
            Ok(samples) => return Ok((ResultFormat::Xml, samples)),
            Err(e) => {
                debug!("Result file is not valid XML ({}), trying CSV", e);
                xml_error = Some(e);
            }
        }
    }

    match parse_csv(content) {
        Ok(samples) => Ok((ResultFormat::Csv, samples)),
        Err(e) => Err(xml_error.unwrap_or(e)),
    }
}

/// Parses XML results; every `httpSample` or `sample` element counts
pub fn parse_xml(content: &str) -> Result<Vec<Sample>, ParseError> {
    let mut reader = Reader::from_str(content);
    let mut samples = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(element) | Event::Empty(element) => {
                let name = element.name();
                if name.as_ref() == b"httpSample" || name.as_ref() == b"sample" {
                    samples.push(sample_from_element(&element)?);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(samples)
}

fn sample_from_element(element: &BytesStart<'_>) -> Result<Sample, ParseError> {
    let mut elapsed_ms = 0.0;
    let mut timestamp_ms = None;
    let mut success = true;

    for attribute in element.attributes() {
        let attribute = attribute.map_err(quick_xml::Error::InvalidAttr)?;
        let value = String::from_utf8_lossy(&attribute.value);

        match attribute.key.as_ref() {
            b"t" => elapsed_ms = parse_number("t", &value)?,
            b"ts" => timestamp_ms = Some(parse_number("ts", &value)?),
            b"s" => success = value.trim().eq_ignore_ascii_case("true"),
            _ => {}
        }
    }

    Ok(Sample {
        elapsed_ms,
        timestamp_ms,
        success,
    })
}

/// Parses CSV results with a header row
pub fn parse_csv(content: &str) -> Result<Vec<Sample>, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers = reader.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h == name);

    let elapsed_col = column("elapsed").ok_or(ParseError::MissingColumn("elapsed"))?;
    let success_col = column("success");
    let timestamp_col = column("timeStamp");

    let mut samples = Vec::new();
    for record in reader.records() {
        let record = record?;

        let elapsed_ms = parse_number("elapsed", record.get(elapsed_col).unwrap_or_default())?;
        let success = success_col
            .and_then(|i| record.get(i))
            .is_none_or(|v| v.eq_ignore_ascii_case("true"));
        // Formatted dates are tolerated; they just don't count toward throughput
        let timestamp_ms = timestamp_col
            .and_then(|i| record.get(i))
            .and_then(|v| v.parse::<f64>().ok());

        samples.push(Sample {
            elapsed_ms,
            timestamp_ms,
            success,
        });
    }

    Ok(samples)
}

fn parse_number(field: &'static str, value: &str) -> Result<f64, ParseError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| ParseError::InvalidNumber {
            field,
            value: value.to_string(),
        })
}

/// Nearest-rank percentile over ascending values
///
/// Uses index `floor(n * p)`, clamped to the last element.
pub fn nearest_rank(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = ((sorted.len() as f64 * p) as usize).min(sorted.len() - 1);
    sorted[index]
}

/// Aggregates samples into summary metrics
pub fn compute_metrics(samples: &[Sample]) -> PerformanceMetrics {
    if samples.is_empty() {
        return PerformanceMetrics::default();
    }

    let total = samples.len() as u64;
    let successful = samples.iter().filter(|s| s.success).count() as u64;
    let failed = total - successful;

    let mut elapsed: Vec<f64> = samples.iter().map(|s| s.elapsed_ms).collect();
    elapsed.sort_by(|a, b| a.total_cmp(b));
    let average = elapsed.iter().sum::<f64>() / elapsed.len() as f64;

    let timestamps: Vec<f64> = samples.iter().filter_map(|s| s.timestamp_ms).collect();
    let duration = match (
        timestamps.iter().copied().reduce(f64::min),
        timestamps.iter().copied().reduce(f64::max),
    ) {
        (Some(first), Some(last)) => (last - first) / 1000.0,
        _ => 0.0,
    };
    let throughput = if duration > 0.0 {
        total as f64 / duration
    } else {
        0.0
    };

    PerformanceMetrics {
        total_samples: total,
        successful_samples: successful,
        failed_samples: failed,
        error_rate: failed as f64 / total as f64 * 100.0,
        average_response_time: average,
        min_response_time: elapsed[0],
        max_response_time: elapsed[elapsed.len() - 1],
        p95_response_time: nearest_rank(&elapsed, 0.95),
        p99_response_time: nearest_rank(&elapsed, 0.99),
        throughput,
        duration,
    }
}
