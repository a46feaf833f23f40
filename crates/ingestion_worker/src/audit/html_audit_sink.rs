use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDate, NaiveDateTime, Utc};
use common::domain::{
    AttributeSet, AuditDetail, AuditRecord, AuditSink, DomainError, DomainResult, SensorValues,
    WriteOutcome, CIVIL_TIMESTAMP_FORMAT, SENSOR_POWER_STATUS_ON, SUMMARY_SOURCE_TYPE,
    UNKNOWN_DEVICE_ID,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

/// Raw payloads are broken into lines of this many characters
const RAW_PAYLOAD_WRAP: usize = 100;

const FILE_DATE_FORMAT: &str = "%d_%m_%Y";
const HEADER_DATE_FORMAT: &str = "%d/%m/%Y";

const STYLE: &str = r#"        table { border-collapse: collapse; width: 100%; font-family: Arial, sans-serif; }
        th, td { border: 1px solid #ddd; padding: 8px; text-align: left; vertical-align: top; }
        th { background-color: #f2f2f2; }
        tr:nth-child(even) { background-color: #f9f9f9; }
        .timestamp { font-weight: bold; color: #333; }
        .success { color: green; }
        .error { color: red; }
        .raw-data { max-width: 40%; word-wrap: break-word; white-space: pre-wrap; }
        .processed-data { max-width: 30%; }
        .db-ops { max-width: 30%; }"#;

/// Audit sink writing one HTML table per device per day.
///
/// Files are named `LOG_<DD_MM_YYYY>-<device>.html`. The document header is
/// written when a file is created; every record appends one table row.
pub struct HtmlAuditSink {
    log_dir: PathBuf,
    timezone: FixedOffset,
    file_locks: std::sync::Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl HtmlAuditSink {
    pub fn new(log_dir: impl Into<PathBuf>, timezone: FixedOffset) -> Self {
        Self {
            log_dir: log_dir.into(),
            timezone,
            file_locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn log_file_path(&self, device_id: &str, date: NaiveDate) -> PathBuf {
        self.log_dir.join(format!(
            "LOG_{}-{}.html",
            date.format(FILE_DATE_FORMAT),
            sanitize_file_component(device_id)
        ))
    }

    /// Lock guarding one log file. Entries nobody holds are pruned on the way.
    fn file_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self
            .file_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(path.to_path_buf()).or_default())
    }

    async fn append(&self, record: &AuditRecord, written_at: NaiveDateTime) -> std::io::Result<PathBuf> {
        let path = self.log_file_path(&record.device_id, written_at.date());

        // Writers to the same file never interleave rows or write two headers
        let file_lock = self.file_lock(&path);
        let _guard = file_lock.lock().await;

        fs::create_dir_all(&self.log_dir).await?;
        let is_new = !fs::try_exists(&path).await?;

        let mut content = String::new();
        if is_new {
            content.push_str(&render_header(&record.device_id, written_at.date()));
        }
        content.push_str(&render_row(record, written_at));

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;

        if is_new {
            debug!(device_id = %record.device_id, path = %path.display(), "created audit log file");
        }

        Ok(path)
    }
}

#[async_trait]
impl AuditSink for HtmlAuditSink {
    #[instrument(skip(self, record), fields(device_id = %record.device_id, mode = %record.mode))]
    async fn record(&self, record: AuditRecord) -> DomainResult<()> {
        let written_at = Utc::now().with_timezone(&self.timezone).naive_local();

        let path = self.append(&record, written_at).await.map_err(|e| {
            DomainError::AuditSinkError(format!(
                "failed to append to audit log in {}: {}",
                self.log_dir.display(),
                e
            ))
        })?;

        debug!(path = %path.display(), "wrote audit record");
        Ok(())
    }
}

pub fn render_header(device_id: &str, date: NaiveDate) -> String {
    let device = escape_html(device_id);
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Device Log - {device}</title>
    <style>
{STYLE}
    </style>
</head>
<body>
    <h1>Device Log - {device}</h1>
    <h2>Date: {date}</h2>
    <table>
        <tr>
            <th>Timestamp</th>
            <th>Device ID</th>
            <th>MQTT Topic</th>
            <th style="width: 40%;">Raw Data</th>
            <th style="width: 30%;">Processed Data</th>
            <th style="width: 30%;">Database Operations</th>
        </tr>
"#,
        date = date.format(HEADER_DATE_FORMAT),
    )
}

pub fn render_row(record: &AuditRecord, written_at: NaiveDateTime) -> String {
    format!(
        r#"        <tr>
            <td class="timestamp">{}</td>
            <td>{}</td>
            <td>{}</td>
            <td class="raw-data">{}</td>
            <td class="processed-data">{}</td>
            <td class="db-ops">{}</td>
        </tr>
"#,
        written_at.format(CIVIL_TIMESTAMP_FORMAT),
        escape_html(&record.device_id),
        escape_html(&record.topic),
        wrap_escaped(&record.raw_payload, RAW_PAYLOAD_WRAP),
        render_processed_data(record),
        render_operations(record),
    )
}

fn render_processed_data(record: &AuditRecord) -> String {
    let mut lines = vec![
        format!("Timestamp: {}", record.timestamp.format(CIVIL_TIMESTAMP_FORMAT)),
        format!("DeviceID: {}", escape_html(&record.device_id)),
        format!("Type: {}", SUMMARY_SOURCE_TYPE),
    ];

    match &record.detail {
        AuditDetail::Reading {
            sensors,
            unbox_code,
        } => {
            push_sensor_lines(&mut lines, sensors);
            lines.push(format!("SensorPowerStatus: {}", SENSOR_POWER_STATUS_ON));
            lines.push("GSMSignal: 0".to_string());
            lines.push(format!("UnBox: {}", escape_html(&unbox_code.to_string())));
        }
        AuditDetail::Attributes(attributes) => push_attribute_lines(&mut lines, attributes),
        AuditDetail::Empty => lines.push(format!("Mode: {}", record.mode)),
    }

    lines.join("<br>\n")
}

fn push_sensor_lines(lines: &mut Vec<String>, sensors: &SensorValues) {
    for (name, value) in [
        ("Current_ss1", sensors.sensor1),
        ("Current_ss2", sensors.sensor2),
        ("Current_ss3", sensors.sensor3),
        ("Current_ss4", sensors.sensor4),
    ] {
        lines.push(format!("{}: {}", name, format_number(value)));
    }
}

fn push_attribute_lines(lines: &mut Vec<String>, attributes: &AttributeSet) {
    lines.push(format!(
        "MainPower: {}",
        display_or_absent(attributes.main_power.map(format_number))
    ));
    lines.push(format!("GSMSignal: {}", display_or_absent(attributes.gsm_signal)));
    lines.push(format!("sample_time: {}", display_or_absent(attributes.sample_time)));
    lines.push(format!("SendingRate: {}", display_or_absent(attributes.sending_rate)));
    lines.push(format!(
        "UnBox: {}",
        display_or_absent(attributes.unbox_code.map(|c| escape_html(&c.to_string())))
    ));
}

fn display_or_absent<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "N/A".to_string())
}

fn render_operations(record: &AuditRecord) -> String {
    if record.outcomes.is_empty() {
        let class = if record.mode.is_failure() { "error" } else { "success" };
        return format!(r#"<span class="{}">{}</span>"#, class, record.mode);
    }

    record
        .outcomes
        .iter()
        .map(render_outcome)
        .collect::<Vec<_>>()
        .join("<br>")
}

fn render_outcome(outcome: &WriteOutcome) -> String {
    let class = if outcome.is_success() { "success" } else { "error" };
    format!(
        r#"<span class="{}">{}</span>"#,
        class,
        escape_html(&outcome.to_string())
    )
}

/// Whole numbers without decimals, anything else with three
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.3}", value)
    }
}

/// Escape each chunk of `width` characters and join them with `<br>`
fn wrap_escaped(text: &str, width: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(width)
        .map(|chunk| escape_html(&chunk.iter().collect::<String>()))
        .collect::<Vec<_>>()
        .join("<br>")
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Device ids come from topics, so keep only characters safe in a file name
fn sanitize_file_component(device_id: &str) -> String {
    let sanitized: String = device_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() {
        UNKNOWN_DEVICE_ID.to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::{AuditMode, WriteOperation};
    use tempfile::TempDir;

    fn utc_plus_seven() -> FixedOffset {
        FixedOffset::east_opt(7 * 3600).unwrap()
    }

    fn observed_at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 9, 12)
            .unwrap()
            .and_hms_opt(14, 5, 9)
            .unwrap()
    }

    fn reading_record() -> AuditRecord {
        AuditRecord {
            topic: "v1/devices/T24000/telemetry".to_string(),
            raw_payload: "[{ts:1757660709000,values:{Channel:12345,level1:5000,pressure2:3000,level2:2000}}]"
                .to_string(),
            device_id: "T24000".to_string(),
            detail: AuditDetail::Reading {
                sensors: SensorValues {
                    sensor1: 12.35,
                    sensor2: 5.0,
                    sensor3: 3.0,
                    sensor4: 2.0,
                },
                unbox_code: 'C',
            },
            timestamp: observed_at(),
            outcomes: vec![
                WriteOutcome::success(WriteOperation::InsertReading),
                WriteOutcome::failed(WriteOperation::UpdateSummary, "timeout"),
            ],
            mode: AuditMode::FullReading,
        }
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(12.0), "12");
        assert_eq!(format_number(0.0), "0");
        assert_eq!(format_number(12.35), "12.350");
        assert_eq!(format_number(0.999), "0.999");
    }

    #[test]
    fn test_wrap_escaped() {
        let text = "a".repeat(250);
        let wrapped = wrap_escaped(&text, 100);

        let parts: Vec<&str> = wrapped.split("<br>").collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 100);
        assert_eq!(parts[2].len(), 50);

        assert_eq!(wrap_escaped("<b>", 100), "&lt;b&gt;");
    }

    #[test]
    fn test_sanitize_file_component() {
        assert_eq!(sanitize_file_component("T24000"), "T24000");
        assert_eq!(sanitize_file_component("../etc/passwd"), "___etc_passwd");
        assert_eq!(sanitize_file_component(""), "unknown");
    }

    #[test]
    fn test_log_file_path() {
        let sink = HtmlAuditSink::new("/var/log/rdas", utc_plus_seven());
        let date = NaiveDate::from_ymd_opt(2025, 9, 12).unwrap();

        assert_eq!(
            sink.log_file_path("T24000", date),
            PathBuf::from("/var/log/rdas/LOG_12_09_2025-T24000.html")
        );
    }

    #[test]
    fn test_render_row_for_reading() {
        let row = render_row(&reading_record(), observed_at());

        assert!(row.contains(r#"<td class="timestamp">2025-09-12 14:05:09</td>"#));
        assert!(row.contains("Current_ss1: 12.350"));
        assert!(row.contains("Current_ss2: 5"));
        assert!(row.contains("UnBox: C"));
        assert!(row.contains(r#"<span class="success">INSERT sensor_data: SUCCESS</span>"#));
        assert!(row.contains(r#"<span class="error">UPDATE rdas_dev: FAILED - timeout</span>"#));
    }

    #[test]
    fn test_render_row_for_attributes() {
        let record = AuditRecord {
            topic: "v1/devices/T24000/attributes".to_string(),
            raw_payload: r#"{"GSM_Signal":42}"#.to_string(),
            device_id: "T24000".to_string(),
            detail: AuditDetail::Attributes(AttributeSet {
                gsm_signal: Some(42),
                ..Default::default()
            }),
            timestamp: observed_at(),
            outcomes: vec![WriteOutcome::success(WriteOperation::UpdateSummary)],
            mode: AuditMode::Attributes,
        };

        let row = render_row(&record, observed_at());

        assert!(row.contains("GSMSignal: 42"));
        assert!(row.contains("MainPower: N/A"));
        assert!(row.contains("{&quot;GSM_Signal&quot;:42}"));
    }

    #[test]
    fn test_render_row_for_failure() {
        let record = AuditRecord {
            topic: "x/y".to_string(),
            raw_payload: "<script>".to_string(),
            device_id: "unknown".to_string(),
            detail: AuditDetail::Empty,
            timestamp: observed_at(),
            outcomes: Vec::new(),
            mode: AuditMode::InvalidTopic,
        };

        let row = render_row(&record, observed_at());

        assert!(row.contains(r#"<span class="error">INVALID TOPIC</span>"#));
        assert!(row.contains("&lt;script&gt;"));
        assert!(!row.contains("<script>"));
    }

    #[tokio::test]
    async fn test_header_written_once_per_file() {
        let dir = TempDir::new().unwrap();
        let log_dir = dir.path().join("LOG");
        let sink = HtmlAuditSink::new(&log_dir, utc_plus_seven());

        let written_at = observed_at();
        sink.append(&reading_record(), written_at).await.unwrap();
        let path = sink.append(&reading_record(), written_at).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("<!DOCTYPE html>").count(), 1);
        assert_eq!(content.matches(r#"<td class="timestamp">"#).count(), 2);
        assert!(content.contains("<h2>Date: 12/09/2025</h2>"));
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "LOG_12_09_2025-T24000.html"
        );
    }

    #[tokio::test]
    async fn test_other_device_is_not_blocked_by_held_file_lock() {
        let sink = HtmlAuditSink::new("/var/log/rdas", utc_plus_seven());
        let date = observed_at().date();
        let busy_path = sink.log_file_path("T24000", date);

        let busy = sink.file_lock(&busy_path);
        let _held = busy.lock().await;

        assert!(Arc::ptr_eq(&busy, &sink.file_lock(&busy_path)));
        assert!(busy.try_lock().is_err());

        let other = sink.file_lock(&sink.log_file_path("T24001", date));
        assert!(!Arc::ptr_eq(&busy, &other));
        assert!(other.try_lock().is_ok());
    }

    #[tokio::test]
    async fn test_released_file_locks_are_pruned() {
        let sink = HtmlAuditSink::new("/var/log/rdas", utc_plus_seven());
        let date = observed_at().date();

        drop(sink.file_lock(&sink.log_file_path("T24000", date)));
        drop(sink.file_lock(&sink.log_file_path("T24001", date)));

        assert_eq!(sink.file_locks.lock().unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_to_one_file() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(HtmlAuditSink::new(dir.path(), utc_plus_seven()));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let sink = Arc::clone(&sink);
            handles.push(tokio::spawn(async move {
                sink.append(&reading_record(), observed_at()).await.unwrap()
            }));
        }
        let mut path = PathBuf::new();
        for handle in handles {
            path = handle.await.unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("<!DOCTYPE html>").count(), 1);
        assert_eq!(content.matches(r#"<td class="timestamp">"#).count(), 16);
    }

    #[tokio::test]
    async fn test_record_creates_file_per_device() {
        let dir = TempDir::new().unwrap();
        let sink = HtmlAuditSink::new(dir.path(), utc_plus_seven());

        let mut other = reading_record();
        other.device_id = "T24001".to_string();

        sink.record(reading_record()).await.unwrap();
        sink.record(other).await.unwrap();

        let files = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(files, 2);
    }

    #[tokio::test]
    async fn test_record_fails_when_dir_is_a_file() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("LOG");
        std::fs::write(&blocker, "not a directory").unwrap();

        let sink = HtmlAuditSink::new(&blocker, utc_plus_seven());

        let result = sink.record(reading_record()).await;
        assert!(matches!(result, Err(DomainError::AuditSinkError(_))));
    }
}
