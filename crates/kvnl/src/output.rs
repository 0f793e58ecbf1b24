use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use kvnl_codec::Record;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct RecordOutput<'a> {
    key: &'a str,
    encoding: &'static str,
    size: usize,
    value: String,
}

impl<'a> RecordOutput<'a> {
    fn new(record: &'a Record) -> Self {
        Self {
            key: if record.is_empty_line() { "" } else { &record.key },
            encoding: encoding_name(record),
            size: record.value.len(),
            value: value_preview(&record.value),
        }
    }
}

#[derive(Serialize)]
struct SummaryOutput {
    records: usize,
    bytes: u64,
    checksum: String,
}

pub fn print_records(records: &[Record], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for record in records {
                println!(
                    "{}",
                    serde_json::to_string(&RecordOutput::new(record))
                        .unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KEY", "ENCODING", "SIZE", "VALUE"]);
            for record in records {
                let out = RecordOutput::new(record);
                table.add_row(vec![
                    out.key.to_string(),
                    out.encoding.to_string(),
                    out.size.to_string(),
                    out.value,
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for record in records {
                let out = RecordOutput::new(record);
                println!(
                    "{} ({}, {} bytes) {}",
                    out.key, out.encoding, out.size, out.value
                );
            }
        }
        OutputFormat::Raw => {
            for record in records {
                print_raw(&record.value);
            }
        }
    }
}

pub fn print_summary(records: usize, bytes: u64, checksum: u64, format: OutputFormat) {
    let summary = SummaryOutput {
        records,
        bytes,
        checksum: format!("{checksum:016x}"),
    };
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string(&summary).unwrap_or_else(|_| "{}".to_string())
        ),
        OutputFormat::Table | OutputFormat::Pretty => println!(
            "records={} bytes={} checksum={}",
            summary.records, summary.bytes, summary.checksum
        ),
        OutputFormat::Raw => {}
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn encoding_name(record: &Record) -> &'static str {
    match (record.is_empty_line(), record.size) {
        (true, _) => "empty-line",
        (false, Some(_)) => "sized",
        (false, None) => "delimited",
    }
}

fn value_preview(value: &[u8]) -> String {
    match std::str::from_utf8(value) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", value.len()),
    }
}
