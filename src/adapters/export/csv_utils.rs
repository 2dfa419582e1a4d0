//! Archive serialization. Uses the `csv` crate for safe quoting.
//!
//! One CSV row per vote; motions without votes still get a single row with
//! empty vote columns so that every motion shows up in the sheet.

use crate::domain::MotionRecord;
use chrono::{DateTime, SecondsFormat, Utc};

const HEADER: [&str; 16] = [
    "motion_id",
    "council_id",
    "author_id",
    "text",
    "majority",
    "unanimous",
    "status",
    "created_at",
    "closed_at",
    "yes",
    "no",
    "abstain",
    "voter_id",
    "choice",
    "weight",
    "reason",
];

fn fmt_ts(at: Option<DateTime<Utc>>) -> String {
    at.map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

/// Convert archive records to CSV with a header row.
pub fn records_to_csv(records: &[MotionRecord]) -> Result<String, csv::Error> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(true)
        .from_writer(Vec::new());

    wtr.write_record(HEADER)?;

    for record in records {
        let m = &record.motion;
        let motion_cols = [
            m.id.to_string(),
            m.council_id.to_string(),
            m.author_id.to_string(),
            // Keep one record per line
            m.text.replace('\n', " ").replace('\r', ""),
            m.majority.to_string(),
            m.unanimous.to_string(),
            m.status.to_string(),
            fmt_ts(Some(m.created_at)),
            fmt_ts(m.closed_at),
            record.tally.yes.to_string(),
            record.tally.no.to_string(),
            record.tally.abstain.to_string(),
        ];

        if record.votes.is_empty() {
            let mut row = motion_cols.to_vec();
            row.extend(std::iter::repeat_n(String::new(), 4));
            wtr.write_record(&row)?;
            continue;
        }

        for vote in &record.votes {
            let mut row = motion_cols.to_vec();
            row.push(vote.voter_id.to_string());
            row.push(vote.choice.to_string());
            row.push(vote.weight.to_string());
            row.push(
                vote.reason
                    .as_deref()
                    .unwrap_or_default()
                    .replace('\n', " ")
                    .replace('\r', ""),
            );
            wtr.write_record(&row)?;
        }
    }

    wtr.flush()?;
    let bytes = wtr
        .into_inner()
        .map_err(|e| csv::Error::from(std::io::Error::other(e.to_string())))?;

    String::from_utf8(bytes).map_err(|e| {
        csv::Error::from(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            e.to_string(),
        ))
    })
}

/// Pretty-printed JSON array of records.
pub fn records_to_json(records: &[MotionRecord]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(records)
}
