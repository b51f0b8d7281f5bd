// Aligns heterogeneous series onto one time grid and renders delimited text
use super::deep_link::format_iso;
use super::plot::{ExportSettings, LineTerminator};
use super::telemetry::{DataPoint, Value};
use csv::{QuoteStyle, Terminator, WriterBuilder};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct ExportColumn {
    pub name: String,
    pub datapoints: Vec<DataPoint>,
}

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum GridError {
    #[error("time range {start}..{end} cannot be split into {step} ms steps")]
    Overflow { start: i64, end: i64, step: i64 },
    #[error("export would produce {rows} rows, the limit is {limit}")]
    TooManyRows { rows: u64, limit: usize },
}

/// Number of grid ticks from `start` to `end`, rejecting more than `max_rows`.
pub fn grid_len(start: i64, end: i64, step: i64, max_rows: usize) -> Result<usize, GridError> {
    if step <= 0 || end < start {
        return Ok(0);
    }
    let count = end
        .checked_sub(start)
        .and_then(|span| span.checked_div(step))
        .and_then(|n| n.checked_add(1))
        .ok_or(GridError::Overflow { start, end, step })?;

    let rows = count.unsigned_abs();
    match usize::try_from(rows) {
        Ok(len) if len <= max_rows => Ok(len),
        _ => Err(GridError::TooManyRows {
            rows,
            limit: max_rows,
        }),
    }
}

/// Grid ticks `start + k * step` up to and including `end`.
pub fn grid_ticks(start: i64, end: i64, step: i64, max_rows: usize) -> Result<Vec<i64>, GridError> {
    let len = grid_len(start, end, step, max_rows)?;
    (0..len as i64)
        .map(|k| k.checked_mul(step).and_then(|offset| start.checked_add(offset)))
        .collect::<Option<Vec<i64>>>()
        .ok_or(GridError::Overflow { start, end, step })
}

/// Value per tick: the latest sample in `[tick, tick + step)`, no interpolation.
pub fn resample(points: &[DataPoint], start: i64, step: i64, ticks: usize) -> Vec<Option<Value>> {
    let mut cells: Vec<Option<(i64, Value)>> = vec![None; ticks];
    for point in points {
        let Some(offset) = point.x.checked_sub(start).filter(|o| *o >= 0) else {
            continue;
        };
        let Ok(bucket) = usize::try_from(offset / step) else {
            continue;
        };
        let Some(cell) = cells.get_mut(bucket) else {
            continue;
        };
        if cell.as_ref().is_none_or(|(x, _)| point.x >= *x) {
            *cell = Some((point.x, point.y.clone()));
        }
    }
    cells.into_iter().map(|c| c.map(|(_, v)| v)).collect()
}

/// Header plus one row per tick: `[index, timestamp, value_1, ...]`.
pub fn build_rows(
    columns: &[ExportColumn],
    start: i64,
    end: i64,
    step: i64,
    max_rows: usize,
) -> Result<Vec<Vec<String>>, GridError> {
    let ticks = grid_ticks(start, end, step, max_rows)?;
    let resampled: Vec<Vec<Option<Value>>> = columns
        .iter()
        .map(|c| resample(&c.datapoints, start, step, ticks.len()))
        .collect();

    let mut header = vec!["index".to_string(), "timestamp (utc)".to_string()];
    header.extend(columns.iter().map(|c| c.name.clone()));

    let mut rows = Vec::with_capacity(ticks.len() + 1);
    rows.push(header);
    for (i, tick) in ticks.iter().enumerate() {
        let mut row = vec![i.to_string(), format_iso(*tick)];
        row.extend(
            resampled
                .iter()
                .map(|cells| cells[i].as_ref().map(|v| v.to_string()).unwrap_or_default()),
        );
        rows.push(row);
    }
    Ok(rows)
}

/// Render `rows` with the configured separator, quoting and line terminator.
///
/// With quoting enabled every field is quoted, empty ones included, and an
/// embedded quote character is doubled.
pub fn serialize(rows: &[Vec<String>], settings: &ExportSettings) -> Result<String, csv::Error> {
    let mut builder = WriterBuilder::new();
    builder
        .has_headers(false)
        .delimiter(settings.separator.delimiter())
        .terminator(match settings.line_terminator {
            LineTerminator::CrLf => Terminator::CRLF,
            LineTerminator::Lf => Terminator::Any(b'\n'),
        });
    match settings.quote.quote_byte() {
        Some(quote) => builder.quote(quote).double_quote(true).quote_style(QuoteStyle::Always),
        None => builder.quote_style(QuoteStyle::Never),
    };

    let mut writer = builder.from_writer(Vec::new());
    for row in rows {
        writer.write_record(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    String::from_utf8(bytes)
        .map_err(|e| csv::Error::from(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}
