//! Tabular text decoding.
//!
//! Turns raw CSV-ish text into [`RawRow`]s (ordered header -> string pairs).
//! The delimiter is sniffed from the header line, quoting follows the usual
//! doubled-quote convention and nothing in here ever fails: bad records are
//! skipped, short records are padded with empty strings.

use csv::ReaderBuilder;
use tracing::debug;

/// First bytes of a version-control large-file pointer committed in place of
/// the real data file.
pub const POINTER_PREAMBLE: &str = "version https://git-lfs.github.com/spec/";

/// One decoded record, keyed by header in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    fields: Vec<(String, String)>,
}

impl RawRow {
    pub fn new(fields: Vec<(String, String)>) -> Self {
        Self { fields }
    }

    /// Raw value of `column`, if the column exists.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == column)
            .map(|(_, v)| v.as_str())
    }

    /// First non-blank value among `candidates`, consulted in order.
    ///
    /// Dimension tables ship under several column spellings (`cod_stazione`,
    /// `codice`, `cod`...); every ingest path resolves them through here.
    pub fn pick(&self, candidates: &[&str]) -> Option<&str> {
        candidates
            .iter()
            .filter_map(|c| self.get(c))
            .map(str::trim)
            .find(|v| !v.is_empty())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Returns `true` when `text` is a large-file pointer rather than data: it
/// starts with the pointer preamble and its first line has no comma.
pub fn is_pointer_file(text: &str) -> bool {
    let t = text.trim_start_matches('\u{feff}').trim_start();
    if !t.starts_with(POINTER_PREAMBLE) {
        return false;
    }
    let first_line = t.lines().next().unwrap_or("");
    !first_line.contains(',')
}

/// Pick the delimiter of `header_line` by counting unquoted `,`, `;` and
/// tabs. Comma wins ties and is the default when none appear.
pub fn sniff_delimiter(header_line: &str) -> u8 {
    let (mut commas, mut semis, mut tabs) = (0usize, 0usize, 0usize);
    let mut in_quotes = false;
    for ch in header_line.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => commas += 1,
            ';' if !in_quotes => semis += 1,
            '\t' if !in_quotes => tabs += 1,
            _ => {}
        }
    }
    let mut best = (b',', commas);
    for candidate in [(b';', semis), (b'\t', tabs)] {
        if candidate.1 > best.1 {
            best = candidate;
        }
    }
    best.0
}

/// Decode `text` into rows. Zero or one non-blank line yields no rows.
pub fn parse_csv(text: &str) -> Vec<RawRow> {
    let body = text.trim_start_matches('\u{feff}').trim();
    if body.is_empty() {
        return Vec::new();
    }
    let mut lines = body.lines().filter(|l| !l.trim().is_empty());
    let Some(header_line) = lines.next() else {
        return Vec::new();
    };
    if lines.next().is_none() {
        return Vec::new();
    }

    let delimiter = sniff_delimiter(header_line);
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(body.as_bytes());

    let headers: Vec<String> = match rdr.headers() {
        Ok(h) => h.iter().map(|s| s.trim().to_string()).collect(),
        Err(e) => {
            debug!(error = %e, "unreadable header line, treating table as empty");
            return Vec::new();
        }
    };

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for result in rdr.records() {
        let record = match result {
            Ok(r) => r,
            Err(_) => {
                skipped += 1;
                continue;
            }
        };
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        let fields = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), record.get(i).unwrap_or("").to_string()))
            .collect();
        rows.push(RawRow::new(fields));
    }
    if skipped > 0 {
        debug!(skipped, "skipped undecodable records");
    }
    rows
}
