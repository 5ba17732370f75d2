//! Term Store Reader.
//!
//! The term store is one JSON object mapping term → record, written by the
//! extraction step and potentially far larger than memory. `TermStream`
//! scans the byte stream and materialises one entry at a time, so memory
//! use is bounded by the largest single entry, never by the store size.
//!
//! serde_json's deserializer is push-based: a `MapAccess` visitor runs over
//! the whole object before control returns, so it cannot back a pull
//! iterator. The scanner here only frames each entry (key string, raw value
//! bytes); serde_json still decodes both.
//!
//! A store can be re-read any number of times by calling
//! [`TermStore::open`] again; the stream keeps no state across opens.

use crate::error::{Result, TrendsError};
use crate::record::TermRecord;
use std::collections::hash_map::DefaultHasher;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Read buffer for the store file
const READ_BUFFER_BYTES: usize = 64 * 1024;

/// Handle to an on-disk term store
#[derive(Debug, Clone)]
pub struct TermStore {
    path: PathBuf,
}

impl TermStore {
    /// Create a handle; nothing is opened until [`TermStore::open`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the store file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a fresh forward-only stream over the store.
    pub fn open(&self) -> Result<TermStream<BufReader<File>>> {
        let file = File::open(&self.path).map_err(|e| TrendsError::StoreUnavailable {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        debug!(path = %self.path.display(), "Opened term store");
        Ok(TermStream::new(BufReader::with_capacity(READ_BUFFER_BYTES, file)))
    }

    /// Open a stream that only yields the terms belonging to `shard`.
    pub fn open_shard(&self, shard: ShardSpec) -> Result<TermStream<BufReader<File>>> {
        Ok(self.open()?.with_shard(shard))
    }
}

/// One decoded store entry
#[derive(Debug, Clone, PartialEq)]
pub struct StoreEntry {
    /// Position of the entry in the store, counting every entry
    pub ordinal: u64,
    pub term: String,
    pub record: TermRecord,
}

/// Disjoint partition of the term stream, selected by a stable hash of the term
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardSpec {
    index: usize,
    count: usize,
}

impl ShardSpec {
    /// Shard `index` of `count`.
    pub fn new(index: usize, count: usize) -> Result<Self> {
        if count == 0 {
            return Err(TrendsError::Config("shard count must be at least 1".to_string()));
        }
        if index >= count {
            return Err(TrendsError::Config(format!(
                "shard index {} out of range for {} shards",
                index, count
            )));
        }
        Ok(Self { index, count })
    }

    /// The single shard covering the whole store
    pub fn whole() -> Self {
        Self { index: 0, count: 1 }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Whether `term` belongs to this shard
    pub fn contains(&self, term: &str) -> bool {
        self.count == 1 || (stable_hash_str(term) % self.count as u64) as usize == self.index
    }
}

fn stable_hash_str(value: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Start,
    InObject { first: bool },
    Done,
}

/// Lazy iterator over `(term, record)` entries of a store.
///
/// Yields `Err(TrendsError::MalformedRecord)` for an entry whose value cannot
/// be decoded and then carries on with the next entry. Structural damage
/// (truncation, a top-level value that is not an object) yields one fatal
/// error and ends the stream.
pub struct TermStream<R> {
    reader: R,
    state: ScanState,
    next_ordinal: u64,
    shard: ShardSpec,
    value_buf: Vec<u8>,
    key_buf: Vec<u8>,
    peak_entry_bytes: usize,
}

impl<R: BufRead> TermStream<R> {
    /// Stream over any buffered reader positioned at the start of a store.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            state: ScanState::Start,
            next_ordinal: 0,
            shard: ShardSpec::whole(),
            value_buf: Vec::new(),
            key_buf: Vec::new(),
            peak_entry_bytes: 0,
        }
    }

    /// Restrict the stream to one shard. Ordinals still count every entry.
    pub fn with_shard(mut self, shard: ShardSpec) -> Self {
        self.shard = shard;
        self
    }

    /// Number of entries scanned so far, across all shards
    pub fn entries_scanned(&self) -> u64 {
        self.next_ordinal
    }

    /// Largest raw entry (key + value bytes) held in memory so far
    pub fn peak_entry_bytes(&self) -> usize {
        self.peak_entry_bytes
    }

    fn scan_next(&mut self) -> Result<Option<StoreEntry>> {
        loop {
            match self.state {
                ScanState::Done => return Ok(None),
                ScanState::Start => {
                    self.skip_whitespace()?;
                    match self.next_byte()? {
                        Some(b'{') => self.state = ScanState::InObject { first: true },
                        Some(other) => {
                            return Err(TrendsError::CorruptStore(format!(
                                "expected '{{' at start of store, found '{}'",
                                other as char
                            )))
                        }
                        None => {
                            return Err(TrendsError::CorruptStore("store is empty".to_string()))
                        }
                    }
                }
                ScanState::InObject { first } => {
                    self.skip_whitespace()?;
                    match self.peek()? {
                        Some(b'}') => {
                            self.bump();
                            self.state = ScanState::Done;
                            return Ok(None);
                        }
                        None => {
                            return Err(TrendsError::CorruptStore(
                                "unexpected end of store inside top-level object".to_string(),
                            ))
                        }
                        _ => {}
                    }
                    if !first {
                        self.expect(b',')?;
                        self.skip_whitespace()?;
                    }
                    self.state = ScanState::InObject { first: false };

                    if self.peek()? != Some(b'"') {
                        return Err(TrendsError::CorruptStore(format!(
                            "expected term key after entry {}",
                            self.next_ordinal
                        )));
                    }
                    let mut key_buf = std::mem::take(&mut self.key_buf);
                    key_buf.clear();
                    let key_result = self.read_string(&mut key_buf);
                    self.key_buf = key_buf;
                    key_result?;
                    let term: String = serde_json::from_slice(&self.key_buf).map_err(|e| {
                        TrendsError::CorruptStore(format!("undecodable term key: {}", e))
                    })?;

                    self.skip_whitespace()?;
                    self.expect(b':')?;
                    self.skip_whitespace()?;

                    let mut value_buf = std::mem::take(&mut self.value_buf);
                    value_buf.clear();
                    let value_result = self.read_value(&mut value_buf);
                    self.value_buf = value_buf;
                    value_result?;

                    self.peak_entry_bytes = self
                        .peak_entry_bytes
                        .max(self.key_buf.len() + self.value_buf.len());
                    let ordinal = self.next_ordinal;
                    self.next_ordinal += 1;

                    if !self.shard.contains(&term) {
                        continue;
                    }

                    return match serde_json::from_slice::<TermRecord>(&self.value_buf) {
                        Ok(record) => Ok(Some(StoreEntry {
                            ordinal,
                            term,
                            record,
                        })),
                        Err(e) => Err(TrendsError::MalformedRecord {
                            term,
                            reason: e.to_string(),
                        }),
                    };
                }
            }
        }
    }

    fn peek(&mut self) -> Result<Option<u8>> {
        let buf = self.reader.fill_buf()?;
        Ok(buf.first().copied())
    }

    fn bump(&mut self) {
        self.reader.consume(1);
    }

    fn next_byte(&mut self) -> Result<Option<u8>> {
        let byte = self.peek()?;
        if byte.is_some() {
            self.bump();
        }
        Ok(byte)
    }

    fn skip_whitespace(&mut self) -> Result<()> {
        while let Some(b) = self.peek()? {
            if !b.is_ascii_whitespace() {
                break;
            }
            self.bump();
        }
        Ok(())
    }

    fn expect(&mut self, wanted: u8) -> Result<()> {
        match self.next_byte()? {
            Some(b) if b == wanted => Ok(()),
            Some(b) => Err(TrendsError::CorruptStore(format!(
                "expected '{}', found '{}'",
                wanted as char, b as char
            ))),
            None => Err(TrendsError::CorruptStore(format!(
                "expected '{}', found end of store",
                wanted as char
            ))),
        }
    }

    /// Copy a JSON string literal, quotes included. Positioned on the opening quote.
    fn read_string(&mut self, out: &mut Vec<u8>) -> Result<()> {
        self.expect(b'"')?;
        out.push(b'"');
        self.read_string_tail(out)
    }

    /// Copy the rest of a string literal after its opening quote.
    fn read_string_tail(&mut self, out: &mut Vec<u8>) -> Result<()> {
        loop {
            match self.next_byte()? {
                Some(b'\\') => {
                    out.push(b'\\');
                    match self.next_byte()? {
                        Some(escaped) => out.push(escaped),
                        None => break,
                    }
                }
                Some(b'"') => {
                    out.push(b'"');
                    return Ok(());
                }
                Some(b) => out.push(b),
                None => break,
            }
        }
        Err(TrendsError::CorruptStore("unterminated string".to_string()))
    }

    /// Copy one raw JSON value without interpreting it.
    fn read_value(&mut self, out: &mut Vec<u8>) -> Result<()> {
        match self.peek()? {
            Some(b'"') => self.read_string(out),
            Some(b'{') | Some(b'[') => {
                let mut depth = 0usize;
                loop {
                    let byte = self.next_byte()?.ok_or_else(|| {
                        TrendsError::CorruptStore(
                            "unexpected end of store inside entry".to_string(),
                        )
                    })?;
                    out.push(byte);
                    match byte {
                        b'"' => self.read_string_tail(out)?,
                        b'{' | b'[' => depth += 1,
                        b'}' | b']' => {
                            depth -= 1;
                            if depth == 0 {
                                return Ok(());
                            }
                        }
                        _ => {}
                    }
                }
            }
            Some(_) => {
                while let Some(b) = self.peek()? {
                    if b == b',' || b == b'}' || b.is_ascii_whitespace() {
                        break;
                    }
                    out.push(b);
                    self.bump();
                }
                if out.is_empty() {
                    return Err(TrendsError::CorruptStore("missing entry value".to_string()));
                }
                Ok(())
            }
            None => Err(TrendsError::CorruptStore(
                "unexpected end of store before entry value".to_string(),
            )),
        }
    }
}

impl<R: BufRead> Iterator for TermStream<R> {
    type Item = Result<StoreEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.scan_next() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(e) => {
                if !e.is_recoverable() {
                    self.state = ScanState::Done;
                }
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;

    fn stream(json: &str) -> TermStream<Cursor<Vec<u8>>> {
        TermStream::new(Cursor::new(json.as_bytes().to_vec()))
    }

    #[test]
    fn test_streams_entries_in_store_order() -> Result<()> {
        let json = r#"{
            "tumor": {"category": "Oncology", "count": 2, "references": [{"PMID": "1", "Year": 2020}]},
            "heart \"attack\"": {"category": "Cardiology", "count": 1, "co_occurrence": ["a}b", "[x"]},
            "brain": {}
        }"#;
        let entries = stream(json).collect::<Result<Vec<_>>>()?;
        let terms: Vec<&str> = entries.iter().map(|e| e.term.as_str()).collect();
        assert_eq!(terms, vec!["tumor", "heart \"attack\"", "brain"]);
        assert_eq!(entries[1].record.co_occurrence, vec!["a}b", "[x"]);
        assert_eq!(entries[2].ordinal, 2);
        assert_eq!(entries[2].record.category, "General/Other");
        Ok(())
    }

    #[test]
    fn test_empty_object() {
        assert_eq!(stream("  {  }  ").count(), 0);
    }

    #[test]
    fn test_malformed_record_is_skipped() {
        let json = r#"{"a": {"count": 1}, "b": {"count": "many"}, "c": 7, "d": {"count": 2}}"#;
        let results: Vec<_> = stream(json).collect();
        assert_eq!(results.len(), 4);
        assert!(results[0].is_ok());
        assert!(matches!(
            &results[1],
            Err(TrendsError::MalformedRecord { term, .. }) if term == "b"
        ));
        assert!(matches!(&results[2], Err(TrendsError::MalformedRecord { .. })));
        match &results[3] {
            Ok(entry) => assert_eq!(entry.record.count, 2),
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    #[test]
    fn test_truncated_store_is_fatal() {
        let json = r#"{"a": {"count": 1}, "b": {"count": 2, "references": ["#;
        let results: Vec<_> = stream(json).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(TrendsError::CorruptStore(_))));
    }

    #[test]
    fn test_non_object_store_is_fatal() {
        let results: Vec<_> = stream("[1, 2]").collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(TrendsError::CorruptStore(_))));
    }

    #[test]
    fn test_missing_store_is_unavailable() {
        let store = TermStore::new("/nonexistent/terms.json");
        assert!(matches!(
            store.open(),
            Err(TrendsError::StoreUnavailable { .. })
        ));
    }

    #[test]
    fn test_shards_partition_the_store() -> Result<()> {
        let json: String = {
            let body: Vec<String> = (0..200)
                .map(|i| format!("\"term{}\": {{\"count\": {}}}", i, i))
                .collect();
            format!("{{{}}}", body.join(","))
        };
        let mut seen = Vec::new();
        for index in 0..3 {
            let shard = ShardSpec::new(index, 3)?;
            for entry in stream(&json).with_shard(shard) {
                seen.push(entry?.ordinal);
            }
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..200).collect::<Vec<u64>>());
        Ok(())
    }

    #[test]
    fn test_shard_spec_validation() {
        assert!(ShardSpec::new(0, 0).is_err());
        assert!(ShardSpec::new(3, 3).is_err());
        assert!(ShardSpec::whole().contains("anything"));
    }

    #[test]
    fn test_memory_bounded_by_single_entry() -> Result<()> {
        let mut temp = NamedTempFile::new()?;
        let entry = r#"{"category": "Oncology", "count": 4, "references": [{"PMID": "1", "Year": 2020}, {"PMID": "2", "Year": 2021}], "co_occurrence": ["cell", "therapy"]}"#;
        write!(temp, "{{")?;
        for i in 0..20_000 {
            if i > 0 {
                write!(temp, ",")?;
            }
            write!(temp, "\"term{:05}\": {}", i, entry)?;
        }
        write!(temp, "}}")?;
        temp.flush()?;

        let store = TermStore::new(temp.path());
        let mut stream = store.open()?;
        let mut count = 0;
        for item in stream.by_ref() {
            item?;
            count += 1;
        }
        assert_eq!(count, 20_000);
        assert_eq!(stream.entries_scanned(), 20_000);

        let file_len = std::fs::metadata(temp.path())?.len() as usize;
        let single_entry = entry.len() + "\"term00000\"".len();
        assert_eq!(stream.peak_entry_bytes(), single_entry);
        assert!(file_len > 1000 * stream.peak_entry_bytes());
        Ok(())
    }

    #[test]
    fn test_reopen_restarts_from_beginning() -> Result<()> {
        let mut temp = NamedTempFile::new()?;
        write!(temp, r#"{{"x": {{"count": 1}}, "y": {{"count": 2}}}}"#)?;
        temp.flush()?;
        let store = TermStore::new(temp.path());
        let first: Vec<String> = store.open()?.map(|e| e.map(|e| e.term)).collect::<Result<_>>()?;
        let second: Vec<String> = store.open()?.map(|e| e.map(|e| e.term)).collect::<Result<_>>()?;
        assert_eq!(first, second);
        Ok(())
    }
}
