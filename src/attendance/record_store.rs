use crate::attendance::model::Attendance;
use crate::common::{AttendanceError, Result};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceField {
    StudentId,
    CourseId,
}

/// The document store attendance is written to: put by id, get by id,
/// query by field.
pub trait RecordStore: Send + Sync {
    fn put(&self, record: &Attendance) -> Result<()>;

    fn get(&self, id: &str) -> Result<Option<Attendance>>;

    fn query(&self, field: AttendanceField, value: &str) -> Result<Vec<Attendance>>;

    fn put_all(&self, records: &[Attendance]) -> Result<()> {
        records.iter().try_for_each(|record| self.put(record))
    }
}

/// Append-only JSON-lines ledger; a later line with the same id replaces an
/// earlier one.
pub struct JsonLinesStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLinesStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| AttendanceError::Storage("Ledger lock poisoned".into()))
    }

    /// Records in first-seen order, each holding its latest version. A final
    /// line without a newline is an append still in flight and is skipped.
    fn read_all(&self) -> Result<Vec<Attendance>> {
        let contents = {
            let _guard = self.lock()?;
            match fs::read_to_string(&self.path) {
                Ok(contents) => contents,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(e.into()),
            }
        };

        let (complete, partial) = match contents.rfind('\n') {
            Some(end) => contents.split_at(end + 1),
            None => ("", contents.as_str()),
        };
        if !partial.is_empty() {
            tracing::debug!("Skipping unterminated ledger line in {}", self.path.display());
        }

        let mut records: Vec<Attendance> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for (line_no, line) in complete.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: Attendance = serde_json::from_str(line).map_err(|e| {
                AttendanceError::Storage(format!(
                    "Corrupt ledger entry at {}:{}: {}", self.path.display(), line_no + 1, e
                ))
            })?;
            match positions.get(&record.id) {
                Some(&index) => records[index] = record,
                None => {
                    positions.insert(record.id.clone(), records.len());
                    records.push(record);
                }
            }
        }
        Ok(records)
    }
}

impl RecordStore for JsonLinesStore {
    fn put(&self, record: &Attendance) -> Result<()> {
        let mut line = serde_json::to_string(record)
            .map_err(|e| AttendanceError::Storage(format!("Failed to serialize record: {}", e)))?;
        line.push('\n');

        let _guard = self.lock()?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Attendance>> {
        Ok(self.read_all()?.into_iter().find(|r| r.id == id))
    }

    fn query(&self, field: AttendanceField, value: &str) -> Result<Vec<Attendance>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|r| match field {
                AttendanceField::StudentId => r.student_id == value,
                AttendanceField::CourseId => r.course_id == value,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::bookkeeping::mark_attendance;
    use crate::attendance::model::CaptureMethod;

    #[test]
    fn records_are_queryable_by_field() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonLinesStore::new(dir.path().join("ledger").join("attendance.jsonl")).unwrap();

        let present = mark_attendance("c1", &["s1".to_string(), "s2".to_string()], true, "t1", CaptureMethod::FaceRecognition);
        let absent = mark_attendance("c2", &["s1".to_string()], false, "t1", CaptureMethod::ManualEntry);
        store.put_all(&present).unwrap();
        store.put_all(&absent).unwrap();

        assert_eq!(store.query(AttendanceField::StudentId, "s1").unwrap().len(), 2);
        assert_eq!(store.query(AttendanceField::CourseId, "c1").unwrap().len(), 2);
        assert!(store.query(AttendanceField::CourseId, "c9").unwrap().is_empty());
        assert_eq!(store.get(&absent[0].id).unwrap(), Some(absent[0].clone()));
    }

    #[test]
    fn later_writes_replace_earlier_ones() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonLinesStore::new(dir.path().join("attendance.jsonl")).unwrap();

        let mut record = mark_attendance("c1", &["s1".to_string()], false, "t1", CaptureMethod::FaceRecognition).remove(0);
        store.put(&record).unwrap();
        record.is_present = true;
        store.put(&record).unwrap();

        let stored = store.query(AttendanceField::StudentId, "s1").unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].is_present);
    }

    #[test]
    fn empty_ledger_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonLinesStore::new(dir.path().join("attendance.jsonl")).unwrap();
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn corrupt_line_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.jsonl");
        fs::write(&path, "not json\n").unwrap();
        let store = JsonLinesStore::new(path).unwrap();
        assert!(matches!(
            store.query(AttendanceField::StudentId, "s1"),
            Err(AttendanceError::Storage(_))
        ));
    }

    #[test]
    fn unterminated_last_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.jsonl");
        let record = mark_attendance("c1", &["s1".to_string()], true, "t1", CaptureMethod::FaceRecognition).remove(0);
        let line = serde_json::to_string(&record).unwrap();
        fs::write(&path, format!("{}\n{}", line, &line[..line.len() / 2])).unwrap();

        let store = JsonLinesStore::new(path).unwrap();
        assert_eq!(store.query(AttendanceField::StudentId, "s1").unwrap(), vec![record]);
    }

    #[test]
    fn replacements_keep_first_seen_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonLinesStore::new(dir.path().join("attendance.jsonl")).unwrap();

        let ids: Vec<String> = (0..50).map(|i| format!("s{}", i)).collect();
        let mut records = mark_attendance("c1", &ids, false, "t1", CaptureMethod::FaceRecognition);
        store.put_all(&records).unwrap();
        for record in records.iter_mut().step_by(2) {
            record.is_present = true;
            store.put(record).unwrap();
        }

        let stored = store.query(AttendanceField::CourseId, "c1").unwrap();
        assert_eq!(stored, records);
    }

    #[test]
    fn reads_during_appends_never_fail() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonLinesStore::new(dir.path().join("attendance.jsonl")).unwrap();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..200 {
                    let ids = vec![format!("s{}", i % 5)];
                    store.put_all(&mark_attendance("c1", &ids, true, "t1", CaptureMethod::FaceRecognition)).unwrap();
                }
            });
            for _ in 0..50 {
                store.query(AttendanceField::CourseId, "c1").unwrap();
            }
        });

        assert_eq!(store.query(AttendanceField::CourseId, "c1").unwrap().len(), 200);
    }
}
