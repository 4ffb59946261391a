//! CsvFileTable - ローカル CSV ファイルを共有 table として使う backend
//!
//! 同じファイルを複数の worker プロセスが読み書きします。
//! 書き込みは「lock 取得 → 全体を読む → 1 セル変更 → 一時ファイルに書く → rename → lock 解放」。
//!
//! # ロック
//! - プロセス間: 隣に置いた `.<name>.lock` への advisory lock（fd-lock）
//! - プロセス内: インスタンスごとの `tokio::sync::Mutex`
//! - 一時ファイルは `tempfile` で一意な名前を作るので、同じファイルを指す
//!   インスタンスが複数あっても衝突しない

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::BackendError;
use crate::ports::TableBackend;

type Rows = Vec<Vec<String>>;

/// Shared table stored as a CSV file.
#[derive(Debug, Clone)]
pub struct CsvFileTable {
    path: PathBuf,
    lock_path: PathBuf,
    gate: Arc<Mutex<()>>,
}

impl CsvFileTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "table.csv".to_string());
        let lock_path = path.with_file_name(format!(".{name}.lock"));
        Self {
            path,
            lock_path,
            gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create a new table file with the given header and default rows.
    ///
    /// Fails if the file already exists.
    pub async fn create(
        path: impl Into<PathBuf>,
        header: Vec<String>,
        defaults: Vec<String>,
    ) -> Result<Self, BackendError> {
        let table = Self::new(path);
        let target = table.path.clone();
        table
            .locked(move |path| {
                if path.exists() {
                    return Err(BackendError::new(format!(
                        "table file {} already exists",
                        target.display()
                    )));
                }
                store(path, &[header, defaults])
            })
            .await?;
        Ok(table)
    }

    /// Run `op` on the table file while holding both the in-process gate and
    /// the exclusive file lock.
    async fn locked<T, F>(&self, op: F) -> Result<T, BackendError>
    where
        F: FnOnce(&Path) -> Result<T, BackendError> + Send + 'static,
        T: Send + 'static,
    {
        let _gate = self.gate.lock().await;
        let path = self.path.clone();
        let lock_path = self.lock_path.clone();

        tokio::task::spawn_blocking(move || {
            let mut lock = fd_lock::RwLock::new(open_lock_file(&lock_path)?);
            let _guard = lock.write().map_err(|e| {
                BackendError::with_source(format!("cannot lock {}", lock_path.display()), e)
            })?;
            op(&path)
        })
        .await
        .map_err(|e| BackendError::with_source("table file task failed", e))?
    }

    /// Load, change and store the rows as one locked step.
    async fn modify<T, F>(&self, change: F) -> Result<T, BackendError>
    where
        F: FnOnce(&mut Rows) -> Result<T, BackendError> + Send + 'static,
        T: Send + 'static,
    {
        self.locked(move |path| {
            let mut rows = load(path)?;
            let out = change(&mut rows)?;
            store(path, &rows)?;
            Ok(out)
        })
        .await
    }
}

fn open_lock_file(lock_path: &Path) -> Result<File, BackendError> {
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path)
        .map_err(|e| BackendError::with_source(format!("cannot open {}", lock_path.display()), e))
}

fn load(path: &Path) -> Result<Rows, BackendError> {
    let bytes = std::fs::read(path).map_err(|e| {
        BackendError::with_source(format!("cannot read table file {}", path.display()), e)
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes.as_slice());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| {
            BackendError::with_source(format!("cannot parse table file {}", path.display()), e)
        })?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

fn store(path: &Path, rows: &[Vec<String>]) -> Result<(), BackendError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_writer(Vec::new());
    for row in rows {
        writer
            .write_record(row)
            .map_err(|e| BackendError::with_source("cannot encode table row", e))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| BackendError::new(format!("cannot encode table: {e}")))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        BackendError::with_source(format!("cannot create a temp file in {}", dir.display()), e)
    })?;
    tmp.write_all(&bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| {
            BackendError::with_source(format!("cannot write {}", tmp.path().display()), e)
        })?;
    tmp.persist(path).map_err(|e| {
        BackendError::with_source(format!("cannot replace table file {}", path.display()), e)
    })?;
    Ok(())
}

fn set_cell(rows: &mut Rows, row: usize, col: usize, value: String) -> Result<(), BackendError> {
    if row == 0 || col == 0 {
        return Err(BackendError::new(format!(
            "cell ({row}, {col}) is out of range: rows and columns start at 1"
        )));
    }
    if rows.len() < row {
        // an empty record would be written as a blank line and skipped on read
        rows.resize_with(row, || vec![String::new()]);
    }
    let cells = &mut rows[row - 1];
    if cells.len() < col {
        cells.resize(col, String::new());
    }
    cells[col - 1] = value;
    Ok(())
}

#[async_trait]
impl TableBackend for CsvFileTable {
    async fn read_table(&self) -> Result<Vec<Vec<String>>, BackendError> {
        self.locked(|path| load(path)).await
    }

    async fn write_cell(&self, row: usize, col: usize, value: &str) -> Result<(), BackendError> {
        let value = value.to_string();
        self.modify(move |rows| set_cell(rows, row, col, value)).await
    }

    async fn append_column(&self, name: &str) -> Result<usize, BackendError> {
        let name = name.to_string();
        self.modify(move |rows| {
            if rows.is_empty() {
                rows.push(Vec::new());
            }
            rows[0].push(name);
            Ok(rows[0].len())
        })
        .await
    }
}
