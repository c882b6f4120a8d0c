//! 联系人 / 罚单数据访问
//!
//! 引擎只消费一个窄接口 [`ContactStore`]（查询某联系人的待缴罚单数）；
//! [`SqliteStore`] 是随附的最小 SQLite 实现，另带 CLI 驱动所需的联系人列表查询
//! 与测试用的插入方法。完整的联系人 / 罚单 CRUD 不在本引擎范围内。

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::Connection;
use thiserror::Error;

use crate::core::batch::Recipient;

/// 存储层错误（resolver 统一映射为 `SendError::DataUnavailable`）
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store open failed: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),
}

/// 引擎消费的数据存储接口
#[async_trait]
pub trait ContactStore: Send + Sync {
    /// 某联系人当前待缴罚单数；无记录时为 0
    async fn pending_fines_count(&self, contact_id: &str) -> Result<u32, StoreError>;
}

/// 原始数据中用于表示「无邮箱 / 无电话」的哨兵值
const NOT_AVAILABLE: &str = "N/A";

fn normalize_field(value: Option<String>) -> Option<String> {
    match value {
        Some(s) if s.trim().is_empty() || s.trim() == NOT_AVAILABLE => None,
        other => other,
    }
}

/// SQLite 存储：`contactos` 与 `multas` 两张表
///
/// rusqlite 为同步库；查询都是带索引的点查，直接持锁执行。
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// 打开（必要时创建）数据库文件并确保表结构存在
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Open(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// 内存数据库（测试用）
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Open(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Query(format!("Store lock poisoned: {e}")))
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS contactos (
                cedula_rif TEXT PRIMARY KEY,
                nombre     TEXT NOT NULL,
                email      TEXT DEFAULT NULL UNIQUE,
                telefono   TEXT DEFAULT NULL UNIQUE,
                direccion  TEXT
            );
            CREATE TABLE IF NOT EXISTS multas (
                expediente_nro  TEXT PRIMARY KEY,
                cedula_rif      TEXT NOT NULL
                                REFERENCES contactos(cedula_rif) ON DELETE CASCADE,
                uc              INTEGER,
                bs              REAL DEFAULT 0.0,
                fecha_multa     TEXT,
                fecha_pago      TEXT DEFAULT NULL,
                multa_pendiente INTEGER DEFAULT 1
            );",
        )
        .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    /// 全部联系人，按姓名排序；`"N/A"` 与空串归一化为 `None`
    pub fn list_contacts(&self) -> Result<Vec<Recipient>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT cedula_rif, nombre, email, telefono FROM contactos ORDER BY nombre")
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Recipient {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    email: normalize_field(row.get(2)?),
                    phone: normalize_field(row.get(3)?),
                })
            })
            .map_err(|e| StoreError::Query(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Query(e.to_string()))
    }

    /// 插入联系人（种子数据 / 测试）
    pub fn insert_contact(
        &self,
        id: &str,
        name: &str,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO contactos (cedula_rif, nombre, email, telefono) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id, name, email, phone],
        )
        .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    /// 插入罚单记录（种子数据 / 测试）
    pub fn insert_fine(
        &self,
        expediente: &str,
        contact_id: &str,
        pending: bool,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO multas (expediente_nro, cedula_rif, multa_pendiente) VALUES (?1, ?2, ?3)",
            rusqlite::params![expediente, contact_id, pending as i64],
        )
        .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    fn count_pending(&self, contact_id: &str) -> Result<u32, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT COUNT(*) FROM multas WHERE cedula_rif = ?1 AND multa_pendiente = 1",
            [contact_id],
            |row| row.get::<_, u32>(0),
        )
        .map_err(|e| StoreError::Query(e.to_string()))
    }
}

#[async_trait]
impl ContactStore for SqliteStore {
    async fn pending_fines_count(&self, contact_id: &str) -> Result<u32, StoreError> {
        self.count_pending(contact_id)
    }
}
