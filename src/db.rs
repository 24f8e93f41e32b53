// 💾 SQLite Store - rusqlite adapter for the store ports
//
// Tables:
// - bins, subtypes, agencies
// - commerce_plans, plan_items, subtype_plan_links
// - validations, validation_maps
// - id_types (owner identification types)
// - events (audit trail)
//
// Natural keys and the derived effective key carry UNIQUE indexes, so a
// racing writer fails with the same *AlreadyExists error as the engine's
// pre-check. The plan validation-mode lock is a trigger.

use crate::audit::{Audit, Event};
use crate::engine::{CatalogEngine, EngineSettings};
use crate::entities::{
    Agency, Bin, CommercePlan, DataType, PlanItem, Subtype, SubtypePlanLink, Validation,
    ValidationMap, ValidationMode,
};
use crate::error::{CatalogError, CatalogResult};
use crate::status::Status;
use crate::store::{
    AgencyRepository, AuditTrail, BinRepository, CatalogStore, IdTypeCatalog, Page,
    PlanRepository, SubtypeRepository, ValidationRepository,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{ffi, params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use tracing::debug;

// ============================================================================
// SCHEMA
// ============================================================================

pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Catalog hierarchy: BIN → subtype → agency
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS bins (
            bin TEXT PRIMARY KEY,
            description TEXT,
            uses_extension TEXT NOT NULL CHECK (uses_extension IN ('Y', 'N')),
            extension_digits INTEGER,
            status TEXT NOT NULL CHECK (status IN ('A', 'I')),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            updated_by TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subtypes (
            subtype_code TEXT PRIMARY KEY,
            bin TEXT NOT NULL,
            name TEXT,
            extension TEXT,
            effective_key TEXT,
            owner_id_type TEXT,
            owner_id_number TEXT,
            status TEXT NOT NULL CHECK (status IN ('A', 'I')),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            updated_by TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS agencies (
            subtype_code TEXT NOT NULL,
            agency_code TEXT NOT NULL,
            name TEXT,
            status TEXT NOT NULL CHECK (status IN ('A', 'I')),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            updated_by TEXT NOT NULL,
            PRIMARY KEY (subtype_code, agency_code)
        )",
        [],
    )?;

    // ==========================================================================
    // Commerce plans
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS commerce_plans (
            plan_id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT UNIQUE NOT NULL,
            name TEXT,
            validation_mode TEXT NOT NULL CHECK (validation_mode IN ('UNIQUE', 'MCC', 'MERCHANT_ID')),
            status TEXT NOT NULL CHECK (status IN ('A', 'I')),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            updated_by TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS plan_items (
            plan_item_id INTEGER PRIMARY KEY AUTOINCREMENT,
            plan_id INTEGER NOT NULL,
            value TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('A', 'I')),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            updated_by TEXT NOT NULL,
            UNIQUE (plan_id, value)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subtype_plan_links (
            subtype_code TEXT PRIMARY KEY,
            plan_id INTEGER NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('A', 'I')),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            updated_by TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Validations and their per-subtype values
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS validations (
            validation_id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT UNIQUE NOT NULL,
            description TEXT,
            data_type TEXT NOT NULL CHECK (data_type IN ('BOOL', 'NUMBER', 'TEXT')),
            status TEXT NOT NULL CHECK (status IN ('A', 'I')),
            valid_from TEXT,
            valid_to TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            updated_by TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS validation_maps (
            subtype_code TEXT NOT NULL,
            bin TEXT NOT NULL,
            validation_id INTEGER NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('A', 'I')),
            value_flag TEXT CHECK (value_flag IN ('SI', 'NO')),
            value_num REAL,
            value_text TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            updated_by TEXT NOT NULL,
            PRIMARY KEY (subtype_code, bin, validation_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS id_types (
            code TEXT PRIMARY KEY,
            description TEXT
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_subtypes_extension ON subtypes(bin, extension)",
        [],
    )?;

    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_subtypes_effective_key ON subtypes(effective_key)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subtypes_bin ON subtypes(bin)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
        [],
    )?;

    // ==========================================================================
    // Plan validation-mode lock
    // ==========================================================================
    conn.execute_batch(
        "CREATE TRIGGER IF NOT EXISTS trg_plan_mode_lock
         BEFORE UPDATE OF validation_mode ON commerce_plans
         WHEN NEW.validation_mode <> OLD.validation_mode
          AND EXISTS (SELECT 1 FROM plan_items WHERE plan_id = OLD.plan_id)
         BEGIN
             SELECT RAISE(ABORT, 'validation mode is locked while the plan has items');
         END;",
    )?;

    debug!("catalog schema ready");
    Ok(())
}

/// Register an owner identification type (idempotent)
pub fn register_id_type(conn: &Connection, code: &str, description: Option<&str>) -> Result<()> {
    conn.execute(
        "INSERT INTO id_types (code, description) VALUES (?1, ?2)
         ON CONFLICT(code) DO UPDATE SET description = excluded.description",
        params![code, description],
    )?;
    Ok(())
}

// ============================================================================
// UNIT OF WORK
// ============================================================================

/// Run one engine call inside a transaction: commit on success, roll back
/// on failure.
pub fn in_transaction<T, F>(conn: &mut Connection, settings: EngineSettings, work: F) -> CatalogResult<T>
where
    F: FnOnce(&CatalogEngine<'_, SqliteStore<'_>>) -> CatalogResult<T>,
{
    let tx = conn.transaction()?;
    let result = {
        let store = SqliteStore::new(&tx);
        let engine = CatalogEngine::new(&store, settings);
        work(&engine)
    };

    match result {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(err) => {
            tx.rollback()?;
            debug!(error = %err, "unit of work rolled back");
            Err(err)
        }
    }
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

/// Translate constraint failures into the domain error the pre-check would
/// have raised. Trigger and CHECK aborts are invalid data.
fn map_constraint(err: rusqlite::Error, on_duplicate: impl FnOnce() -> CatalogError) -> CatalogError {
    let extended_code = match &err {
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::ConstraintViolation => {
            Some(failure.extended_code)
        }
        _ => None,
    };

    match extended_code {
        Some(ffi::SQLITE_CONSTRAINT_UNIQUE) | Some(ffi::SQLITE_CONSTRAINT_PRIMARYKEY) => on_duplicate(),
        Some(ffi::SQLITE_CONSTRAINT_TRIGGER) | Some(ffi::SQLITE_CONSTRAINT_CHECK) => {
            CatalogError::invalid(constraint_message(&err))
        }
        _ => CatalogError::from(err),
    }
}

fn constraint_message(err: &rusqlite::Error) -> String {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(message)) => message.clone(),
        other => other.to_string(),
    }
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

// ============================================================================
// ROW HELPERS
// ============================================================================

fn time_at(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn optional_time_at(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

fn status_at(row: &Row, idx: usize) -> rusqlite::Result<Status> {
    let raw: String = row.get(idx)?;
    Status::parse(&raw).map_err(|e| conversion_error(idx, e))
}

/// created_at, updated_at, updated_by starting at `idx`
fn audit_at(row: &Row, idx: usize) -> rusqlite::Result<Audit> {
    Ok(Audit {
        created_at: time_at(row, idx)?,
        updated_at: time_at(row, idx + 1)?,
        updated_by: row.get(idx + 2)?,
    })
}

fn status_filter(status: Option<Status>) -> Option<&'static str> {
    status.map(|s| s.as_str())
}

fn page_params(page: Page) -> (i64, i64) {
    (page.limit as i64, page.offset as i64)
}

fn count(n: i64) -> usize {
    usize::try_from(n).unwrap_or_default()
}

const BIN_COLUMNS: &str =
    "bin, description, uses_extension, extension_digits, status, created_at, updated_at, updated_by";

fn bin_from_row(row: &Row) -> rusqlite::Result<Bin> {
    let uses_extension: String = row.get(2)?;
    Ok(Bin {
        bin: row.get(0)?,
        description: row.get(1)?,
        uses_extension: uses_extension == "Y",
        extension_digits: row.get(3)?,
        status: status_at(row, 4)?,
        audit: audit_at(row, 5)?,
    })
}

const SUBTYPE_COLUMNS: &str = "bin, subtype_code, name, extension, effective_key, owner_id_type, \
     owner_id_number, status, created_at, updated_at, updated_by";

fn subtype_from_row(row: &Row) -> rusqlite::Result<Subtype> {
    Ok(Subtype {
        bin: row.get(0)?,
        subtype_code: row.get(1)?,
        name: row.get(2)?,
        extension: row.get(3)?,
        effective_key: row.get(4)?,
        owner_id_type: row.get(5)?,
        owner_id_number: row.get(6)?,
        status: status_at(row, 7)?,
        audit: audit_at(row, 8)?,
    })
}

const AGENCY_COLUMNS: &str =
    "subtype_code, agency_code, name, status, created_at, updated_at, updated_by";

fn agency_from_row(row: &Row) -> rusqlite::Result<Agency> {
    Ok(Agency {
        subtype_code: row.get(0)?,
        agency_code: row.get(1)?,
        name: row.get(2)?,
        status: status_at(row, 3)?,
        audit: audit_at(row, 4)?,
    })
}

const PLAN_COLUMNS: &str =
    "plan_id, code, name, validation_mode, status, created_at, updated_at, updated_by";

fn plan_from_row(row: &Row) -> rusqlite::Result<CommercePlan> {
    let mode: String = row.get(3)?;
    Ok(CommercePlan {
        plan_id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        validation_mode: ValidationMode::parse(&mode).map_err(|e| conversion_error(3, e))?,
        status: status_at(row, 4)?,
        audit: audit_at(row, 5)?,
    })
}

const ITEM_COLUMNS: &str =
    "plan_item_id, plan_id, value, status, created_at, updated_at, updated_by";

fn item_from_row(row: &Row) -> rusqlite::Result<PlanItem> {
    Ok(PlanItem {
        plan_item_id: row.get(0)?,
        plan_id: row.get(1)?,
        value: row.get(2)?,
        status: status_at(row, 3)?,
        audit: audit_at(row, 4)?,
    })
}

const LINK_COLUMNS: &str = "subtype_code, plan_id, status, created_at, updated_at, updated_by";

fn link_from_row(row: &Row) -> rusqlite::Result<SubtypePlanLink> {
    Ok(SubtypePlanLink {
        subtype_code: row.get(0)?,
        plan_id: row.get(1)?,
        status: status_at(row, 2)?,
        audit: audit_at(row, 3)?,
    })
}

const VALIDATION_COLUMNS: &str = "validation_id, code, description, data_type, status, \
     valid_from, valid_to, created_at, updated_at, updated_by";

fn validation_from_row(row: &Row) -> rusqlite::Result<Validation> {
    let data_type: String = row.get(3)?;
    Ok(Validation {
        validation_id: row.get(0)?,
        code: row.get(1)?,
        description: row.get(2)?,
        data_type: DataType::parse(&data_type).map_err(|e| conversion_error(3, e))?,
        status: status_at(row, 4)?,
        valid_from: optional_time_at(row, 5)?,
        valid_to: optional_time_at(row, 6)?,
        audit: audit_at(row, 7)?,
    })
}

const MAP_COLUMNS: &str = "subtype_code, bin, validation_id, status, value_flag, value_num, \
     value_text, created_at, updated_at, updated_by";

fn map_from_row(row: &Row) -> rusqlite::Result<ValidationMap> {
    Ok(ValidationMap {
        subtype_code: row.get(0)?,
        bin: row.get(1)?,
        validation_id: row.get(2)?,
        status: status_at(row, 3)?,
        value_flag: row.get(4)?,
        value_num: row.get(5)?,
        value_text: row.get(6)?,
        audit: audit_at(row, 7)?,
    })
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// Store ports over one connection (or one open transaction)
pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        SqliteStore { conn }
    }

    /// Audit trail of one entity, newest first
    pub fn events_for_entity(&self, entity_type: &str, entity_id: &str) -> CatalogResult<Vec<Event>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
             FROM events
             WHERE entity_type = ?1 AND entity_id = ?2
             ORDER BY id DESC",
        )?;

        let events = stmt
            .query_map(params![entity_type, entity_id], |row| {
                let data_json: String = row.get(5)?;
                Ok(Event {
                    event_id: row.get(0)?,
                    timestamp: time_at(row, 1)?,
                    event_type: row.get(2)?,
                    entity_type: row.get(3)?,
                    entity_id: row.get(4)?,
                    data: serde_json::from_str(&data_json).map_err(|e| conversion_error(5, e))?,
                    actor: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(events)
    }

    fn validation_code(&self, validation_id: i64) -> CatalogResult<String> {
        let code: Option<String> = self
            .conn
            .query_row(
                "SELECT code FROM validations WHERE validation_id = ?1",
                params![validation_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(code.unwrap_or_else(|| validation_id.to_string()))
    }
}

impl<'c> BinRepository for SqliteStore<'c> {
    fn find_bin(&self, bin: &str) -> CatalogResult<Option<Bin>> {
        let sql = format!("SELECT {} FROM bins WHERE bin = ?1", BIN_COLUMNS);
        Ok(self.conn.query_row(&sql, params![bin], bin_from_row).optional()?)
    }

    fn bin_exists(&self, bin: &str) -> CatalogResult<bool> {
        let found: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM bins WHERE bin = ?1",
            params![bin],
            |row| row.get(0),
        )?;
        Ok(found > 0)
    }

    fn insert_bin(&self, bin: &Bin) -> CatalogResult<()> {
        self.conn
            .execute(
                "INSERT INTO bins (
                    bin, description, uses_extension, extension_digits, status,
                    created_at, updated_at, updated_by
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    bin.bin,
                    bin.description,
                    if bin.uses_extension { "Y" } else { "N" },
                    bin.extension_digits,
                    bin.status.as_str(),
                    bin.audit.created_at.to_rfc3339(),
                    bin.audit.updated_at.to_rfc3339(),
                    bin.audit.updated_by,
                ],
            )
            .map_err(|e| map_constraint(e, || CatalogError::BinAlreadyExists(bin.bin.clone())))?;
        Ok(())
    }

    fn update_bin(&self, bin: &Bin) -> CatalogResult<()> {
        self.conn
            .execute(
                "INSERT INTO bins (
                    bin, description, uses_extension, extension_digits, status,
                    created_at, updated_at, updated_by
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(bin) DO UPDATE SET
                    description = excluded.description,
                    uses_extension = excluded.uses_extension,
                    extension_digits = excluded.extension_digits,
                    status = excluded.status,
                    updated_at = excluded.updated_at,
                    updated_by = excluded.updated_by",
                params![
                    bin.bin,
                    bin.description,
                    if bin.uses_extension { "Y" } else { "N" },
                    bin.extension_digits,
                    bin.status.as_str(),
                    bin.audit.created_at.to_rfc3339(),
                    bin.audit.updated_at.to_rfc3339(),
                    bin.audit.updated_by,
                ],
            )
            .map_err(|e| map_constraint(e, || CatalogError::BinAlreadyExists(bin.bin.clone())))?;
        Ok(())
    }

    fn list_bins(&self, status: Option<Status>, page: Page) -> CatalogResult<Vec<Bin>> {
        let (limit, offset) = page_params(page);
        let sql = format!(
            "SELECT {} FROM bins
             WHERE (?1 IS NULL OR status = ?1)
             ORDER BY bin LIMIT ?2 OFFSET ?3",
            BIN_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let bins = stmt
            .query_map(params![status_filter(status), limit, offset], bin_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(bins)
    }
}

impl<'c> SqliteStore<'c> {
    fn find_subtype_where(&self, clause: &str, args: &[&dyn rusqlite::ToSql]) -> CatalogResult<Option<Subtype>> {
        let sql = format!("SELECT {} FROM subtypes WHERE {}", SUBTYPE_COLUMNS, clause);
        Ok(self.conn.query_row(&sql, args, subtype_from_row).optional()?)
    }

    fn write_subtype(&self, sql: &str, subtype: &Subtype) -> CatalogResult<()> {
        self.conn
            .execute(
                sql,
                params![
                    subtype.bin,
                    subtype.subtype_code,
                    subtype.name,
                    subtype.extension,
                    subtype.effective_key,
                    subtype.owner_id_type,
                    subtype.owner_id_number,
                    subtype.status.as_str(),
                    subtype.audit.created_at.to_rfc3339(),
                    subtype.audit.updated_at.to_rfc3339(),
                    subtype.audit.updated_by,
                ],
            )
            .map_err(|e| {
                map_constraint(e, || {
                    CatalogError::SubtypeAlreadyExists(format!(
                        "{} (BIN {}, effective key {})",
                        subtype.subtype_code,
                        subtype.bin,
                        subtype.effective_key.as_deref().unwrap_or("-")
                    ))
                })
            })?;
        Ok(())
    }
}

const SUBTYPE_INSERT: &str = "INSERT INTO subtypes (
        bin, subtype_code, name, extension, effective_key, owner_id_type,
        owner_id_number, status, created_at, updated_at, updated_by
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)";

impl<'c> SubtypeRepository for SqliteStore<'c> {
    fn find_subtype(&self, subtype_code: &str) -> CatalogResult<Option<Subtype>> {
        self.find_subtype_where("subtype_code = ?1", params![subtype_code])
    }

    fn find_subtype_by_key(&self, bin: &str, subtype_code: &str) -> CatalogResult<Option<Subtype>> {
        self.find_subtype_where("bin = ?1 AND subtype_code = ?2", params![bin, subtype_code])
    }

    fn find_subtype_by_extension(&self, bin: &str, extension: &str) -> CatalogResult<Option<Subtype>> {
        self.find_subtype_where("bin = ?1 AND extension = ?2", params![bin, extension])
    }

    fn find_subtype_by_effective_key(&self, effective_key: &str) -> CatalogResult<Option<Subtype>> {
        self.find_subtype_where("effective_key = ?1", params![effective_key])
    }

    fn count_subtypes_for_bin(&self, bin: &str) -> CatalogResult<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM subtypes WHERE bin = ?1",
            params![bin],
            |row| row.get(0),
        )?;
        Ok(count(n))
    }

    fn insert_subtype(&self, subtype: &Subtype) -> CatalogResult<()> {
        self.write_subtype(SUBTYPE_INSERT, subtype)
    }

    fn update_subtype(&self, subtype: &Subtype) -> CatalogResult<()> {
        let sql = format!(
            "{} ON CONFLICT(subtype_code) DO UPDATE SET
                name = excluded.name,
                extension = excluded.extension,
                effective_key = excluded.effective_key,
                owner_id_type = excluded.owner_id_type,
                owner_id_number = excluded.owner_id_number,
                status = excluded.status,
                updated_at = excluded.updated_at,
                updated_by = excluded.updated_by",
            SUBTYPE_INSERT
        );
        self.write_subtype(&sql, subtype)
    }

    fn list_subtypes(
        &self,
        bin: Option<&str>,
        status: Option<Status>,
        page: Page,
    ) -> CatalogResult<Vec<Subtype>> {
        let (limit, offset) = page_params(page);
        let sql = format!(
            "SELECT {} FROM subtypes
             WHERE (?1 IS NULL OR bin = ?1) AND (?2 IS NULL OR status = ?2)
             ORDER BY bin, subtype_code LIMIT ?3 OFFSET ?4",
            SUBTYPE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let subtypes = stmt
            .query_map(
                params![bin, status_filter(status), limit, offset],
                subtype_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(subtypes)
    }
}

const AGENCY_INSERT: &str = "INSERT INTO agencies (
        subtype_code, agency_code, name, status, created_at, updated_at, updated_by
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

impl<'c> SqliteStore<'c> {
    fn write_agency(&self, sql: &str, agency: &Agency) -> CatalogResult<()> {
        self.conn
            .execute(
                sql,
                params![
                    agency.subtype_code,
                    agency.agency_code,
                    agency.name,
                    agency.status.as_str(),
                    agency.audit.created_at.to_rfc3339(),
                    agency.audit.updated_at.to_rfc3339(),
                    agency.audit.updated_by,
                ],
            )
            .map_err(|e| {
                map_constraint(e, || CatalogError::AgencyAlreadyExists {
                    subtype_code: agency.subtype_code.clone(),
                    agency_code: agency.agency_code.clone(),
                })
            })?;
        Ok(())
    }
}

impl<'c> AgencyRepository for SqliteStore<'c> {
    fn find_agency(&self, subtype_code: &str, agency_code: &str) -> CatalogResult<Option<Agency>> {
        let sql = format!(
            "SELECT {} FROM agencies WHERE subtype_code = ?1 AND agency_code = ?2",
            AGENCY_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![subtype_code, agency_code], agency_from_row)
            .optional()?)
    }

    fn count_active_agencies(&self, subtype_code: &str, excluding: Option<&str>) -> CatalogResult<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM agencies
             WHERE subtype_code = ?1 AND status = 'A'
               AND (?2 IS NULL OR agency_code <> ?2)",
            params![subtype_code, excluding],
            |row| row.get(0),
        )?;
        Ok(count(n))
    }

    fn insert_agency(&self, agency: &Agency) -> CatalogResult<()> {
        self.write_agency(AGENCY_INSERT, agency)
    }

    fn update_agency(&self, agency: &Agency) -> CatalogResult<()> {
        let sql = format!(
            "{} ON CONFLICT(subtype_code, agency_code) DO UPDATE SET
                name = excluded.name,
                status = excluded.status,
                updated_at = excluded.updated_at,
                updated_by = excluded.updated_by",
            AGENCY_INSERT
        );
        self.write_agency(&sql, agency)
    }

    fn list_agencies(
        &self,
        subtype_code: &str,
        status: Option<Status>,
        page: Page,
    ) -> CatalogResult<Vec<Agency>> {
        let (limit, offset) = page_params(page);
        let sql = format!(
            "SELECT {} FROM agencies
             WHERE subtype_code = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY agency_code LIMIT ?3 OFFSET ?4",
            AGENCY_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let agencies = stmt
            .query_map(
                params![subtype_code, status_filter(status), limit, offset],
                agency_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(agencies)
    }
}

impl<'c> PlanRepository for SqliteStore<'c> {
    fn find_plan(&self, plan_id: i64) -> CatalogResult<Option<CommercePlan>> {
        let sql = format!("SELECT {} FROM commerce_plans WHERE plan_id = ?1", PLAN_COLUMNS);
        Ok(self.conn.query_row(&sql, params![plan_id], plan_from_row).optional()?)
    }

    fn find_plan_by_code(&self, code: &str) -> CatalogResult<Option<CommercePlan>> {
        let sql = format!("SELECT {} FROM commerce_plans WHERE code = ?1", PLAN_COLUMNS);
        Ok(self.conn.query_row(&sql, params![code], plan_from_row).optional()?)
    }

    fn insert_plan(&self, plan: &CommercePlan) -> CatalogResult<i64> {
        self.conn
            .execute(
                "INSERT INTO commerce_plans (
                    code, name, validation_mode, status, created_at, updated_at, updated_by
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    plan.code,
                    plan.name,
                    plan.validation_mode.as_str(),
                    plan.status.as_str(),
                    plan.audit.created_at.to_rfc3339(),
                    plan.audit.updated_at.to_rfc3339(),
                    plan.audit.updated_by,
                ],
            )
            .map_err(|e| map_constraint(e, || CatalogError::PlanAlreadyExists(plan.code.clone())))?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_plan(&self, plan: &CommercePlan) -> CatalogResult<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE commerce_plans SET
                    name = ?2, validation_mode = ?3, status = ?4, updated_at = ?5, updated_by = ?6
                 WHERE plan_id = ?1",
                params![
                    plan.plan_id,
                    plan.name,
                    plan.validation_mode.as_str(),
                    plan.status.as_str(),
                    plan.audit.updated_at.to_rfc3339(),
                    plan.audit.updated_by,
                ],
            )
            .map_err(|e| map_constraint(e, || CatalogError::PlanAlreadyExists(plan.code.clone())))?;
        if changed == 0 {
            return Err(CatalogError::PlanNotFound(plan.code.clone()));
        }
        Ok(())
    }

    fn list_plans(&self, status: Option<Status>, page: Page) -> CatalogResult<Vec<CommercePlan>> {
        let (limit, offset) = page_params(page);
        let sql = format!(
            "SELECT {} FROM commerce_plans
             WHERE (?1 IS NULL OR status = ?1)
             ORDER BY code LIMIT ?2 OFFSET ?3",
            PLAN_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let plans = stmt
            .query_map(params![status_filter(status), limit, offset], plan_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(plans)
    }

    fn find_plan_item(&self, plan_item_id: i64) -> CatalogResult<Option<PlanItem>> {
        let sql = format!("SELECT {} FROM plan_items WHERE plan_item_id = ?1", ITEM_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![plan_item_id], item_from_row)
            .optional()?)
    }

    fn plan_item_values(&self, plan_id: i64) -> CatalogResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM plan_items WHERE plan_id = ?1")?;
        let values = stmt
            .query_map(params![plan_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(values)
    }

    fn count_plan_items(&self, plan_id: i64, status: Option<Status>) -> CatalogResult<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM plan_items WHERE plan_id = ?1 AND (?2 IS NULL OR status = ?2)",
            params![plan_id, status_filter(status)],
            |row| row.get(0),
        )?;
        Ok(count(n))
    }

    fn insert_plan_item(&self, item: &PlanItem) -> CatalogResult<i64> {
        self.conn
            .execute(
                "INSERT INTO plan_items (
                    plan_id, value, status, created_at, updated_at, updated_by
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    item.plan_id,
                    item.value,
                    item.status.as_str(),
                    item.audit.created_at.to_rfc3339(),
                    item.audit.updated_at.to_rfc3339(),
                    item.audit.updated_by,
                ],
            )
            .map_err(|e| {
                map_constraint(e, || {
                    CatalogError::invalid(format!("item {} already exists in plan", item.value))
                })
            })?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_plan_item(&self, item: &PlanItem) -> CatalogResult<()> {
        let changed = self.conn.execute(
            "UPDATE plan_items SET status = ?2, updated_at = ?3, updated_by = ?4
             WHERE plan_item_id = ?1",
            params![
                item.plan_item_id,
                item.status.as_str(),
                item.audit.updated_at.to_rfc3339(),
                item.audit.updated_by,
            ],
        )?;
        if changed == 0 {
            return Err(CatalogError::PlanItemNotFound(item.plan_item_id));
        }
        Ok(())
    }

    fn list_plan_items(
        &self,
        plan_id: i64,
        status: Option<Status>,
        page: Page,
    ) -> CatalogResult<Vec<PlanItem>> {
        let (limit, offset) = page_params(page);
        let sql = format!(
            "SELECT {} FROM plan_items
             WHERE plan_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY value LIMIT ?3 OFFSET ?4",
            ITEM_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let items = stmt
            .query_map(
                params![plan_id, status_filter(status), limit, offset],
                item_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    fn find_plan_link(&self, subtype_code: &str) -> CatalogResult<Option<SubtypePlanLink>> {
        let sql = format!(
            "SELECT {} FROM subtype_plan_links WHERE subtype_code = ?1",
            LINK_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![subtype_code], link_from_row)
            .optional()?)
    }

    fn save_plan_link(&self, link: &SubtypePlanLink) -> CatalogResult<()> {
        self.conn.execute(
            "INSERT INTO subtype_plan_links (
                subtype_code, plan_id, status, created_at, updated_at, updated_by
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(subtype_code) DO UPDATE SET
                plan_id = excluded.plan_id,
                status = excluded.status,
                updated_at = excluded.updated_at,
                updated_by = excluded.updated_by",
            params![
                link.subtype_code,
                link.plan_id,
                link.status.as_str(),
                link.audit.created_at.to_rfc3339(),
                link.audit.updated_at.to_rfc3339(),
                link.audit.updated_by,
            ],
        )?;
        Ok(())
    }
}

const MAP_INSERT: &str = "INSERT INTO validation_maps (
        subtype_code, bin, validation_id, status, value_flag, value_num, value_text,
        created_at, updated_at, updated_by
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)";

impl<'c> SqliteStore<'c> {
    fn write_map(&self, sql: &str, map: &ValidationMap) -> CatalogResult<()> {
        let result = self.conn.execute(
            sql,
            params![
                map.subtype_code,
                map.bin,
                map.validation_id,
                map.status.as_str(),
                map.value_flag,
                map.value_num,
                map.value_text,
                map.audit.created_at.to_rfc3339(),
                map.audit.updated_at.to_rfc3339(),
                map.audit.updated_by,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let validation_code = self.validation_code(map.validation_id)?;
                Err(map_constraint(err, || CatalogError::AlreadyExists {
                    subtype_code: map.subtype_code.clone(),
                    bin: map.bin.clone(),
                    validation_code,
                }))
            }
        }
    }
}

impl<'c> ValidationRepository for SqliteStore<'c> {
    fn find_validation_by_code(&self, code: &str) -> CatalogResult<Option<Validation>> {
        let sql = format!("SELECT {} FROM validations WHERE code = ?1", VALIDATION_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![code], validation_from_row)
            .optional()?)
    }

    fn insert_validation(&self, validation: &Validation) -> CatalogResult<i64> {
        self.conn
            .execute(
                "INSERT INTO validations (
                    code, description, data_type, status, valid_from, valid_to,
                    created_at, updated_at, updated_by
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    validation.code,
                    validation.description,
                    validation.data_type.as_str(),
                    validation.status.as_str(),
                    validation.valid_from.map(|dt| dt.to_rfc3339()),
                    validation.valid_to.map(|dt| dt.to_rfc3339()),
                    validation.audit.created_at.to_rfc3339(),
                    validation.audit.updated_at.to_rfc3339(),
                    validation.audit.updated_by,
                ],
            )
            .map_err(|e| {
                map_constraint(e, || {
                    CatalogError::ValidationAlreadyExists(validation.code.clone())
                })
            })?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_validation(&self, validation: &Validation) -> CatalogResult<()> {
        let changed = self.conn.execute(
            "UPDATE validations SET
                description = ?2, data_type = ?3, status = ?4, valid_from = ?5, valid_to = ?6,
                updated_at = ?7, updated_by = ?8
             WHERE validation_id = ?1",
            params![
                validation.validation_id,
                validation.description,
                validation.data_type.as_str(),
                validation.status.as_str(),
                validation.valid_from.map(|dt| dt.to_rfc3339()),
                validation.valid_to.map(|dt| dt.to_rfc3339()),
                validation.audit.updated_at.to_rfc3339(),
                validation.audit.updated_by,
            ],
        )?;
        if changed == 0 {
            return Err(CatalogError::ValidationNotFound(validation.code.clone()));
        }
        Ok(())
    }

    fn list_validations(&self, status: Option<Status>, page: Page) -> CatalogResult<Vec<Validation>> {
        let (limit, offset) = page_params(page);
        let sql = format!(
            "SELECT {} FROM validations
             WHERE (?1 IS NULL OR status = ?1)
             ORDER BY code LIMIT ?2 OFFSET ?3",
            VALIDATION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let validations = stmt
            .query_map(params![status_filter(status), limit, offset], validation_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(validations)
    }

    fn find_validation_map(
        &self,
        subtype_code: &str,
        bin: &str,
        validation_id: i64,
    ) -> CatalogResult<Option<ValidationMap>> {
        let sql = format!(
            "SELECT {} FROM validation_maps
             WHERE subtype_code = ?1 AND bin = ?2 AND validation_id = ?3",
            MAP_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![subtype_code, bin, validation_id], map_from_row)
            .optional()?)
    }

    fn insert_validation_map(&self, map: &ValidationMap) -> CatalogResult<()> {
        self.write_map(MAP_INSERT, map)
    }

    fn update_validation_map(&self, map: &ValidationMap) -> CatalogResult<()> {
        let sql = format!(
            "{} ON CONFLICT(subtype_code, bin, validation_id) DO UPDATE SET
                status = excluded.status,
                value_flag = excluded.value_flag,
                value_num = excluded.value_num,
                value_text = excluded.value_text,
                updated_at = excluded.updated_at,
                updated_by = excluded.updated_by",
            MAP_INSERT
        );
        self.write_map(&sql, map)
    }

    fn rekey_validation_maps(
        &self,
        subtype_code: &str,
        from_bin: &str,
        to_bin: &str,
    ) -> CatalogResult<usize> {
        self.conn
            .execute(
                "UPDATE validation_maps SET bin = ?3 WHERE subtype_code = ?1 AND bin = ?2",
                params![subtype_code, from_bin, to_bin],
            )
            .map_err(|e| {
                map_constraint(e, || {
                    CatalogError::invalid(format!(
                        "validation maps of subtype {} already exist under {}",
                        subtype_code, to_bin
                    ))
                })
            })
    }

    fn list_validation_maps(
        &self,
        subtype_code: &str,
        bin: Option<&str>,
        page: Page,
    ) -> CatalogResult<Vec<ValidationMap>> {
        let (limit, offset) = page_params(page);
        let sql = format!(
            "SELECT {} FROM validation_maps
             WHERE subtype_code = ?1 AND (?2 IS NULL OR bin = ?2)
             ORDER BY bin, validation_id LIMIT ?3 OFFSET ?4",
            MAP_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let maps = stmt
            .query_map(params![subtype_code, bin, limit, offset], map_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(maps)
    }
}

impl<'c> IdTypeCatalog for SqliteStore<'c> {
    fn id_type_codes(&self) -> CatalogResult<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT code FROM id_types ORDER BY code")?;
        let codes = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(codes)
    }
}

impl<'c> AuditTrail for SqliteStore<'c> {
    fn record_event(&self, event: &Event) -> CatalogResult<()> {
        let data_json = serde_json::to_string(&event.data)?;

        self.conn.execute(
            "INSERT INTO events (
                event_id, timestamp, event_type, entity_type, entity_id, data, actor
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.event_id,
                event.timestamp.to_rfc3339(),
                event.event_type,
                event.entity_type,
                event.entity_id,
                data_json,
                event.actor,
            ],
        )?;

        Ok(())
    }
}

impl<'c> CatalogStore for SqliteStore<'c> {
    type Bins = Self;
    type Subtypes = Self;
    type Agencies = Self;
    type Plans = Self;
    type Validations = Self;

    fn bins(&self) -> &Self {
        self
    }

    fn subtypes(&self) -> &Self {
        self
    }

    fn agencies(&self) -> &Self {
        self
    }

    fn plans(&self) -> &Self {
        self
    }

    fn validations(&self) -> &Self {
        self
    }

    fn id_types(&self) -> &dyn IdTypeCatalog {
        self
    }

    fn audit_trail(&self) -> &dyn AuditTrail {
        self
    }
}

/// Row count per catalog table
pub fn table_counts(conn: &Connection) -> Result<Vec<(&'static str, i64)>> {
    let tables = [
        "bins",
        "subtypes",
        "agencies",
        "commerce_plans",
        "plan_items",
        "validations",
        "validation_maps",
        "events",
    ];

    let mut counts = Vec::with_capacity(tables.len());
    for table in tables {
        let n: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
            .with_context(|| format!("Failed to count {}", table))?;
        counts.push((table, n));
    }
    debug!(tables = counts.len(), "table counts collected");
    Ok(counts)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{NewAgency, NewBin, NewPlan, NewSubtype, PlanChanges, SubtypeChanges};
    use crate::error::ErrorKind;
    use serde_json::json;

    const ACTOR: &str = "tester";

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        register_id_type(&conn, "CC", Some("Cedula de ciudadania")).unwrap();
        register_id_type(&conn, "NIT", None).unwrap();
        conn
    }

    fn new_bin(bin: &str, uses_extension: &str, digits: Option<i64>) -> NewBin {
        NewBin {
            bin: bin.to_string(),
            uses_extension: uses_extension.to_string(),
            extension_digits: digits,
            description: None,
        }
    }

    fn new_subtype(bin: &str, code: &str, extension: Option<&str>) -> NewSubtype {
        NewSubtype {
            bin: bin.to_string(),
            subtype_code: code.to_string(),
            extension: extension.map(str::to_string),
            ..NewSubtype::default()
        }
    }

    fn seed(conn: &mut Connection) {
        in_transaction(conn, EngineSettings::default(), |engine| {
            engine.create_bin(&new_bin("123456", "Y", Some(3)), ACTOR)?;
            engine.create_subtype(&new_subtype("123456", "ABC", Some("7")), ACTOR)?;
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_setup_is_idempotent() {
        let conn = test_db();
        setup_database(&conn).unwrap();
        register_id_type(&conn, "CC", None).unwrap();

        let store = SqliteStore::new(&conn);
        assert_eq!(store.id_type_codes().unwrap(), vec!["CC", "NIT"]);
    }

    #[test]
    fn test_bin_round_trip_through_engine() {
        let mut conn = test_db();
        seed(&mut conn);

        let store = SqliteStore::new(&conn);
        let bin = store.find_bin("123456").unwrap().unwrap();
        assert!(bin.uses_extension);
        assert_eq!(bin.extension_digits, Some(3));
        assert_eq!(bin.status, Status::Active);

        let subtype = store.find_subtype("ABC").unwrap().unwrap();
        assert_eq!(subtype.effective_key.as_deref(), Some("123456007"));
        assert_eq!(subtype.status, Status::Inactive);
        assert!(store.find_subtype_by_effective_key("123456007").unwrap().is_some());
    }

    #[test]
    fn test_failed_unit_of_work_rolls_back() {
        let mut conn = test_db();

        let err = in_transaction(&mut conn, EngineSettings::default(), |engine| {
            engine.create_bin(&new_bin("654321", "N", None), ACTOR)?;
            engine.create_subtype(&new_subtype("999999", "XYZ", None), ACTOR)
        })
        .unwrap_err();
        assert_eq!(err, CatalogError::BinNotFound("999999".into()));

        let store = SqliteStore::new(&conn);
        assert!(store.find_bin("654321").unwrap().is_none());
        assert!(store.events_for_entity("bin", "654321").unwrap().is_empty());
    }

    #[test]
    fn test_unique_indexes_map_to_already_exists() {
        let mut conn = test_db();
        seed(&mut conn);
        let store = SqliteStore::new(&conn);

        // bypass the engine pre-checks: the index alone must refuse these
        let dup_bin = store.find_bin("123456").unwrap().unwrap();
        assert_eq!(
            store.insert_bin(&dup_bin).unwrap_err(),
            CatalogError::BinAlreadyExists("123456".into())
        );

        let mut racer = store.find_subtype("ABC").unwrap().unwrap();
        racer.subtype_code = "DEF".into();
        let err = store.insert_subtype(&racer).unwrap_err();
        assert!(matches!(err, CatalogError::SubtypeAlreadyExists(_)));
    }

    #[test]
    fn test_extensionless_subtypes_share_null_extension() {
        let mut conn = test_db();
        in_transaction(&mut conn, EngineSettings::default(), |engine| {
            engine.create_bin(&new_bin("654321", "N", None), ACTOR)?;
            engine.create_subtype(&new_subtype("654321", "P1", None), ACTOR)?;
            engine.create_subtype(&new_subtype("654321", "P2", None), ACTOR)
        })
        .unwrap();

        let store = SqliteStore::new(&conn);
        assert_eq!(store.count_subtypes_for_bin("654321").unwrap(), 2);
    }

    #[test]
    fn test_scenario_activation_requires_agency() {
        let mut conn = test_db();
        seed(&mut conn);
        let settings = EngineSettings::default();

        let err = in_transaction(&mut conn, settings, |engine| {
            engine.change_subtype_status("ABC", "A", ACTOR)
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConflictRule);

        let subtype = in_transaction(&mut conn, settings, |engine| {
            let agency = NewAgency {
                subtype_code: "ABC".into(),
                agency_code: "01".into(),
                name: None,
            };
            engine.create_agency(&agency, ACTOR)?;
            engine.change_subtype_status("ABC", "A", ACTOR)
        })
        .unwrap();
        assert_eq!(subtype.status, Status::Active);
    }

    #[test]
    fn test_mode_lock_trigger() {
        let mut conn = test_db();
        let settings = EngineSettings::default();
        in_transaction(&mut conn, settings, |engine| {
            let plan = NewPlan {
                code: "FUEL".into(),
                name: None,
                validation_mode: "MCC".into(),
            };
            engine.create_plan(&plan, ACTOR)?;
            engine.add_plan_item("FUEL", "5541", ACTOR)
        })
        .unwrap();

        let err = in_transaction(&mut conn, settings, |engine| {
            let changes = PlanChanges {
                name: None,
                validation_mode: "MERCHANT_ID".into(),
            };
            engine.update_plan("FUEL", &changes, ACTOR)
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
        assert!(err.to_string().contains("locked"));

        let store = SqliteStore::new(&conn);
        let plan = store.find_plan_by_code("FUEL").unwrap().unwrap();
        assert_eq!(plan.validation_mode, ValidationMode::Mcc);
    }

    #[test]
    fn test_plan_item_unique_is_invalid_data() {
        let mut conn = test_db();
        in_transaction(&mut conn, EngineSettings::default(), |engine| {
            let plan = NewPlan {
                code: "FUEL".into(),
                name: None,
                validation_mode: "MCC".into(),
            };
            engine.create_plan(&plan, ACTOR).map(|_| ())
        })
        .unwrap();

        let store = SqliteStore::new(&conn);
        let plan = store.find_plan_by_code("FUEL").unwrap().unwrap();
        store
            .insert_plan_item(&PlanItem::new(plan.plan_id, "5541".into(), ACTOR))
            .unwrap();
        let err = store
            .insert_plan_item(&PlanItem::new(plan.plan_id, "5541".into(), ACTOR))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn test_scenario_bulk_add_and_assignment() {
        let mut conn = test_db();
        seed(&mut conn);
        let settings = EngineSettings::default();

        let summary = in_transaction(&mut conn, settings, |engine| {
            let plan = NewPlan {
                code: "FUEL".into(),
                name: None,
                validation_mode: "MCC".into(),
            };
            engine.create_plan(&plan, ACTOR)?;
            let values: Vec<String> = ["1234", "12", "", "1234"].iter().map(|v| v.to_string()).collect();
            engine.bulk_add_plan_items("FUEL", &values, ACTOR)
        })
        .unwrap();
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.invalid, 2);

        let link = in_transaction(&mut conn, settings, |engine| {
            engine.assign_plan("ABC", "FUEL", ACTOR)
        })
        .unwrap();
        assert_eq!(link.status, Status::Active);

        let plan = in_transaction(&mut conn, settings, |engine| engine.get_subtype_plan("ABC")).unwrap();
        assert_eq!(plan.unwrap().code, "FUEL");
    }

    #[test]
    fn test_rule_attach_and_duplicate() {
        let mut conn = test_db();
        seed(&mut conn);
        let settings = EngineSettings::default();

        let map = in_transaction(&mut conn, settings, |engine| {
            let validation = crate::commands::NewValidation {
                code: "CONTACTLESS".into(),
                data_type: "BOOL".into(),
                ..Default::default()
            };
            engine.create_validation(&validation, ACTOR)?;
            engine.attach_rule("ABC", "123456007", "CONTACTLESS", &json!("si"), ACTOR)
        })
        .unwrap();
        assert_eq!(map.value_flag.as_deref(), Some("SI"));

        let store = SqliteStore::new(&conn);
        let err = store.insert_validation_map(&map).unwrap_err();
        assert_eq!(
            err,
            CatalogError::AlreadyExists {
                subtype_code: "ABC".into(),
                bin: "123456007".into(),
                validation_code: "CONTACTLESS".into(),
            }
        );

        let stored = store
            .list_validation_maps("ABC", None, Page::default())
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].value_num, None);
    }

    #[test]
    fn test_key_change_moves_rule_maps() {
        let mut conn = test_db();
        seed(&mut conn);

        in_transaction(&mut conn, EngineSettings::default(), |engine| {
            let validation = crate::commands::NewValidation {
                code: "NOTE".into(),
                data_type: "TEXT".into(),
                ..Default::default()
            };
            engine.create_validation(&validation, ACTOR)?;
            engine.attach_rule("ABC", "123456007", "NOTE", &json!("kept"), ACTOR)?;
            let changes = SubtypeChanges {
                extension: Some("12".into()),
                ..SubtypeChanges::default()
            };
            engine.update_subtype("ABC", &changes, ACTOR)
        })
        .unwrap();

        let store = SqliteStore::new(&conn);
        let stored = store
            .list_validation_maps("ABC", None, Page::default())
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].bin, "123456012");
        assert_eq!(stored[0].value_text.as_deref(), Some("kept"));

        let err = in_transaction(&mut conn, EngineSettings::default(), |engine| {
            engine.update_rule_value("ABC", "123456007", "NOTE", &json!("stale"), ACTOR)
        })
        .unwrap_err();
        assert!(matches!(err, CatalogError::BinNotFound(_)));
    }

    #[test]
    fn test_event_log() {
        let mut conn = test_db();
        seed(&mut conn);

        let store = SqliteStore::new(&conn);
        let events = store.events_for_entity("subtype", "ABC").unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "subtype_created");
        assert_eq!(events[0].actor, ACTOR);
        assert_eq!(events[0].data["effective_key"], json!("123456007"));
    }

    #[test]
    fn test_paged_listing() {
        let mut conn = test_db();
        in_transaction(&mut conn, EngineSettings::default(), |engine| {
            for bin in ["111111", "222222", "333333"] {
                engine.create_bin(&new_bin(bin, "N", None), ACTOR)?;
            }
            Ok(())
        })
        .unwrap();

        let store = SqliteStore::new(&conn);
        let page = store.list_bins(None, Page::new(1, 1)).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].bin, "222222");
        assert_eq!(store.list_bins(Some(Status::Inactive), Page::default()).unwrap().len(), 0);

        let counts = table_counts(&conn).unwrap();
        assert_eq!(counts[0], ("bins", 3));
    }
}
