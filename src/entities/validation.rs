// ✔️ Validation Entity - Typed, time-windowed rule definitions
//
// A Validation declares a data type; a ValidationMap attaches a value of that
// type to a (subtype, BIN) pair. Exactly one value slot is ever populated.

use crate::audit::Audit;
use crate::error::{CatalogError, CatalogResult};
use crate::status::Status;
use crate::store::{matches_status, read_lock, write_lock, Page, ValidationRepository};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

// ============================================================================
// DATA TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    #[serde(rename = "BOOL")]
    Bool,
    #[serde(rename = "NUMBER")]
    Number,
    #[serde(rename = "TEXT")]
    Text,
}

impl DataType {
    pub fn parse(raw: &str) -> CatalogResult<DataType> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "BOOL" => Ok(DataType::Bool),
            "NUMBER" => Ok(DataType::Number),
            "TEXT" => Ok(DataType::Text),
            other => Err(CatalogError::invalid(format!(
                "data type must be BOOL, NUMBER or TEXT, got '{}'",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Bool => "BOOL",
            DataType::Number => "NUMBER",
            DataType::Text => "TEXT",
        }
    }
}

// ============================================================================
// VALIDATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    pub validation_id: i64,
    pub code: String,
    pub description: Option<String>,
    pub data_type: DataType,
    pub status: Status,

    /// Activity window; an open end means unbounded on that side
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub audit: Audit,
}

impl Validation {
    pub fn new(code: String, data_type: DataType, actor: &str) -> Self {
        Validation {
            validation_id: 0,
            code,
            description: None,
            data_type,
            status: Status::Active,
            valid_from: None,
            valid_to: None,
            audit: Audit::new(actor),
        }
    }

    /// Inclusive on both ends
    pub fn is_within_window(&self, at: DateTime<Utc>) -> bool {
        self.valid_from.map_or(true, |from| from <= at) && self.valid_to.map_or(true, |to| at <= to)
    }
}

// ============================================================================
// RULE VALUE
// ============================================================================

/// A coerced value, ready to be stored in its slot
#[derive(Debug, Clone, PartialEq)]
pub enum RuleValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl RuleValue {
    /// Stored representation of a flag
    pub fn flag_str(value: bool) -> &'static str {
        if value {
            "SI"
        } else {
            "NO"
        }
    }
}

// ============================================================================
// VALIDATION MAP
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationMap {
    pub subtype_code: String,
    pub bin: String,
    pub validation_id: i64,
    pub status: Status,

    /// "SI" / "NO"
    pub value_flag: Option<String>,
    pub value_num: Option<f64>,
    pub value_text: Option<String>,

    #[serde(flatten)]
    pub audit: Audit,
}

impl ValidationMap {
    pub fn new(subtype_code: String, bin: String, validation_id: i64, value: RuleValue, actor: &str) -> Self {
        let mut map = ValidationMap {
            subtype_code,
            bin,
            validation_id,
            status: Status::Active,
            value_flag: None,
            value_num: None,
            value_text: None,
            audit: Audit::new(actor),
        };
        map.set_value(value);
        map
    }

    /// Populate exactly one slot, clearing the others
    pub fn set_value(&mut self, value: RuleValue) {
        self.value_flag = None;
        self.value_num = None;
        self.value_text = None;

        match value {
            RuleValue::Flag(flag) => self.value_flag = Some(RuleValue::flag_str(flag).to_string()),
            RuleValue::Number(n) => self.value_num = Some(n),
            RuleValue::Text(text) => self.value_text = Some(text),
        }
    }

    fn same_key(&self, subtype_code: &str, bin: &str, validation_id: i64) -> bool {
        self.subtype_code == subtype_code && self.bin == bin && self.validation_id == validation_id
    }
}

stateful_audited!(Validation, ValidationMap);

// ============================================================================
// VALIDATION REGISTRY
// ============================================================================

#[derive(Default)]
struct ValidationTables {
    validations: Vec<Validation>,
    maps: Vec<ValidationMap>,
    next_id: i64,
}

#[derive(Clone, Default)]
pub struct ValidationRegistry {
    tables: Arc<RwLock<ValidationTables>>,
}

impl ValidationRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ValidationRepository for ValidationRegistry {
    fn find_validation_by_code(&self, code: &str) -> CatalogResult<Option<Validation>> {
        let tables = read_lock(&self.tables)?;
        Ok(tables.validations.iter().find(|v| v.code == code).cloned())
    }

    fn insert_validation(&self, validation: &Validation) -> CatalogResult<i64> {
        let mut tables = write_lock(&self.tables)?;
        if tables.validations.iter().any(|v| v.code == validation.code) {
            return Err(CatalogError::ValidationAlreadyExists(validation.code.clone()));
        }
        tables.next_id += 1;
        let mut stored = validation.clone();
        stored.validation_id = tables.next_id;
        tables.validations.push(stored);
        Ok(tables.next_id)
    }

    fn update_validation(&self, validation: &Validation) -> CatalogResult<()> {
        let mut tables = write_lock(&self.tables)?;
        match tables
            .validations
            .iter_mut()
            .find(|v| v.validation_id == validation.validation_id)
        {
            Some(existing) => {
                *existing = validation.clone();
                Ok(())
            }
            None => Err(CatalogError::ValidationNotFound(validation.code.clone())),
        }
    }

    fn list_validations(&self, status: Option<Status>, page: Page) -> CatalogResult<Vec<Validation>> {
        let tables = read_lock(&self.tables)?;
        let mut matching: Vec<Validation> = tables
            .validations
            .iter()
            .filter(|v| matches_status(status, v.status))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(page.slice(matching))
    }

    fn find_validation_map(
        &self,
        subtype_code: &str,
        bin: &str,
        validation_id: i64,
    ) -> CatalogResult<Option<ValidationMap>> {
        let tables = read_lock(&self.tables)?;
        Ok(tables
            .maps
            .iter()
            .find(|m| m.same_key(subtype_code, bin, validation_id))
            .cloned())
    }

    fn insert_validation_map(&self, map: &ValidationMap) -> CatalogResult<()> {
        let mut tables = write_lock(&self.tables)?;
        if tables
            .maps
            .iter()
            .any(|m| m.same_key(&map.subtype_code, &map.bin, map.validation_id))
        {
            let code = tables
                .validations
                .iter()
                .find(|v| v.validation_id == map.validation_id)
                .map(|v| v.code.clone())
                .unwrap_or_else(|| map.validation_id.to_string());
            return Err(CatalogError::AlreadyExists {
                subtype_code: map.subtype_code.clone(),
                bin: map.bin.clone(),
                validation_code: code,
            });
        }
        tables.maps.push(map.clone());
        Ok(())
    }

    fn update_validation_map(&self, map: &ValidationMap) -> CatalogResult<()> {
        let mut tables = write_lock(&self.tables)?;
        match tables
            .maps
            .iter_mut()
            .find(|m| m.same_key(&map.subtype_code, &map.bin, map.validation_id))
        {
            Some(existing) => *existing = map.clone(),
            None => tables.maps.push(map.clone()),
        }
        Ok(())
    }

    fn rekey_validation_maps(
        &self,
        subtype_code: &str,
        from_bin: &str,
        to_bin: &str,
    ) -> CatalogResult<usize> {
        let mut tables = write_lock(&self.tables)?;
        let mut moved = 0;
        for map in tables
            .maps
            .iter_mut()
            .filter(|m| m.subtype_code == subtype_code && m.bin == from_bin)
        {
            map.bin = to_bin.to_string();
            moved += 1;
        }
        Ok(moved)
    }

    fn list_validation_maps(
        &self,
        subtype_code: &str,
        bin: Option<&str>,
        page: Page,
    ) -> CatalogResult<Vec<ValidationMap>> {
        let tables = read_lock(&self.tables)?;
        let mut matching: Vec<ValidationMap> = tables
            .maps
            .iter()
            .filter(|m| m.subtype_code == subtype_code && bin.map_or(true, |b| m.bin == b))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.bin.cmp(&b.bin).then(a.validation_id.cmp(&b.validation_id)));
        Ok(page.slice(matching))
    }
}

// ============================================================================
// TESTS
// ============================================================================
