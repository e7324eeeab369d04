//! # Records
//!
//! Active-record persistence over the query builder.
//!
//! A record type declares its table, identity columns and field-to-column
//! map through [`Record`] (normally generated by `#[derive(Record)]`), and
//! gets finders plus `save` / `delete` / `refresh` from [`ActiveRecord`].
//!
//! Each instance carries a [`RecordState`]: the primary key once known, the
//! change hash of every column as last read or written, and the `is_new`
//! flag. Saving an existing record only writes the columns whose current
//! hash differs from the stored one; with no differences nothing is sent.

use crate::column::{change_hash, ColumnValue};
use crate::config::Driver;
use crate::database::{Database, DbValue, Row};
use crate::error::{Error, Result};
use crate::query::{Condition, Criteria, Direction, Query};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

/// Semantic type of an identity column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    /// Integer key
    Integer,
    /// Text key
    String,
}

impl KeyType {
    /// Type label used in error messages
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::String => "string",
        }
    }

    /// Check whether an assigned value has this type
    #[must_use]
    pub const fn accepts(self, value: &DbValue) -> bool {
        matches!(
            (self, value),
            (Self::Integer, DbValue::Int(_)) | (Self::String, DbValue::String(_))
        )
    }

    fn coerce(self, column: &str, value: DbValue) -> Result<DbValue> {
        match self {
            Self::Integer => i64::from_db(column, value).map(DbValue::Int),
            Self::String => String::from_db(column, value).map(DbValue::String),
        }
    }
}

/// Identity of a persisted record
#[derive(Debug, Clone, PartialEq)]
pub enum PrimaryKey {
    /// Value of a single-column key
    Single(DbValue),
    /// Column/value pairs of a composite key, in declaration order
    Composite(Vec<(String, DbValue)>),
}

impl PrimaryKey {
    /// Integer value of a single-column key
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Single(DbValue::Int(id)) => Some(*id),
            _ => None,
        }
    }
}

/// Persistence bookkeeping embedded in every record
#[derive(Debug, Clone, PartialEq)]
pub struct RecordState {
    primary_key: Option<Vec<(String, DbValue)>>,
    hashes: HashMap<String, u64>,
    is_new: bool,
}

impl Default for RecordState {
    fn default() -> Self {
        Self {
            primary_key: None,
            hashes: HashMap::new(),
            is_new: true,
        }
    }
}

/// Persistence event hooks
///
/// Every hook defaults to "allow" / no-op. `#[derive(Record)]` emits an empty
/// implementation unless the type opts out with `#[record(custom_hooks)]`.
pub trait Lifecycle {
    /// Runs before any save; returning `false` aborts the save without I/O
    fn before_save(&mut self) -> bool {
        true
    }

    /// Runs after a successful insert or update (or skipped no-op update)
    fn after_save(&mut self) {}

    /// Runs before a delete; returning `false` keeps the row
    fn before_delete(&mut self) -> bool {
        true
    }

    /// Runs after the row was deleted
    fn after_delete(&mut self) {}
}

/// Static table metadata and field access for a record type
pub trait Record: Lifecycle + Default + Send + Sync + 'static {
    /// Backing table
    fn table_name() -> &'static str;

    /// Identity columns with their semantic types
    fn primary_key_columns() -> &'static [(&'static str, KeyType)] {
        &[("id", KeyType::Integer)]
    }

    /// The identity or mapped column assigned by the store on insert
    fn auto_increment() -> Option<&'static str> {
        Some("id")
    }

    /// Mapped columns, in field declaration order
    fn columns() -> &'static [&'static str];

    /// Serialized value of a mapped column, `None` for an unmapped name
    ///
    /// # Errors
    ///
    /// Returns an error if the field cannot be serialized.
    fn read_column(&self, column: &str) -> Result<Option<DbValue>>;

    /// Decode a stored value into the mapped field; unmapped names are ignored
    ///
    /// # Errors
    ///
    /// Returns `Error::Conversion` if the value does not fit the field.
    fn write_column(&mut self, column: &str, value: DbValue) -> Result<()>;

    /// Persistence bookkeeping
    fn state(&self) -> &RecordState;

    /// Mutable persistence bookkeeping
    fn state_mut(&mut self) -> &mut RecordState;
}

/// Finders and lifecycle operations, available on every [`Record`]
#[async_trait]
pub trait ActiveRecord: Record {
    /// Build a record from a fetched row
    ///
    /// # Errors
    ///
    /// Returns `Error::Conversion` if a column does not fit its field.
    fn from_row(row: Row) -> Result<Self> {
        let mut record = Self::default();
        hydrate(&mut record, row)?;
        Ok(record)
    }

    /// First record matching the condition
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` if the query fails.
    async fn find_one<C>(
        db: &Database,
        condition: C,
        order: Option<(&str, Direction)>,
    ) -> Result<Option<Self>>
    where
        C: Into<Condition> + Send,
    {
        let found = Self::find_all(db, condition, order, Some(1)).await?;
        Ok(found.into_iter().next())
    }

    /// All records matching the condition; a limit of 0 means no limit
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` if the query fails.
    async fn find_all<C>(
        db: &Database,
        condition: C,
        order: Option<(&str, Direction)>,
        limit: Option<u64>,
    ) -> Result<Vec<Self>>
    where
        C: Into<Condition> + Send,
    {
        let mut query = Query::select(["*"])
            .from(Self::table_name())?
            .filter(condition)?;
        if let Some((expr, direction)) = order {
            query = query.order_by(expr, direction)?;
        }
        if let Some(limit) = limit.filter(|n| *n > 0) {
            query = query.limit(limit, None)?;
        }

        query
            .run(db)
            .await?
            .map_or_else(Vec::new, |result| result.rows)
            .into_iter()
            .map(Self::from_row)
            .collect()
    }

    /// Records hydrated from an arbitrary statement
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` if the statement fails.
    async fn find_by_sql(db: &Database, sql: &str, params: &[DbValue]) -> Result<Vec<Self>> {
        db.fetch_all(sql, params)
            .await?
            .into_iter()
            .map(Self::from_row)
            .collect()
    }

    /// Delete every row matching the condition, returning the affected count
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` if the statement fails.
    async fn delete_all<C>(db: &Database, condition: C) -> Result<u64>
    where
        C: Into<Condition> + Send,
    {
        let result = Query::delete()
            .from(Self::table_name())?
            .filter(condition)?
            .run(db)
            .await?;
        Ok(result.map_or(0, |r| r.rows_affected))
    }

    /// Insert a new record or write the changed columns of an existing one
    ///
    /// # Errors
    ///
    /// Returns `Error::Precondition` if a natural key is missing on insert,
    /// `Error::Database` if a statement fails.
    async fn save(&mut self, db: &Database) -> Result<()> {
        if !self.before_save() {
            debug!(table = Self::table_name(), "Save vetoed by before_save");
            return Ok(());
        }

        if self.state().is_new {
            insert_row(self, db).await?;
        } else {
            update_row(self, db).await?;
        }

        self.after_save();
        Ok(())
    }

    /// Delete the backing row; a new record is left untouched
    ///
    /// Afterwards the record is new again, without a key, and can be saved
    /// as a fresh row.
    ///
    /// # Errors
    ///
    /// Returns `Error::Precondition` if the primary key is unset,
    /// `Error::Database` if the statement fails.
    async fn delete(&mut self, db: &Database) -> Result<()> {
        if self.state().is_new {
            return Ok(());
        }

        let criteria = key_criteria(self)?;
        if !self.before_delete() {
            debug!(table = Self::table_name(), "Delete vetoed by before_delete");
            return Ok(());
        }

        Query::delete()
            .from(Self::table_name())?
            .filter(criteria)?
            .run(db)
            .await?;

        let state = self.state_mut();
        state.hashes.clear();
        state.primary_key = None;
        state.is_new = true;

        self.after_delete();
        Ok(())
    }

    /// Re-read the row and overwrite mapped fields and their hashes
    ///
    /// # Errors
    ///
    /// Returns `Error::Precondition` if the key is unset or the row is gone.
    async fn refresh(&mut self, db: &Database) -> Result<()> {
        let criteria = key_criteria(self)?;
        let row = Query::select(["*"])
            .from(Self::table_name())?
            .filter(criteria)?
            .limit(1, None)?
            .run(db)
            .await?
            .and_then(|result| result.rows.into_iter().next())
            .ok_or_else(|| {
                Error::precondition(format!(
                    "no row in {} matches the primary key",
                    Self::table_name()
                ))
            })?;

        hydrate(self, row)
    }

    /// Assign a natural key, one value per declared key column
    ///
    /// # Errors
    ///
    /// Returns `Error::Precondition` if the key is already set, the value
    /// count or a value type does not match, or the key is store-assigned.
    fn set_primary_key(&mut self, values: &[DbValue]) -> Result<()> {
        let declared = Self::primary_key_columns();

        if self.state().primary_key.is_some() {
            return Err(Error::precondition("primary key is already set"));
        }
        if values.len() != declared.len() {
            return Err(Error::precondition(format!(
                "primary key of {} has {} columns, got {} values",
                Self::table_name(),
                declared.len(),
                values.len()
            )));
        }
        if let Some(ai) = Self::auto_increment() {
            if declared.iter().any(|(column, _)| *column == ai) {
                return Err(Error::precondition(format!(
                    "primary key column {ai} is assigned by the store"
                )));
            }
        }

        let mut key = Vec::with_capacity(declared.len());
        for ((column, kind), value) in declared.iter().zip(values) {
            if !kind.accepts(value) {
                return Err(Error::precondition(format!(
                    "primary key column {column} expects {}, got {}",
                    kind.name(),
                    value.type_name()
                )));
            }
            key.push(((*column).to_string(), value.clone()));
        }

        self.state_mut().primary_key = Some(key);
        Ok(())
    }

    /// Current primary key
    ///
    /// # Errors
    ///
    /// Returns `Error::Precondition` if the key is unset or incomplete.
    fn primary_key(&self) -> Result<PrimaryKey> {
        let key = self
            .state()
            .primary_key
            .as_ref()
            .ok_or_else(|| Error::precondition("primary key is not set"))?;

        if key.len() != Self::primary_key_columns().len() {
            return Err(Error::precondition("primary key is only partially set"));
        }

        match key.as_slice() {
            [(_, value)] => Ok(PrimaryKey::Single(value.clone())),
            _ => Ok(PrimaryKey::Composite(key.clone())),
        }
    }

    /// Check if no row backs this record yet
    fn is_new(&self) -> bool {
        self.state().is_new
    }

    /// Check if the primary key is known
    fn is_primary_key_set(&self) -> bool {
        self.state().primary_key.is_some()
    }
}

impl<T: Record> ActiveRecord for T {}

fn is_key_column<R: Record>(column: &str) -> bool {
    R::primary_key_columns().iter().any(|(c, _)| *c == column)
}

fn key_criteria<R: Record>(record: &R) -> Result<Criteria> {
    let key = record.state().primary_key.as_ref().ok_or_else(|| {
        Error::precondition(format!("{} record has no primary key", R::table_name()))
    })?;

    Ok(key
        .iter()
        .fold(Criteria::new(), |criteria, (column, value)| {
            criteria.eq(column.as_str(), value.clone())
        }))
}

fn sort_key<R: Record>(key: &mut [(String, DbValue)]) {
    let declared = R::primary_key_columns();
    key.sort_by_key(|(column, _)| declared.iter().position(|(c, _)| c == column));
}

fn hydrate<R: Record>(record: &mut R, row: Row) -> Result<()> {
    let declared = R::primary_key_columns();
    let mut key = Vec::with_capacity(declared.len());
    let mut hashes = HashMap::new();

    for (column, value) in row {
        if let Some((_, kind)) = declared.iter().find(|(c, _)| *c == column) {
            key.push((column.clone(), kind.coerce(&column, value.clone())?));
        }
        if R::columns().contains(&column.as_str()) {
            hashes.insert(column.clone(), change_hash(&value));
            record.write_column(&column, value)?;
        }
    }

    sort_key::<R>(&mut key);
    let state = record.state_mut();
    if key.len() == declared.len() {
        state.primary_key = Some(key);
    }
    state.hashes = hashes;
    state.is_new = false;
    Ok(())
}

async fn insert_row<R: Record>(record: &mut R, db: &Database) -> Result<()> {
    let ai = R::auto_increment();
    if let Some(column) = ai.filter(|c| !is_key_column::<R>(c)) {
        if db.driver() == Driver::Sqlite {
            return Err(Error::precondition(format!(
                "{}.{column}: SQLite only assigns identifiers to the primary key",
                R::table_name()
            )));
        }
    }

    let mut values: Vec<(String, DbValue)> = Vec::new();

    match &record.state().primary_key {
        Some(key) => values.extend(
            key.iter()
                .filter(|(column, _)| Some(column.as_str()) != ai)
                .cloned(),
        ),
        None => {
            if let Some((column, _)) = R::primary_key_columns()
                .iter()
                .find(|(c, _)| Some(*c) != ai)
            {
                return Err(Error::precondition(format!(
                    "{} needs primary key column {column} before insert",
                    R::table_name()
                )));
            }
        }
    }

    for column in R::columns() {
        if Some(*column) == ai || is_key_column::<R>(column) {
            continue;
        }
        if let Some(value) = record.read_column(column)? {
            values.push(((*column).to_string(), value));
        }
    }

    if let Some(ai) = ai {
        values.push((ai.to_string(), DbValue::Null));
    }

    let result = Query::insert(false)
        .into(R::table_name())?
        .values(values)?
        .run(db)
        .await?;

    if let Some(ai) = ai {
        let id = result
            .and_then(|r| r.last_insert_id)
            .ok_or_else(|| Error::Database {
                message: format!("insert into {} returned no generated id", R::table_name()),
            })?;

        apply_generated_id(record, ai, id)?;
    }

    record.state_mut().is_new = false;
    debug!(table = R::table_name(), "Record inserted");
    record.refresh(db).await
}

fn apply_generated_id<R: Record>(record: &mut R, column: &str, id: i64) -> Result<()> {
    if is_key_column::<R>(column) {
        let state = record.state_mut();
        let mut key = state.primary_key.take().unwrap_or_default();
        key.push((column.to_string(), DbValue::Int(id)));
        sort_key::<R>(&mut key);
        state.primary_key = Some(key);
        Ok(())
    } else {
        record.write_column(column, DbValue::Int(id))
    }
}

async fn update_row<R: Record>(record: &mut R, db: &Database) -> Result<()> {
    let ai = R::auto_increment();
    let mut changed = Vec::new();
    let mut hashes = Vec::new();

    for column in R::columns() {
        if Some(*column) == ai || is_key_column::<R>(column) {
            continue;
        }
        let Some(value) = record.read_column(column)? else {
            continue;
        };
        let hash = change_hash(&value);
        if record.state().hashes.get(*column) != Some(&hash) {
            changed.push(((*column).to_string(), value));
            hashes.push(((*column).to_string(), hash));
        }
    }

    if changed.is_empty() {
        debug!(table = R::table_name(), "No changed columns, update skipped");
        return Ok(());
    }

    let criteria = key_criteria(record)?;
    Query::update(R::table_name())
        .set(changed)?
        .filter(criteria)?
        .run(db)
        .await?;

    record.state_mut().hashes.extend(hashes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Customer {
        full_name: String,
        age: i64,
        tags: Vec<String>,
        vip: bool,
        greeting: String,
        locked: bool,
        state: RecordState,
    }

    impl Lifecycle for Customer {
        fn before_save(&mut self) -> bool {
            !self.locked
        }

        fn before_delete(&mut self) -> bool {
            !self.locked
        }

        fn after_save(&mut self) {
            self.greeting = format!("Hello, {}", self.full_name);
        }
    }

    impl Record for Customer {
        fn table_name() -> &'static str {
            "customers"
        }

        fn columns() -> &'static [&'static str] {
            &["full_name", "age", "tags", "vip"]
        }

        fn read_column(&self, column: &str) -> Result<Option<DbValue>> {
            match column {
                "full_name" => self.full_name.to_db().map(Some),
                "age" => self.age.to_db().map(Some),
                "tags" => self.tags.to_db().map(Some),
                "vip" => self.vip.to_db().map(Some),
                _ => Ok(None),
            }
        }

        fn write_column(&mut self, column: &str, value: DbValue) -> Result<()> {
            match column {
                "full_name" => self.full_name = ColumnValue::from_db(column, value)?,
                "age" => self.age = ColumnValue::from_db(column, value)?,
                "tags" => self.tags = ColumnValue::from_db(column, value)?,
                "vip" => self.vip = ColumnValue::from_db(column, value)?,
                _ => {}
            }
            Ok(())
        }

        fn state(&self) -> &RecordState {
            &self.state
        }

        fn state_mut(&mut self) -> &mut RecordState {
            &mut self.state
        }
    }

    #[derive(Debug, Default)]
    struct Membership {
        role: String,
        state: RecordState,
    }

    impl Lifecycle for Membership {}

    impl Record for Membership {
        fn table_name() -> &'static str {
            "memberships"
        }

        fn primary_key_columns() -> &'static [(&'static str, KeyType)] {
            &[("team", KeyType::String), ("member", KeyType::Integer)]
        }

        fn auto_increment() -> Option<&'static str> {
            None
        }

        fn columns() -> &'static [&'static str] {
            &["role"]
        }

        fn read_column(&self, column: &str) -> Result<Option<DbValue>> {
            match column {
                "role" => self.role.to_db().map(Some),
                _ => Ok(None),
            }
        }

        fn write_column(&mut self, column: &str, value: DbValue) -> Result<()> {
            if column == "role" {
                self.role = ColumnValue::from_db(column, value)?;
            }
            Ok(())
        }

        fn state(&self) -> &RecordState {
            &self.state
        }

        fn state_mut(&mut self) -> &mut RecordState {
            &mut self.state
        }
    }

    async fn setup() -> Database {
        let db = Database::connect_sqlite("sqlite::memory:").await.unwrap();
        db.execute(
            "CREATE TABLE customers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                full_name TEXT NOT NULL,
                age INTEGER NOT NULL DEFAULT 0,
                tags TEXT,
                vip INTEGER NOT NULL DEFAULT 0
            )",
            &[],
        )
        .await
        .unwrap();
        db.execute(
            "CREATE TABLE memberships (
                team TEXT NOT NULL,
                member INTEGER NOT NULL,
                role TEXT NOT NULL,
                PRIMARY KEY (team, member)
            )",
            &[],
        )
        .await
        .unwrap();
        db
    }

    fn ann() -> Customer {
        Customer {
            full_name: "Ann Lee".to_string(),
            age: 34,
            tags: vec!["gold".to_string(), "early".to_string()],
            vip: true,
            ..Customer::default()
        }
    }

    #[tokio::test]
    async fn test_save_then_find_round_trip() {
        let db = setup().await;
        let mut customer = ann();
        assert!(customer.is_new());

        customer.save(&db).await.unwrap();
        assert!(!customer.is_new());
        assert_eq!(customer.primary_key().unwrap().as_int(), Some(1));
        assert_eq!(customer.greeting, "Hello, Ann Lee");

        let found = Customer::find_one(&db, Criteria::new().eq("id", 1), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.full_name, "Ann Lee");
        assert_eq!(found.age, 34);
        assert_eq!(found.tags, vec!["gold", "early"]);
        assert!(found.vip);
        assert_eq!(found.primary_key().unwrap(), customer.primary_key().unwrap());
    }

    #[tokio::test]
    async fn test_second_save_without_changes_is_a_no_op() {
        let db = setup().await;
        let mut customer = ann();
        customer.save(&db).await.unwrap();

        let before = db.query_count();
        customer.save(&db).await.unwrap();
        assert_eq!(db.query_count(), before);
    }

    #[tokio::test]
    async fn test_update_writes_changed_columns_only() {
        let db = setup().await;
        let mut customer = ann();
        customer.save(&db).await.unwrap();

        customer.age = 35;
        let before = db.query_count();
        customer.save(&db).await.unwrap();
        assert_eq!(db.query_count(), before + 1);

        let rows = db
            .fetch_all("SELECT age, full_name FROM customers", &[])
            .await
            .unwrap();
        assert_eq!(rows[0].get("age"), Some(&DbValue::Int(35)));

        let before = db.query_count();
        customer.save(&db).await.unwrap();
        assert_eq!(db.query_count(), before);
    }

    #[tokio::test]
    async fn test_before_save_veto_skips_io() {
        let db = setup().await;
        let mut customer = Customer {
            locked: true,
            ..ann()
        };

        let before = db.query_count();
        customer.save(&db).await.unwrap();
        assert_eq!(db.query_count(), before);
        assert!(customer.is_new());
        assert!(customer.greeting.is_empty());
    }

    #[tokio::test]
    async fn test_delete_new_record_is_a_no_op() {
        let db = setup().await;
        let mut customer = ann();

        let before = db.query_count();
        customer.delete(&db).await.unwrap();
        assert_eq!(db.query_count(), before);
    }

    #[tokio::test]
    async fn test_delete_resets_to_new() {
        let db = setup().await;
        let mut customer = ann();
        customer.save(&db).await.unwrap();

        customer.delete(&db).await.unwrap();
        assert!(customer.is_new());
        assert!(!customer.is_primary_key_set());
        assert!(matches!(customer.primary_key(), Err(Error::Precondition { .. })));

        let remaining = Customer::find_all(&db, Condition::None, None, None)
            .await
            .unwrap();
        assert!(remaining.is_empty());

        customer.save(&db).await.unwrap();
        assert_eq!(customer.primary_key().unwrap().as_int(), Some(2));
    }

    #[tokio::test]
    async fn test_before_delete_veto_keeps_row() {
        let db = setup().await;
        let mut customer = ann();
        customer.save(&db).await.unwrap();

        customer.locked = true;
        customer.delete(&db).await.unwrap();
        assert!(!customer.is_new());
        assert_eq!(
            Customer::find_all(&db, Condition::None, None, None)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_finders_and_delete_all() {
        let db = setup().await;
        for (name, age) in [("Ann", 34), ("Bob", 17), ("Cid", 52)] {
            let mut customer = Customer {
                full_name: name.to_string(),
                age,
                ..Customer::default()
            };
            customer.save(&db).await.unwrap();
        }

        let adults = Customer::find_all(
            &db,
            Criteria::new().compare(crate::query::Operator::Ge, "age", 18),
            Some(("age", Direction::Desc)),
            None,
        )
        .await
        .unwrap();
        let names: Vec<_> = adults.iter().map(|c| c.full_name.as_str()).collect();
        assert_eq!(names, ["Cid", "Ann"]);

        let youngest = Customer::find_one(&db, Condition::None, Some(("age", Direction::Asc)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(youngest.full_name, "Bob");

        let by_sql = Customer::find_by_sql(
            &db,
            "SELECT * FROM customers WHERE full_name LIKE ?",
            &["%i%".into()],
        )
        .await
        .unwrap();
        assert_eq!(by_sql.len(), 1);

        let missing = Customer::find_one(&db, Criteria::new().eq("id", 99), None)
            .await
            .unwrap();
        assert!(missing.is_none());

        let removed = Customer::delete_all(&db, Criteria::new().any_of("id", [1, 3]))
            .await
            .unwrap();
        assert_eq!(removed, 2);
    }

    #[tokio::test]
    async fn test_composite_natural_key() {
        let db = setup().await;
        let mut membership = Membership {
            role: "owner".to_string(),
            ..Membership::default()
        };

        let missing = membership.save(&db).await;
        assert!(matches!(missing, Err(Error::Precondition { .. })));

        membership
            .set_primary_key(&["core".into(), DbValue::Int(7)])
            .unwrap();
        membership.save(&db).await.unwrap();
        assert!(!membership.is_new());

        match membership.primary_key().unwrap() {
            PrimaryKey::Composite(key) => {
                assert_eq!(key[0], ("team".to_string(), DbValue::String("core".to_string())));
                assert_eq!(key[1], ("member".to_string(), DbValue::Int(7)));
            }
            PrimaryKey::Single(_) => panic!("expected composite key"),
        }

        membership.role = "admin".to_string();
        membership.save(&db).await.unwrap();

        let found = Membership::find_one(
            &db,
            Criteria::new().eq("team", "core").eq("member", 7),
            None,
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(found.role, "admin");
    }

    #[test]
    fn test_set_primary_key_checks() {
        let mut membership = Membership::default();
        assert!(membership.set_primary_key(&["core".into()]).is_err());
        assert!(membership
            .set_primary_key(&[DbValue::Int(1), DbValue::Int(7)])
            .is_err());

        membership
            .set_primary_key(&["core".into(), DbValue::Int(7)])
            .unwrap();
        let again = membership.set_primary_key(&["core".into(), DbValue::Int(7)]);
        assert!(matches!(again, Err(Error::Precondition { .. })));

        let mut customer = Customer::default();
        let result = customer.set_primary_key(&[DbValue::Int(5)]);
        assert!(matches!(result, Err(Error::Precondition { .. })));
    }

    #[test]
    fn test_hydrate_ignores_unknown_columns() {
        let mut row = Row::new();
        row.insert("id".to_string(), DbValue::String("12".to_string()));
        row.insert("full_name".to_string(), "Dee".into());
        row.insert("vip".to_string(), DbValue::Int(1));
        row.insert("tags".to_string(), DbValue::Null);
        row.insert("legacy_column".to_string(), DbValue::Int(3));

        let customer = Customer::from_row(row).unwrap();
        assert_eq!(customer.primary_key().unwrap(), PrimaryKey::Single(DbValue::Int(12)));
        assert_eq!(customer.full_name, "Dee");
        assert!(customer.vip);
        assert!(customer.tags.is_empty());
        assert!(!customer.is_new());
    }

    #[derive(Debug, Default, crate::Record)]
    #[record(table = "tickets", key(code = "string"))]
    struct Ticket {
        #[record(column = "subject")]
        title: String,
        priority: Option<i64>,
        #[record(skip)]
        scratch: String,
        meta: RecordState,
    }

    #[tokio::test]
    async fn test_derived_record_with_natural_key() {
        let db = setup().await;
        db.execute(
            "CREATE TABLE tickets (code TEXT PRIMARY KEY, subject TEXT NOT NULL, priority INTEGER)",
            &[],
        )
        .await
        .unwrap();

        assert_eq!(Ticket::columns(), ["subject", "priority"]);
        assert_eq!(Ticket::auto_increment(), None);
        assert_eq!(Ticket::primary_key_columns(), [("code", KeyType::String)]);

        let mut ticket = Ticket {
            title: "Broken login".to_string(),
            scratch: "not stored".to_string(),
            ..Ticket::default()
        };
        ticket.set_primary_key(&["T-1".into()]).unwrap();
        ticket.save(&db).await.unwrap();

        db.execute("UPDATE tickets SET priority = 2 WHERE code = 'T-1'", &[])
            .await
            .unwrap();
        ticket.refresh(&db).await.unwrap();
        assert_eq!(ticket.priority, Some(2));
        assert_eq!(ticket.title, "Broken login");
        assert_eq!(ticket.read_column("scratch").unwrap(), None);

        let found = Ticket::find_one(&db, Criteria::new().eq("code", "T-1"), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.title, "Broken login");
        assert!(found.scratch.is_empty());
    }

    #[derive(Debug, Default, crate::Record)]
    #[record(table = "people")]
    struct Person {
        nickname: Option<String>,
        state: RecordState,
    }

    #[tokio::test]
    async fn test_null_to_empty_string_is_written() {
        let db = setup().await;
        db.execute(
            "CREATE TABLE people (id INTEGER PRIMARY KEY AUTOINCREMENT, nickname TEXT)",
            &[],
        )
        .await
        .unwrap();

        let mut person = Person::default();
        person.save(&db).await.unwrap();

        person.nickname = Some(String::new());
        let before = db.query_count();
        person.save(&db).await.unwrap();
        assert_eq!(db.query_count(), before + 1);

        let stored = Person::find_one(&db, Condition::None, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.nickname, Some(String::new()));

        person.nickname = None;
        person.save(&db).await.unwrap();
        person.refresh(&db).await.unwrap();
        assert_eq!(person.nickname, None);
    }

    #[derive(Debug, Default, crate::Record)]
    #[record(table = "orders", key(code = "string"), auto_increment = "seq")]
    struct Order {
        seq: Option<i64>,
        note: String,
        state: RecordState,
    }

    #[tokio::test]
    async fn test_sqlite_rejects_non_key_auto_increment() {
        let db = setup().await;
        db.execute(
            "CREATE TABLE orders (code TEXT PRIMARY KEY, seq INTEGER, note TEXT NOT NULL)",
            &[],
        )
        .await
        .unwrap();

        let mut order = Order {
            note: "first".to_string(),
            ..Order::default()
        };
        order.set_primary_key(&["A".into()]).unwrap();

        let before = db.query_count();
        let result = order.save(&db).await;
        assert!(matches!(result, Err(Error::Precondition { .. })));
        assert_eq!(db.query_count(), before);
        assert!(order.is_new());
        assert_eq!(order.seq, None);
    }

    #[test]
    fn test_generated_id_written_back() {
        let mut order = Order::default();
        apply_generated_id(&mut order, "seq", 41).unwrap();
        assert_eq!(order.seq, Some(41));
        assert!(!order.is_primary_key_set());

        let mut customer = Customer::default();
        apply_generated_id(&mut customer, "id", 9).unwrap();
        assert_eq!(customer.primary_key().unwrap(), PrimaryKey::Single(DbValue::Int(9)));
    }

    #[tokio::test]
    async fn test_zero_limit_means_no_limit() {
        let db = setup().await;
        for name in ["Ann", "Bob"] {
            let mut customer = Customer {
                full_name: name.to_string(),
                ..Customer::default()
            };
            customer.save(&db).await.unwrap();
        }

        let all = Customer::find_all(&db, Condition::None, None, Some(0))
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let one = Customer::find_all(&db, Condition::None, None, Some(1))
            .await
            .unwrap();
        assert_eq!(one.len(), 1);
    }
}
