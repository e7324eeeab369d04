//! # Query Builder
//!
//! Fluent, order-checked assembly of parameterized SQL.
//!
//! Each entry constructor ([`Query::select`], [`Query::insert`],
//! [`Query::update`], [`Query::delete`]) seeds the builder with the clauses
//! that statement kind allows, in order, each marked required or optional.
//! Every clause may be called at most once and only after all required
//! clauses before it. Misuse is reported as `Error::Sequencing` before any
//! SQL reaches the database.
//!
//! ```ignore
//! let adults = Query::select(["*"])
//!     .from("customers")?
//!     .filter(Criteria::new().compare(Operator::Ge, "age", 18))?
//!     .order_by("full_name", Direction::Asc)?
//!     .limit(10, None)?
//!     .run(&db)
//!     .await?;
//! ```

use crate::config::Driver;
use crate::database::{Database, DbValue, ResultSet};
use crate::error::{Error, Result};
use std::fmt;
use tracing::debug;

/// Chainable clause of a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clause {
    /// `INTO <table>`
    Into,
    /// `(<columns>) VALUES (<placeholders>)`
    Values,
    /// `FROM <table>`
    From,
    /// `WHERE <condition>`
    Where,
    /// `SET <assignments>`
    Set,
    /// `ORDER BY <expr> <direction>`
    OrderBy,
    /// `LIMIT <n> [OFFSET <m>]`
    Limit,
}

impl Clause {
    /// Builder method name of the clause
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Into => "into",
            Self::Values => "values",
            Self::From => "from",
            Self::Where => "where",
            Self::Set => "set",
            Self::OrderBy => "orderBy",
            Self::Limit => "limit",
        }
    }
}

/// Statement kind chosen by the entry constructor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// SELECT
    Select,
    /// INSERT
    Insert,
    /// UPDATE
    Update,
    /// DELETE
    Delete,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select => write!(f, "SELECT"),
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// Sort direction for `ORDER BY`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Ascending
    #[default]
    Asc,
    /// Descending
    Desc,
}

impl Direction {
    const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Comparison operator for [`Criteria::compare`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `LIKE`
    Like,
}

impl Operator {
    const fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Like => "LIKE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Equals(String, DbValue),
    IsNull(String),
    In(String, Vec<DbValue>),
    Compare {
        op: Operator,
        expr: String,
        value: DbValue,
    },
}

/// Conjunction of column predicates, each rendered in parentheses and
/// joined with `AND`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Criteria {
    predicates: Vec<Predicate>,
}

impl Criteria {
    /// Empty criteria (matches everything, emits no `WHERE`)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `column = ?`, or `column IS NULL` when the value is null
    #[must_use]
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<DbValue>) -> Self {
        let column = column.into();
        let predicate = match value.into() {
            DbValue::Null => Predicate::IsNull(column),
            value => Predicate::Equals(column, value),
        };
        self.predicates.push(predicate);
        self
    }

    /// `column IS NULL`
    #[must_use]
    pub fn is_null(mut self, column: impl Into<String>) -> Self {
        self.predicates.push(Predicate::IsNull(column.into()));
        self
    }

    /// `column IN (?, ?, ...)` with one placeholder per value
    #[must_use]
    pub fn any_of<I, V>(mut self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<DbValue>,
    {
        self.predicates.push(Predicate::In(
            column.into(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// `expr <op> ?`, the only form for non-equality comparisons
    #[must_use]
    pub fn compare(
        mut self,
        op: Operator,
        expr: impl Into<String>,
        value: impl Into<DbValue>,
    ) -> Self {
        self.predicates.push(Predicate::Compare {
            op,
            expr: expr.into(),
            value: value.into(),
        });
        self
    }

    /// Number of predicates
    #[must_use]
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// Check if no predicate was added
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    fn render(&self, sql: &mut String, params: &mut Vec<DbValue>) {
        let mut parts = Vec::with_capacity(self.predicates.len());
        for predicate in &self.predicates {
            let part = match predicate {
                Predicate::Equals(column, value) => {
                    params.push(value.clone());
                    format!("{column} = ?")
                }
                Predicate::IsNull(column) => format!("{column} IS NULL"),
                Predicate::In(_, values) if values.is_empty() => "1 = 0".to_string(),
                Predicate::In(column, values) => {
                    params.extend(values.iter().cloned());
                    format!("{column} IN ({})", placeholders(values.len()))
                }
                Predicate::Compare { op, expr, value } => {
                    params.push(value.clone());
                    format!("{expr} {} ?", op.as_sql())
                }
            };
            parts.push(format!("({part})"));
        }
        sql.push_str(&parts.join(" AND "));
    }
}

/// Argument of [`Query::filter`]
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Condition {
    /// No condition; `filter` becomes a no-op
    #[default]
    None,
    /// Raw SQL fragment with its positional parameters
    Raw {
        /// Fragment text with `?` placeholders
        sql: String,
        /// Parameters in placeholder order
        params: Vec<DbValue>,
    },
    /// Column predicates joined with `AND`
    Criteria(Criteria),
}

impl Condition {
    /// Raw fragment with parameters
    #[must_use]
    pub fn raw<I, V>(sql: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<DbValue>,
    {
        Self::Raw {
            sql: sql.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    /// Check whether rendering would emit nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::None => true,
            Self::Raw { sql, .. } => sql.trim().is_empty(),
            Self::Criteria(criteria) => criteria.is_empty(),
        }
    }
}

impl From<Criteria> for Condition {
    fn from(criteria: Criteria) -> Self {
        Self::Criteria(criteria)
    }
}

impl From<&str> for Condition {
    fn from(sql: &str) -> Self {
        Self::Raw {
            sql: sql.to_string(),
            params: Vec::new(),
        }
    }
}

impl From<String> for Condition {
    fn from(sql: String) -> Self {
        Self::Raw {
            sql,
            params: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Gate {
    clause: Clause,
    required: bool,
    called: bool,
}

const fn gate(clause: Clause, required: bool) -> Gate {
    Gate {
        clause,
        required,
        called: false,
    }
}

/// Order-checked SQL statement under construction
///
/// Every builder is an independently owned value; nothing is shared between
/// statements built at the same time.
#[derive(Debug, Clone)]
pub struct Query {
    kind: StatementKind,
    ignore: bool,
    sql: String,
    params: Vec<DbValue>,
    gates: Vec<Gate>,
    empty_payload: bool,
}

impl Query {
    fn new(kind: StatementKind, sql: String, gates: Vec<Gate>) -> Self {
        Self {
            kind,
            ignore: false,
            sql,
            params: Vec::new(),
            gates,
            empty_payload: false,
        }
    }

    /// `SELECT <columns>`; requires `from`, then optional `where`, `orderBy`, `limit`
    ///
    /// An empty column list selects `*`.
    pub fn select<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let columns: Vec<String> = columns
            .into_iter()
            .map(|c| c.as_ref().to_string())
            .collect();
        let list = if columns.is_empty() {
            "*".to_string()
        } else {
            columns.join(", ")
        };
        Self::new(
            StatementKind::Select,
            format!("SELECT {list}"),
            vec![
                gate(Clause::From, true),
                gate(Clause::Where, false),
                gate(Clause::OrderBy, false),
                gate(Clause::Limit, false),
            ],
        )
    }

    /// `INSERT [IGNORE]`; requires `into`, then `values`
    ///
    /// With `ignore_duplicates`, rows violating a unique key are skipped
    /// (`INSERT IGNORE` on MySQL, `INSERT OR IGNORE` on SQLite).
    #[must_use]
    pub fn insert(ignore_duplicates: bool) -> Self {
        let mut query = Self::new(
            StatementKind::Insert,
            String::new(),
            vec![gate(Clause::Into, true), gate(Clause::Values, true)],
        );
        query.ignore = ignore_duplicates;
        query
    }

    /// `UPDATE <table>`; requires `set`, then optional `where`, `orderBy`, `limit`
    #[must_use]
    pub fn update(table: &str) -> Self {
        Self::new(
            StatementKind::Update,
            format!("UPDATE {table}"),
            vec![
                gate(Clause::Set, true),
                gate(Clause::Where, false),
                gate(Clause::OrderBy, false),
                gate(Clause::Limit, false),
            ],
        )
    }

    /// `DELETE`; requires `from`, then optional `where`, `orderBy`, `limit`
    #[must_use]
    pub fn delete() -> Self {
        Self::new(
            StatementKind::Delete,
            "DELETE".to_string(),
            vec![
                gate(Clause::From, true),
                gate(Clause::Where, false),
                gate(Clause::OrderBy, false),
                gate(Clause::Limit, false),
            ],
        )
    }

    /// Statement kind
    #[must_use]
    pub const fn kind(&self) -> StatementKind {
        self.kind
    }

    /// Bound parameters in placeholder order
    #[must_use]
    pub fn params(&self) -> &[DbValue] {
        &self.params
    }

    fn enter(&mut self, clause: Clause) -> Result<()> {
        let Some(position) = self.gates.iter().position(|g| g.clause == clause) else {
            return Err(Error::sequencing(
                clause.name(),
                format!("not available on a {} statement", self.kind),
            ));
        };

        if self.gates[position].called {
            return Err(Error::sequencing(clause.name(), "was already called"));
        }

        if let Some(missing) = self.gates[..position]
            .iter()
            .find(|g| g.required && !g.called)
        {
            return Err(Error::sequencing(
                clause.name(),
                format!("{} is missing before it", missing.clause.name()),
            ));
        }

        self.gates[position].called = true;
        Ok(())
    }

    /// `INTO <table>`
    ///
    /// # Errors
    ///
    /// `Error::Sequencing` if called twice or on a non-INSERT statement.
    pub fn into(mut self, table: &str) -> Result<Self> {
        self.enter(Clause::Into)?;
        self.sql.push_str(" INTO ");
        self.sql.push_str(table);
        Ok(self)
    }

    /// `(<columns>) VALUES (?, ...)` in iteration order
    ///
    /// An empty mapping consumes the clause but writes nothing; running such
    /// a statement performs no I/O.
    ///
    /// # Errors
    ///
    /// `Error::Sequencing` if `into` was not called first or on repeat calls.
    pub fn values<I, K, V>(mut self, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<DbValue>,
    {
        self.enter(Clause::Values)?;

        let (columns, values): (Vec<String>, Vec<DbValue>) = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();

        if columns.is_empty() {
            self.empty_payload = true;
            return Ok(self);
        }

        self.sql.push_str(&format!(
            " ({}) VALUES ({})",
            columns.join(", "),
            placeholders(values.len())
        ));
        self.params.extend(values);
        Ok(self)
    }

    /// `FROM <table>`
    ///
    /// # Errors
    ///
    /// `Error::Sequencing` if called twice or on INSERT/UPDATE.
    pub fn from(mut self, table: &str) -> Result<Self> {
        self.enter(Clause::From)?;
        self.sql.push_str(" FROM ");
        self.sql.push_str(table);
        Ok(self)
    }

    /// `WHERE <condition>`; an empty condition leaves the statement untouched
    ///
    /// # Errors
    ///
    /// `Error::Sequencing` if a required clause is missing or `where` was
    /// already applied.
    pub fn filter(mut self, condition: impl Into<Condition>) -> Result<Self> {
        let condition = condition.into();
        if condition.is_empty() {
            return Ok(self);
        }

        self.enter(Clause::Where)?;
        self.sql.push_str(" WHERE ");
        match condition {
            Condition::None => {}
            Condition::Raw { sql, params } => {
                self.sql.push_str(&sql);
                self.params.extend(params);
            }
            Condition::Criteria(criteria) => criteria.render(&mut self.sql, &mut self.params),
        }
        Ok(self)
    }

    /// `SET col = ?, ...` in iteration order
    ///
    /// An empty mapping consumes the clause but writes nothing.
    ///
    /// # Errors
    ///
    /// `Error::Sequencing` if called twice or on a non-UPDATE statement.
    pub fn set<I, K, V>(mut self, assignments: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<DbValue>,
    {
        self.enter(Clause::Set)?;

        let parts: Vec<String> = assignments
            .into_iter()
            .map(|(column, value)| {
                self.params.push(value.into());
                format!("{} = ?", column.into())
            })
            .collect();

        if parts.is_empty() {
            self.empty_payload = true;
        } else {
            self.sql.push_str(" SET ");
            self.sql.push_str(&parts.join(", "));
        }
        Ok(self)
    }

    /// `SET <expr>` from a raw fragment with its parameters
    ///
    /// # Errors
    ///
    /// `Error::Sequencing` if called twice or on a non-UPDATE statement.
    pub fn set_expr<I, V>(mut self, expr: &str, params: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<DbValue>,
    {
        self.enter(Clause::Set)?;
        if expr.trim().is_empty() {
            self.empty_payload = true;
            return Ok(self);
        }
        self.sql.push_str(" SET ");
        self.sql.push_str(expr);
        self.params.extend(params.into_iter().map(Into::into));
        Ok(self)
    }

    /// `ORDER BY <expr> <direction>`
    ///
    /// # Errors
    ///
    /// `Error::Sequencing` if a required clause is missing or on repeat calls.
    pub fn order_by(mut self, expr: &str, direction: Direction) -> Result<Self> {
        self.enter(Clause::OrderBy)?;
        self.sql
            .push_str(&format!(" ORDER BY {expr} {}", direction.as_sql()));
        Ok(self)
    }

    /// `LIMIT <n>`, plus `OFFSET <m>` for a non-zero offset
    ///
    /// # Errors
    ///
    /// `Error::Sequencing` if a required clause is missing or on repeat calls.
    pub fn limit(mut self, limit: u64, offset: Option<u64>) -> Result<Self> {
        self.enter(Clause::Limit)?;
        self.sql.push_str(&format!(" LIMIT {limit}"));
        if let Some(offset) = offset.filter(|o| *o > 0) {
            self.sql.push_str(&format!(" OFFSET {offset}"));
        }
        Ok(self)
    }

    /// Render the terminated statement text for a dialect
    ///
    /// # Errors
    ///
    /// `Error::Sequencing` if a required clause was never called.
    pub fn sql(&self, driver: Driver) -> Result<String> {
        if let Some(missing) = self.gates.iter().find(|g| g.required && !g.called) {
            return Err(Error::sequencing(
                missing.clause.name(),
                "is missing before rendering the statement",
            ));
        }

        let mut text = match self.kind {
            StatementKind::Insert => {
                let keyword = match (self.ignore, driver) {
                    (false, _) => "INSERT",
                    (true, Driver::Mysql) => "INSERT IGNORE",
                    (true, Driver::Sqlite) => "INSERT OR IGNORE",
                };
                format!("{keyword}{}", self.sql)
            }
            _ => self.sql.clone(),
        };
        text.push(';');
        Ok(text)
    }

    /// Validate, render and execute through the gateway
    ///
    /// Returns `None` for a write with nothing to write (no I/O happens) and
    /// for a SELECT that matched no rows. Never fails because rows are absent.
    ///
    /// # Errors
    ///
    /// `Error::Sequencing` for an incomplete chain, `Error::Database` if the
    /// statement fails.
    pub async fn run(self, db: &Database) -> Result<Option<ResultSet>> {
        let sql = self.sql(db.driver())?;

        if self.empty_payload {
            debug!(sql = %sql, "Skipping statement with nothing to write");
            return Ok(None);
        }

        if self.kind == StatementKind::Select {
            let rows = db.fetch_all(&sql, &self.params).await?;
            if rows.is_empty() {
                return Ok(None);
            }
            return Ok(Some(ResultSet {
                rows,
                ..ResultSet::default()
            }));
        }

        db.execute(&sql, &self.params).await.map(Some)
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
