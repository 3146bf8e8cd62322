//! # Statement AST
//!
//! Stores describe what they want as data; executors decide how to run it.
//! `Statement::to_sql` renders Postgres text with `$n` placeholders, the
//! in-memory adapter evaluates the same tree directly.

use super::descriptor::{ColumnScope, Record, TableDescriptor};
use super::value::SqlValue;
use std::fmt::Write as _;

/// One conjunct of a `WHERE` clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(&'static str, SqlValue),
    In(&'static str, Vec<SqlValue>),
    IsNull(&'static str),
    IsNotNull(&'static str),
    Lt(&'static str, SqlValue),
    Le(&'static str, SqlValue),
    Gt(&'static str, SqlValue),
    Ge(&'static str, SqlValue),
    /// `$n = ANY(column)` on an array column.
    ArrayContains(&'static str, SqlValue),
    /// `column && $n` on an array column.
    ArrayOverlaps(&'static str, Vec<String>),
}

impl Predicate {
    pub fn eq(column: &'static str, value: impl Into<SqlValue>) -> Self {
        Predicate::Eq(column, value.into())
    }

    pub fn any_of<V: Into<SqlValue>>(column: &'static str, values: impl IntoIterator<Item = V>) -> Self {
        Predicate::In(column, values.into_iter().map(Into::into).collect())
    }

    pub fn column(&self) -> &'static str {
        match self {
            Predicate::Eq(c, _)
            | Predicate::In(c, _)
            | Predicate::IsNull(c)
            | Predicate::IsNotNull(c)
            | Predicate::Lt(c, _)
            | Predicate::Le(c, _)
            | Predicate::Gt(c, _)
            | Predicate::Ge(c, _)
            | Predicate::ArrayContains(c, _)
            | Predicate::ArrayOverlaps(c, _) => c,
        }
    }

    fn render(&self, args: &mut Args) -> String {
        match self {
            Predicate::Eq(c, v) => format!("{} = {}", c, args.bind(v.clone())),
            Predicate::In(c, vs) => format!("{} = ANY({})", c, args.bind(array_of(vs))),
            Predicate::IsNull(c) => format!("{} IS NULL", c),
            Predicate::IsNotNull(c) => format!("{} IS NOT NULL", c),
            Predicate::Lt(c, v) => format!("{} < {}", c, args.bind(v.clone())),
            Predicate::Le(c, v) => format!("{} <= {}", c, args.bind(v.clone())),
            Predicate::Gt(c, v) => format!("{} > {}", c, args.bind(v.clone())),
            Predicate::Ge(c, v) => format!("{} >= {}", c, args.bind(v.clone())),
            Predicate::ArrayContains(c, v) => format!("{} = ANY({})", args.bind(v.clone()), c),
            Predicate::ArrayOverlaps(c, vs) => {
                format!("{} && {}", c, args.bind(SqlValue::TextArray(vs.clone())))
            }
        }
    }
}

fn array_of(values: &[SqlValue]) -> SqlValue {
    SqlValue::TextArray(
        values
            .iter()
            .map(|v| match v {
                SqlValue::Text(s) => s.clone(),
                other => format!("{:?}", other),
            })
            .collect(),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Row lock taken by a `SELECT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLock {
    /// Blocks writers but not foreign-key checks.
    ForNoKeyUpdate,
    ForUpdate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub table: &'static str,
    pub columns: Vec<&'static str>,
    pub filter: Vec<Predicate>,
    pub order_by: Vec<(&'static str, SortOrder)>,
    pub limit: Option<usize>,
    pub lock: Option<RowLock>,
}

impl Select {
    /// `SELECT <all columns> FROM <table>`.
    pub fn table(desc: &TableDescriptor) -> Self {
        Self {
            table: desc.name,
            columns: desc.columns.to_vec(),
            filter: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            lock: None,
        }
    }

    pub fn only(mut self, columns: &[&'static str]) -> Self {
        self.columns = columns.to_vec();
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filter.push(predicate);
        self
    }

    pub fn active(self) -> Self {
        self.filter(Predicate::IsNull("deleted_at"))
    }

    pub fn order_by(mut self, column: &'static str, order: SortOrder) -> Self {
        self.order_by.push((column, order));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn lock(mut self, lock: RowLock) -> Self {
        self.lock = Some(lock);
        self
    }
}

/// `ON CONFLICT` clause of an insert.
#[derive(Debug, Clone, PartialEq)]
pub enum OnConflict {
    DoNothing,
    /// `ON CONFLICT (target) DO UPDATE SET c = EXCLUDED.c` for every `set` column.
    DoUpdate {
        target: Vec<&'static str>,
        set: Vec<&'static str>,
    },
}

impl OnConflict {
    /// Overwrite every mutable column when the primary key already exists.
    pub fn update_all(desc: &TableDescriptor) -> Self {
        OnConflict::DoUpdate {
            target: desc.primary_key.to_vec(),
            set: desc.mutable_columns(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub table: &'static str,
    pub columns: Vec<&'static str>,
    pub values: Vec<SqlValue>,
    pub on_conflict: Option<OnConflict>,
}

impl Insert {
    /// Insert every column of `record` allowed by `scope`.
    pub fn from_record<R: Record>(record: &R, scope: ColumnScope) -> Self {
        let desc = R::descriptor();
        let row = record.to_row();
        let columns = desc.insert_columns(scope);
        let values = columns.iter().map(|c| row.value_or_null(c)).collect();
        Self {
            table: desc.name,
            columns,
            values,
            on_conflict: None,
        }
    }

    pub fn on_conflict(mut self, clause: OnConflict) -> Self {
        self.on_conflict = Some(clause);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: &'static str,
    pub set: Vec<(&'static str, SqlValue)>,
    pub filter: Vec<Predicate>,
}

impl Update {
    pub fn table(desc: &TableDescriptor) -> Self {
        Self {
            table: desc.name,
            set: Vec::new(),
            filter: Vec::new(),
        }
    }

    pub fn set(mut self, column: &'static str, value: impl Into<SqlValue>) -> Self {
        self.set.push((column, value.into()));
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filter.push(predicate);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub table: &'static str,
    pub filter: Vec<Predicate>,
}

impl Delete {
    pub fn table(desc: &TableDescriptor) -> Self {
        Self {
            table: desc.name,
            filter: Vec::new(),
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filter.push(predicate);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(Select),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
}

impl From<Select> for Statement {
    fn from(s: Select) -> Self {
        Statement::Select(s)
    }
}

impl From<Insert> for Statement {
    fn from(s: Insert) -> Self {
        Statement::Insert(s)
    }
}

impl From<Update> for Statement {
    fn from(s: Update) -> Self {
        Statement::Update(s)
    }
}

impl From<Delete> for Statement {
    fn from(s: Delete) -> Self {
        Statement::Delete(s)
    }
}

/// Positional argument collector.
#[derive(Default)]
struct Args {
    values: Vec<SqlValue>,
}

impl Args {
    fn bind(&mut self, value: SqlValue) -> String {
        self.values.push(value);
        format!("${}", self.values.len())
    }
}

fn render_where(filter: &[Predicate], args: &mut Args, sql: &mut String) {
    if filter.is_empty() {
        return;
    }
    let clauses: Vec<String> = filter.iter().map(|p| p.render(args)).collect();
    let _ = write!(sql, " WHERE {}", clauses.join(" AND "));
}

impl Statement {
    pub fn table(&self) -> &'static str {
        match self {
            Statement::Select(s) => s.table,
            Statement::Insert(s) => s.table,
            Statement::Update(s) => s.table,
            Statement::Delete(s) => s.table,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Statement::Select(_) => "select",
            Statement::Insert(_) => "insert",
            Statement::Update(_) => "update",
            Statement::Delete(_) => "delete",
        }
    }

    /// Render Postgres text and its positional arguments.
    pub fn to_sql(&self) -> (String, Vec<SqlValue>) {
        let mut args = Args::default();
        let mut sql = String::new();
        match self {
            Statement::Select(s) => {
                let _ = write!(sql, "SELECT {} FROM {}", s.columns.join(", "), s.table);
                render_where(&s.filter, &mut args, &mut sql);
                if !s.order_by.is_empty() {
                    let parts: Vec<String> = s
                        .order_by
                        .iter()
                        .map(|(c, o)| match o {
                            SortOrder::Asc => format!("{} ASC", c),
                            SortOrder::Desc => format!("{} DESC", c),
                        })
                        .collect();
                    let _ = write!(sql, " ORDER BY {}", parts.join(", "));
                }
                if let Some(n) = s.limit {
                    let _ = write!(sql, " LIMIT {}", n);
                }
                match s.lock {
                    Some(RowLock::ForNoKeyUpdate) => sql.push_str(" FOR NO KEY UPDATE"),
                    Some(RowLock::ForUpdate) => sql.push_str(" FOR UPDATE"),
                    None => {}
                }
            }
            Statement::Insert(s) => {
                let placeholders: Vec<String> =
                    s.values.iter().map(|v| args.bind(v.clone())).collect();
                let _ = write!(
                    sql,
                    "INSERT INTO {} ({}) VALUES ({})",
                    s.table,
                    s.columns.join(", "),
                    placeholders.join(", ")
                );
                match &s.on_conflict {
                    Some(OnConflict::DoNothing) => sql.push_str(" ON CONFLICT DO NOTHING"),
                    Some(OnConflict::DoUpdate { target, set }) => {
                        let assignments: Vec<String> = set
                            .iter()
                            .map(|c| format!("{} = EXCLUDED.{}", c, c))
                            .collect();
                        let _ = write!(
                            sql,
                            " ON CONFLICT ({}) DO UPDATE SET {}",
                            target.join(", "),
                            assignments.join(", ")
                        );
                    }
                    None => {}
                }
            }
            Statement::Update(s) => {
                let assignments: Vec<String> = s
                    .set
                    .iter()
                    .map(|(c, v)| format!("{} = {}", c, args.bind(v.clone())))
                    .collect();
                let _ = write!(sql, "UPDATE {} SET {}", s.table, assignments.join(", "));
                render_where(&s.filter, &mut args, &mut sql);
            }
            Statement::Delete(s) => {
                let _ = write!(sql, "DELETE FROM {}", s.table);
                render_where(&s.filter, &mut args, &mut sql);
            }
        }
        (sql, args.values)
    }
}

/// Statements queued for one pipelined round trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    statements: Vec<Statement>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&mut self, statement: impl Into<Statement>) {
        self.statements.push(statement.into());
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }
}
