//! Row query builder.
//!
//! Renders filters, embeds, ordering, and limits into the query-string
//! dialect of the row interface (`column=eq.value`, `order=created_at.desc`).

use std::fmt::Display;

/// Upsert conflict handling.
#[derive(Debug, Clone, Copy)]
pub enum Conflict {
    /// Replace the existing row's columns with the incoming ones.
    Merge(&'static str),
    /// Keep the existing row untouched.
    Ignore(&'static str),
}

impl Conflict {
    /// Conflict target columns (`on_conflict=`).
    #[must_use]
    pub const fn columns(&self) -> &'static str {
        match self {
            Self::Merge(columns) | Self::Ignore(columns) => columns,
        }
    }

    /// `Prefer` header resolution directive.
    #[must_use]
    pub const fn resolution(&self) -> &'static str {
        match self {
            Self::Merge(_) => "resolution=merge-duplicates",
            Self::Ignore(_) => "resolution=ignore-duplicates",
        }
    }
}

/// A read, update, or delete against one collection.
#[derive(Debug, Clone)]
pub struct RowQuery {
    table: &'static str,
    select: Option<String>,
    filters: Vec<(String, String)>,
    order: Option<String>,
    limit: Option<usize>,
}

impl RowQuery {
    #[must_use]
    pub const fn table(table: &'static str) -> Self {
        Self {
            table,
            select: None,
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    #[must_use]
    pub const fn table_name(&self) -> &'static str {
        self.table
    }

    /// Column list, including embedded relations (`*,products(*)`).
    #[must_use]
    pub fn select(mut self, columns: &str) -> Self {
        self.select = Some(columns.to_string());
        self
    }

    #[must_use]
    pub fn eq(self, column: &str, value: impl Display) -> Self {
        self.filter(column, format!("eq.{value}"))
    }

    #[must_use]
    pub fn gte(self, column: &str, value: impl Display) -> Self {
        self.filter(column, format!("gte.{value}"))
    }

    #[must_use]
    pub fn lte(self, column: &str, value: impl Display) -> Self {
        self.filter(column, format!("lte.{value}"))
    }

    /// Array column shares at least one element with `values`.
    #[must_use]
    pub fn overlaps<S: AsRef<str>>(self, column: &str, values: &[S]) -> Self {
        let items = values
            .iter()
            .map(|v| quote(v.as_ref()))
            .collect::<Vec<_>>()
            .join(",");
        self.filter(column, format!("ov.{{{items}}}"))
    }

    /// Case-insensitive substring match on any of `columns`.
    #[must_use]
    pub fn ilike_any(self, columns: &[&str], needle: &str) -> Self {
        let pattern = quote(&format!("*{needle}*"));
        let clauses = columns
            .iter()
            .map(|column| format!("{column}.ilike.{pattern}"))
            .collect::<Vec<_>>()
            .join(",");
        self.filter("or", format!("({clauses})"))
    }

    #[must_use]
    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        let direction = if ascending { "asc" } else { "desc" };
        self.order = Some(format!("{column}.{direction}"));
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn filter(mut self, column: &str, expression: String) -> Self {
        self.filters.push((column.to_string(), expression));
        self
    }

    /// Query-string pairs in a stable order: select, filters, order, limit.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(self.filters.len() + 3);
        if let Some(select) = &self.select {
            pairs.push(("select".to_string(), select.clone()));
        }
        pairs.extend(self.filters.iter().cloned());
        if let Some(order) = &self.order {
            pairs.push(("order".to_string(), order.clone()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        pairs
    }
}

/// Double-quote a value so reserved characters (`,` `.` `(` `)`) survive.
fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}
