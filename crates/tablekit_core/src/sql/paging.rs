//! Row-numbered pagination without `LIMIT/OFFSET`.
//!
//! # Responsibility
//! - Translate a 1-based page request into a row-number window.
//! - Produce the page statement and the matching count statement as the
//!   two named result streams of one composite query.
//!
//! # Invariants
//! - Page rows satisfy `p_start_row < rnum <= p_end_row`, numbered in
//!   order-by order starting at 1.
//! - The order-by is applied by the inner select, so it may name either a
//!   select alias (`Owner`) or a qualified source column (`P.ID`).
//! - The count ignores ordering and paging bounds.
//! - `page_size` must be positive.
//!
//! # See also
//! - `db::executor::query_multiple`

use super::{order_by_clause, where_clause, StatementError};
use crate::db::executor::CompositeQuery;
use crate::db::NamedParams;

/// Result stream carrying the page rows.
pub const PAGE_CURSOR: &str = "C1";
/// Result stream carrying the total count.
pub const COUNT_CURSOR: &str = "C2";
pub const START_ROW_PARAM: &str = "p_start_row";
pub const END_ROW_PARAM: &str = "p_end_row";

/// Inputs of a paginated query over an arbitrary table expression.
///
/// `columns`, `table_expression`, `filter` and `order_by` are raw SQL text
/// inserted verbatim; values belong in `params`.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub columns: String,
    /// A table name or a join expression.
    pub table_expression: String,
    /// 1-based page number.
    pub page_index: i64,
    pub page_size: i64,
    pub filter: Option<String>,
    pub order_by: Option<String>,
    pub params: NamedParams,
}

impl PageRequest {
    pub fn new(
        columns: impl Into<String>,
        table_expression: impl Into<String>,
        page_index: i64,
        page_size: i64,
    ) -> Self {
        Self {
            columns: columns.into(),
            table_expression: table_expression.into(),
            page_index,
            page_size,
            filter: None,
            order_by: None,
            params: NamedParams::new(),
        }
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn params(mut self, params: NamedParams) -> Self {
        self.params = params;
        self
    }
}

/// Page + count statement pair with its row window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagedStatement {
    pub page_sql: String,
    pub count_sql: String,
    pub start_row: i64,
    pub end_row: i64,
}

impl PagedStatement {
    /// Builds both statements for `request`.
    ///
    /// # Errors
    /// - `InvalidPageSize` when `page_size <= 0`.
    pub fn build(request: &PageRequest) -> Result<Self, StatementError> {
        if request.page_size <= 0 {
            return Err(StatementError::InvalidPageSize(request.page_size));
        }

        let start_row = request
            .page_index
            .saturating_sub(1)
            .saturating_mul(request.page_size);
        let end_row = start_row.saturating_add(request.page_size);

        let filter = where_clause(request.filter.as_deref());
        let order = order_by_clause(request.order_by.as_deref());
        // Window functions keep the outer query from being flattened, so the
        // derived table is numbered in the order the inner select yields.
        let page_sql = format!(
            "SELECT * FROM (SELECT paged.*, ROW_NUMBER() OVER () AS rnum \
             FROM (SELECT {columns} FROM {table}{filter}{order}) AS paged) \
             WHERE rnum > :{START_ROW_PARAM} AND rnum <= :{END_ROW_PARAM} ORDER BY rnum",
            columns = request.columns.trim(),
            table = request.table_expression.trim(),
        );
        let count_sql = format!(
            "SELECT COUNT(*) FROM {}{filter}",
            request.table_expression.trim()
        );

        Ok(Self {
            page_sql,
            count_sql,
            start_row,
            end_row,
        })
    }

    /// Both statements as one composite query: `C1` page rows, `C2` count.
    pub fn composite(&self) -> CompositeQuery {
        CompositeQuery::new()
            .cursor(PAGE_CURSOR, self.page_sql.clone())
            .cursor(COUNT_CURSOR, self.count_sql.clone())
    }

    /// Caller parameters plus the row window; the window wins on name clashes.
    pub fn bind_params(&self, caller: &NamedParams) -> NamedParams {
        let window = NamedParams::new()
            .with(START_ROW_PARAM, self.start_row)
            .with(END_ROW_PARAM, self.end_row);
        let mut params = caller.clone();
        params.merge(&window);
        params
    }
}

#[cfg(test)]
mod tests {
    use super::{PageRequest, PagedStatement, COUNT_CURSOR, PAGE_CURSOR};
    use crate::db::NamedParams;
    use crate::sql::StatementError;
    use rusqlite::types::Value;

    #[test]
    fn window_is_derived_from_page_index_and_size() {
        let statement = PagedStatement::build(&PageRequest::new("*", "T", 2, 10)).unwrap();
        assert_eq!(statement.start_row, 10);
        assert_eq!(statement.end_row, 20);
    }

    #[test]
    fn page_statement_numbers_rows_in_order_by_order() {
        let request = PageRequest::new("a.ID, b.NAME", "A a JOIN B b ON b.ID = a.B_ID", 1, 5)
            .filter("a.ID > :min")
            .order_by("b.NAME DESC");
        let statement = PagedStatement::build(&request).unwrap();

        assert_eq!(
            statement.page_sql,
            "SELECT * FROM (SELECT paged.*, ROW_NUMBER() OVER () AS rnum \
             FROM (SELECT a.ID, b.NAME FROM A a JOIN B b ON b.ID = a.B_ID \
             WHERE a.ID > :min ORDER BY b.NAME DESC) AS paged) \
             WHERE rnum > :p_start_row AND rnum <= :p_end_row ORDER BY rnum"
        );
        assert_eq!(
            statement.count_sql,
            "SELECT COUNT(*) FROM A a JOIN B b ON b.ID = a.B_ID WHERE a.ID > :min"
        );
    }

    #[test]
    fn missing_order_leaves_inner_select_unordered() {
        let statement = PagedStatement::build(&PageRequest::new("ID", "T", 1, 5)).unwrap();
        assert!(statement.page_sql.contains("FROM (SELECT ID FROM T) AS paged)"));
        assert_eq!(statement.count_sql, "SELECT COUNT(*) FROM T");
    }

    #[test]
    fn non_positive_page_size_is_rejected() {
        assert_eq!(
            PagedStatement::build(&PageRequest::new("*", "T", 1, 0)),
            Err(StatementError::InvalidPageSize(0))
        );
        assert_eq!(
            PagedStatement::build(&PageRequest::new("*", "T", 1, -3)),
            Err(StatementError::InvalidPageSize(-3))
        );
    }

    #[test]
    fn page_index_below_one_never_widens_the_window() {
        let statement = PagedStatement::build(&PageRequest::new("*", "T", 0, 10)).unwrap();
        assert_eq!(statement.start_row, -10);
        assert_eq!(statement.end_row - statement.start_row, 10);

        let extreme = PagedStatement::build(&PageRequest::new("*", "T", i64::MIN, 10)).unwrap();
        assert!(extreme.end_row <= 0);
    }

    #[test]
    fn composite_names_cursors_and_window_overrides_params() {
        let statement = PagedStatement::build(&PageRequest::new("*", "T", 3, 4)).unwrap();
        let composite = statement.composite();
        assert_eq!(
            composite.cursor_names().collect::<Vec<_>>(),
            vec![PAGE_CURSOR, COUNT_CURSOR]
        );
        assert_eq!(composite.sql(COUNT_CURSOR), Some("SELECT COUNT(*) FROM T"));

        let caller = NamedParams::new()
            .with("p_start_row", 999_i64)
            .with("min", 1_i64);
        let bound = statement.bind_params(&caller);
        assert_eq!(bound.get("p_start_row"), Some(&Value::Integer(8)));
        assert_eq!(bound.get("p_end_row"), Some(&Value::Integer(12)));
        assert_eq!(bound.get("min"), Some(&Value::Integer(1)));
    }
}
