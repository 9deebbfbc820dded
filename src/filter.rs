//! Schema/table allow-list filtering.
//!
//! A record passes only if it passes both dimensions: its schema is in
//! `only_schemas` (or that list is unset) and its table is in `only_tables`
//! (or that list is unset). Table entries may be bare (`orders`) or
//! qualified (`db1.orders`). The filter is a pure predicate; the MySQL
//! source also consults it so rejected tables are skipped before any
//! metadata lookup or conversion work.

#[derive(Debug, Clone, Default)]
pub struct TableFilter {
    only_schemas: Option<Vec<String>>,
    only_tables: Option<Vec<String>>,
}

impl TableFilter {
    pub fn new(only_schemas: Option<Vec<String>>, only_tables: Option<Vec<String>>) -> Self {
        // An empty list means "no restriction", same as unset.
        let normalize = |list: Option<Vec<String>>| list.filter(|l| !l.is_empty());
        Self {
            only_schemas: normalize(only_schemas),
            only_tables: normalize(only_tables),
        }
    }

    /// Accept-all filter.
    pub fn pass_all() -> Self {
        Self::default()
    }

    pub fn accept(&self, schema: &str, table: &str) -> bool {
        if let Some(schemas) = &self.only_schemas {
            if !schemas.iter().any(|s| s == schema) {
                return false;
            }
        }

        if let Some(tables) = &self.only_tables {
            let qualified = format!("{}.{}", schema, table);
            if !tables.iter().any(|t| t == table || *t == qualified) {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_unset_lists_accept_all() {
        let filter = TableFilter::pass_all();
        assert!(filter.accept("db1", "orders"));
        assert!(filter.accept("anything", "at_all"));
    }

    #[test]
    fn test_empty_lists_accept_all() {
        let filter = TableFilter::new(Some(vec![]), Some(vec![]));
        assert!(filter.accept("db1", "orders"));
    }

    #[test]
    fn test_schema_dimension() {
        let filter = TableFilter::new(Some(strings(&["db1"])), None);
        assert!(filter.accept("db1", "orders"));
        assert!(filter.accept("db1", "customers"));
        assert!(!filter.accept("db2", "logs"));
    }

    #[test]
    fn test_table_dimension_bare() {
        let filter = TableFilter::new(None, Some(strings(&["orders"])));
        assert!(filter.accept("db1", "orders"));
        assert!(filter.accept("db2", "orders"));
        assert!(!filter.accept("db1", "customers"));
    }

    #[test]
    fn test_table_dimension_qualified() {
        let filter = TableFilter::new(None, Some(strings(&["db1.orders"])));
        assert!(filter.accept("db1", "orders"));
        assert!(!filter.accept("db2", "orders"));
    }

    #[test]
    fn test_both_dimensions_must_pass() {
        let filter = TableFilter::new(Some(strings(&["db1"])), Some(strings(&["orders"])));
        assert!(filter.accept("db1", "orders"));
        assert!(!filter.accept("db1", "customers"));
        assert!(!filter.accept("db2", "orders"));
    }
}
