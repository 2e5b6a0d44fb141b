// crates/stockrx-ops/src/reconcile/counters.rs
// Static counter cache definitions per parent entity

use serde::{Deserialize, Serialize};

/// Parent entities that carry counter caches
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    strum::Display, strum::EnumString, strum::EnumIter, strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive)]
pub enum EntityKind {
    #[strum(to_string = "inventory", serialize = "inventories")]
    Inventory,
    #[strum(to_string = "store", serialize = "stores")]
    Store,
}

/// One cached count column and the relation it mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterDefinition {
    /// Column on the parent table holding the cached value
    pub column: &'static str,
    pub child_table: &'static str,
    /// Column on the child table pointing at the parent id
    pub foreign_key: &'static str,
    /// Extra SQL predicate on the child table (e.g. only pending rows)
    pub filter: Option<&'static str>,
}

impl CounterDefinition {
    /// `SELECT COUNT(*)` over the true child relation, bound to `?1` = parent id.
    pub fn count_sql(&self) -> String {
        match self.filter {
            Some(filter) => format!(
                "SELECT COUNT(*) FROM {} WHERE {} = ?1 AND {}",
                self.child_table, self.foreign_key, filter
            ),
            None => format!(
                "SELECT COUNT(*) FROM {} WHERE {} = ?1",
                self.child_table, self.foreign_key
            ),
        }
    }

    /// Correlated subquery form used by repair writes, bound to `?1` = parent id.
    pub fn resync_sql(&self, parent_table: &str) -> String {
        format!(
            "UPDATE {parent_table} SET {column} = ({count}) WHERE id = ?1",
            column = self.column,
            count = self.count_sql(),
        )
    }
}

const INVENTORY_COUNTERS: &[CounterDefinition] = &[
    CounterDefinition {
        column: "batches_count",
        child_table: "batches",
        foreign_key: "inventory_id",
        filter: None,
    },
    CounterDefinition {
        column: "inventory_logs_count",
        child_table: "inventory_logs",
        foreign_key: "inventory_id",
        filter: None,
    },
    CounterDefinition {
        column: "shipments_count",
        child_table: "shipments",
        foreign_key: "inventory_id",
        filter: None,
    },
    CounterDefinition {
        column: "receipts_count",
        child_table: "receipts",
        foreign_key: "inventory_id",
        filter: None,
    },
];

const STORE_COUNTERS: &[CounterDefinition] = &[
    CounterDefinition {
        column: "store_inventories_count",
        child_table: "store_inventories",
        foreign_key: "store_id",
        filter: None,
    },
    CounterDefinition {
        column: "pending_outgoing_transfers_count",
        child_table: "inter_store_transfers",
        foreign_key: "source_store_id",
        filter: Some("status = 'pending'"),
    },
    CounterDefinition {
        column: "pending_incoming_transfers_count",
        child_table: "inter_store_transfers",
        foreign_key: "destination_store_id",
        filter: Some("status = 'pending'"),
    },
];

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Parent table name
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Inventory => "inventories",
            EntityKind::Store => "stores",
        }
    }

    pub fn counters(&self) -> &'static [CounterDefinition] {
        match self {
            EntityKind::Inventory => INVENTORY_COUNTERS,
            EntityKind::Store => STORE_COUNTERS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn parse(value: &str) -> EntityKind {
        EntityKind::from_str(value).unwrap()
    }

    #[test]
    fn test_parse_entity_kind_aliases() {
        assert_eq!(parse("inventory"), EntityKind::Inventory);
        assert_eq!(parse("Inventories"), EntityKind::Inventory);
        assert_eq!(parse("STORE"), EntityKind::Store);
        assert!(EntityKind::from_str("batch").is_err());
    }

    #[test]
    fn test_entity_kind_displays_singular_name() {
        assert_eq!(EntityKind::Inventory.to_string(), "inventory");
        assert_eq!(format!("{}", EntityKind::Store), "store");
        assert_eq!(EntityKind::Store.as_str(), "store");
        assert_eq!(parse(EntityKind::Store.as_str()), EntityKind::Store);
    }

    #[test]
    fn test_count_sql_with_filter() {
        let def = STORE_COUNTERS[1];
        let expected = "SELECT COUNT(*) FROM inter_store_transfers \
                        WHERE source_store_id = ?1 AND status = 'pending'";
        assert_eq!(def.count_sql(), expected);
    }

    #[test]
    fn test_resync_sql() {
        let def = INVENTORY_COUNTERS[0];
        let expected = "UPDATE inventories SET batches_count = \
                        (SELECT COUNT(*) FROM batches WHERE inventory_id = ?1) WHERE id = ?1";
        assert_eq!(def.resync_sql("inventories"), expected);
    }

    #[test]
    fn test_every_kind_has_counters() {
        use strum::IntoEnumIterator;
        for kind in EntityKind::iter() {
            assert!(!kind.counters().is_empty(), "{} has no counters", kind);
        }
    }
}
