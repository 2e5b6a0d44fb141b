// crates/stockrx-ops/src/patch/builtin/price_adjustment.rs
// inventory_price_adjustment: bulk price changes over inventory items

use crate::error::{Result, StockrxError};
use crate::patch::{
    BatchResult, DataPatch, OptionSpec, PatchCategory, PatchMetadata, PatchOptions,
    RecordOutcome, TargetSnapshot, ValueTotals, process_records,
};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

pub const NAME: &str = "inventory_price_adjustment";

const OPTIONS: &[OptionSpec] = &[
    OptionSpec {
        key: "ADJUSTMENT_TYPE",
        description: "percentage | fixed_amount | multiply",
        required: true,
        default: None,
    },
    OptionSpec {
        key: "ADJUSTMENT_VALUE",
        description: "percentage -100..1000, fixed_amount +/-1,000,000 yen, multiply (0, 10]",
        required: true,
        default: None,
    },
    OptionSpec {
        key: "CATEGORY",
        description: "Only items in this category",
        required: false,
        default: None,
    },
    OptionSpec {
        key: "MIN_PRICE",
        description: "Only items priced at or above this",
        required: false,
        default: None,
    },
    OptionSpec {
        key: "MAX_PRICE",
        description: "Only items priced at or below this",
        required: false,
        default: None,
    },
];

pub fn metadata() -> PatchMetadata {
    PatchMetadata {
        name: NAME,
        description: "Adjust inventory prices by percentage, fixed amount or multiplier",
        category: PatchCategory::Inventory,
        target_tables: &["inventories"],
        version: "1.2.0",
        options: OPTIONS,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Adjustment {
    Percentage(f64),
    FixedAmount(f64),
    Multiply(f64),
}

impl Adjustment {
    fn parse(options: &PatchOptions) -> Result<Self> {
        let kind = options.require("ADJUSTMENT_TYPE")?;
        let value = options
            .get_f64("ADJUSTMENT_VALUE")?
            .ok_or_else(|| StockrxError::MissingOption("adjustment_value".into()))?;

        let adjustment = match kind.to_ascii_lowercase().as_str() {
            "percentage" => {
                if !(-100.0..=1000.0).contains(&value) {
                    return Err(out_of_range("must be between -100 and 1000 for percentage type"));
                }
                Adjustment::Percentage(value)
            }
            "fixed_amount" => {
                if !(-1_000_000.0..=1_000_000.0).contains(&value) {
                    return Err(out_of_range(
                        "must be between -1000000 and 1000000 for fixed_amount type",
                    ));
                }
                Adjustment::FixedAmount(value)
            }
            "multiply" => {
                if value <= 0.0 || value > 10.0 {
                    return Err(out_of_range(
                        "must be greater than 0 and at most 10 for multiply type",
                    ));
                }
                Adjustment::Multiply(value)
            }
            other => {
                return Err(StockrxError::invalid_option(
                    "adjustment_type",
                    format!("must be one of percentage, fixed_amount, multiply (got '{other}')"),
                ));
            }
        };
        Ok(adjustment)
    }

    /// New price in yen, rounded half away from zero and never negative.
    pub fn apply(&self, price: i64) -> i64 {
        let price = price as f64;
        let next = match *self {
            Adjustment::Percentage(v) => (price * (1.0 + v / 100.0)).round(),
            Adjustment::FixedAmount(v) => (price + v).round(),
            Adjustment::Multiply(v) => (price * v).round(),
        };
        next.max(0.0) as i64
    }
}

fn out_of_range(expected: &str) -> StockrxError {
    StockrxError::invalid_option("adjustment_value", expected)
}

fn non_negative(options: &PatchOptions, key: &str) -> Result<Option<i64>> {
    match options.get_i64(key)? {
        Some(n) if n < 0 => Err(StockrxError::invalid_option(
            key.to_ascii_lowercase(),
            format!("must be a non-negative integer, got {n}"),
        )),
        other => Ok(other),
    }
}

#[derive(Debug)]
pub struct PriceAdjustmentPatch {
    adjustment: Adjustment,
    category: Option<String>,
    min_price: Option<i64>,
    max_price: Option<i64>,
    dry_run: bool,
    snapshot: TargetSnapshot,
}

impl PriceAdjustmentPatch {
    pub fn new(options: &PatchOptions) -> Result<Self> {
        let adjustment = Adjustment::parse(options)?;
        let min_price = non_negative(options, "MIN_PRICE")?;
        let max_price = non_negative(options, "MAX_PRICE")?;
        if let (Some(min), Some(max)) = (min_price, max_price)
            && min > max
        {
            return Err(StockrxError::invalid_option(
                "min_price",
                format!("must not exceed max_price ({min} > {max})"),
            ));
        }

        Ok(Self {
            adjustment,
            category: options
                .get("CATEGORY")
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            min_price,
            max_price,
            dry_run: options.dry_run()?,
            snapshot: TargetSnapshot::new(),
        })
    }

    fn target_ids_sql() -> &'static str {
        "SELECT id FROM inventories
         WHERE (?1 IS NULL OR category = ?1)
           AND (?2 IS NULL OR price >= ?2)
           AND (?3 IS NULL OR price <= ?3)
         ORDER BY id"
    }

    fn page(
        &self,
        conn: &Connection,
        batch_size: usize,
        offset: usize,
    ) -> Result<(Vec<i64>, bool)> {
        self.snapshot.page(
            conn,
            Self::target_ids_sql(),
            params![self.category, self.min_price, self.max_price],
            batch_size,
            offset,
        )
    }

    fn adjust_one(
        &self,
        conn: &Connection,
        id: i64,
        totals: &mut ValueTotals,
    ) -> Result<RecordOutcome> {
        let price: Option<i64> = conn
            .query_row("SELECT price FROM inventories WHERE id = ?", [id], |r| {
                r.get(0)
            })
            .optional()?;
        let Some(price) = price else {
            return Err(StockrxError::Other("record not found".into()));
        };

        let next = self.adjustment.apply(price);
        if !self.dry_run && next != price {
            conn.execute(
                "UPDATE inventories SET price = ?, updated_at = datetime('now') WHERE id = ?",
                params![next, id],
            )?;
        }
        totals.add(price, next);

        Ok(if next == price {
            RecordOutcome::Unchanged { id }
        } else {
            RecordOutcome::Updated { id }
        })
    }
}

impl DataPatch for PriceAdjustmentPatch {
    fn estimate_target_count(&self, conn: &Connection) -> Result<u64> {
        let ids = self.snapshot.ids(
            conn,
            Self::target_ids_sql(),
            params![self.category, self.min_price, self.max_price],
        )?;
        Ok(ids.len() as u64)
    }

    fn execute_batch(
        &self,
        conn: &Connection,
        batch_size: usize,
        offset: usize,
    ) -> Result<BatchResult> {
        let (ids, finished) = self.page(conn, batch_size, offset)?;
        if ids.is_empty() {
            return Ok(BatchResult::exhausted());
        }

        let mut totals = ValueTotals::default();
        let records = process_records(conn, &ids, |conn, id| {
            self.adjust_one(conn, id, &mut totals)
        })?;

        debug!(
            offset,
            count = ids.len(),
            delta = totals.delta(),
            dry_run = self.dry_run,
            "Price adjustment batch"
        );
        Ok(BatchResult {
            count: ids.len(),
            finished,
            records,
            totals: Some(totals),
        })
    }

    fn dry_run(&self) -> bool {
        self.dry_run
    }

    fn totals_label(&self) -> &'static str {
        "Total price"
    }
}

pub fn create(options: &PatchOptions) -> Result<Box<dyn DataPatch>> {
    Ok(Box::new(PriceAdjustmentPatch::new(options)?))
}
