// crates/stockrx-ops/src/patch/builtin/batch_expiry.rs
// batch_expiry_update: move batches past their expiry date to `expired`

use crate::error::{Result, StockrxError};
use crate::patch::{
    BatchResult, DataPatch, OptionSpec, PatchCategory, PatchMetadata, PatchOptions,
    RecordOutcome, TargetSnapshot, process_records,
};
use chrono::{Days, Local, NaiveDate};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

pub const NAME: &str = "batch_expiry_update";

const STATUS_ACTIVE: &str = "active";
const STATUS_EXPIRING_SOON: &str = "expiring_soon";
const STATUS_EXPIRED: &str = "expired";

const OPTIONS: &[OptionSpec] = &[
    OptionSpec {
        key: "EXPIRY_DATE",
        description: "Reference date (YYYY-MM-DD)",
        required: false,
        default: Some("today"),
    },
    OptionSpec {
        key: "GRACE_PERIOD",
        description: "Days past expiry before a batch counts as expired (0-365)",
        required: false,
        default: Some("0"),
    },
    OptionSpec {
        key: "INCLUDE_EXPIRING_SOON",
        description: "Also flag active batches about to expire",
        required: false,
        default: Some("false"),
    },
    OptionSpec {
        key: "WARNING_DAYS",
        description: "Look-ahead window for expiring_soon (1-365)",
        required: false,
        default: Some("30"),
    },
];

pub fn metadata() -> PatchMetadata {
    PatchMetadata {
        name: NAME,
        description: "Mark expired batches and optionally flag batches expiring soon",
        category: PatchCategory::Maintenance,
        target_tables: &["batches"],
        version: "1.1.0",
        options: OPTIONS,
    }
}

fn days_in_range(
    options: &PatchOptions,
    key: &str,
    range: std::ops::RangeInclusive<i64>,
    default: i64,
) -> Result<u64> {
    let value = options.get_i64(key)?.unwrap_or(default);
    if !range.contains(&value) {
        let (min, max) = (range.start(), range.end());
        return Err(StockrxError::invalid_option(
            key.to_ascii_lowercase(),
            format!("must be between {min} and {max} days, got {value}"),
        ));
    }
    Ok(value as u64)
}

#[derive(Debug)]
pub struct BatchExpiryPatch {
    /// Batches expiring strictly before this date are expired
    cutoff: NaiveDate,
    /// End of the expiring-soon window, when enabled
    warn_until: Option<NaiveDate>,
    dry_run: bool,
    snapshot: TargetSnapshot,
}

impl BatchExpiryPatch {
    pub fn new(options: &PatchOptions) -> Result<Self> {
        let reference = options
            .get_date("EXPIRY_DATE")?
            .unwrap_or_else(|| Local::now().date_naive());
        let grace = days_in_range(options, "GRACE_PERIOD", 0..=365, 0)?;
        let warning = days_in_range(options, "WARNING_DAYS", 1..=365, 30)?;
        let include_soon = options.get_bool("INCLUDE_EXPIRING_SOON")?.unwrap_or(false);

        let out_of_calendar =
            || StockrxError::invalid_option("expiry_date", "date out of supported range");
        let cutoff = reference
            .checked_sub_days(Days::new(grace))
            .ok_or_else(out_of_calendar)?;
        let warn_until = if include_soon {
            Some(
                reference
                    .checked_add_days(Days::new(warning))
                    .ok_or_else(out_of_calendar)?,
            )
        } else {
            None
        };

        Ok(Self {
            cutoff,
            warn_until,
            dry_run: options.dry_run()?,
            snapshot: TargetSnapshot::new(),
        })
    }

    fn target_ids_sql() -> &'static str {
        "SELECT id FROM batches
         WHERE expires_on IS NOT NULL
           AND ((expires_on < ?1 AND status != 'expired')
             OR (?2 IS NOT NULL AND expires_on >= ?1 AND expires_on <= ?2 AND status = 'active'))
         ORDER BY id"
    }

    fn target_params(&self) -> (String, Option<String>) {
        (
            self.cutoff.format("%Y-%m-%d").to_string(),
            self.warn_until.map(|d| d.format("%Y-%m-%d").to_string()),
        )
    }

    /// Status a batch should move to, if any
    fn next_status(&self, expires_on: NaiveDate, status: &str) -> Option<&'static str> {
        if expires_on < self.cutoff {
            return (status != STATUS_EXPIRED).then_some(STATUS_EXPIRED);
        }
        match self.warn_until {
            Some(until) if expires_on <= until && status == STATUS_ACTIVE => {
                Some(STATUS_EXPIRING_SOON)
            }
            _ => None,
        }
    }

    fn update_one(&self, conn: &Connection, id: i64) -> Result<RecordOutcome> {
        let row: Option<(Option<String>, String)> = conn
            .query_row(
                "SELECT expires_on, status FROM batches WHERE id = ?",
                [id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        let Some((expires_on, status)) = row else {
            return Err(StockrxError::Other("record not found".into()));
        };
        let Some(expires_on) = expires_on else {
            return Ok(RecordOutcome::Unchanged { id });
        };
        let expires_on = NaiveDate::parse_from_str(&expires_on, "%Y-%m-%d")
            .map_err(|e| {
                StockrxError::Other(format!("unreadable expires_on '{expires_on}': {e}"))
            })?;

        let Some(next) = self.next_status(expires_on, &status) else {
            return Ok(RecordOutcome::Unchanged { id });
        };
        if !self.dry_run {
            conn.execute(
                "UPDATE batches SET status = ?, updated_at = datetime('now') WHERE id = ?",
                params![next, id],
            )?;
        }
        Ok(RecordOutcome::Updated { id })
    }
}

impl DataPatch for BatchExpiryPatch {
    fn estimate_target_count(&self, conn: &Connection) -> Result<u64> {
        let (cutoff, until) = self.target_params();
        let ids = self
            .snapshot
            .ids(conn, Self::target_ids_sql(), params![cutoff, until])?;
        Ok(ids.len() as u64)
    }

    fn execute_batch(
        &self,
        conn: &Connection,
        batch_size: usize,
        offset: usize,
    ) -> Result<BatchResult> {
        let (cutoff, until) = self.target_params();
        let (ids, finished) = self.snapshot.page(
            conn,
            Self::target_ids_sql(),
            params![cutoff, until],
            batch_size,
            offset,
        )?;
        if ids.is_empty() {
            return Ok(BatchResult::exhausted());
        }

        let records = process_records(conn, &ids, |conn, id| self.update_one(conn, id))?;
        debug!(
            offset,
            count = ids.len(),
            dry_run = self.dry_run,
            "Batch expiry batch"
        );

        Ok(BatchResult {
            count: ids.len(),
            finished,
            records,
            totals: None,
        })
    }

    fn dry_run(&self) -> bool {
        self.dry_run
    }
}

pub fn create(options: &PatchOptions) -> Result<Box<dyn DataPatch>> {
    Ok(Box::new(BatchExpiryPatch::new(options)?))
}
