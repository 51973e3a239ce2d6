use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use crate::clients::store::Filter;
use crate::clients::{DataStore, RateSource};
use crate::error::AppError;
use crate::models::{ExchangeRate, FX_RATES_TABLE};

pub const BASE_CURRENCY: &str = "USD";
pub const QUOTE_CURRENCIES: [&str; 3] = ["EUR", "THB", "RUB"];

/// Where a single rate write currently stands. A write starts as an insert
/// and moves to an update on `(base, quote)` only if the insert fails.
#[derive(Debug, Clone, PartialEq)]
pub enum RateWrite {
    InsertAttempted,
    UpdateAttempted { insert_error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    Inserted,
    Updated,
    Failed(String),
}

impl WriteOutcome {
    pub fn succeeded(&self) -> bool {
        !matches!(self, WriteOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FxOutcome {
    /// Rates for the current UTC day already exist.
    Skipped,
    Written(Vec<(String, WriteOutcome)>),
}

impl FxOutcome {
    pub fn updated_currencies(&self) -> Vec<&str> {
        match self {
            FxOutcome::Skipped => Vec::new(),
            FxOutcome::Written(results) => results
                .iter()
                .filter(|(_, outcome)| outcome.succeeded())
                .map(|(quote, _)| quote.as_str())
                .collect(),
        }
    }
}

pub struct FxUpdater<'a> {
    rates: &'a dyn RateSource,
    store: &'a dyn DataStore,
}

impl<'a> FxUpdater<'a> {
    pub fn new(rates: &'a dyn RateSource, store: &'a dyn DataStore) -> Self {
        Self { rates, store }
    }

    /// Fetches the latest rates and writes one row per quote currency.
    /// With `skip_if_fresh`, does nothing when today's rates are stored.
    pub async fn run(&self, skip_if_fresh: bool) -> Result<FxOutcome, AppError> {
        let now = Utc::now();
        if skip_if_fresh && self.has_rates_for_day(now).await? {
            tracing::info!("Rates for today already exist, skipping update");
            return Ok(FxOutcome::Skipped);
        }

        let latest = self.rates.latest(BASE_CURRENCY).await?;
        let mut results = Vec::new();
        for quote in QUOTE_CURRENCIES {
            let Some(rate) = latest.get(quote) else {
                tracing::warn!("Rate API returned no {} rate", quote);
                continue;
            };

            tracing::info!("Updating {} rate: {}", quote, rate);
            let outcome = self
                .write(&ExchangeRate {
                    base: BASE_CURRENCY.to_string(),
                    quote: quote.to_string(),
                    rate: *rate,
                    fetched_at: now,
                })
                .await;
            match &outcome {
                WriteOutcome::Inserted => tracing::info!("Successfully inserted {}", quote),
                WriteOutcome::Updated => tracing::info!("Successfully updated {}", quote),
                WriteOutcome::Failed(e) => tracing::error!("Failed to update {}: {}", quote, e),
            }
            results.push((quote.to_string(), outcome));
        }

        Ok(FxOutcome::Written(results))
    }

    async fn has_rates_for_day(&self, now: DateTime<Utc>) -> Result<bool, AppError> {
        let start = now.date_naive().and_hms_opt(0, 0, 0).map(|t| t.and_utc());
        let Some(start) = start else {
            return Ok(false);
        };
        let end = start + Duration::days(1);
        let fmt = |t: DateTime<Utc>| t.format("%Y-%m-%dT%H:%M:%SZ").to_string();

        let existing = self
            .store
            .select(
                FX_RATES_TABLE,
                &[Filter::gte("fetched_at", fmt(start)), Filter::lt("fetched_at", fmt(end))],
                Some(1),
            )
            .await?;
        Ok(!existing.is_empty())
    }

    /// Runs the insert → update sequence for one rate.
    pub async fn write(&self, rate: &ExchangeRate) -> WriteOutcome {
        let mut state = RateWrite::InsertAttempted;
        loop {
            state = match state {
                RateWrite::InsertAttempted => {
                    let record = match serde_json::to_value(rate) {
                        Ok(record) => record,
                        Err(e) => return WriteOutcome::Failed(e.to_string()),
                    };
                    match self.store.insert(FX_RATES_TABLE, &[record]).await {
                        Ok(_) => return WriteOutcome::Inserted,
                        Err(e) => {
                            tracing::info!("Insert failed for {}, trying update: {}", rate.quote, e);
                            RateWrite::UpdateAttempted { insert_error: e.to_string() }
                        }
                    }
                }
                RateWrite::UpdateAttempted { insert_error } => {
                    let patch = json!({ "rate": rate.rate, "fetched_at": rate.fetched_at });
                    let filters = [Filter::eq("base", rate.base.as_str()), Filter::eq("quote", rate.quote.as_str())];
                    return match self.store.update(FX_RATES_TABLE, &filters, &patch).await {
                        Ok(rows) if rows.is_empty() => WriteOutcome::Failed(format!(
                            "no existing {}/{} row to update after insert failed: {}",
                            rate.base, rate.quote, insert_error
                        )),
                        Ok(_) => WriteOutcome::Updated,
                        Err(e) => WriteOutcome::Failed(e.to_string()),
                    };
                }
            };
        }
    }
}
