// History ledger
// Append-only record of completed checkouts; rows are never updated or deleted by the application

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::error::StoreError;
use crate::money::Amount;
use crate::store::{decode_all, encode, Collection, DocumentStore, Filter};

const MONTHS_ID: [&str; 12] = [
    "Januari",
    "Februari",
    "Maret",
    "April",
    "Mei",
    "Juni",
    "Juli",
    "Agustus",
    "September",
    "Oktober",
    "November",
    "Desember",
];

fn month_name(month0: u32) -> &'static str {
    MONTHS_ID.get(month0 as usize).copied().unwrap_or("")
}

// "19 Oktober 2026"
pub fn format_date_id(date: NaiveDate) -> String {
    format!("{} {} {}", date.day(), month_name(date.month0()), date.year())
}

// "19 Oktober 2026 14.05"
pub fn format_timestamp_id<Tz: chrono::TimeZone>(at: &DateTime<Tz>) -> String {
    format!(
        "{} {} {} {:02}.{:02}",
        at.day(),
        month_name(at.month0()),
        at.year(),
        at.hour(),
        at.minute()
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryStatus {
    Completed,
    Pending,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    pub transaction_id: String,
    // Human-readable transaction date
    pub date: String,
    pub hotel_name: String,
    pub city: String,
    pub image: String,
    pub check_in: String,
    pub check_out: String,
    pub guests: u32,
    pub nights: u32,
    pub total_paid: Amount,
    pub status: HistoryStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

pub struct HistoryLedger<S: DocumentStore> {
    store: Arc<S>,
}

impl<S: DocumentStore> HistoryLedger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn append(&self, item: &HistoryItem) -> Result<String, StoreError> {
        let id = self
            .store
            .insert(Collection::History, encode(item)?)
            .await
            .map_err(|e| {
                error!(user_id = %item.user_id, error = %e, "error adding to history");
                e
            })?;
        Ok(id)
    }

    // Persist all rows concurrently. Fails if any insert fails; rows already
    // written stay written.
    pub async fn append_all(&self, items: &[HistoryItem]) -> Result<Vec<String>, StoreError> {
        let ids = try_join_all(items.iter().map(|item| self.append(item))).await?;
        if let Some(first) = items.first() {
            info!(
                user_id = %first.user_id,
                transaction_id = %first.transaction_id,
                rows = ids.len(),
                "history recorded"
            );
        }
        Ok(ids)
    }

    // Newest first
    pub async fn fetch(&self, user_id: &str) -> Result<Vec<HistoryItem>, StoreError> {
        let docs = self
            .store
            .query_equals(Collection::History, &[Filter::eq("userId", user_id)])
            .await
            .map_err(|e| {
                error!(%user_id, error = %e, "error fetching history");
                e
            })?;
        let mut history: Vec<HistoryItem> = decode_all(&docs)?;
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, StoreOp};
    use chrono::{Duration, TimeZone};

    fn row(user: &str, trx: &str, hotel: &str, at: DateTime<Utc>) -> HistoryItem {
        HistoryItem {
            id: String::new(),
            user_id: user.to_string(),
            transaction_id: trx.to_string(),
            date: format_timestamp_id(&at),
            hotel_name: hotel.to_string(),
            city: "Bali".to_string(),
            image: String::new(),
            check_in: "1 November 2026".to_string(),
            check_out: "3 November 2026".to_string(),
            guests: 2,
            nights: 2,
            total_paid: 169_500,
            status: HistoryStatus::Completed,
            created_at: Some(at),
        }
    }

    #[test]
    fn test_indonesian_dates() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        assert_eq!(format_date_id(date), "19 Oktober 2026");
        let at = Utc.with_ymd_and_hms(2026, 1, 5, 9, 7, 0).unwrap();
        assert_eq!(format_timestamp_id(&at), "5 Januari 2026 09.07");
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_value(HistoryStatus::Cancelled).unwrap(),
            "cancelled"
        );
    }

    #[tokio::test]
    async fn test_fetch_orders_newest_first() {
        let store = Arc::new(InMemoryStore::new());
        let ledger = HistoryLedger::new(store.clone());
        let base = Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap();

        ledger.append(&row("u1", "TRX-1", "Old", base)).await.unwrap();
        ledger
            .append(&row("u1", "TRX-3", "Newest", base + Duration::days(2)))
            .await
            .unwrap();
        ledger
            .append(&row("u1", "TRX-2", "Middle", base + Duration::days(1)))
            .await
            .unwrap();
        ledger
            .append(&row("u2", "TRX-9", "Someone else", base))
            .await
            .unwrap();

        let history = ledger.fetch("u1").await.unwrap();
        let names: Vec<&str> = history.iter().map(|h| h.hotel_name.as_str()).collect();
        assert_eq!(names, vec!["Newest", "Middle", "Old"]);
    }

    #[tokio::test]
    async fn test_append_all_partial_failure_keeps_written_rows() {
        let store = Arc::new(InMemoryStore::new());
        let ledger = HistoryLedger::new(store.clone());
        let at = Utc::now();
        let rows = vec![
            row("u1", "TRX-1", "A", at),
            row("u1", "TRX-1", "B", at),
            row("u1", "TRX-1", "C", at),
        ];

        store.fail_operation(StoreOp::Insert, 1);
        assert!(ledger.append_all(&rows).await.is_err());
        assert!(store.len(Collection::History) < rows.len());
        assert!(!store.is_empty(Collection::History));
    }
}
