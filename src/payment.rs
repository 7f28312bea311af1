// Payment method registry
// Saved payment instruments per user with a procedural single-default rule

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{BookingError, StoreError};
use crate::store::{decode_all, encode, Collection, Document, DocumentStore, Fields, Filter};

// Every variant-specific field name, so an update can clear the ones of a previous variant
const DETAIL_FIELDS: [&str; 6] = [
    "cardNumber",
    "cardExpiry",
    "cardName",
    "eWalletType",
    "phoneNumber",
    "bankName",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum PaymentDetails {
    CreditCard {
        card_number: String,
        card_expiry: String,
        card_name: String,
    },
    EWallet {
        e_wallet_type: String,
        phone_number: String,
    },
    BankTransfer {
        bank_name: String,
    },
}

impl PaymentDetails {
    // Every field of the variant must be filled in
    pub fn is_complete(&self) -> bool {
        match self {
            PaymentDetails::CreditCard {
                card_number,
                card_expiry,
                card_name,
            } => !card_number.trim().is_empty()
                && !card_expiry.trim().is_empty()
                && !card_name.trim().is_empty(),
            PaymentDetails::EWallet {
                e_wallet_type,
                phone_number,
            } => !e_wallet_type.trim().is_empty() && !phone_number.trim().is_empty(),
            PaymentDetails::BankTransfer { bank_name } => !bank_name.trim().is_empty(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            PaymentDetails::CreditCard { .. } => "Kartu Kredit/Debit",
            PaymentDetails::EWallet { .. } => "E-Wallet",
            PaymentDetails::BankTransfer { .. } => "Transfer Bank",
        }
    }

    // Masked label shown in lists and at checkout
    pub fn label(&self) -> String {
        match self {
            PaymentDetails::CreditCard { card_number, .. } => {
                let digits: Vec<char> = card_number.chars().collect();
                let last_four: String = digits[digits.len().saturating_sub(4)..].iter().collect();
                format!("**** **** **** {}", last_four)
            }
            PaymentDetails::EWallet {
                e_wallet_type,
                phone_number,
            } => format!("{} - {}", e_wallet_type.to_uppercase(), phone_number),
            PaymentDetails::BankTransfer { bank_name } => bank_name.to_uppercase(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethod {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    #[serde(flatten)]
    pub details: PaymentDetails,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentUpdate {
    pub details: PaymentDetails,
    // None keeps the current flag
    pub is_default: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeleteOutcome {
    pub deleted: bool,
    // The deleted method was the default, and no other method was promoted
    pub default_cleared: bool,
}

pub struct PaymentRegistry<S: DocumentStore> {
    store: Arc<S>,
}

impl<S: DocumentStore> PaymentRegistry<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<PaymentMethod>, StoreError> {
        let docs = self
            .store
            .query_equals(
                Collection::PaymentMethods,
                &[Filter::eq("userId", user_id)],
            )
            .await
            .map_err(|e| {
                error!(%user_id, error = %e, "error fetching payment methods");
                e
            })?;
        decode_all(&docs)
    }

    pub async fn default_method(&self, user_id: &str) -> Result<Option<PaymentMethod>, StoreError> {
        Ok(self.list(user_id).await?.into_iter().find(|m| m.is_default))
    }

    // The user's first method becomes the default
    pub async fn add(
        &self,
        user_id: &str,
        details: PaymentDetails,
    ) -> Result<PaymentMethod, BookingError> {
        if !details.is_complete() {
            return Err(BookingError::InvalidPaymentDetails(
                details.kind_name().to_string(),
            ));
        }
        let existing = self.list(user_id).await?;
        let mut method = PaymentMethod {
            id: String::new(),
            user_id: user_id.to_string(),
            details,
            is_default: existing.is_empty(),
            created_at: Some(Utc::now()),
        };
        method.id = self
            .store
            .insert(Collection::PaymentMethods, encode(&method)?)
            .await?;
        info!(%user_id, method_id = %method.id, is_default = method.is_default, "added payment method");
        Ok(method)
    }

    pub async fn update(
        &self,
        user_id: &str,
        method_id: &str,
        update: PaymentUpdate,
    ) -> Result<Option<PaymentMethod>, BookingError> {
        if !update.details.is_complete() {
            return Err(BookingError::InvalidPaymentDetails(
                update.details.kind_name().to_string(),
            ));
        }
        let Some(doc) = self.find(user_id, method_id).await? else {
            warn!(%user_id, %method_id, "payment method to update not found");
            return Ok(None);
        };
        let current: PaymentMethod = doc.decode()?;

        let mut patch = Fields::new();
        for field in DETAIL_FIELDS {
            patch.insert(field.to_string(), Value::Null);
        }
        for (key, value) in encode(&update.details)? {
            patch.insert(key, value);
        }
        if update.is_default == Some(false) {
            patch.insert("isDefault".to_string(), json!(false));
        }
        patch.insert("updatedAt".to_string(), json!(Utc::now()));
        self.store
            .update(Collection::PaymentMethods, &doc.id, patch)
            .await?;
        info!(%user_id, %method_id, "updated payment method");

        if update.is_default == Some(true) && !current.is_default {
            self.set_default(user_id, method_id).await?;
        }
        self.fetch(user_id, method_id).await
    }

    // Delete a method. Deleting the default leaves the user without one; the
    // outcome reports that so the caller can ask the user to pick another.
    pub async fn delete(&self, user_id: &str, method_id: &str) -> Result<DeleteOutcome, BookingError> {
        let Some(doc) = self.find(user_id, method_id).await? else {
            return Ok(DeleteOutcome::default());
        };
        let method: PaymentMethod = doc.decode()?;
        self.store
            .delete(Collection::PaymentMethods, &doc.id)
            .await?;
        info!(%user_id, %method_id, was_default = method.is_default, "deleted payment method");
        Ok(DeleteOutcome {
            deleted: true,
            default_cleared: method.is_default,
        })
    }

    // Make `method_id` the user's only default.
    // Runs in two phases without a transaction: every method is cleared, then
    // the target is set. If either phase fails the previous default is
    // restored on a best-effort basis before the error is returned.
    pub async fn set_default(&self, user_id: &str, method_id: &str) -> Result<(), BookingError> {
        let docs = self
            .store
            .query_equals(
                Collection::PaymentMethods,
                &[Filter::eq("userId", user_id)],
            )
            .await?;
        let methods: Vec<PaymentMethod> = decode_all(&docs)?;
        if !methods.iter().any(|m| m.id == method_id) {
            return Err(BookingError::UnknownPaymentMethod(method_id.to_string()));
        }
        let previous: Vec<String> = methods
            .iter()
            .filter(|m| m.is_default)
            .map(|m| m.id.clone())
            .collect();

        let store = &self.store;
        if let Err(e) = try_join_all(
            docs.iter()
                .map(|doc| store.update(Collection::PaymentMethods, &doc.id, default_patch(false))),
        )
        .await
        {
            error!(%user_id, %method_id, error = %e, "clearing defaults failed, restoring previous default");
            self.restore_defaults(user_id, &previous).await;
            return Err(e.into());
        }

        if let Err(e) = self
            .store
            .update(Collection::PaymentMethods, method_id, default_patch(true))
            .await
        {
            error!(%user_id, %method_id, error = %e, "setting default failed, restoring previous default");
            self.restore_defaults(user_id, &previous).await;
            return Err(e.into());
        }
        info!(%user_id, %method_id, "default payment method set");
        Ok(())
    }

    async fn restore_defaults(&self, user_id: &str, ids: &[String]) {
        for id in ids {
            if let Err(e) = self
                .store
                .update(Collection::PaymentMethods, id, default_patch(true))
                .await
            {
                error!(%user_id, method_id = %id, error = %e, "could not restore default payment method");
            }
        }
    }

    async fn find(&self, user_id: &str, method_id: &str) -> Result<Option<Document>, StoreError> {
        let docs = self
            .store
            .query_equals(
                Collection::PaymentMethods,
                &[Filter::eq("userId", user_id), Filter::eq("id", method_id)],
            )
            .await?;
        Ok(docs.into_iter().next())
    }

    async fn fetch(
        &self,
        user_id: &str,
        method_id: &str,
    ) -> Result<Option<PaymentMethod>, BookingError> {
        match self.find(user_id, method_id).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }
}

fn default_patch(is_default: bool) -> Fields {
    let mut patch = Fields::new();
    patch.insert("isDefault".to_string(), json!(is_default));
    patch.insert("updatedAt".to_string(), json!(Utc::now()));
    patch
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::PaymentDetails;

    pub fn card(number: &str) -> PaymentDetails {
        PaymentDetails::CreditCard {
            card_number: number.to_string(),
            card_expiry: "12/28".to_string(),
            card_name: "SARI DEWI".to_string(),
        }
    }

    pub fn gopay() -> PaymentDetails {
        PaymentDetails::EWallet {
            e_wallet_type: "gopay".to_string(),
            phone_number: "081234567890".to_string(),
        }
    }

    pub fn bca() -> PaymentDetails {
        PaymentDetails::BankTransfer {
            bank_name: "bca".to_string(),
        }
    }
}
