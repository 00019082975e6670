use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockbill_core::{DomainError, DomainResult, Entity, ErrorKind, ProductId};

/// Entity: Product (one stock balance in the ledger).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    code: String,
    description: String,
    balance: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Payload: create a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub code: String,
    pub description: String,
    pub balance: i64,
}

/// Payload: replace the mutable fields of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdate {
    pub code: String,
    pub description: String,
    pub balance: i64,
}

/// Why a single debit was refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DebitError {
    #[error("product {0} not found")]
    NotFound(ProductId),

    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: i64, available: i64 },

    #[error("invalid quantity: {0}")]
    InvalidQuantity(i64),
}

impl DebitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DebitError::NotFound(_) => ErrorKind::NotFound,
            DebitError::InsufficientBalance { .. } => ErrorKind::BusinessDenial,
            DebitError::InvalidQuantity(_) => ErrorKind::Validation,
        }
    }
}

impl Product {
    /// Build a validated product.
    pub fn create(id: ProductId, new: NewProduct, now: DateTime<Utc>) -> DomainResult<Self> {
        validate_fields(&new.code, &new.description, new.balance)?;
        Ok(Self {
            id,
            code: new.code.trim().to_string(),
            description: new.description.trim().to_string(),
            balance: new.balance,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn balance(&self) -> i64 {
        self.balance
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the code this update would leave the product with.
    pub fn normalized_code(update: &ProductUpdate) -> &str {
        update.code.trim()
    }

    /// Replace code, description and balance. Either all fields change or none.
    ///
    /// Code uniqueness is not checked here; the ledger owns the code index.
    pub fn apply_update(&mut self, update: ProductUpdate, now: DateTime<Utc>) -> DomainResult<()> {
        validate_fields(&update.code, &update.description, update.balance)?;
        self.code = update.code.trim().to_string();
        self.description = update.description.trim().to_string();
        self.balance = update.balance;
        self.updated_at = now;
        Ok(())
    }

    /// Advisory check: would a debit of `quantity` succeed right now?
    pub fn can_reserve(&self, quantity: i64) -> bool {
        quantity > 0 && self.balance >= quantity
    }

    /// Debit `quantity` from the balance and return the new balance.
    ///
    /// The caller must hold whatever lock makes read-check-write indivisible
    /// for this product. On error the product is left untouched.
    pub fn debit(&mut self, quantity: i64, now: DateTime<Utc>) -> Result<i64, DebitError> {
        if quantity <= 0 {
            return Err(DebitError::InvalidQuantity(quantity));
        }
        if self.balance < quantity {
            return Err(DebitError::InsufficientBalance {
                requested: quantity,
                available: self.balance,
            });
        }
        self.balance -= quantity;
        self.updated_at = now;
        Ok(self.balance)
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

fn validate_fields(code: &str, description: &str, balance: i64) -> DomainResult<()> {
    if code.trim().is_empty() {
        return Err(DomainError::validation("code cannot be empty"));
    }
    if description.trim().is_empty() {
        return Err(DomainError::validation("description cannot be empty"));
    }
    if balance < 0 {
        return Err(DomainError::validation("balance cannot be negative"));
    }
    Ok(())
}
