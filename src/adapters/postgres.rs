//! Postgres implementations of the store ports.
//!
//! The single-open invariant is enforced by a partial unique index on
//! (buyer_id, offering_id) WHERE status = 'open'; `replace_open` runs the
//! delete and the insert inside one database transaction so a concurrent
//! success callback can never be lost between them.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{Discount, Offering, PromoCode, Transaction, TransactionStatus};
use crate::ports::{Catalog, PromoCodes, StoreError, StoreResult, TransactionStore};

const SELECT_TRANSACTION: &str = r#"
    SELECT id, code, buyer_id, offering_id, offering_kind,
           base_price, offering_discount, promo_code, promo_discount, final_price,
           status, created_at, updated_at
    FROM transactions
"#;

/// Postgres-backed transaction store.
#[derive(Clone)]
pub struct PostgresTransactionStore {
    pool: PgPool,
}

impl PostgresTransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionStore for PostgresTransactionStore {
    async fn create(&self, tx: &Transaction) -> StoreResult<Transaction> {
        let row = insert_transaction(&self.pool, tx).await.map_err(map_write_err)?;
        row.into_domain()
    }

    async fn replace_open(&self, old_id: Uuid, tx: &Transaction) -> StoreResult<Transaction> {
        let mut dbtx = self.pool.begin().await.map_err(map_db_err)?;

        let deleted = sqlx::query("DELETE FROM transactions WHERE id = $1 AND status = 'open'")
            .bind(old_id)
            .execute(&mut *dbtx)
            .await
            .map_err(map_db_err)?;

        if deleted.rows_affected() == 0 {
            // The record moved to a terminal status (or vanished) underneath
            // us; abort without writing anything.
            dbtx.rollback().await.map_err(map_db_err)?;
            return Err(StoreError::Conflict(format!(
                "transaction {old_id} is no longer open"
            )));
        }

        let row = insert_transaction(&mut *dbtx, tx).await.map_err(map_write_err)?;
        dbtx.commit().await.map_err(map_db_err)?;
        row.into_domain()
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!("{SELECT_TRANSACTION} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)?;
        row.map(TransactionRow::into_domain).transpose()
    }

    async fn get_by_code(&self, code: &str) -> StoreResult<Option<Transaction>> {
        let row =
            sqlx::query_as::<_, TransactionRow>(&format!("{SELECT_TRANSACTION} WHERE code = $1"))
                .bind(code)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_err)?;
        row.map(TransactionRow::into_domain).transpose()
    }

    async fn find_open(
        &self,
        buyer_id: Uuid,
        offering_id: Uuid,
    ) -> StoreResult<Option<Transaction>> {
        self.find_by_status(buyer_id, offering_id, TransactionStatus::Open).await
    }

    async fn find_paid(
        &self,
        buyer_id: Uuid,
        offering_id: Uuid,
    ) -> StoreResult<Option<Transaction>> {
        self.find_by_status(buyer_id, offering_id, TransactionStatus::Paid).await
    }

    async fn update_status(
        &self,
        id: Uuid,
        new_status: TransactionStatus,
        expected: TransactionStatus,
    ) -> StoreResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            UPDATE transactions SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = $3
            RETURNING id, code, buyer_id, offering_id, offering_kind,
                      base_price, offering_discount, promo_code, promo_discount, final_price,
                      status, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(new_status.as_str())
        .bind(expected.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?;

        match row {
            Some(row) => row.into_domain(),
            // Distinguish a lost conditional write from a missing record.
            None => match self.get(id).await? {
                Some(current) => Err(StoreError::Conflict(format!(
                    "transaction {id} is {}, expected {expected}",
                    current.status
                ))),
                None => Err(StoreError::NotFound(format!("transaction {id}"))),
            },
        }
    }

    async fn delete_open(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM transactions WHERE id = $1 AND status = 'open'")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;

        if result.rows_affected() == 1 {
            return Ok(());
        }
        match self.get(id).await? {
            Some(current) => Err(StoreError::Conflict(format!(
                "transaction {id} is {}, expected open",
                current.status
            ))),
            None => Err(StoreError::NotFound(format!("transaction {id}"))),
        }
    }

    async fn force_status(
        &self,
        id: Uuid,
        new_status: TransactionStatus,
    ) -> StoreResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            UPDATE transactions SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, code, buyer_id, offering_id, offering_kind,
                      base_price, offering_discount, promo_code, promo_discount, final_price,
                      status, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(new_status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?;

        row.ok_or_else(|| StoreError::NotFound(format!("transaction {id}")))?
            .into_domain()
    }

    async fn purge(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM transactions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("transaction {id}")));
        }
        Ok(())
    }
}

impl PostgresTransactionStore {
    async fn find_by_status(
        &self,
        buyer_id: Uuid,
        offering_id: Uuid,
        status: TransactionStatus,
    ) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "{SELECT_TRANSACTION} WHERE buyer_id = $1 AND offering_id = $2 AND status = $3"
        ))
        .bind(buyer_id)
        .bind(offering_id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?;
        row.map(TransactionRow::into_domain).transpose()
    }
}

async fn insert_transaction<'e, E>(executor: E, tx: &Transaction) -> Result<TransactionRow, sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query_as::<_, TransactionRow>(
        r#"
        INSERT INTO transactions (
            id, code, buyer_id, offering_id, offering_kind,
            base_price, offering_discount, promo_code, promo_discount, final_price,
            status, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING id, code, buyer_id, offering_id, offering_kind,
                  base_price, offering_discount, promo_code, promo_discount, final_price,
                  status, created_at, updated_at
        "#,
    )
    .bind(tx.id)
    .bind(&tx.code)
    .bind(tx.buyer_id)
    .bind(tx.offering_id)
    .bind(&tx.offering_kind)
    .bind(&tx.base_price)
    .bind(&tx.offering_discount)
    .bind(&tx.promo_code)
    .bind(&tx.promo_discount)
    .bind(&tx.final_price)
    .bind(tx.status.as_str())
    .bind(tx.created_at)
    .bind(tx.updated_at)
    .fetch_one(executor)
    .await
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    code: String,
    buyer_id: Uuid,
    offering_id: Uuid,
    offering_kind: String,
    base_price: BigDecimal,
    offering_discount: BigDecimal,
    promo_code: Option<String>,
    promo_discount: BigDecimal,
    final_price: BigDecimal,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> StoreResult<Transaction> {
        let status = TransactionStatus::parse(&self.status).ok_or_else(|| {
            StoreError::Database(format!("unknown transaction status '{}'", self.status))
        })?;
        Ok(Transaction {
            id: self.id,
            code: self.code,
            buyer_id: self.buyer_id,
            offering_id: self.offering_id,
            offering_kind: self.offering_kind,
            base_price: self.base_price,
            offering_discount: self.offering_discount,
            promo_code: self.promo_code,
            promo_discount: self.promo_discount,
            final_price: self.final_price,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Postgres-backed read-only catalog view.
#[derive(Clone)]
pub struct PostgresCatalog {
    pool: PgPool,
}

impl PostgresCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Catalog for PostgresCatalog {
    async fn offering(&self, id: Uuid) -> StoreResult<Option<Offering>> {
        let row = sqlx::query_as::<_, OfferingRow>(
            r#"
            SELECT id, kind, base_price, discount_type, discount_value,
                   active, valid_from, valid_until, promo_allowed
            FROM offerings WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?;
        row.map(OfferingRow::into_domain).transpose()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OfferingRow {
    id: Uuid,
    kind: String,
    base_price: BigDecimal,
    discount_type: Option<String>,
    discount_value: Option<BigDecimal>,
    active: bool,
    valid_from: Option<DateTime<Utc>>,
    valid_until: Option<DateTime<Utc>>,
    promo_allowed: bool,
}

impl OfferingRow {
    fn into_domain(self) -> StoreResult<Offering> {
        Ok(Offering {
            id: self.id,
            kind: self.kind,
            base_price: self.base_price,
            discount: discount_from_columns(self.discount_type, self.discount_value)?,
            active: self.active,
            valid_from: self.valid_from,
            valid_until: self.valid_until,
            promo_allowed: self.promo_allowed,
        })
    }
}

/// Postgres-backed promo code lookup.
#[derive(Clone)]
pub struct PostgresPromoCodes {
    pool: PgPool,
}

impl PostgresPromoCodes {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PromoCodes for PostgresPromoCodes {
    async fn find(&self, code: &str) -> StoreResult<Option<PromoCode>> {
        let row = sqlx::query_as::<_, PromoCodeRow>(
            r#"
            SELECT code, discount_type, discount_value, active, valid_from, valid_until
            FROM promo_codes WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?;
        row.map(PromoCodeRow::into_domain).transpose()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PromoCodeRow {
    code: String,
    discount_type: String,
    discount_value: BigDecimal,
    active: bool,
    valid_from: Option<DateTime<Utc>>,
    valid_until: Option<DateTime<Utc>>,
}

impl PromoCodeRow {
    fn into_domain(self) -> StoreResult<PromoCode> {
        let discount = discount_from_columns(Some(self.discount_type), Some(self.discount_value))?
            .ok_or_else(|| StoreError::Database("promo code without discount".to_string()))?;
        Ok(PromoCode {
            code: self.code,
            discount,
            active: self.active,
            valid_from: self.valid_from,
            valid_until: self.valid_until,
        })
    }
}

fn discount_from_columns(
    kind: Option<String>,
    value: Option<BigDecimal>,
) -> StoreResult<Option<Discount>> {
    match (kind, value) {
        (None, _) => Ok(None),
        (Some(kind), Some(value)) => match kind.as_str() {
            "percentage" => Ok(Some(Discount::Percentage(value))),
            "fixed" => Ok(Some(Discount::Fixed(value))),
            other => Err(StoreError::Database(format!("unknown discount type '{other}'"))),
        },
        (Some(kind), None) => Err(StoreError::Database(format!(
            "discount type '{kind}' without a value"
        ))),
    }
}

fn map_db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

/// Write-path mapping: unique violations (code collision, or the partial
/// index guarding one open transaction per buyer/offering pair) become
/// `Conflict` so the orchestrator can re-read and decide.
fn map_write_err(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(format!(
            "unique constraint violated: {}",
            db.constraint().unwrap_or("unknown")
        )),
        _ => StoreError::Database(e.to_string()),
    }
}
