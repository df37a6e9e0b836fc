use chrono::{DateTime, Utc};
use sqlx::Row;

use listing_core::domain::property::{
    ContactId, OwnerDetails, PropertyFields, PropertyId, PropertyRecord, PropertyStatus,
};

use super::{parse_timestamp, timestamp, PropertyRepository, RepositoryError};
use crate::DbPool;

const PROPERTY_COLUMNS: &str = "id, contact_id, owner_name, owner_email, owner_address, owner_city,
     fields_json, status, created_at, updated_at";

pub struct SqlPropertyRepository {
    pool: DbPool,
}

impl SqlPropertyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_property(row: &sqlx::sqlite::SqliteRow) -> Result<PropertyRecord, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let contact_id: String =
        row.try_get("contact_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let owner_name: String =
        row.try_get("owner_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let owner_email: Option<String> =
        row.try_get("owner_email").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let owner_address: Option<String> =
        row.try_get("owner_address").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let owner_city: Option<String> =
        row.try_get("owner_city").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let fields_json: String =
        row.try_get("fields_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let fields: PropertyFields = serde_json::from_str(&fields_json)
        .map_err(|error| RepositoryError::Decode(format!("fields_json: {error}")))?;
    let status = PropertyStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown property status `{status_str}`")))?;

    Ok(PropertyRecord {
        id: PropertyId(id),
        contact_id: ContactId(contact_id),
        owner: OwnerDetails {
            name: owner_name,
            email: owner_email,
            address: owner_address,
            city: owner_city,
        },
        fields,
        status,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

fn encode_fields(fields: &PropertyFields) -> Result<String, RepositoryError> {
    serde_json::to_string(fields)
        .map_err(|error| RepositoryError::Decode(format!("fields_json: {error}")))
}

#[async_trait::async_trait]
impl PropertyRepository for SqlPropertyRepository {
    async fn create(&self, record: PropertyRecord) -> Result<(), RepositoryError> {
        let fields_json = encode_fields(&record.fields)?;
        sqlx::query(
            "INSERT INTO property (id, contact_id, owner_name, owner_email, owner_address,
                                   owner_city, fields_json, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id.0)
        .bind(&record.contact_id.0)
        .bind(&record.owner.name)
        .bind(&record.owner.email)
        .bind(&record.owner.address)
        .bind(&record.owner.city)
        .bind(&fields_json)
        .bind(record.status.as_str())
        .bind(timestamp(record.created_at))
        .bind(timestamp(record.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &PropertyId) -> Result<Option<PropertyRecord>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {PROPERTY_COLUMNS} FROM property WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_property).transpose()
    }

    async fn update_fields(
        &self,
        id: &PropertyId,
        fields: &PropertyFields,
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let fields_json = encode_fields(fields)?;
        let result = sqlx::query("UPDATE property SET fields_json = ?, updated_at = ? WHERE id = ?")
            .bind(&fields_json)
            .bind(timestamp(updated_at))
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("property {id}")));
        }
        Ok(())
    }

    async fn update_status(
        &self,
        id: &PropertyId,
        status: PropertyStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE property SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(timestamp(updated_at))
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("property {id}")));
        }
        Ok(())
    }

    async fn list(
        &self,
        status: Option<PropertyStatus>,
        limit: u32,
    ) -> Result<Vec<PropertyRecord>, RepositoryError> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {PROPERTY_COLUMNS} FROM property
                     WHERE status = ? ORDER BY updated_at DESC LIMIT ?"
                ))
                .bind(status.as_str())
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {PROPERTY_COLUMNS} FROM property ORDER BY updated_at DESC LIMIT ?"
                ))
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(row_to_property).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use listing_core::domain::property::{
        Condition, ContactId, OwnerDetails, PropertyId, PropertyRecord, PropertyStatus,
        PropertyType, SaleTimeframe,
    };

    use crate::migrations::run_pending;
    use crate::repositories::{PropertyRepository, RepositoryError, SqlPropertyRepository};
    use crate::{connect_with_settings, DbPool};

    async fn pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrations");
        pool
    }

    fn record() -> PropertyRecord {
        PropertyRecord::new(
            PropertyId("PROP-7".to_string()),
            ContactId("573001112233".to_string()),
            OwnerDetails {
                name: "Ana Gómez".to_string(),
                email: Some("ana@example.com".to_string()),
                address: Some("Cra 7 # 45-10".to_string()),
                city: Some("Bogotá".to_string()),
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn typed_fields_round_trip_through_json_column() {
        let repo = SqlPropertyRepository::new(pool().await);
        let mut record = record();
        repo.create(record.clone()).await.expect("create");

        record.fields.property_type = Some(PropertyType::Apartment);
        record.fields.built_area_m2 = Some(Decimal::new(825, 1));
        record.fields.floor = Some(12);
        record.fields.condition = Some(Condition::NeedsRenovation);
        record.fields.sale_timeframe = Some(SaleTimeframe::ThreeToSixMonths);
        record.fields.sale_price = Some(Decimal::from(380_000_000_i64));
        record.fields.deed = Some(true);
        repo.update_fields(&record.id, &record.fields, Utc::now()).await.expect("update");

        let found = repo.find_by_id(&record.id).await.expect("find").expect("exists");
        assert_eq!(found.fields, record.fields);
        assert_eq!(found.owner, record.owner);
        assert_eq!(found.status, PropertyStatus::Collecting);
    }

    #[tokio::test]
    async fn status_updates_and_filtered_listing() {
        let repo = SqlPropertyRepository::new(pool().await);
        let record = record();
        repo.create(record.clone()).await.expect("create");
        repo.update_status(&record.id, PropertyStatus::Complete, Utc::now()).await.expect("status");

        assert_eq!(repo.list(Some(PropertyStatus::Complete), 10).await.expect("list").len(), 1);
        assert!(repo.list(Some(PropertyStatus::Collecting), 10).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn updating_missing_property_is_not_found() {
        let repo = SqlPropertyRepository::new(pool().await);
        let record = record();
        let error = repo
            .update_fields(&record.id, &record.fields, Utc::now())
            .await
            .expect_err("no such row");
        assert!(matches!(error, RepositoryError::NotFound(_)));
    }
}
