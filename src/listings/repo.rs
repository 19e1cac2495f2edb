use std::{collections::BTreeMap, sync::Mutex};

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::{
    error::StoreError,
    listings::repo_types::{Listing, NewListing},
};

/// Plain CRUD over listings. Ownership rules live in the service layer.
#[async_trait]
pub trait ListingRepository: Send + Sync {
    /// Newest first.
    async fn list_all(&self) -> Result<Vec<Listing>, StoreError>;
    async fn get(&self, id: i64) -> Result<Option<Listing>, StoreError>;
    async fn insert(&self, owner_id: i64, new: NewListing) -> Result<Listing, StoreError>;
    /// Writes every mutable column; `None` when the row no longer exists.
    async fn update(&self, listing: &Listing) -> Result<Option<Listing>, StoreError>;
    /// Returns whether a row was removed.
    async fn delete(&self, id: i64) -> Result<bool, StoreError>;
}

const LISTING_COLUMNS: &str =
    "id, title, description, price, category, location, image_url, user_id, created_at";

pub struct PgListingRepository {
    db: PgPool,
}

impl PgListingRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ListingRepository for PgListingRepository {
    async fn list_all(&self) -> Result<Vec<Listing>, StoreError> {
        let rows = sqlx::query_as::<_, Listing>(&format!(
            r#"
            SELECT {LISTING_COLUMNS}
            FROM listings
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn get(&self, id: i64) -> Result<Option<Listing>, StoreError> {
        let row = sqlx::query_as::<_, Listing>(&format!(
            "SELECT {LISTING_COLUMNS} FROM listings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn insert(&self, owner_id: i64, new: NewListing) -> Result<Listing, StoreError> {
        let row = sqlx::query_as::<_, Listing>(&format!(
            r#"
            INSERT INTO listings (title, description, price, category, location, image_url, user_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {LISTING_COLUMNS}
            "#
        ))
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.price)
        .bind(&new.category)
        .bind(&new.location)
        .bind(&new.image_url)
        .bind(owner_id)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn update(&self, listing: &Listing) -> Result<Option<Listing>, StoreError> {
        let row = sqlx::query_as::<_, Listing>(&format!(
            r#"
            UPDATE listings
               SET title = $2,
                   description = $3,
                   price = $4,
                   category = $5,
                   location = $6,
                   image_url = $7
             WHERE id = $1
            RETURNING {LISTING_COLUMNS}
            "#
        ))
        .bind(listing.id)
        .bind(&listing.title)
        .bind(&listing.description)
        .bind(listing.price)
        .bind(&listing.category)
        .bind(&listing.location)
        .bind(&listing.image_url)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM listings WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Default)]
pub struct InMemoryListingRepository {
    inner: Mutex<ListingTable>,
}

#[derive(Default)]
struct ListingTable {
    next_id: i64,
    rows: BTreeMap<i64, Listing>,
}

fn poisoned() -> StoreError {
    StoreError::Backend(anyhow::anyhow!("listing table lock poisoned"))
}

#[async_trait]
impl ListingRepository for InMemoryListingRepository {
    async fn list_all(&self) -> Result<Vec<Listing>, StoreError> {
        let table = self.inner.lock().map_err(|_| poisoned())?;
        let mut rows: Vec<Listing> = table.rows.values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn get(&self, id: i64) -> Result<Option<Listing>, StoreError> {
        let table = self.inner.lock().map_err(|_| poisoned())?;
        Ok(table.rows.get(&id).cloned())
    }

    async fn insert(&self, owner_id: i64, new: NewListing) -> Result<Listing, StoreError> {
        let mut table = self.inner.lock().map_err(|_| poisoned())?;
        table.next_id += 1;
        let listing = Listing {
            id: table.next_id,
            title: new.title,
            description: new.description,
            price: new.price,
            category: new.category,
            location: new.location,
            image_url: new.image_url,
            user_id: owner_id,
            created_at: OffsetDateTime::now_utc(),
        };
        table.rows.insert(listing.id, listing.clone());
        Ok(listing)
    }

    async fn update(&self, listing: &Listing) -> Result<Option<Listing>, StoreError> {
        let mut table = self.inner.lock().map_err(|_| poisoned())?;
        let Some(row) = table.rows.get_mut(&listing.id) else {
            return Ok(None);
        };
        // owner and creation time are immutable
        *row = Listing {
            user_id: row.user_id,
            created_at: row.created_at,
            ..listing.clone()
        };
        Ok(Some(row.clone()))
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let mut table = self.inner.lock().map_err(|_| poisoned())?;
        Ok(table.rows.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chair(price: f64) -> NewListing {
        NewListing {
            title: "Chair".into(),
            description: "Hand-carved".into(),
            price,
            category: "Product".into(),
            location: "Thika Town".into(),
            image_url: None,
        }
    }

    #[tokio::test]
    async fn list_all_is_newest_first() {
        let repo = InMemoryListingRepository::default();
        let first = repo.insert(1, chair(10.0)).await.unwrap();
        let second = repo.insert(1, chair(20.0)).await.unwrap();
        let all = repo.list_all().await.unwrap();
        assert_eq!(
            all.iter().map(|l| l.id).collect::<Vec<_>>(),
            vec![second.id, first.id]
        );
    }

    #[tokio::test]
    async fn update_keeps_owner_and_created_at() {
        let repo = InMemoryListingRepository::default();
        let original = repo.insert(1, chair(10.0)).await.unwrap();
        let mut changed = original.clone();
        changed.title = "Table".into();
        changed.user_id = 99;
        let saved = repo.update(&changed).await.unwrap().unwrap();
        assert_eq!(saved.title, "Table");
        assert_eq!(saved.user_id, 1);
        assert_eq!(saved.created_at, original.created_at);
    }

    #[tokio::test]
    async fn delete_is_permanent() {
        let repo = InMemoryListingRepository::default();
        let l = repo.insert(1, chair(10.0)).await.unwrap();
        assert!(repo.delete(l.id).await.unwrap());
        assert!(repo.get(l.id).await.unwrap().is_none());
        assert!(!repo.delete(l.id).await.unwrap());
        assert!(repo.update(&l).await.unwrap().is_none());
    }
}
