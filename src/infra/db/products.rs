use async_trait::async_trait;
use sqlx::{FromRow, Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::{
    application::{
        pagination::PageRequest,
        repos::{AppendOutcome, ProductQueryFilter, ProductsRepo, ProductsWriteRepo, RepoError},
    },
    domain::{
        entities::ProductRecord,
        products::{ProductDraft, retained_artifacts},
    },
};

use super::{PostgresRepositories, map_sqlx_error, util::convert_count};

const PRODUCT_COLUMNS: &str = "id, user_id, name, description, images, compressed_images, \
    price, created_at, updated_at";

#[derive(FromRow)]
struct ProductRow {
    id: i64,
    user_id: i64,
    name: String,
    description: String,
    images: Vec<String>,
    compressed_images: Vec<String>,
    price: f64,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<ProductRow> for ProductRecord {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            description: row.description,
            images: row.images,
            compressed_images: row.compressed_images,
            price: row.price,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl PostgresRepositories {
    fn apply_product_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &ProductQueryFilter) {
        if let Some(name) = filter.name.as_ref() {
            qb.push(" AND name ILIKE ");
            qb.push_bind(format!("%{}%", escape_like(name)));
        }

        if let Some(min) = filter.min_price {
            qb.push(" AND price >= ");
            qb.push_bind(min);
        }

        if let Some(max) = filter.max_price {
            qb.push(" AND price <= ");
            qb.push_bind(max);
        }
    }
}

/// Escape `LIKE` metacharacters so the name filter is a literal substring match.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[async_trait]
impl ProductsRepo for PostgresRepositories {
    async fn find_product(&self, id: i64) -> Result<Option<ProductRecord>, RepoError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(ProductRecord::from))
    }

    async fn list_products(
        &self,
        filter: &ProductQueryFilter,
        page: PageRequest,
    ) -> Result<Vec<ProductRecord>, RepoError> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE 1=1"
        ));
        Self::apply_product_filter(&mut qb, filter);

        let offset = i64::try_from(page.offset())
            .map_err(|_| RepoError::from_persistence("page offset exceeds supported range"))?;
        qb.push(" ORDER BY id ASC LIMIT ");
        qb.push_bind(i64::from(page.limit));
        qb.push(" OFFSET ");
        qb.push_bind(offset);

        let rows = qb
            .build_query_as::<ProductRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ProductRecord::from).collect())
    }

    async fn count_products(&self, filter: &ProductQueryFilter) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM products WHERE 1=1");
        Self::apply_product_filter(&mut qb, filter);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        convert_count(count)
    }
}

#[async_trait]
impl ProductsWriteRepo for PostgresRepositories {
    async fn create_product(&self, draft: &ProductDraft) -> Result<ProductRecord, RepoError> {
        let sql = format!(
            "INSERT INTO products (user_id, name, description, images, price) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {PRODUCT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(draft.user_id)
            .bind(&draft.name)
            .bind(&draft.description)
            .bind(&draft.images)
            .bind(draft.price)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn replace_product(
        &self,
        id: i64,
        draft: &ProductDraft,
    ) -> Result<Option<ProductRecord>, RepoError> {
        let allowed = retained_artifacts(id, &draft.images);
        let sql = format!(
            "UPDATE products \
                SET user_id = $2, \
                    name = $3, \
                    description = $4, \
                    images = $5, \
                    price = $6, \
                    compressed_images = ARRAY( \
                        SELECT reference FROM unnest(compressed_images) AS reference \
                         WHERE reference = ANY($7) \
                    ), \
                    updated_at = now() \
              WHERE id = $1 \
             RETURNING {PRODUCT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id)
            .bind(draft.user_id)
            .bind(&draft.name)
            .bind(&draft.description)
            .bind(&draft.images)
            .bind(draft.price)
            .bind(&allowed)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(ProductRecord::from))
    }

    async fn delete_product(&self, id: i64) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn append_compressed_image(
        &self,
        product_id: i64,
        image_url: &str,
        reference: &str,
    ) -> Result<AppendOutcome, RepoError> {
        let sql = format!(
            "UPDATE products \
                SET compressed_images = array_append(compressed_images, $2), \
                    updated_at = now() \
              WHERE id = $1 \
                AND $3 = ANY(images) \
                AND NOT ($2 = ANY(compressed_images)) \
             RETURNING {PRODUCT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(product_id)
            .bind(reference)
            .bind(image_url)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if let Some(row) = row {
            return Ok(AppendOutcome::Appended(row.into()));
        }

        let Some(current) = self.find_product(product_id).await? else {
            return Ok(AppendOutcome::OwnerMissing);
        };
        if current.has_compressed_image(reference) {
            Ok(AppendOutcome::AlreadyRecorded)
        } else {
            Ok(AppendOutcome::SourceRemoved)
        }
    }
}
