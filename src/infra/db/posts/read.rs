use async_trait::async_trait;
use sqlx::QueryBuilder;
use tracing::debug;
use uuid::Uuid;

use crate::application::pagination::PageWindow;
use crate::application::repos::{PostScope, PostsRepo, RepoError};
use crate::domain::entities::PostListing;

use super::types::{LISTING_COLUMNS, LISTING_FROM, PostListingRow};
use crate::infra::db::{PostgresRepositories, map_sqlx_error};

fn bind_i64(value: u64, what: &str) -> Result<i64, RepoError> {
    i64::try_from(value).map_err(|_| RepoError::InvalidInput {
        message: format!("{what} exceeds supported range"),
    })
}

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn count_posts(&self, scope: PostScope) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM posts p WHERE 1=1 ");
        Self::apply_scope_conditions(&mut qb, scope);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }

    async fn list_posts(
        &self,
        scope: PostScope,
        window: PageWindow,
    ) -> Result<Vec<PostListing>, RepoError> {
        let limit = bind_i64(window.limit, "page limit")?;
        let offset = bind_i64(window.offset, "page offset")?;

        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(LISTING_COLUMNS);
        qb.push(LISTING_FROM);
        qb.push(" WHERE 1=1 ");
        Self::apply_scope_conditions(&mut qb, scope);
        qb.push(" ORDER BY p.created_at DESC, p.id DESC LIMIT ");
        qb.push_bind(limit);
        qb.push(" OFFSET ");
        qb.push_bind(offset);

        let rows = qb
            .build_query_as::<PostListingRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        debug!(?scope, limit, offset, rows = rows.len(), "loaded post listings");

        Ok(rows.into_iter().map(PostListing::from).collect())
    }

    async fn find_post(&self, id: Uuid) -> Result<Option<PostListing>, RepoError> {
        let sql = format!("SELECT {LISTING_COLUMNS}{LISTING_FROM} WHERE p.id = $1");
        let row = sqlx::query_as::<_, PostListingRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(PostListing::from))
    }
}
