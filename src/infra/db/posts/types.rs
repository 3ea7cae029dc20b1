use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::{GroupSummary, PostListing, PostRecord};

/// Columns selected for a post listing; `p`, `u` and `g` alias posts, users
/// and groups.
pub(crate) const LISTING_COLUMNS: &str = "p.id, p.text, p.author_id, p.group_id, p.image, \
     p.created_at, u.username AS author_username, g.slug AS group_slug, g.title AS group_title";

pub(crate) const LISTING_FROM: &str = " FROM posts p \
     INNER JOIN users u ON u.id = p.author_id \
     LEFT JOIN groups g ON g.id = p.group_id ";

#[derive(sqlx::FromRow)]
pub(crate) struct PostRow {
    pub(crate) id: Uuid,
    pub(crate) text: String,
    pub(crate) author_id: Uuid,
    pub(crate) group_id: Option<Uuid>,
    pub(crate) image: Option<String>,
    pub(crate) created_at: OffsetDateTime,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            text: row.text,
            author_id: row.author_id,
            group_id: row.group_id,
            image: row.image,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct PostListingRow {
    pub(crate) id: Uuid,
    pub(crate) text: String,
    pub(crate) author_id: Uuid,
    pub(crate) group_id: Option<Uuid>,
    pub(crate) image: Option<String>,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) author_username: String,
    pub(crate) group_slug: Option<String>,
    pub(crate) group_title: Option<String>,
}

impl From<PostListingRow> for PostListing {
    fn from(row: PostListingRow) -> Self {
        let group = match (row.group_slug, row.group_title) {
            (Some(slug), Some(title)) => Some(GroupSummary { slug, title }),
            _ => None,
        };

        Self {
            post: PostRecord {
                id: row.id,
                text: row.text,
                author_id: row.author_id,
                group_id: row.group_id,
                image: row.image,
                created_at: row.created_at,
            },
            author_username: row.author_username,
            group,
        }
    }
}
