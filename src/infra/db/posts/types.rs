use time::OffsetDateTime;

use crate::application::repos::{GroupSummary, PostListRecord};
use crate::domain::entities::PostRecord;

pub(super) const POST_COLUMNS: &str = "id, text, pub_date, author_id, group_id, image";

#[derive(sqlx::FromRow)]
pub(crate) struct PostRow {
    pub(crate) id: i64,
    pub(crate) text: String,
    pub(crate) pub_date: OffsetDateTime,
    pub(crate) author_id: i64,
    pub(crate) group_id: Option<i64>,
    pub(crate) image: Option<String>,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            text: row.text,
            pub_date: row.pub_date,
            author_id: row.author_id,
            group_id: row.group_id,
            image: row.image,
        }
    }
}

/// A post joined with its author and group.
#[derive(sqlx::FromRow)]
pub(crate) struct PostListRow {
    pub(crate) id: i64,
    pub(crate) text: String,
    pub(crate) pub_date: OffsetDateTime,
    pub(crate) author_id: i64,
    pub(crate) group_id: Option<i64>,
    pub(crate) image: Option<String>,
    pub(crate) author_username: String,
    pub(crate) group_slug: Option<String>,
    pub(crate) group_title: Option<String>,
}

impl From<PostListRow> for PostListRecord {
    fn from(row: PostListRow) -> Self {
        let group = match (row.group_id, row.group_slug, row.group_title) {
            (Some(id), Some(slug), Some(title)) => Some(GroupSummary { id, slug, title }),
            _ => None,
        };

        Self {
            post: PostRecord {
                id: row.id,
                text: row.text,
                pub_date: row.pub_date,
                author_id: row.author_id,
                group_id: row.group_id,
                image: row.image,
            },
            author_username: row.author_username,
            group,
        }
    }
}
