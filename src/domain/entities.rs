//! Domain entities mirrored from persistent storage.

use std::fmt;

use serde::Serialize;
use time::OffsetDateTime;

use crate::domain::posts::preview;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
}

impl fmt::Display for UserRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.username)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupRecord {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub description: String,
}

impl fmt::Display for GroupRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.title)
    }
}

/// Author fields joined onto every post listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorSummary {
    pub id: i64,
    pub username: String,
}

/// Group fields joined onto posts that belong to a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupSummary {
    pub id: i64,
    pub slug: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostRecord {
    pub id: i64,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub author: AuthorSummary,
    pub group: Option<GroupSummary>,
    pub image: Option<String>,
}

impl PostRecord {
    pub fn is_authored_by(&self, user: &UserRecord) -> bool {
        self.author.id == user.id
    }

    /// Listing order key: newer first, ties broken by the larger id.
    pub fn recency_key(&self) -> (OffsetDateTime, i64) {
        (self.created_at, self.id)
    }
}

impl fmt::Display for PostRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(preview(&self.text))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentRecord {
    pub id: i64,
    pub post_id: i64,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub author: AuthorSummary,
}

impl fmt::Display for CommentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(preview(&self.text))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FollowRecord {
    pub id: i64,
    pub user_id: i64,
    pub author_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_with_text(text: &str) -> PostRecord {
        PostRecord {
            id: 1,
            text: text.to_string(),
            created_at: OffsetDateTime::UNIX_EPOCH,
            author: AuthorSummary {
                id: 1,
                username: "auth".to_string(),
            },
            group: None,
            image: None,
        }
    }

    #[test]
    fn post_display_truncates_to_fifteen_characters() {
        let post = post_with_text("Тестовый пост о самых разных интересных вещах!");
        assert_eq!(post.to_string(), "Тестовый пост о");
    }

    #[test]
    fn short_post_display_is_unchanged() {
        let post = post_with_text("Hello");
        assert_eq!(post.to_string(), "Hello");
    }

    #[test]
    fn timestamps_serialize_as_rfc3339_strings() {
        let json = serde_json::to_value(post_with_text("Hello")).expect("serialize post");
        assert_eq!(json["created_at"], "1970-01-01T00:00:00Z");

        let comment = CommentRecord {
            id: 1,
            post_id: 1,
            text: "Nice".to_string(),
            created_at: OffsetDateTime::UNIX_EPOCH,
            author: AuthorSummary {
                id: 2,
                username: "reader".to_string(),
            },
        };
        let json = serde_json::to_value(comment).expect("serialize comment");
        assert_eq!(json["created_at"], "1970-01-01T00:00:00Z");
    }

    #[test]
    fn group_display_uses_title() {
        let group = GroupRecord {
            id: 1,
            title: "Тестовая группа".to_string(),
            slug: "test-slug".to_string(),
            description: "Тестовое описание".to_string(),
        };
        assert_eq!(group.to_string(), "Тестовая группа");
    }
}
