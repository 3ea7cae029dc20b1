//! Viewer identity and the relationship states derived from it.

use serde::Serialize;
use uuid::Uuid;

use crate::domain::entities::UserRecord;

/// Who is making the current request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Viewer {
    #[default]
    Anonymous,
    Authenticated(UserRecord),
}

impl Viewer {
    pub fn user(&self) -> Option<&UserRecord> {
        match self {
            Viewer::Anonymous => None,
            Viewer::Authenticated(user) => Some(user),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Viewer::Authenticated(_))
    }

    pub fn is_user(&self, user_id: Uuid) -> bool {
        self.user().is_some_and(|user| user.id == user_id)
    }
}

/// Relationship between the viewer and the author whose profile is shown.
///
/// An anonymous viewer is reported as such rather than as "not following".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowStatus {
    Anonymous,
    OwnProfile,
    NotFollowing,
    Following,
}

impl FollowStatus {
    pub fn can_follow(self) -> bool {
        matches!(self, FollowStatus::NotFollowing)
    }

    pub fn can_unfollow(self) -> bool {
        matches!(self, FollowStatus::Following)
    }
}
