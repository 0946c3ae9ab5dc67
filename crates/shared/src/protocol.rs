use serde::{Deserialize, Serialize};

use crate::domain::{FriendshipAction, TournamentId, UserId};

pub const LEAVE_TOURNAMENT_PATH: &str = "/api/games/tournament/leave/";
pub const FRIENDSHIP_PATH: &str = "/api/users/friendship/";
pub const FRIEND_REQUESTS_PATH: &str = "/api/users/friendship-requests/";
pub const DATA_EXPORT_PATH: &str = "/api/users/data-export/";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaveTournamentRequest {
    pub tournament_id: TournamentId,
}

/// Body shared by friendship POST (send request) and DELETE (remove friend).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FriendRequest {
    pub friend_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FriendshipActionRequest {
    pub friend_id: UserId,
    pub action: FriendshipAction,
}

/// Frame written to an open tournament socket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SocketEvent {
    pub event: String,
}

impl SocketEvent {
    pub const USER_LEFT: &'static str = "user_left";

    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
        }
    }

    pub fn user_left() -> Self {
        Self::new(Self::USER_LEFT)
    }
}
