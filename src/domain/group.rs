use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub icon_image: Option<String>,
    pub admin_id: Uuid,
    /// Includes the admin; ordered by join time.
    pub members: Vec<Uuid>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Group {
    #[must_use]
    pub fn is_member(&self, user_id: Uuid) -> bool {
        self.members.contains(&user_id)
    }

    #[must_use]
    pub fn is_admin(&self, user_id: Uuid) -> bool {
        self.admin_id == user_id
    }

    /// Fan-out target set for a message from `sender_id`.
    #[must_use]
    pub fn receivers_for(&self, sender_id: Uuid) -> Vec<Uuid> {
        self.members.iter().copied().filter(|id| *id != sender_id).collect()
    }
}

/// Partial update applied by the group admin.
#[derive(Debug, Clone, Default)]
pub struct GroupUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub icon_image: Option<String>,
}

impl GroupUpdate {
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.icon_image.is_none()
    }
}
